//! One-time addresses requested from the wallet service, at most one per
//! trade guid.

use crate::{
    config::RetryPolicy, retry::with_retry, wallet::WalletService, IndClientError, Result,
};
use ind_protocol::{
    constants::endpoints,
    crypto::OneTimePublicKey,
    infrastructure::logging,
    types::{
        messages::{GrantAccessRequest, OneTimeAddressRequest, OneTimeAddressResponse},
        Guid, OneTimeAddress,
    },
};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    InFlight,
    Issued,
    /// The wallet may have issued an address that never reached us.
    Abandoned,
}

#[derive(Debug, Default)]
struct Ledger {
    requests: HashMap<Guid, RequestState>,
    /// Issued public key to the guid it was issued for.
    issued_keys: HashMap<String, Guid>,
}

/// Client of the wallet's one-time address endpoint.
///
/// Each guid is requested at most once per oracle. A guid is reserved before
/// the wallet is called, so a concurrent or later request for it fails fast
/// with [`IndClientError::DuplicateAddressRequest`]. The reservation is only
/// released when the wallet provably never saw the request.
#[derive(Debug)]
pub struct AddressOracle<W> {
    wallet: W,
    retry: RetryPolicy,
    ledger: Mutex<Ledger>,
}

impl<W: WalletService> AddressOracle<W> {
    pub fn new(wallet: W, retry: RetryPolicy) -> Self {
        Self {
            wallet,
            retry,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    /// Request the one-time address of `guid`.
    ///
    /// The returned public key was not issued for any other guid seen by this
    /// oracle.
    #[instrument(skip_all, err(Debug), fields(guid))]
    pub async fn request_one_time_address(
        &self,
        guid: &Guid,
        company_name: &str,
        signer_name: &str,
    ) -> Result<OneTimeAddress> {
        logging::record_field("guid", guid);
        self.reserve(guid).await?;

        let request = OneTimeAddressRequest {
            guid: guid.clone(),
            company_name: company_name.to_string(),
            signer_name: signer_name.to_string(),
        };
        let outcome = self.fetch(&request).await;

        let mut ledger = self.ledger.lock().await;
        match outcome {
            Ok(address) => {
                let public_key = address.public_key.to_string();
                if let Some(first_guid) = ledger.issued_keys.get(&public_key) {
                    error!("Wallet reissued the public key of trade {}", first_guid);
                    let error = IndClientError::PublicKeyReused {
                        guid: guid.to_string(),
                        first_guid: first_guid.to_string(),
                    };
                    let _ = ledger.requests.insert(guid.clone(), RequestState::Abandoned);
                    return Err(error);
                }
                let _ = ledger.issued_keys.insert(public_key, guid.clone());
                let _ = ledger.requests.insert(guid.clone(), RequestState::Issued);
                info!("Received one-time address {}", address.address);
                Ok(address)
            }
            Err(error) if error.never_sent() => {
                warn!("Wallet unreachable, releasing the guid");
                let _ = ledger.requests.remove(guid);
                Err(error)
            }
            Err(error) => {
                let _ = ledger.requests.insert(guid.clone(), RequestState::Abandoned);
                Err(error)
            }
        }
    }

    /// Have the wallet re-wrap a key it custodies for another party's
    /// one-time key. Returns `partyEncryptedSymmetricKey`.
    #[instrument(skip_all, err(Debug), fields(guid))]
    pub async fn remote_grant_access(&self, request: &GrantAccessRequest) -> Result<String> {
        logging::record_field("guid", &request.guid);
        let response = with_retry(&self.retry, endpoints::GRANT_ACCESS, move || {
            self.wallet.grant_access(request)
        })
        .await?;

        if !response.is_ok() {
            warn!("Wallet refused the grant: {}", response.error);
            return Err(IndClientError::Upstream {
                guid: request.guid.to_string(),
                error: response.error,
            });
        }
        Ok(response.party_encrypted_symmetric_key)
    }

    async fn reserve(&self, guid: &Guid) -> Result<()> {
        let mut ledger = self.ledger.lock().await;
        if let Some(state) = ledger.requests.get(guid) {
            warn!("Guid already requested ({:?})", state);
            return Err(IndClientError::DuplicateAddressRequest(guid.to_string()));
        }
        let _ = ledger.requests.insert(guid.clone(), RequestState::InFlight);
        Ok(())
    }

    async fn fetch(&self, request: &OneTimeAddressRequest) -> Result<OneTimeAddress> {
        let response = with_retry(&self.retry, endpoints::ONE_TIME_ADDRESS, move || {
            self.wallet.one_time_address(request)
        })
        .await?;
        parse_response(&request.guid, response)
    }
}

fn parse_response(guid: &Guid, response: OneTimeAddressResponse) -> Result<OneTimeAddress> {
    if !response.is_ok() {
        return Err(IndClientError::Upstream {
            guid: guid.to_string(),
            error: response.error,
        });
    }
    if !response.guid.is_empty() && response.guid != guid.as_str() {
        return Err(IndClientError::InvalidResponse(format!(
            "answer for trade {} instead of {guid}",
            response.guid
        )));
    }

    let public_key: OneTimePublicKey = response
        .bitcore_public_key
        .parse()
        .map_err(|error| IndClientError::InvalidResponse(format!("{error}")))?;
    let address = OneTimeAddress::from_public_key(guid.clone(), public_key);
    if !response.ot_address.is_empty() && !response.ot_address.eq_ignore_ascii_case(&address.address)
    {
        return Err(IndClientError::InvalidResponse(format!(
            "address {} does not belong to the issued public key",
            response.ot_address
        )));
    }
    Ok(address)
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;
    use ind_protocol::{
        crypto::OneTimeSecretKey,
        types::messages::GrantAccessResponse,
    };
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    #[derive(Default)]
    struct TestWallet {
        /// Calls that fail with `failure` before the wallet answers.
        failures: u32,
        failure: Option<fn() -> IndClientError>,
        /// Non-`OK` error to answer with.
        error: Option<&'static str>,
        /// Answer every request with the same key.
        fixed_key: bool,
        delay: Duration,
        calls: AtomicU32,
    }

    #[async_trait]
    impl WalletService for TestWallet {
        async fn one_time_address(
            &self,
            request: &OneTimeAddressRequest,
        ) -> Result<OneTimeAddressResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if let Some(failure) = self.failure {
                if call < self.failures {
                    return Err(failure());
                }
            }

            let secret = if self.fixed_key {
                OneTimeSecretKey::from_bytes(&[7; 32]).unwrap()
            } else {
                OneTimeSecretKey::generate(&mut rand::thread_rng())
            };
            let public_key = secret.public_key();
            Ok(OneTimeAddressResponse {
                guid: request.guid.to_string(),
                ot_address: public_key.address(),
                bitcore_public_key: public_key.to_string(),
                encrypted_symmetric_key: String::new(),
                error: self.error.unwrap_or("OK").to_string(),
            })
        }

        async fn grant_access(&self, request: &GrantAccessRequest) -> Result<GrantAccessResponse> {
            Ok(GrantAccessResponse {
                guid: request.guid.to_string(),
                party_encrypted_symmetric_key: "0xwrapped".to_string(),
                error: self.error.unwrap_or("OK").to_string(),
            })
        }
    }

    fn refused() -> IndClientError {
        IndClientError::UpstreamUnavailable("refused".to_string())
    }

    fn reset() -> IndClientError {
        IndClientError::AmbiguousOutcome("connection reset".to_string())
    }

    fn oracle(wallet: TestWallet) -> AddressOracle<TestWallet> {
        AddressOracle::new(
            wallet,
            RetryPolicy {
                request_timeout: Duration::from_secs(1),
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
            },
        )
    }

    fn guid(value: &str) -> Guid {
        Guid::new(value).unwrap()
    }

    #[tokio::test]
    async fn address_matches_the_issued_key() {
        let oracle = oracle(TestWallet::default());
        let address = oracle
            .request_one_time_address(&guid("T1"), "Mercuria", "alice")
            .await
            .unwrap();
        assert_eq!(address.correlation_id, guid("T1"));
        assert_eq!(address.address, address.public_key.address());
    }

    #[tokio::test]
    async fn second_request_for_a_guid_is_a_duplicate() {
        let oracle = oracle(TestWallet::default());
        let _ = oracle
            .request_one_time_address(&guid("T1"), "Mercuria", "alice")
            .await
            .unwrap();
        let second = oracle
            .request_one_time_address(&guid("T1"), "Mercuria", "alice")
            .await;
        assert!(matches!(
            second,
            Err(IndClientError::DuplicateAddressRequest(_))
        ));
        assert_eq!(oracle.wallet().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_for_a_guid_reach_the_wallet_once() {
        let oracle = oracle(TestWallet {
            delay: Duration::from_millis(20),
            ..TestWallet::default()
        });
        let t1 = guid("T1");
        let (first, second) = tokio::join!(
            oracle.request_one_time_address(&t1, "Mercuria", "alice"),
            oracle.request_one_time_address(&t1, "Mercuria", "alice"),
        );

        assert_eq!(
            [&first, &second].iter().filter(|result| result.is_ok()).count(),
            1
        );
        assert!([first, second]
            .into_iter()
            .any(|result| matches!(result, Err(IndClientError::DuplicateAddressRequest(_)))));
        assert_eq!(oracle.wallet().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_wallet_releases_the_guid() {
        let oracle = oracle(TestWallet {
            failures: 3,
            failure: Some(refused as fn() -> IndClientError),
            ..TestWallet::default()
        });

        let first = oracle
            .request_one_time_address(&guid("T1"), "Mercuria", "alice")
            .await;
        assert!(matches!(first, Err(IndClientError::UpstreamUnavailable(_))));

        // The wallet never saw the guid, so it can be requested again.
        let _ = oracle
            .request_one_time_address(&guid("T1"), "Mercuria", "alice")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ambiguous_failures_keep_the_guid_consumed() {
        let oracle = oracle(TestWallet {
            failures: 1,
            failure: Some(reset as fn() -> IndClientError),
            ..TestWallet::default()
        });

        let first = oracle
            .request_one_time_address(&guid("T1"), "Mercuria", "alice")
            .await;
        assert!(matches!(first, Err(IndClientError::AmbiguousOutcome(_))));

        let second = oracle
            .request_one_time_address(&guid("T1"), "Mercuria", "alice")
            .await;
        assert!(matches!(
            second,
            Err(IndClientError::DuplicateAddressRequest(_))
        ));
        assert_eq!(oracle.wallet().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wallet_errors_are_surfaced_verbatim() {
        let oracle = oracle(TestWallet {
            error: Some("Company not registered"),
            ..TestWallet::default()
        });
        let error = oracle
            .request_one_time_address(&guid("T1"), "Mercuria", "alice")
            .await
            .unwrap_err();
        assert!(matches!(error, IndClientError::Upstream { ref guid, .. } if guid == "T1"));
        assert_eq!(error.to_string(), "Company not registered");
    }

    #[tokio::test]
    async fn reused_public_keys_are_rejected() {
        let oracle = oracle(TestWallet {
            fixed_key: true,
            ..TestWallet::default()
        });
        let _ = oracle
            .request_one_time_address(&guid("T1"), "Mercuria", "alice")
            .await
            .unwrap();
        let second = oracle
            .request_one_time_address(&guid("T2"), "Mercuria", "alice")
            .await;
        assert!(matches!(
            second,
            Err(IndClientError::PublicKeyReused { ref first_guid, .. }) if first_guid == "T1"
        ));
    }

    #[test]
    fn addresses_must_match_the_public_key() {
        let public_key = OneTimeSecretKey::from_bytes(&[7; 32]).unwrap().public_key();
        let response = OneTimeAddressResponse {
            guid: "T1".to_string(),
            ot_address: "0x0000000000000000000000000000000000000000".to_string(),
            bitcore_public_key: public_key.to_string(),
            encrypted_symmetric_key: String::new(),
            error: "OK".to_string(),
        };
        assert!(matches!(
            parse_response(&guid("T1"), response),
            Err(IndClientError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn remote_grants_return_the_wrapped_key() {
        let oracle = oracle(TestWallet::default());
        let request = GrantAccessRequest {
            guid: guid("T1"),
            accessible_symmetric_key: "0x01".to_string(),
            party_ot_address: "0xabc".to_string(),
            party_bitcore_public_key: "0x02".to_string(),
            contract_address: "0xdef".to_string(),
            company_name: "ICAP".to_string(),
        };
        assert_eq!(
            oracle.remote_grant_access(&request).await.unwrap(),
            "0xwrapped"
        );
    }
}
