//! Party-side orchestration of a confidential trade: encrypting a record
//! under field group keys, posting it through the relay and handing out
//! group keys to other parties.

use crate::{
    config::{Config, RetryPolicy},
    oracle::AddressOracle,
    relay::{HttpRelay, Relay, RelayClient},
    transport::JsonTransport,
    wallet::{HttpWalletService, WalletService},
    Result,
};
use ind_protocol::{
    assembler,
    codec::{self, DecryptOptions, DecryptedFields, KeyMap, Keyring},
    config::ContractRegistry,
    crypto::{KeyId, OneTimeSecretKey},
    grant::{self, AccessGrant},
    infrastructure::logging,
    key_store::{InMemoryKeyStore, KeyStore},
    types::{
        messages::GrantAccessRequest,
        transaction::{
            CreateTransactionResponse, RegistrationData, SignedRequest, UnRegistrationData,
        },
        EncryptedRecord, FieldGroup, Guid, OneTimeAddress, PlainRecord, RoutingInfo,
        TransactionEnvelope,
    },
};
use rand::{rngs::StdRng, SeedableRng};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// The operations one trading party performs, on top of a wallet service, a
/// relay and a local [`KeyStore`].
#[derive(Debug)]
pub struct TradeClient<W, R, S = InMemoryKeyStore> {
    oracle: AddressOracle<W>,
    relay: RelayClient<R>,
    store: Arc<S>,
    registry: ContractRegistry,
    rng: Arc<Mutex<StdRng>>,
    /// Held from key id allocation until the new keys are bound, so that two
    /// encryptions of one guid never allocate the same id.
    key_locks: Mutex<HashMap<Guid, Arc<Mutex<()>>>>,
}

impl TradeClient<HttpWalletService, HttpRelay> {
    /// A client talking to the wallet and relay of `config`, with an empty
    /// in-memory key store.
    pub fn connect(config: &Config) -> Self {
        let wallet = HttpWalletService::new(JsonTransport::new(
            config.wallet_uri.clone(),
            config.tls_config.clone(),
        ));
        let relay = HttpRelay::new(JsonTransport::new(
            config.relay_uri.clone(),
            config.tls_config.clone(),
        ));

        Self::new(
            wallet,
            relay,
            Arc::new(InMemoryKeyStore::new()),
            config.contracts.clone().into(),
            config.retry,
        )
    }
}

impl<W: WalletService, R: Relay, S: KeyStore> TradeClient<W, R, S> {
    pub fn new(
        wallet: W,
        relay: R,
        store: Arc<S>,
        registry: ContractRegistry,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            oracle: AddressOracle::new(wallet, retry),
            relay: RelayClient::new(relay, retry),
            store,
            registry,
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the random number generator, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Arc::new(Mutex::new(rng));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn oracle(&self) -> &AddressOracle<W> {
        &self.oracle
    }

    pub fn relay(&self) -> &R {
        self.relay.relay()
    }

    /// Request this party's one-time address for `guid`. See
    /// [`AddressOracle::request_one_time_address`].
    pub async fn one_time_address(
        &self,
        guid: &Guid,
        company_name: &str,
        signer_name: &str,
    ) -> Result<OneTimeAddress> {
        self.oracle
            .request_one_time_address(guid, company_name, signer_name)
            .await
    }

    /// Encrypt `record` with one key per group. Groups that already have a
    /// key for `guid` reuse it; new groups get fresh keys, which are bound
    /// once the whole record is encrypted.
    pub async fn encrypt_record(
        &self,
        guid: &Guid,
        record: &PlainRecord,
        groups: &[FieldGroup],
    ) -> Result<EncryptedRecord> {
        self.encrypt_with(guid, record, groups, &[]).await
    }

    /// Like [`TradeClient::encrypt_record`], but `rotated` groups get a fresh
    /// key even if they have one. The new key becomes the group's current
    /// key, so grants issued from now on no longer open the old one.
    pub async fn rotate_and_encrypt(
        &self,
        guid: &Guid,
        record: &PlainRecord,
        groups: &[FieldGroup],
        rotated: &[&str],
    ) -> Result<EncryptedRecord> {
        self.encrypt_with(guid, record, groups, rotated).await
    }

    #[instrument(skip_all, err(Debug), fields(guid))]
    async fn encrypt_with(
        &self,
        guid: &Guid,
        record: &PlainRecord,
        groups: &[FieldGroup],
        rotated: &[&str],
    ) -> Result<EncryptedRecord> {
        logging::record_field("guid", guid);

        let key_lock = self.key_lock(guid).await;
        let _allocating = key_lock.lock().await;

        let mut keyring = Keyring::continuing(self.store.bindings(guid).await);
        for group_name in rotated {
            keyring.rotate(*group_name);
        }

        let encrypted = {
            let mut rng = self.rng.lock().await;
            codec::encrypt_groups(&mut *rng, guid, record, groups, &mut keyring)?
        };

        for binding in keyring.new_bindings() {
            self.store
                .bind(guid, binding.key_id, &binding.group_name, binding.key)
                .await?;
        }
        Ok(encrypted)
    }

    /// Decrypt every field of `encrypted` this party holds a key for.
    #[instrument(skip_all, err(Debug), fields(guid))]
    pub async fn decrypt_record(
        &self,
        encrypted: &EncryptedRecord,
        options: DecryptOptions,
    ) -> Result<DecryptedFields> {
        logging::record_field("guid", &encrypted.guid);

        let available: KeyMap = self
            .store
            .bindings(&encrypted.guid)
            .await
            .into_iter()
            .map(|binding| (binding.key_id, binding.key))
            .collect();
        Ok(codec::decrypt_fields(encrypted, &available, options)?)
    }

    /// Give the holder of `recipient` read access to `group_name`.
    pub async fn grant_access(
        &self,
        guid: &Guid,
        group_name: &str,
        recipient: &OneTimeAddress,
    ) -> Result<AccessGrant> {
        let mut rng = self.rng.lock().await;
        Ok(grant::grant_access(&mut *rng, self.store.as_ref(), guid, group_name, recipient).await?)
    }

    /// Unwrap a grant addressed to this party and keep its key. Returns the
    /// key id to decrypt with.
    #[instrument(skip_all, err(Debug), fields(guid))]
    pub async fn accept_grant(
        &self,
        grant: &AccessGrant,
        recipient: &OneTimeSecretKey,
    ) -> Result<KeyId> {
        logging::record_field("guid", &grant.guid);

        let (key_id, key) = grant::unwrap_grant(grant, recipient)?;
        let key_lock = self.key_lock(&grant.guid).await;
        let _binding = key_lock.lock().await;
        self.store
            .bind(&grant.guid, key_id.clone(), &grant.group_name, key)
            .await?;
        info!("Accepted grant for group {}", grant.group_name);
        Ok(key_id)
    }

    /// Have the wallet re-wrap a key it custodies. See
    /// [`AddressOracle::remote_grant_access`].
    pub async fn remote_grant_access(&self, request: &GrantAccessRequest) -> Result<String> {
        self.oracle.remote_grant_access(request).await
    }

    /// Build the envelope of an encrypted record.
    pub fn envelope(
        &self,
        record: EncryptedRecord,
        message_hash: impl Into<String>,
        signature: impl Into<String>,
        routing: RoutingInfo,
    ) -> Result<TransactionEnvelope> {
        Ok(assembler::assemble(
            &self.registry,
            record,
            message_hash,
            signature,
            routing,
        )?)
    }

    pub async fn post(&self, envelope: &TransactionEnvelope) -> Result<()> {
        self.relay.post_transaction(envelope).await
    }

    /// Publish an encrypted record as a contract.
    pub async fn create_transaction(
        &self,
        record: &EncryptedRecord,
        message_hash: impl Into<String>,
        signature: impl Into<String>,
        routing: RoutingInfo,
    ) -> Result<CreateTransactionResponse> {
        let request = assembler::assemble_transaction(
            &self.registry,
            record,
            message_hash,
            signature,
            routing,
        )?;
        self.relay.create_transaction(&request).await
    }

    pub async fn register_company(
        &self,
        company_name: &str,
        url: &str,
        signature: &str,
    ) -> Result<()> {
        let request = SignedRequest {
            message: RegistrationData {
                company_name: company_name.to_string(),
                url: url.to_string(),
            },
            signature: signature.to_string(),
        };
        self.relay.register_company(&request).await
    }

    pub async fn unregister_company(&self, company_name: &str, signature: &str) -> Result<()> {
        let request = SignedRequest {
            message: UnRegistrationData {
                company_name: company_name.to_string(),
            },
            signature: signature.to_string(),
        };
        self.relay.unregister_company(&request).await
    }

    /// Drop every key of `guid`. Returns whether there were any.
    pub async fn forget(&self, guid: &Guid) -> bool {
        let forgotten = self.store.forget(guid).await;

        let mut key_locks = self.key_locks.lock().await;
        // Only drop the lock when no encryption holds or awaits it.
        if matches!(key_locks.get(guid), Some(lock) if Arc::strong_count(lock) == 1) {
            let _ = key_locks.remove(guid);
        }
        forgotten
    }

    async fn key_lock(&self, guid: &Guid) -> Arc<Mutex<()>> {
        self.key_locks
            .lock()
            .await
            .entry(guid.clone())
            .or_default()
            .clone()
    }
}
