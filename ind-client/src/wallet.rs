//! Access to the wallet service, which custodies one-time keys.

use crate::{transport::JsonTransport, Result};
use async_trait::async_trait;
use ind_protocol::{
    constants::endpoints,
    types::messages::{
        GrantAccessRequest, GrantAccessResponse, OneTimeAddressRequest, OneTimeAddressResponse,
    },
};

/// Calls offered by the wallet service.
///
/// Implementations make a single attempt per call and report a request that
/// never reached the service as
/// [`IndClientError::UpstreamUnavailable`](crate::IndClientError::UpstreamUnavailable).
#[async_trait]
pub trait WalletService: Send + Sync {
    async fn one_time_address(
        &self,
        request: &OneTimeAddressRequest,
    ) -> Result<OneTimeAddressResponse>;

    async fn grant_access(&self, request: &GrantAccessRequest) -> Result<GrantAccessResponse>;
}

/// [`WalletService`] reached over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpWalletService {
    transport: JsonTransport,
}

impl HttpWalletService {
    pub fn new(transport: JsonTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl WalletService for HttpWalletService {
    async fn one_time_address(
        &self,
        request: &OneTimeAddressRequest,
    ) -> Result<OneTimeAddressResponse> {
        self.transport
            .post(endpoints::ONE_TIME_ADDRESS, request)
            .await
    }

    async fn grant_access(&self, request: &GrantAccessRequest) -> Result<GrantAccessResponse> {
        self.transport.post(endpoints::GRANT_ACCESS, request).await
    }
}
