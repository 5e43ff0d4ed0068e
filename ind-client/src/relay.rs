//! Access to the relay and contract layer.

use crate::{
    config::RetryPolicy, retry::with_retry, transport::JsonTransport, IndClientError, Result,
};
use async_trait::async_trait;
use ind_protocol::{
    constants::endpoints,
    types::{
        messages::PostTransactionResponse,
        transaction::{
            CreateTransactionRequest, CreateTransactionResponse, WalletRegistrationRequest,
            WalletRegistrationResponse, WalletUnRegistrationRequest, WalletUnRegistrationResponse,
        },
        TransactionEnvelope,
    },
};
use tracing::{info, instrument, warn};

/// Calls offered by the relay. Implementations make a single attempt per
/// call, like [`WalletService`](crate::wallet::WalletService).
#[async_trait]
pub trait Relay: Send + Sync {
    async fn post_transaction(
        &self,
        envelope: &TransactionEnvelope,
    ) -> Result<PostTransactionResponse>;

    async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<CreateTransactionResponse>;

    async fn register_company(
        &self,
        request: &WalletRegistrationRequest,
    ) -> Result<WalletRegistrationResponse>;

    async fn unregister_company(
        &self,
        request: &WalletUnRegistrationRequest,
    ) -> Result<WalletUnRegistrationResponse>;
}

/// [`Relay`] reached over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpRelay {
    transport: JsonTransport,
}

impl HttpRelay {
    pub fn new(transport: JsonTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn post_transaction(
        &self,
        envelope: &TransactionEnvelope,
    ) -> Result<PostTransactionResponse> {
        self.transport
            .post(endpoints::POST_TRANSACTION, envelope)
            .await
    }

    async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<CreateTransactionResponse> {
        self.transport
            .post(endpoints::CREATE_TRANSACTION, request)
            .await
    }

    async fn register_company(
        &self,
        request: &WalletRegistrationRequest,
    ) -> Result<WalletRegistrationResponse> {
        self.transport.post(endpoints::REGISTER, request).await
    }

    async fn unregister_company(
        &self,
        request: &WalletUnRegistrationRequest,
    ) -> Result<WalletUnRegistrationResponse> {
        self.transport.post(endpoints::UNREGISTER, request).await
    }
}

/// A [`Relay`] under a [`RetryPolicy`]. Every non-`OK` answer becomes an
/// error carrying the relay's message verbatim.
#[derive(Debug)]
pub struct RelayClient<R> {
    relay: R,
    retry: RetryPolicy,
}

impl<R: Relay> RelayClient<R> {
    pub fn new(relay: R, retry: RetryPolicy) -> Self {
        Self { relay, retry }
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    #[instrument(skip_all, err(Debug), fields(guid = %envelope.guid()))]
    pub async fn post_transaction(&self, envelope: &TransactionEnvelope) -> Result<()> {
        let response = with_retry(&self.retry, endpoints::POST_TRANSACTION, move || {
            self.relay.post_transaction(envelope)
        })
        .await?;

        if !response.is_ok() {
            warn!("Relay refused the envelope: {}", response.error);
            return Err(IndClientError::Upstream {
                guid: envelope.guid().to_string(),
                error: response.error,
            });
        }
        info!("Posted envelope");
        Ok(())
    }

    #[instrument(skip_all, err(Debug), fields(guid = %request.data.guid))]
    pub async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<CreateTransactionResponse> {
        let response = with_retry(&self.retry, endpoints::CREATE_TRANSACTION, move || {
            self.relay.create_transaction(request)
        })
        .await?;

        if !response.is_ok() {
            warn!("Relay refused the transaction: {}", response.error);
            return Err(IndClientError::Upstream {
                guid: request.data.guid.to_string(),
                error: response.error,
            });
        }
        info!("Created contract {}", response.contract_id);
        Ok(response)
    }

    #[instrument(skip_all, err(Debug), fields(company_name = %request.message.company_name))]
    pub async fn register_company(&self, request: &WalletRegistrationRequest) -> Result<()> {
        let response = with_retry(&self.retry, endpoints::REGISTER, move || {
            self.relay.register_company(request)
        })
        .await?;

        if !response.is_ok() {
            return Err(IndClientError::Registration {
                company_name: request.message.company_name.clone(),
                error: response.error,
            });
        }
        Ok(())
    }

    #[instrument(skip_all, err(Debug), fields(company_name = %request.message.company_name))]
    pub async fn unregister_company(&self, request: &WalletUnRegistrationRequest) -> Result<()> {
        let response = with_retry(&self.retry, endpoints::UNREGISTER, move || {
            self.relay.unregister_company(request)
        })
        .await?;

        if !response.is_ok() {
            return Err(IndClientError::Registration {
                company_name: request.message.company_name.clone(),
                error: response.error,
            });
        }
        Ok(())
    }
}
