use ind_protocol::IndError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndClientError>;

#[derive(Debug, Error)]
pub enum IndClientError {
    #[error("A one-time address was already requested for trade {0}")]
    DuplicateAddressRequest(String),
    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Request may or may not have been processed: {0}")]
    AmbiguousOutcome(String),
    /// A non-`OK` `error` reported by the wallet or the relay, verbatim.
    #[error("{error}")]
    Upstream { guid: String, error: String },
    /// A non-`OK` `error` for a company (un)registration, verbatim.
    #[error("{error}")]
    Registration { company_name: String, error: String },
    #[error("Upstream rejected the request with status {0}")]
    UpstreamRejected(http::StatusCode),
    #[error("Invalid response from upstream: {0}")]
    InvalidResponse(String),
    #[error("Public key issued for trade {guid} was already issued for trade {first_guid}")]
    PublicKeyReused { guid: String, first_guid: String },
    #[error("HTTPS URI was configured but no CA chain was provided.")]
    TlsConfigMissing,
    #[error("Invalid CA certificate: {0}")]
    InvalidCertificate(String),

    // Wrapped errors
    #[error(transparent)]
    Ind(#[from] IndError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] http::Error),
    #[error(transparent)]
    InvalidUri(#[from] http::uri::InvalidUri),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl IndClientError {
    /// Whether the request is known not to have reached the upstream service,
    /// so that repeating it cannot duplicate any effect.
    pub fn never_sent(&self) -> bool {
        matches!(self, IndClientError::UpstreamUnavailable(_))
    }
}
