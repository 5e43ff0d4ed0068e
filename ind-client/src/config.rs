use ind_protocol::{config::ContractsConfig, infrastructure::pem_utils};
use rustls::{ClientConfig, RootCertStore};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::Level;

use crate::IndClientError;

/// Client configuration with all fields ready to use.
#[derive(Clone)]
pub struct Config {
    pub wallet_uri: http::Uri,
    pub relay_uri: http::Uri,
    pub tls_config: ClientConfig,
    pub retry: RetryPolicy,
    pub logging: LoggingConfig,
    pub contracts: ContractsConfig,
}

impl Config {
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self, IndClientError> {
        let config_string = std::fs::read_to_string(&config_path)?;
        let config_file = ConfigFile::from_str(&config_string)?;
        Self::from_config_file(config_file)
    }

    pub fn from_config_file(config: ConfigFile) -> Result<Self, IndClientError> {
        let wallet_uri = http::Uri::from_str(&config.wallet_uri)?;
        let relay_uri = http::Uri::from_str(&config.relay_uri)?;
        let uses_https = [&wallet_uri, &relay_uri]
            .iter()
            .any(|uri| uri.scheme() == Some(&http::uri::Scheme::HTTPS));
        if uses_https && config.ca_chain.is_none() {
            return Err(IndClientError::TlsConfigMissing);
        }

        let contracts = match &config.contracts {
            Some(path) => ContractsConfig::from_file(path)?,
            None => ContractsConfig::default(),
        };

        Ok(Self {
            tls_config: config.tls_config()?,
            wallet_uri,
            relay_uri,
            retry: config.retry,
            logging: config.logging,
            contracts,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("wallet_uri", &self.wallet_uri)
            .field("relay_uri", &self.relay_uri)
            .field("tls_config", &"[Does not implement Debug]")
            .field("retry", &self.retry)
            .field("logging", &self.logging)
            .field("contracts", &self.contracts)
            .finish()
    }
}

/// Client configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
#[non_exhaustive]
pub struct ConfigFile {
    pub wallet_uri: String,
    pub relay_uri: String,
    /// Root certificates trusted for HTTPS. Required when either URI is
    /// `https`.
    pub ca_chain: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Contract registry file. The built-in registry is used when absent.
    pub contracts: Option<PathBuf>,
}

impl ConfigFile {
    pub fn tls_config(&self) -> Result<ClientConfig, IndClientError> {
        let mut root_store = RootCertStore::empty();

        if let Some(ca_chain) = &self.ca_chain {
            let root_cert = pem_utils::read_certificates(ca_chain)?;
            for cert in root_cert {
                root_store
                    .add(&cert)
                    .map_err(|error| IndClientError::InvalidCertificate(error.to_string()))?;
            }
        }

        let tls_config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Ok(tls_config)
    }
}

impl FromStr for ConfigFile {
    type Err = IndClientError;

    fn from_str(config_string: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(config_string)?)
    }
}

/// Timeout and retry behavior for every upstream request.
///
/// Only failures that are known to have happened before the request reached
/// the upstream service are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct RetryPolicy {
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from `initial_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent)
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct LoggingConfig {
    #[serde_as(as = "DisplayFromStr")]
    pub stdout_log_level: Level,
    pub log_files: Option<LoggingFileConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout_log_level: Level::INFO,
            log_files: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct LoggingFileConfig {
    pub ind_logs_file_name: PathBuf,
    pub all_logs_file_name: PathBuf,
}
