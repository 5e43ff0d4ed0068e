//! JSON over HTTP(S) transport shared by the wallet and relay clients.

use crate::{IndClientError, Result};
use hyper::{client::HttpConnector, Body, Client, Method, Request, StatusCode};
use hyper_rustls::HttpsConnector;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

/// Connection type used by the transport.
type HttpsClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Posts JSON requests to the endpoints of one base URI.
///
/// Failures are classified by whether the request can have reached the
/// upstream service: connection failures and `503 Service Unavailable` are
/// [`IndClientError::UpstreamUnavailable`]; anything that breaks after the
/// request was written is [`IndClientError::AmbiguousOutcome`]. A single call
/// makes a single attempt; retries belong to the caller.
#[derive(Clone)]
pub struct JsonTransport {
    client: HttpsClient,
    base_uri: http::Uri,
}

impl std::fmt::Debug for JsonTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonTransport")
            .field("base_uri", &self.base_uri)
            .finish()
    }
}

impl JsonTransport {
    pub fn new(base_uri: http::Uri, tls_config: rustls::ClientConfig) -> Self {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .build();

        Self {
            client: Client::builder().build(connector),
            base_uri,
        }
    }

    fn endpoint_uri(&self, endpoint: &str) -> Result<http::Uri> {
        let base = self.base_uri.to_string();
        let uri = format!("{}/{}", base.trim_end_matches('/'), endpoint);
        Ok(uri.parse()?)
    }

    /// POST `body` to `endpoint` and parse the JSON answer.
    ///
    /// An answer that parses as `Resp` is returned even with a non-success
    /// status, so that the upstream `error` field reaches the caller verbatim.
    #[instrument(skip(self, body), err(Debug))]
    pub async fn post<Req, Resp>(&self, endpoint: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint_uri(endpoint)?)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body)?))?;

        let response = self.client.request(request).await.map_err(classify)?;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|error| IndClientError::AmbiguousOutcome(error.to_string()))?;
        debug!("Upstream answered {}", status);

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(IndClientError::UpstreamUnavailable(format!(
                "{endpoint} answered {status}"
            )));
        }

        match serde_json::from_slice(&bytes) {
            Ok(parsed) => Ok(parsed),
            Err(error) if status.is_success() => {
                Err(IndClientError::InvalidResponse(error.to_string()))
            }
            Err(_) if status.is_client_error() => Err(IndClientError::UpstreamRejected(status)),
            Err(_) => Err(IndClientError::AmbiguousOutcome(format!(
                "{endpoint} answered {status}"
            ))),
        }
    }
}

fn classify(error: hyper::Error) -> IndClientError {
    if error.is_connect() {
        IndClientError::UpstreamUnavailable(error.to_string())
    } else {
        IndClientError::AmbiguousOutcome(error.to_string())
    }
}
