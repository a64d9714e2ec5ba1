//! Transport seam between the request executor and the network.
//!
//! The executor never talks to the network itself; it hands an [`ApiRequest`]
//! to a [`Transport`] and interprets the [`ApiResponse`]. Production code uses
//! [`HttpTransport`]; tests plug in an in-memory helpdesk.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;

use crate::config::{ExecutorConfig, InstanceConfig};
use crate::error::{Error, TransportError};
use crate::request::{parse_retry_after, ApiRequest, ApiResponse, Method};

/// A single round trip to an instance.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Any HTTP status is a successful round trip; only
    /// failures to obtain a response are errors.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// HTTP transport backed by `reqwest`.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    username: String,
    token: String,
}

impl HttpTransport {
    /// Build a transport for one instance.
    pub fn new(instance: &InstanceConfig, config: &ExecutorConfig) -> Result<Self, Error> {
        instance.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("deskmig/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: instance.base_url(),
            username: instance.username(),
            token: instance.token.clone(),
        })
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .http
            .request(method, self.url(&request.path))
            .basic_auth(&self.username, Some(&self.token));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_path() {
        let instance = InstanceConfig::new("acme", "ops@acme.test", "secret")
            .with_base_url("http://127.0.0.1:9/api/v2/");
        let transport = HttpTransport::new(&instance, &ExecutorConfig::default()).unwrap();
        assert_eq!(transport.base_url(), "http://127.0.0.1:9/api/v2");
        assert_eq!(
            transport.url("/ticket_fields.json"),
            "http://127.0.0.1:9/api/v2/ticket_fields.json"
        );
    }

    #[test]
    fn test_rejects_missing_credentials() {
        let instance = InstanceConfig::new("acme", "ops@acme.test", "");
        assert!(matches!(
            HttpTransport::new(&instance, &ExecutorConfig::default()),
            Err(Error::Config(_))
        ));
    }
}
