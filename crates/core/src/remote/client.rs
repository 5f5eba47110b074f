//! Single-call RPC transport for the remote web service endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::RemoteConfig;
use crate::error::{Result, SatchelError};

/// Fixed path of the REST web service entry point, relative to the base URL.
pub const RPC_ENDPOINT_PATH: &str = "/webservice/rest/server.php";

/// Function-specific query parameters for one RPC call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcParams {
    pairs: Vec<(String, String)>,
}

impl RpcParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scalar parameter.
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    /// Append an indexed array parameter as `key[0]=..`, `key[1]=..`.
    pub fn with_indexed<T: ToString>(mut self, key: &str, values: &[T]) -> Self {
        for (i, value) in values.iter().enumerate() {
            self.pairs.push((format!("{key}[{i}]"), value.to_string()));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Value of the first parameter named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A generic named-function transport.
///
/// Implementations perform exactly one request per call and never retry;
/// callers decide whether a failure skips or aborts their work.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn call(&self, config: &RemoteConfig, function: &str, params: &RpcParams)
        -> Result<Value>;
}

/// HTTP implementation of [`RemoteApi`] over `reqwest`.
pub struct RemoteClient {
    http: Client,
}

impl RemoteClient {
    /// Build a client whose every call is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SatchelError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Create a client with a custom reqwest::Client (useful for testing).
    pub fn with_http_client(http: Client) -> Self {
        Self { http }
    }

    fn endpoint(config: &RemoteConfig) -> String {
        format!("{}{RPC_ENDPOINT_PATH}", config.base_url())
    }
}

#[async_trait]
impl RemoteApi for RemoteClient {
    async fn call(
        &self,
        config: &RemoteConfig,
        function: &str,
        params: &RpcParams,
    ) -> Result<Value> {
        debug!(function = %function, params = params.pairs().len(), "Calling remote function");

        let response = self
            .http
            .get(Self::endpoint(config))
            .query(&[
                ("wstoken", config.token()),
                ("moodlewsrestformat", "json"),
                ("wsfunction", function),
            ])
            .query(params.pairs())
            .send()
            .await
            .map_err(|e| SatchelError::Transport(format!("{function} request failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(function = %function, status = %status, "Remote call failed");
            return Err(SatchelError::Transport(format!(
                "{function} returned HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SatchelError::Transport(format!("{function} body read failed: {e}")))?;

        serde_json::from_str(&body).map_err(|e| {
            SatchelError::Serialization(format!("failed to decode {function} response: {e}"))
        })
    }
}
