//! HTTP collaborator for API-only steps
//!
//! One request, one response. Timeouts and transport errors are reported,
//! not retried; retrying is the calling step's decision.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Status and body of a completed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Thin wrapper over the HTTP client collaborator
#[derive(Debug, Clone)]
pub struct HttpCaller {
    client: reqwest::Client,
}

impl Default for HttpCaller {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpCaller {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Reqwest client handle, shared with the readiness prober.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Perform a single request. Non-2xx statuses are data, not errors;
    /// only transport-level failures surface as `Err`.
    pub async fn call(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&str>,
        timeout: Duration,
    ) -> HarnessResult<HttpResponse> {
        let method = reqwest::Method::from_str(&method.to_uppercase())
            .map_err(|_| HarnessError::SpecParse(format!("invalid HTTP method '{method}'")))?;

        debug!("{} {}", method, url);

        let mut request = self.client.request(method, url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!("-> {} ({} bytes)", status, body.len());
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_method_is_a_spec_error_not_transport() {
        let caller = HttpCaller::new();
        let err = caller
            .call("NOT A METHOD", "http://127.0.0.1:1/", &BTreeMap::new(), None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::SpecParse(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_transport() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let caller = HttpCaller::new();
        let err = caller
            .call(
                "GET",
                &format!("http://127.0.0.1:{port}/health"),
                &BTreeMap::new(),
                None,
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Transport(_)));
    }
}
