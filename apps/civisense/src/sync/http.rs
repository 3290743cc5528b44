//! # HTTP Transport
//!
//! `Transport` over the authority's REST API:
//! - `GET  {base}/health` - reachability
//! - `POST {base}/issues` - submit one issue (`201` new, `200` duplicate)
//!
//! Submissions carry the author in a header so the authority can apply its
//! per-device quota without parsing the body.

use super::{Delivery, IssuePayload, TransmitError, Transport};
use crate::api::AUTHOR_HEADER;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Bound on the per-cycle health check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the authority at `base_url`.
    ///
    /// `timeout` bounds every request made by the client.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransmitError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransmitError::Network(format!("Cannot build HTTP client: {}", e)))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Create a transport with a caller-supplied client.
    #[must_use]
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Transport for HttpTransport {
    async fn is_connected(&self) -> bool {
        match self
            .client
            .get(self.url("/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Authority health check failed: {}", e);
                false
            }
        }
    }

    async fn transmit(&self, payload: &IssuePayload) -> Result<Delivery, TransmitError> {
        let response = self
            .client
            .post(self.url("/issues"))
            .header(AUTHOR_HEADER, payload.author_ref.as_str())
            .json(payload)
            .send()
            .await
            .map_err(|e| TransmitError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(Delivery::Duplicate);
        }
        if status.is_success() {
            return Ok(Delivery::Created);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(TransmitError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
