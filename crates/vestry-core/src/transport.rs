//! Network collaborator boundary
//!
//! The orchestrator delivers each queue item as one HTTP request through a
//! [`Transport`]. A 2xx response is success and may carry the server's
//! canonical version of the record, used for conflict checksum comparison.
//! Any other status or a connection failure is a delivery failure.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::HttpMethod;
use crate::util::is_http_url;

/// One outbound mutation delivery.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    /// Path below the API base, starting with `/`
    pub endpoint: String,
    pub body: Option<Value>,
}

/// Parsed server reply to a delivery.
#[derive(Debug, Clone)]
pub struct ServerResponse {
    pub status: u16,
    /// Digest of the server's canonical record, when reported
    pub checksum: Option<String>,
    /// The server's canonical record, when reported
    pub record: Option<Value>,
}

impl ServerResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Abstraction over the REST collaborator so cycles are testable offline.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<ServerResponse>;
}

/// Envelope shape the membership API wraps mutation replies in.
#[derive(Debug, Deserialize)]
struct ReplyEnvelope {
    checksum: Option<String>,
    #[serde(alias = "record")]
    data: Option<Value>,
}

/// HTTP transport over `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    /// Build a transport against an API base URL.
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !is_http_url(&base_url) {
            return Err(Error::InvalidInput(
                "API base URL must include http:// or https://".into(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url,
            auth_token,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<ServerResponse> {
        let url = format!("{}{}", self.base_url, request.endpoint);
        let mut builder = match request.method {
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Patch => self.client.patch(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };

        builder = builder.header("Content-Type", "application/json");
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| Error::Transport(error.to_string()))?;
        let status = response.status().as_u16();

        // The body is advisory; an unparseable reply is not a failure.
        let envelope = response.json::<ReplyEnvelope>().await.ok();
        let (checksum, record) = envelope.map_or((None, None), |e| (e.checksum, e.data));

        Ok(ServerResponse {
            status,
            checksum,
            record,
        })
    }
}
