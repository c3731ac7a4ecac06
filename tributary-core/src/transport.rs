//! HTTP transport abstraction.
//!
//! The agent only needs "send this request, give me a readable byte stream"
//! plus the response status and headers. Retries and backoff belong to the
//! [`Transport`] implementation, not to the core.

mod mock;

pub use mock::{MockResponse, MockTransport};

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};

/// Maximum number of bytes read from an error response body.
const ERROR_BODY_LIMIT: usize = 8 * 1024;

/// Error type for transport operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The response body could not be read.
    #[error("response body error: {0}")]
    Body(String),
}

/// Boxed stream of response body bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// An outgoing vendor request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Absolute endpoint URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// JSON request body.
    pub body: serde_json::Value,
}

impl HttpRequest {
    /// Create a POST request with a JSON body.
    pub fn new(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body,
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response whose body has not been read yet.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, names lowercased.
    pub headers: HashMap<String, String>,
    /// The response body.
    pub body: ByteStream,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Value of a header (name must be lowercase).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Read up to a bounded prefix of the body as text.
    ///
    /// Used for error responses, whose bodies are small diagnostic payloads.
    pub async fn text_prefix(self) -> String {
        let mut body = self.body;
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    collected.extend_from_slice(&bytes);
                    if collected.len() >= ERROR_BODY_LIMIT {
                        collected.truncate(ERROR_BODY_LIMIT);
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&collected).into_owned()
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends vendor requests.
///
/// Implementations must be thread-safe (`Send + Sync`) for use
/// in async contexts.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the response with an unread body.
    ///
    /// Non-2xx statuses are returned as responses, not errors; the caller
    /// decides how to interpret them.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by a `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        tracing::debug!(url = %request.url, "transport: POST");
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        tracing::debug!(status, "transport: response status");

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Body(e.to_string())));

        Ok(HttpResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_http_request_headers() {
        let request = HttpRequest::new("https://example.test", serde_json::json!({}))
            .header("Authorization", "Bearer k");
        assert_eq!(request.header_value("authorization"), Some("Bearer k"));
        assert_eq!(request.header_value("Content-Type"), Some("application/json"));
        assert_eq!(request.header_value("x-missing"), None);
    }

    #[tokio::test]
    async fn test_text_prefix_reads_body() {
        let parts: Vec<Result<Bytes, TransportError>> =
            vec![Ok(Bytes::from("rate ")), Ok(Bytes::from("limited"))];
        let response = HttpResponse {
            status: 429,
            headers: HashMap::new(),
            body: Box::pin(stream::iter(parts)),
        };
        assert!(!response.is_success());
        assert_eq!(response.text_prefix().await, "rate limited");
    }

    #[tokio::test]
    async fn test_text_prefix_is_bounded() {
        let big = "x".repeat(ERROR_BODY_LIMIT * 2);
        let parts: Vec<Result<Bytes, TransportError>> = vec![Ok(Bytes::from(big))];
        let response = HttpResponse {
            status: 500,
            headers: HashMap::new(),
            body: Box::pin(stream::iter(parts)),
        };
        assert_eq!(response.text_prefix().await.len(), ERROR_BODY_LIMIT);
    }

    #[test]
    fn test_transport_is_object_safe() {
        let _transport: Box<dyn Transport> = Box::new(ReqwestTransport::new());
    }
}
