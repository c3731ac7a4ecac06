//! Mock transport for testing.
//!
//! Provides [`MockTransport`], a [`Transport`] that replays canned vendor
//! responses in order and records every request it receives.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use super::{HttpRequest, HttpResponse, Transport, TransportError};

/// A canned response served by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    headers: HashMap<String, String>,
    chunks: Vec<Bytes>,
}

impl MockResponse {
    /// A 200 response whose body is delivered as the given chunks.
    pub fn ok<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Self {
            status: 200,
            headers: HashMap::new(),
            chunks: chunks
                .into_iter()
                .map(|c| Bytes::from(c.into()))
                .collect(),
        }
    }

    /// A 200 SSE response with one `data:` event per payload, followed by
    /// the chat-completions `[DONE]` sentinel.
    pub fn sse_data<I, C>(payloads: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let mut chunks: Vec<String> = payloads
            .into_iter()
            .map(|p| format!("data: {}\n\n", p.into()))
            .collect();
        chunks.push("data: [DONE]\n\n".to_string());
        Self::ok(chunks)
    }

    /// A 200 SSE response with one named event per `(event, payload)` pair.
    pub fn sse_events<I, E, C>(events: I) -> Self
    where
        I: IntoIterator<Item = (E, C)>,
        E: Into<String>,
        C: Into<String>,
    {
        Self::ok(
            events
                .into_iter()
                .map(|(e, p)| format!("event: {}\ndata: {}\n\n", e.into(), p.into())),
        )
    }

    /// A 200 response with one JSON object per line.
    pub fn json_lines<I, C>(lines: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Self::ok(lines.into_iter().map(|l| format!("{}\n", l.into())))
    }

    /// A response with the given status and a plain-text body.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            ..Self::ok([body.into()])
        }
    }

    /// Add a response header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }
}

/// A transport that serves queued [`MockResponse`]s in FIFO order.
///
/// # Examples
///
/// ```
/// use tributary_core::transport::{HttpRequest, MockResponse, MockTransport, Transport};
///
/// # async fn example() {
/// let transport = MockTransport::new().with_response(MockResponse::status(500, "boom"));
/// let response = transport
///     .send(HttpRequest::new("https://example.test", serde_json::json!({})))
///     .await
///     .unwrap();
/// assert_eq!(response.status, 500);
/// assert_eq!(transport.requests().len(), 1);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    closed_bodies: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Create a transport with no queued responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    #[must_use]
    pub fn with_response(self, response: MockResponse) -> Self {
        lock(&self.responses).push_back(response);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Number of response bodies that have been dropped.
    pub fn closed_bodies(&self) -> usize {
        self.closed_bodies.load(Ordering::SeqCst)
    }
}

/// Mutex poisoning only happens after a panic in another test thread;
/// recover the data instead of cascading the panic.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        lock(&self.requests).push(request);
        let response = lock(&self.responses)
            .pop_front()
            .ok_or_else(|| TransportError::RequestFailed("no mock response queued".to_string()))?;

        Ok(HttpResponse {
            status: response.status,
            headers: response.headers,
            body: Box::pin(TrackedBody {
                chunks: response.chunks.into(),
                closed: Arc::clone(&self.closed_bodies),
            }),
        })
    }
}

/// Body stream that counts how many bodies were released.
struct TrackedBody {
    chunks: VecDeque<Bytes>,
    closed: Arc<AtomicUsize>,
}

impl Stream for TrackedBody {
    type Item = Result<Bytes, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.chunks.pop_front().map(Ok))
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
