//! HTTP transport speaking server-sent events.
//!
//! The wire format is one JSON event per `data:` line:
//!
//! ```text
//! data: {"type":"fragment","text":"He"}
//! data: {"type":"fragment","text":"llo"}
//! data: {"type":"end"}
//! ```
//!
//! `data: [DONE]` is accepted as an end-of-stream sentinel as well. An
//! in-stream `{"type":"error",...}` event terminates the stream with an
//! error; its optional `retryable` flag decides the error class.

use super::{FragmentStream, FragmentTransport};
use crate::errors::{SessionError, SessionResult};
use crate::types::{Fragment, Prompt};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// One decoded wire event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent {
    /// An incremental unit of generated text
    Fragment {
        /// The fragment text
        text: String,
    },
    /// Normal end of stream
    End,
    /// The service reported a failure mid-stream
    Error {
        /// Service-provided description
        message: String,
        /// Whether the service considers the failure transient
        #[serde(default)]
        retryable: bool,
    },
}

/// Upper bound on a single buffered line. A peer that streams bytes without
/// ever sending a newline would otherwise grow the buffer indefinitely.
const MAX_LINE_LEN: usize = 1024 * 1024;

/// Incremental decoder for `data:`-prefixed SSE lines.
///
/// Feed it raw byte chunks in arrival order; it buffers partial lines across
/// chunk boundaries and emits one [`WireEvent`] per complete data line. An
/// unterminated line longer than [`MAX_LINE_LEN`] is rejected as a stream
/// error.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns the events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SessionResult<WireEvent>> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            if let Some(event) = Self::parse_line(line.trim_end()) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_LINE_LEN {
            self.buffer.clear();
            events.push(Err(SessionError::Stream {
                message: format!("event line exceeds {} bytes", MAX_LINE_LEN),
            }));
        }
        events
    }

    fn parse_line(line: &str) -> Option<SessionResult<WireEvent>> {
        // Blank lines separate SSE events; comment and field lines other
        // than `data:` carry nothing we consume.
        let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;

        if data == "[DONE]" {
            return Some(Ok(WireEvent::End));
        }

        match serde_json::from_str::<WireEvent>(data) {
            Ok(event) => Some(Ok(event)),
            Err(e) => Some(Err(SessionError::Stream {
                message: format!("undecodable event: {}", e),
            })),
        }
    }
}

pin_project! {
    /// Adapts a raw byte stream into a fragment stream.
    struct FragmentDecoder<S> {
        #[pin]
        inner: S,
        decoder: SseDecoder,
        pending: VecDeque<SessionResult<Fragment>>,
        is_done: bool,
    }
}

impl<S> FragmentDecoder<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            is_done: false,
        }
    }
}

impl<S> Stream for FragmentDecoder<S>
where
    S: Stream<Item = SessionResult<Bytes>>,
{
    type Item = SessionResult<Fragment>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.pending.pop_front() {
                if item.is_err() {
                    *this.is_done = true;
                }
                return Poll::Ready(Some(item));
            }

            if *this.is_done {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    for event in this.decoder.feed(&bytes) {
                        match event {
                            Ok(WireEvent::Fragment { text }) => {
                                this.pending.push_back(Ok(Fragment(text)));
                            }
                            Ok(WireEvent::End) => {
                                *this.is_done = true;
                                break;
                            }
                            Ok(WireEvent::Error { message, retryable }) => {
                                let error = if retryable {
                                    SessionError::Transport { message }
                                } else {
                                    SessionError::Service {
                                        message,
                                        status_code: None,
                                    }
                                };
                                this.pending.push_back(Err(error));
                                break;
                            }
                            Err(e) => {
                                this.pending.push_back(Err(e));
                                break;
                            }
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.is_done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    // Transport closed without an end event; the fragments
                    // seen so far are all there is.
                    *this.is_done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// HTTP implementation of [`FragmentTransport`].
///
/// Posts the prompt as JSON to `{base_url}/v1/generate` and decodes the SSE
/// response body into fragments. A path prefix on the base URL is preserved,
/// so `https://host/api` resolves to `https://host/api/v1/generate`.
pub struct HttpSseTransport {
    client: Client,
    endpoint: Url,
    api_key: SecretString,
}

impl HttpSseTransport {
    /// Creates a transport against the given base URL.
    pub fn new(base_url: impl AsRef<str>, api_key: SecretString) -> SessionResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SessionError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let mut endpoint = Url::parse(base_url.as_ref())?;
        endpoint
            .path_segments_mut()
            .map_err(|_| SessionError::Configuration {
                message: format!("base URL {} cannot carry a path", base_url.as_ref()),
            })?
            .pop_if_empty()
            .extend(["v1", "generate"]);

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    fn map_http_error(status: reqwest::StatusCode, retry_after: Option<Duration>, body: &str) -> SessionError {
        match status.as_u16() {
            401 | 403 => SessionError::Service {
                message: format!("Authentication failed: {}", body),
                status_code: Some(status.as_u16()),
            },
            429 => SessionError::RateLimit {
                message: format!("Rate limit exceeded: {}", body),
                retry_after,
            },
            400 => SessionError::Service {
                message: format!("Rejected request: {}", body),
                status_code: Some(400),
            },
            code @ 500..=599 => SessionError::Service {
                message: format!("Server error: {}", body),
                status_code: Some(code),
            },
            code => SessionError::Service {
                message: format!("HTTP error {}: {}", code, body),
                status_code: Some(code),
            },
        }
    }
}

#[async_trait]
impl FragmentTransport for HttpSseTransport {
    async fn open(&self, prompt: &Prompt) -> SessionResult<FragmentStream> {
        let url = self.endpoint.clone();
        debug!(%url, turns = prompt.turns.len(), "opening generation request");

        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key.expose_secret()))
            .map_err(|_| SessionError::Configuration {
                message: "API key contains invalid header characters".to_string(),
            })?;

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, auth)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(prompt)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, retry_after, &body));
        }

        trace!("request accepted, decoding event stream");
        let bytes = response.bytes_stream().map(|item| item.map_err(SessionError::from));
        Ok(Box::pin(FragmentDecoder::new(bytes)))
    }
}
