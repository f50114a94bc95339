//! Transport boundary: the opaque request call into the generation service.
//!
//! The controller only knows about [`FragmentTransport`]: one call that opens
//! a request and yields a lazy, finite, non-restartable sequence of
//! fragments. End of stream is the end of the sequence; failures surface as
//! `Err` items or as an open error. The concrete HTTP/SSE implementation
//! lives in [`sse`].

mod sse;

pub use sse::{HttpSseTransport, SseDecoder, WireEvent};

use crate::errors::SessionResult;
use crate::types::{Fragment, Prompt};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// A lazy, finite sequence of fragments from one opened request.
pub type FragmentStream = Pin<Box<dyn Stream<Item = SessionResult<Fragment>> + Send>>;

/// The opaque request call into the remote generation service.
///
/// Implementations must deliver fragments in order and must not assume the
/// caller buffers anything; the controller consumes them as delivered. A
/// stream is not restartable: a retry is a fresh `open` call.
#[async_trait]
pub trait FragmentTransport: Send + Sync {
    /// Opens a request for the given prompt and returns the fragment stream.
    async fn open(&self, prompt: &Prompt) -> SessionResult<FragmentStream>;
}
