//! # Stream Session Controller
//!
//! Cancellation-safe, retryable session management for incremental text
//! generation streams.
//!
//! ## Features
//!
//! - Ordered fragment aggregation with partial renders as valid intermediate
//!   states
//! - Session lifecycle (`Idle -> Streaming -> Succeeded | Failed | Cancelled`)
//!   with generation tokens guarding against stale callbacks
//! - Exponential backoff retry with jitter, a delay cap and server
//!   retry-after hints; accumulated text survives reopens
//! - Cooperative cancellation at every side-effecting step, including backoff
//!   waits
//! - Read-only snapshot subscription over `tokio::sync::watch`
//! - HTTP/SSE transport implementation, pluggable behind a trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use secrecy::SecretString;
//! use std::sync::Arc;
//! use stream_session::{HttpSseTransport, Prompt, SessionConfig, SessionController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(HttpSseTransport::new(
//!         "https://generation.example.com",
//!         SecretString::new("sk-...".to_string()),
//!     )?);
//!     let controller = SessionController::new(transport, SessionConfig::default());
//!
//!     let mut updates = controller.subscribe();
//!     tokio::spawn(async move {
//!         while updates.changed().await.is_ok() {
//!             let snapshot = updates.borrow().clone();
//!             println!("[{:?}] {}", snapshot.status, snapshot.text);
//!         }
//!     });
//!
//!     let handle = controller.start(Prompt::from_user_text("hello"))?;
//!     let text = handle.join().await?;
//!     println!("final: {}", text);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - `controller` - Session lifecycle, retry loop and cancellation
//! - `aggregator` - Fragment accumulation and rendering
//! - `retry` - Retry policy and backoff computation
//! - `transport` - Transport trait and the HTTP/SSE implementation
//! - `config` - Configuration types and builder
//! - `errors` - Error types and taxonomy
//! - `types` - Prompt, fragment and snapshot types
//! - `observability` - Logging setup helpers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregator;
pub mod config;
pub mod controller;
pub mod errors;
pub mod observability;
pub mod retry;
pub mod transport;
pub mod types;

#[cfg(test)]
pub mod mocks;

// Re-exports for convenience
pub use aggregator::Transcript;
pub use config::{SessionConfig, SessionConfigBuilder};
pub use controller::{SessionController, SessionHandle};
pub use errors::{SessionError, SessionResult};
pub use observability::{LogFormat, LoggingConfig};
pub use retry::{RetryClassifier, RetryPolicy};
pub use transport::{FragmentStream, FragmentTransport, HttpSseTransport, SseDecoder, WireEvent};
pub use types::{Fragment, Prompt, Role, SessionSnapshot, SessionStatus, Turn};

/// The default maximum number of retry attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// The default backoff base delay in milliseconds
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// The default per-attempt upper-bound timeout (10 minutes, matching
/// long-running generation requests)
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 600;
