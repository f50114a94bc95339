//! Error types for the stream session controller.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Main error type for the stream session controller.
///
/// The taxonomy separates transient transport failures (handled by the retry
/// loop) from terminal service failures (surfaced immediately). The
/// [`is_retryable`](SessionError::is_retryable) method encodes the default
/// classification; a custom classifier on
/// [`RetryPolicy`](crate::retry::RetryPolicy) can override it.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// Configuration error (invalid settings, missing required fields)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Invalid request payload (empty prompt, empty turn content).
    ///
    /// Surfaced synchronously from `start()`, never retried.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message describing the input issue
        message: String,
    },

    /// Transient transport error (connection failed, stream interrupted)
    #[error("Transport error: {message}")]
    Transport {
        /// Error message describing the transport issue
        message: String,
    },

    /// An attempt exceeded the configured upper-bound timeout
    #[error("Attempt timed out after {elapsed:?}")]
    Timeout {
        /// How long the attempt ran before being cut off
        elapsed: Duration,
    },

    /// Rate limit signal from the service (429)
    #[error("Rate limit error: {message}")]
    RateLimit {
        /// Error message describing the rate limit issue
        message: String,
        /// Duration to wait before retrying (if provided by the service)
        retry_after: Option<Duration>,
    },

    /// Terminal service error (auth failure, quota exhaustion, 4xx/5xx)
    #[error("Service error: {message}")]
    Service {
        /// Error message from the service
        message: String,
        /// HTTP status code, when the transport is HTTP-backed
        status_code: Option<u16>,
    },

    /// Malformed stream payload (undecodable event, bad frame)
    #[error("Stream error: {message}")]
    Stream {
        /// Error message describing the stream issue
        message: String,
    },

    /// All retry attempts were consumed without a successful completion
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of retry attempts that were made
        attempts: u32,
        /// The last transient error observed before giving up
        last: Box<SessionError>,
    },

    /// The session was cancelled or superseded by a newer `start()`
    #[error("Session cancelled")]
    Cancelled,

    /// Internal error (unexpected conditions, library bugs)
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal issue
        message: String,
    },
}

impl SessionError {
    /// Returns true if this error is retryable with exponential backoff.
    ///
    /// Retryable errors include:
    /// - Transport errors (connection issues, stream interruption)
    /// - Attempt timeouts
    /// - Rate limit signals (429)
    /// - Server errors with status 500, 503 or 529
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Transport { .. }
                | SessionError::Timeout { .. }
                | SessionError::RateLimit { .. }
                | SessionError::Service {
                    status_code: Some(500) | Some(503) | Some(529),
                    ..
                }
        )
    }

    /// Returns the retry-after duration if available.
    ///
    /// Set on rate limit errors when the service provides a Retry-After
    /// header; the backoff computation uses it as a lower bound.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SessionError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SessionError::Transport {
                message: format!("Request timed out: {}", err),
            }
        } else if err.is_connect() {
            SessionError::Transport {
                message: format!("Connection failed: {}", err),
            }
        } else {
            SessionError::Transport {
                message: format!("Network error: {}", err),
            }
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Stream {
            message: format!("JSON decode error: {}", err),
        }
    }
}

impl From<url::ParseError> for SessionError {
    fn from(err: url::ParseError) -> Self {
        SessionError::Configuration {
            message: format!("Invalid URL: {}", err),
        }
    }
}
