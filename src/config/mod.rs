//! Configuration for the session controller.

use crate::errors::{SessionError, SessionResult};
use crate::retry::RetryPolicy;
use crate::{DEFAULT_ATTEMPT_TIMEOUT_SECS, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};
use std::time::Duration;

/// Configuration for a [`SessionController`](crate::controller::SessionController).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on a single attempt (open plus consume); elapse maps to a
    /// retryable timeout so no session is left permanently streaming
    pub attempt_timeout: Duration,
    /// Retry behavior on transient failures
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Creates a new configuration builder
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// Recognized variables, all optional:
    /// - `STREAM_SESSION_MAX_ATTEMPTS`
    /// - `STREAM_SESSION_BASE_DELAY_MS`
    /// - `STREAM_SESSION_ATTEMPT_TIMEOUT_SECS`
    pub fn from_env() -> SessionResult<Self> {
        let max_attempts = read_env("STREAM_SESSION_MAX_ATTEMPTS")?.unwrap_or(DEFAULT_MAX_ATTEMPTS);

        let base_delay_ms = read_env("STREAM_SESSION_BASE_DELAY_MS")?.unwrap_or(DEFAULT_BASE_DELAY_MS);

        let attempt_timeout_secs =
            read_env("STREAM_SESSION_ATTEMPT_TIMEOUT_SECS")?.unwrap_or(DEFAULT_ATTEMPT_TIMEOUT_SECS);

        Ok(Self {
            attempt_timeout: Duration::from_secs(attempt_timeout_secs),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_delay_ms),
                ..RetryPolicy::default()
            },
        })
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> SessionResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map(Some).map_err(|_| SessionError::Configuration {
            message: format!("{} has an invalid value: {:?}", name, raw),
        }),
        Err(_) => Ok(None),
    }
}

/// Builder for [`SessionConfig`]
#[derive(Default)]
pub struct SessionConfigBuilder {
    attempt_timeout: Option<Duration>,
    max_attempts: Option<u32>,
    base_delay: Option<Duration>,
    max_delay: Option<Duration>,
    retry: Option<RetryPolicy>,
}

impl SessionConfigBuilder {
    /// Sets the per-attempt upper-bound timeout
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Sets the maximum number of retry attempts
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Sets the backoff base delay
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Sets the backoff delay cap
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Replaces the whole retry policy (classifier included)
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Builds the configuration
    pub fn build(self) -> SessionConfig {
        let mut retry = self.retry.unwrap_or_default();
        if let Some(max_attempts) = self.max_attempts {
            retry.max_attempts = max_attempts;
        }
        if let Some(base_delay) = self.base_delay {
            retry.base_delay = base_delay;
        }
        if let Some(max_delay) = self.max_delay {
            retry.max_delay = max_delay;
        }

        SessionConfig {
            attempt_timeout: self
                .attempt_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS)),
            retry,
        }
    }
}
