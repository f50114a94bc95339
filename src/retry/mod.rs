//! Retry policy and backoff computation.
//!
//! The controller never retries inside nested control flow; it consults
//! [`RetryPolicy`] at the single failure edge of its attempt loop, which
//! keeps the cancellation check uniform at every step.

use crate::errors::SessionError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether an error is transient.
pub type RetryClassifier = Arc<dyn Fn(&SessionError) -> bool + Send + Sync>;

/// Configuration for retry behavior.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any computed backoff delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt (exponential growth)
    pub multiplier: f64,
    /// Jitter factor in `[0, 1]` applied around the computed delay
    pub jitter: f64,
    /// Optional override of [`SessionError::is_retryable`]
    pub classifier: Option<RetryClassifier>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .field("classifier", &self.classifier.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
            classifier: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Replaces the default retryability judgement with a custom predicate.
    pub fn with_classifier(
        mut self,
        classifier: impl Fn(&SessionError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Returns true if the error should be retried.
    pub fn is_retryable(&self, error: &SessionError) -> bool {
        match &self.classifier {
            Some(classifier) => classifier(error),
            None => error.is_retryable(),
        }
    }

    /// Calculate the backoff delay before retry attempt `attempt` (1-based).
    ///
    /// Exponential growth from `base_delay`, jittered, capped at `max_delay`.
    /// A server-provided retry-after wins when it is longer than the
    /// computed delay.
    pub fn backoff_delay(&self, attempt: u32, server_retry_after: Option<Duration>) -> Duration {
        let base = self.base_delay.as_millis() as f64
            * self.multiplier.powi(attempt.saturating_sub(1) as i32);

        let jitter_range = base * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_ms = (base + jitter).min(self.max_delay.as_millis() as f64);

        let calculated = Duration::from_millis(delay_ms.max(0.0) as u64);

        match server_retry_after {
            Some(server_delay) if server_delay > calculated => server_delay,
            _ => calculated,
        }
    }
}
