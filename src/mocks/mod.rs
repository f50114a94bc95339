//! Scripted transport doubles for controller tests.

use crate::errors::{SessionError, SessionResult};
use crate::transport::{FragmentStream, FragmentTransport};
use crate::types::{Fragment, Prompt};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One step a scripted attempt plays back.
pub enum ScriptStep {
    /// Yield a fragment
    Fragment(&'static str),
    /// Sleep before the next step (pairs with paused-time tests)
    Wait(Duration),
    /// Yield a stream error
    Fail(SessionError),
}

/// The script for a single `open()` call. Running out of steps without a
/// `Fail` is a clean end of stream.
#[derive(Default)]
pub struct ScriptedAttempt {
    /// Error returned from `open()` itself, before any stream exists
    pub open_error: Option<SessionError>,
    /// Steps played back by the opened stream
    pub steps: Vec<ScriptStep>,
}

impl ScriptedAttempt {
    /// An attempt that yields the given fragments and then ends.
    pub fn fragments<I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        Self {
            open_error: None,
            steps: fragments.into_iter().map(ScriptStep::Fragment).collect(),
        }
    }

    /// An attempt that fails immediately with a stream error.
    pub fn failing(error: SessionError) -> Self {
        Self {
            open_error: None,
            steps: vec![ScriptStep::Fail(error)],
        }
    }

    /// An attempt whose `open()` call itself fails.
    pub fn open_failure(error: SessionError) -> Self {
        Self {
            open_error: Some(error),
            steps: Vec::new(),
        }
    }

    /// Appends a stream error after the existing steps.
    pub fn then_fail(mut self, error: SessionError) -> Self {
        self.steps.push(ScriptStep::Fail(error));
        self
    }

    /// Inserts a wait after the existing steps.
    pub fn then_wait(mut self, duration: Duration) -> Self {
        self.steps.push(ScriptStep::Wait(duration));
        self
    }

    /// Appends a fragment after the existing steps.
    pub fn then_fragment(mut self, text: &'static str) -> Self {
        self.steps.push(ScriptStep::Fragment(text));
        self
    }
}

/// Transport that plays back one scripted attempt per `open()` call.
pub struct ScriptedTransport {
    attempts: Mutex<VecDeque<ScriptedAttempt>>,
    opened: AtomicU32,
}

impl ScriptedTransport {
    /// Creates a transport that plays back the given attempts in order.
    pub fn new(attempts: Vec<ScriptedAttempt>) -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(attempts.into()),
            opened: AtomicU32::new(0),
        })
    }

    /// Number of `open()` calls observed so far.
    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FragmentTransport for ScriptedTransport {
    async fn open(&self, _prompt: &Prompt) -> SessionResult<FragmentStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);

        let attempt = self.attempts.lock().pop_front().unwrap_or_default();
        if let Some(error) = attempt.open_error {
            return Err(error);
        }

        let stream = futures::stream::unfold(attempt.steps.into_iter(), |mut steps| async move {
            loop {
                match steps.next() {
                    Some(ScriptStep::Fragment(text)) => {
                        return Some((Ok(Fragment::from(text)), steps))
                    }
                    Some(ScriptStep::Wait(duration)) => {
                        tokio::time::sleep(duration).await;
                    }
                    Some(ScriptStep::Fail(error)) => return Some((Err(error), steps)),
                    None => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

/// Shorthand for a retryable transport error.
pub fn transient(message: &str) -> SessionError {
    SessionError::Transport {
        message: message.to_string(),
    }
}

/// Shorthand for a terminal service error.
pub fn terminal(message: &str) -> SessionError {
    SessionError::Service {
        message: message.to_string(),
        status_code: Some(403),
    }
}
