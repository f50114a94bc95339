//! Session lifecycle: start, fragment aggregation, retry, cancellation.
//!
//! [`SessionController`] owns exactly one "current" session at a time. Each
//! `start()` issues a new generation token and cancels the previous
//! session's [`CancellationToken`]; every asynchronous callback validates its
//! generation against the current one before touching shared state, so a
//! stale stream can never write into a newer session.
//!
//! All mutations go through one `parking_lot::Mutex<SessionState>`; the
//! spawned driver task is the only writer while a session streams. Observers
//! receive read-only [`SessionSnapshot`] values through a `tokio::sync::watch`
//! channel — a dropped receiver unsubscribes itself, and a slow receiver may
//! observe coalesced intermediate snapshots, but the final accumulated text
//! is identical regardless.

#[cfg(test)]
mod tests;

use crate::aggregator::Transcript;
use crate::config::SessionConfig;
use crate::errors::{SessionError, SessionResult};
use crate::transport::FragmentTransport;
use crate::types::{validate_prompt, Fragment, Prompt, SessionSnapshot, SessionStatus};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// The mutable record of the current session.
struct SessionState {
    generation: u64,
    status: SessionStatus,
    transcript: Transcript,
    /// Rendered transcript, kept in step with `transcript` so snapshot
    /// publication does not re-concatenate on every fragment.
    rendered: String,
    error: Option<SessionError>,
    attempt: u32,
    cancel: CancellationToken,
}

struct Shared {
    state: Mutex<SessionState>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn publish(&self, state: &SessionState) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            status: state.status,
            text: state.rendered.clone(),
            error: state.error.clone(),
            attempt: state.attempt,
            generation: state.generation,
        });
    }
}

/// Drives streaming sessions against a [`FragmentTransport`].
///
/// Exactly one session is current at any time; starting a new one supersedes
/// the previous session, whose late signals are silently discarded.
pub struct SessionController {
    shared: Arc<Shared>,
    transport: Arc<dyn FragmentTransport>,
    config: SessionConfig,
}

impl SessionController {
    /// Creates a controller over the given transport.
    pub fn new(transport: Arc<dyn FragmentTransport>, config: SessionConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::idle());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState {
                    generation: 0,
                    status: SessionStatus::Idle,
                    transcript: Transcript::new(),
                    rendered: String::new(),
                    error: None,
                    attempt: 0,
                    cancel: CancellationToken::new(),
                }),
                snapshot_tx,
            }),
            transport,
            config,
        }
    }

    /// Starts a new session for the given prompt.
    ///
    /// Fails synchronously with [`SessionError::InvalidInput`] on an empty
    /// payload. Any running session is superseded: its cancellation token is
    /// cancelled and its late fragments and completion signals are dropped.
    /// Must be called within a tokio runtime; the session is driven by a
    /// spawned task.
    ///
    /// The returned handle resolves with the final accumulated text on
    /// success, or with the terminal error ([`SessionError::Cancelled`] when
    /// the session was cancelled or superseded).
    pub fn start(&self, prompt: Prompt) -> SessionResult<SessionHandle> {
        validate_prompt(&prompt)?;

        let (generation, token) = {
            let mut state = self.shared.state.lock();
            state.cancel.cancel();
            state.generation += 1;
            state.status = SessionStatus::Streaming;
            state.transcript = Transcript::new();
            state.rendered.clear();
            state.error = None;
            state.attempt = 0;
            state.cancel = CancellationToken::new();
            self.shared.publish(&state);
            (state.generation, state.cancel.clone())
        };

        info!(generation, turns = prompt.turns.len(), "starting session");

        let driver = Driver {
            shared: Arc::clone(&self.shared),
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            generation,
            token,
        };
        let join = tokio::spawn(driver.run(prompt));

        Ok(SessionHandle { generation, join })
    }

    /// Cancels the current session if it is streaming; otherwise a no-op.
    ///
    /// Takes effect immediately: the status flips to `Cancelled`, the
    /// transcript freezes, and any in-flight backoff wait or fragment
    /// delivery is abandoned.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        if state.status != SessionStatus::Streaming {
            return;
        }
        info!(generation = state.generation, "cancelling session");
        state.status = SessionStatus::Cancelled;
        state.cancel.cancel();
        self.shared.publish(&state);
    }

    /// Returns the current snapshot.
    ///
    /// Repeated calls without an intervening state change return identical
    /// values.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Subscribes to snapshot updates.
    ///
    /// Dropping the receiver unsubscribes it; no manual bookkeeping needed.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Fragment offsets at which retries reopened the current session's
    /// request. Empty when no retry has happened.
    pub fn reopen_offsets(&self) -> Vec<usize> {
        self.shared.state.lock().transcript.reopen_offsets().to_vec()
    }
}

/// Handle to one started session.
///
/// Awaiting [`join`](SessionHandle::join) yields the same outcome the status
/// snapshot reflects; callers may use either channel.
#[derive(Debug)]
pub struct SessionHandle {
    generation: u64,
    join: JoinHandle<SessionResult<String>>,
}

impl SessionHandle {
    /// Generation token of the session this handle belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Waits for the session to reach a terminal state.
    pub async fn join(self) -> SessionResult<String> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(SessionError::Cancelled),
            Err(e) => Err(SessionError::Internal {
                message: format!("session driver failed: {}", e),
            }),
        }
    }
}

enum AttemptOutcome {
    /// The stream ended normally
    Completed,
    /// Cancelled or superseded; no terminal state to write
    Interrupted,
    /// The attempt failed; the retry policy decides what happens next
    Failed(SessionError),
}

/// One spawned task per session; owns the attempt loop.
struct Driver {
    shared: Arc<Shared>,
    transport: Arc<dyn FragmentTransport>,
    config: SessionConfig,
    generation: u64,
    token: CancellationToken,
}

impl Driver {
    async fn run(self, prompt: Prompt) -> SessionResult<String> {
        let mut attempt: u32 = 0;

        loop {
            if self.token.is_cancelled() {
                return self.finish_interrupted();
            }

            match self.run_attempt(&prompt).await {
                AttemptOutcome::Completed => return self.finish_success(),
                AttemptOutcome::Interrupted => return self.finish_interrupted(),
                AttemptOutcome::Failed(error) => {
                    let retryable = self.config.retry.is_retryable(&error);

                    if retryable && attempt < self.config.retry.max_attempts {
                        attempt += 1;
                        warn!(
                            generation = self.generation,
                            attempt,
                            error = %error,
                            "transient failure, backing off"
                        );
                        if !self.record_attempt(attempt) {
                            return self.finish_interrupted();
                        }

                        let delay = self.config.retry.backoff_delay(attempt, error.retry_after());
                        debug!(generation = self.generation, ?delay, "waiting before reopen");
                        tokio::select! {
                            _ = self.token.cancelled() => return self.finish_interrupted(),
                            _ = tokio::time::sleep(delay) => {}
                        }

                        // Retries keep the accumulated text; the transcript
                        // records where the continuation begins.
                        if !self.mark_reopen() {
                            return self.finish_interrupted();
                        }
                        continue;
                    }

                    // Only a transient error that ran out of retry budget is
                    // reported as exhaustion; a terminal error keeps its
                    // variant even when earlier attempts were retried.
                    let error = if retryable && attempt > 0 {
                        SessionError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(error),
                        }
                    } else {
                        error
                    };
                    return self.finish_failed(error);
                }
            }
        }
    }

    /// Opens the request and consumes its stream, bounded by the attempt
    /// timeout so a silent transport cannot leave the session streaming
    /// forever.
    async fn run_attempt(&self, prompt: &Prompt) -> AttemptOutcome {
        let work = async {
            let mut stream = match self.transport.open(prompt).await {
                Ok(stream) => stream,
                Err(e) => return AttemptOutcome::Failed(e),
            };

            loop {
                let next = tokio::select! {
                    _ = self.token.cancelled() => return AttemptOutcome::Interrupted,
                    next = stream.next() => next,
                };

                match next {
                    Some(Ok(fragment)) => {
                        if !self.append_fragment(fragment) {
                            return AttemptOutcome::Interrupted;
                        }
                    }
                    Some(Err(e)) => return AttemptOutcome::Failed(e),
                    None => return AttemptOutcome::Completed,
                }
            }
        };

        match tokio::time::timeout(self.config.attempt_timeout, work).await {
            Ok(outcome) => outcome,
            Err(_) => AttemptOutcome::Failed(SessionError::Timeout {
                elapsed: self.config.attempt_timeout,
            }),
        }
    }

    /// Appends a fragment and publishes the new snapshot.
    ///
    /// Returns false when this driver no longer owns the current session;
    /// the fragment is dropped, never buffered.
    fn append_fragment(&self, fragment: Fragment) -> bool {
        let mut state = self.shared.state.lock();
        if !self.owns(&state) {
            trace!(generation = self.generation, "dropping stale fragment");
            return false;
        }
        state.rendered.push_str(fragment.as_str());
        state.transcript.push(fragment);
        self.shared.publish(&state);
        true
    }

    fn record_attempt(&self, attempt: u32) -> bool {
        let mut state = self.shared.state.lock();
        if !self.owns(&state) {
            return false;
        }
        state.attempt = attempt;
        self.shared.publish(&state);
        true
    }

    fn mark_reopen(&self) -> bool {
        let mut state = self.shared.state.lock();
        if !self.owns(&state) {
            return false;
        }
        state.transcript.mark_reopen();
        true
    }

    fn finish_success(&self) -> SessionResult<String> {
        let mut state = self.shared.state.lock();
        if !self.owns(&state) {
            trace!(generation = self.generation, "dropping stale completion");
            return Err(SessionError::Cancelled);
        }
        state.status = SessionStatus::Succeeded;
        self.shared.publish(&state);
        info!(
            generation = self.generation,
            fragments = state.transcript.len(),
            attempt = state.attempt,
            "session succeeded"
        );
        Ok(state.rendered.clone())
    }

    fn finish_failed(&self, error: SessionError) -> SessionResult<String> {
        let mut state = self.shared.state.lock();
        if !self.owns(&state) {
            trace!(generation = self.generation, "dropping stale error");
            return Err(SessionError::Cancelled);
        }
        warn!(generation = self.generation, error = %error, "session failed");
        state.status = SessionStatus::Failed;
        state.error = Some(error.clone());
        self.shared.publish(&state);
        Err(error)
    }

    /// Cancelled or superseded: the terminal status was already written by
    /// `cancel()` or belongs to the newer session, so nothing is mutated.
    fn finish_interrupted(&self) -> SessionResult<String> {
        debug!(generation = self.generation, "session interrupted");
        Err(SessionError::Cancelled)
    }

    /// True while this driver's generation is the current streaming session.
    fn owns(&self, state: &SessionState) -> bool {
        state.generation == self.generation && state.status == SessionStatus::Streaming
    }
}
