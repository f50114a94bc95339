//! Core types shared across the crate.
//!
//! The request side is a [`Prompt`] of role/content [`Turn`]s; the response
//! side is a sequence of opaque [`Fragment`]s. Observers see the session only
//! through cloneable [`SessionSnapshot`] values.

use crate::errors::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// End-user input
    User,
    /// Prior model output
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single role/content turn in the request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn
    pub role: Role,
    /// The turn text
    pub content: String,
}

impl Turn {
    /// Creates a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Creates a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// The request payload for one session: an ordered list of turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Prompt {
    /// Conversation turns, oldest first
    pub turns: Vec<Turn>,
}

impl Prompt {
    /// Creates a prompt from a list of turns.
    pub fn new(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    /// Convenience constructor for a single user turn.
    pub fn from_user_text(content: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::user(content)],
        }
    }
}

/// Validate a request payload before opening a session.
///
/// A prompt must carry at least one turn, and no turn may have empty content.
pub fn validate_prompt(prompt: &Prompt) -> Result<(), SessionError> {
    if prompt.turns.is_empty() {
        return Err(SessionError::InvalidInput {
            message: "prompt must contain at least one turn".to_string(),
        });
    }

    for (i, turn) in prompt.turns.iter().enumerate() {
        if turn.content.is_empty() {
            return Err(SessionError::InvalidInput {
                message: format!("turn {} has empty content", i),
            });
        }
    }

    Ok(())
}

/// One incremental unit of generated text from the service.
///
/// Fragments are opaque and ordered; they carry no identity beyond their
/// position in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment(
    /// The fragment text
    pub String,
);

impl Fragment {
    /// Returns the fragment text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Fragment {
    fn from(s: &str) -> Self {
        Fragment(s.to_string())
    }
}

impl From<String> for Fragment {
    fn from(s: String) -> Self {
        Fragment(s)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a session.
///
/// Transitions are monotonic per session: `Idle -> Streaming -> terminal`.
/// Retry attempts stay within `Streaming`; only exhaustion or a terminal
/// error reaches `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session has been started yet
    Idle,
    /// A request is open and fragments may still arrive
    Streaming,
    /// The stream ended normally
    Succeeded,
    /// A terminal error was surfaced (including retry exhaustion)
    Failed,
    /// The caller cancelled the session
    Cancelled,
}

impl SessionStatus {
    /// Returns true for `Succeeded`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Succeeded | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

/// Read-only view of the current session, published on every change.
///
/// Snapshots are cheap clones; observers never hold a handle into the live
/// session record.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Current lifecycle status
    pub status: SessionStatus,
    /// Rendered accumulated text so far
    pub text: String,
    /// The terminal error, present only when `status` is `Failed`
    pub error: Option<SessionError>,
    /// Retry attempts made so far in this session
    pub attempt: u32,
    /// Generation token of the session this snapshot belongs to
    pub generation: u64,
}

impl SessionSnapshot {
    /// The snapshot before any session has started.
    pub fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            text: String::new(),
            error: None,
            attempt: 0,
            generation: 0,
        }
    }
}
