//! Stream aggregation: folding ordered fragments into the visible text.
//!
//! [`Transcript`] is the accumulation side of a session. It is append-only
//! within a session and backed by a growable buffer, so appends are O(1)
//! amortized. Rendering concatenates fragments in arrival order and is valid
//! on any prefix of the sequence, which is what makes partial snapshots
//! legitimate intermediate states.

use crate::types::Fragment;

/// Ordered, append-only sequence of fragments for one session.
///
/// Besides the fragments themselves, the transcript records the offsets at
/// which a retry reopened the request. Retries keep the text accumulated by
/// earlier attempts and append the continuation; the recorded offsets make
/// that policy observable instead of a silent concatenation.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    fragments: Vec<Fragment>,
    reopen_offsets: Vec<usize>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment in place.
    pub fn push(&mut self, next: Fragment) {
        self.fragments.push(next);
    }

    /// Appends a fragment, returning the extended transcript.
    ///
    /// Ownership-passing form of [`push`](Self::push) for callers that fold
    /// over a fragment sequence.
    pub fn append(mut self, next: Fragment) -> Self {
        self.push(next);
        self
    }

    /// Records that a retry reopened the request at the current offset.
    ///
    /// Fragments appended after this call belong to a new attempt's
    /// continuation.
    pub fn mark_reopen(&mut self) {
        self.reopen_offsets.push(self.fragments.len());
    }

    /// Concatenates all fragments into the externally visible string.
    ///
    /// Idempotent; calling it twice without an intervening append returns
    /// identical values.
    pub fn render(&self) -> String {
        let mut text = String::with_capacity(self.fragments.iter().map(|f| f.as_str().len()).sum());
        for fragment in &self.fragments {
            text.push_str(fragment.as_str());
        }
        text
    }

    /// Number of fragments received so far.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Returns true if no fragment has been received yet.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Fragment offsets at which retry attempts reopened the request.
    pub fn reopen_offsets(&self) -> &[usize] {
        &self.reopen_offsets
    }
}

impl FromIterator<Fragment> for Transcript {
    fn from_iter<I: IntoIterator<Item = Fragment>>(iter: I) -> Self {
        Self {
            fragments: iter.into_iter().collect(),
            reopen_offsets: Vec::new(),
        }
    }
}
