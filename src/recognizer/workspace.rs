//! The interim transcript buffer and its snapshot/prefix-clear protocol.
//!
//! Speech keeps arriving while an upload is in flight, so the coordinator may
//! only discard the text it actually captured: a snapshot taken at dispatch
//! bounds what is safe to clear. Divergence (an engine reset, a concurrent
//! full clear) makes the clear a no-op rather than a destructive mismatch.

/// Volatile, locally-guessed transcript text not yet confirmed by the server.
///
/// `committed` holds final hypotheses and only grows within an epoch;
/// `interim` is fully replaced on every hypothesis batch. The epoch counter is
/// bumped by any non-append rewrite (reset), which invalidates outstanding
/// snapshots — a length compare within a matching epoch is then always a valid
/// prefix check, with no string scanning.
#[derive(Debug, Default)]
pub struct Workspace {
    epoch: u64,
    committed: String,
    interim: String,
}

/// Immutable copy of the Workspace state at segment-dispatch time.
///
/// Created at dispatch, consumed at response, never held across dispatches.
#[derive(Debug, Clone)]
pub struct RecognitionSnapshot {
    epoch: u64,
    committed_len: usize,
    interim: String,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a final (confidently segmented) hypothesis.
    pub fn append_final(&mut self, text: &str) {
        self.committed.push_str(text);
    }

    /// Replace the interim buffer (the engine re-sends revised interim text
    /// each tick, so interim is never appended).
    pub fn set_interim(&mut self, text: &str) {
        self.interim.clear();
        self.interim.push_str(text);
    }

    /// Force-commit pending interim text into the committed buffer.
    ///
    /// Used when the engine terminates with unconsumed interim text; dropping
    /// it would silently lose speech.
    pub fn commit_interim(&mut self) {
        if !self.interim.is_empty() {
            let interim = std::mem::take(&mut self.interim);
            self.committed.push_str(&interim);
        }
    }

    /// The full visible interim transcript: committed + interim.
    pub fn visible(&self) -> String {
        let mut text = self.committed.clone();
        text.push_str(&self.interim);
        text
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.interim.is_empty()
    }

    /// Freeze the current state for an upload dispatch.
    pub fn snapshot(&self) -> RecognitionSnapshot {
        RecognitionSnapshot {
            epoch: self.epoch,
            committed_len: self.committed.len(),
            interim: self.interim.clone(),
        }
    }

    /// Remove exactly the snapshot-covered prefix, if it is still current.
    ///
    /// Committed text spoken after the snapshot survives; the interim buffer
    /// is cleared only when the engine has not revised it since the snapshot.
    /// Returns false when the snapshot no longer matches (no-op).
    pub fn clear_confirmed_prefix(&mut self, snapshot: &RecognitionSnapshot) -> bool {
        if snapshot.epoch != self.epoch || snapshot.committed_len > self.committed.len() {
            return false;
        }

        self.committed.drain(..snapshot.committed_len);
        if self.interim == snapshot.interim {
            self.interim.clear();
        }
        true
    }

    /// Clear everything and invalidate outstanding snapshots.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.committed.clear();
        self.interim.clear();
    }

    /// Take the full visible text and reset (session-final fallback commit).
    pub fn take_all(&mut self) -> String {
        let text = self.visible();
        self.reset();
        text
    }
}
