//! The durable confirmed transcript ("the vault")
//!
//! Append-only ordered segments of server-corrected text. The only mutation
//! paths are the upload coordinator's `append` and the single final-cleanup
//! `replace_all`; everything downstream reads it or subscribes to changes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

/// Separator between confirmed segments
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// One confirmed transcript segment
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

pub struct SessionTranscript {
    entries: Mutex<Vec<TranscriptEntry>>,
    notify_tx: watch::Sender<String>,
}

impl SessionTranscript {
    pub fn new() -> Self {
        let (notify_tx, _) = watch::channel(String::new());
        Self {
            entries: Mutex::new(Vec::new()),
            notify_tx,
        }
    }

    /// Append one confirmed segment. Text already appended is never touched.
    pub async fn append(&self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        let mut entries = self.entries.lock().await;
        entries.push(TranscriptEntry {
            text: trimmed.to_string(),
            received_at: Utc::now(),
        });
        self.notify(&entries);
    }

    /// Replace the whole transcript with its polished version.
    ///
    /// The single sanctioned overwrite: the final cleanup pass at session end.
    pub async fn replace_all(&self, text: String) {
        let mut entries = self.entries.lock().await;
        entries.clear();
        entries.push(TranscriptEntry {
            text,
            received_at: Utc::now(),
        });
        self.notify(&entries);
    }

    /// The full confirmed text, segments joined by paragraph breaks.
    pub async fn text(&self) -> String {
        let entries = self.entries.lock().await;
        Self::join(&entries)
    }

    pub async fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn segment_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Subscribe to change notifications (carries the current full text).
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.notify_tx.subscribe()
    }

    fn notify(&self, entries: &[TranscriptEntry]) {
        let _ = self.notify_tx.send(Self::join(entries));
    }

    fn join(entries: &[TranscriptEntry]) -> String {
        entries
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join(PARAGRAPH_SEPARATOR)
    }
}

impl Default for SessionTranscript {
    fn default() -> Self {
        Self::new()
    }
}
