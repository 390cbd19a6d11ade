//! Event-bus protocol between the cover search batch and its consumers.

use std::path::PathBuf;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Search(SearchMessage),
}

/// Batch and per-track notifications published while covers are searched.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchMessage {
    BatchStarted {
        total: usize,
    },
    TrackStateChanged {
        path: PathBuf,
        state: String,
    },
    TrackHighlighted {
        path: PathBuf,
        highlighted: bool,
    },
    TrackProcessing(PathBuf),
    TrackFinished(PathBuf),
    Progress {
        current: usize,
        total: usize,
    },
    BatchFinished,
    /// Batch stopped on request after `processed` tracks.
    BatchCancelled {
        processed: usize,
    },
    /// Batch machinery failed; remaining stages were skipped.
    BatchFailed {
        message: String,
    },
}

impl SearchMessage {
    /// True for the last message a batch publishes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::BatchFinished | Self::BatchCancelled { .. } | Self::BatchFailed { .. }
        )
    }
}
