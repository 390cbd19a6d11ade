//! Error types shared by provider clients, the cover store, and the batch pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::providers::ProviderKind;

/// Failure reported by a single provider client call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Response(String),
    #[error("image decode failed: {0}")]
    Decode(String),
}

/// Provider-level fault observed by a coordinator.
///
/// Coordinators log these and treat the provider as having contributed nothing;
/// they never reach the resolver.
#[derive(Debug, Error)]
pub enum SearchFault {
    #[error("{provider} exceeded the {}s search timeout", .timeout.as_secs_f32())]
    Timeout {
        provider: ProviderKind,
        timeout: Duration,
    },
    #[error("{provider} failed: {source}")]
    Provider {
        provider: ProviderKind,
        #[source]
        source: ProviderError,
    },
    #[error("{provider} worker stopped unexpectedly: {message}")]
    Worker {
        provider: ProviderKind,
        message: String,
    },
}

/// Failure while writing a cover back to a track.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{} is write-protected", .0.display())]
    NotWritable(PathBuf),
    #[error("tag update failed for {}: {message}", .path.display())]
    Tag { path: PathBuf, message: String },
    #[error("cover encoding failed: {0}")]
    Encode(String),
}

/// Reason a pipeline stopped before running all of its stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Cooperative cancellation; not a failure of the machinery.
    #[error("batch cancelled")]
    Cancelled,
    #[error("stage '{stage}' panicked: {message}")]
    Panicked { stage: &'static str, message: String },
    #[error("stage '{stage}' could not be started: {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
