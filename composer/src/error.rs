use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Per-task upload failure classification.
///
/// These are non-fatal: a failed task keeps its slot in the batch so the
/// host can render the failure, and never blocks or cancels sibling tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum UploadError {
    #[error("file exceeds the maximum allowed size")]
    SizeExceeded,
    #[error("file type is not accepted")]
    UnsupportedType,
    #[error("network error while uploading")]
    NetworkError,
    #[error("upload rejected by the server")]
    ServerRejected,
}

impl UploadError {
    /// Whether a retry could plausibly succeed without the caller changing
    /// anything. Only the transient network class qualifies.
    pub fn is_transient(self) -> bool {
        matches!(self, UploadError::NetworkError)
    }
}

/// Submission failed at the collaborator; buffer and upload state are left
/// intact so the user can retry.
#[derive(Debug, Error)]
#[error("submit failed: {0}")]
pub struct SubmitError(#[from] pub anyhow::Error);

/// Why `submit()` declined to run. This is surfaced state, not an error:
/// nothing is logged and nothing propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitBlocked {
    /// The buffer is empty or whitespace-only.
    EmptyContent,
    /// At least one upload is still queued or in flight.
    UploadsPending,
    /// A previous submission has not resolved yet.
    InFlight,
    /// The composer has been retired; nothing submits anymore.
    Disposed,
}
