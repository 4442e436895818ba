//! Events used by asynchronous work to re-enter the single-threaded core.
//!
//! Mention searches, uploads and submission all run on spawned tasks; their
//! completions are queued as [`ComposerEvent`]s and applied by whoever owns
//! the [`Composer`](crate::Composer), one at a time. That queue is
//! the only path back into shared state, which is what makes the buffer's
//! offset remapping sufficient for correctness.

use tokio::sync::mpsc::UnboundedSender;

use crate::collab::MentionCandidate;
use crate::collab::UploadedAsset;
use crate::error::SubmitError;
use crate::error::UploadError;

#[derive(Debug)]
pub enum ComposerEvent {
    /// The buffer changed; carries the full new text for hosts that mirror
    /// the value (draft persistence, live preview).
    ValueChanged { text: String },
    /// A mention search resolved. `generation` identifies the query that
    /// issued it; stale generations are dropped on receipt.
    MentionSearchResult {
        generation: u64,
        candidates: Vec<MentionCandidate>,
    },
    /// An upload task moved from queued to actively uploading.
    UploadStarted { id: u64 },
    /// An upload task resolved, successfully or not.
    UploadFinished {
        id: u64,
        result: Result<UploadedAsset, UploadError>,
    },
    /// The submit collaborator resolved.
    SubmitFinished { result: Result<(), SubmitError> },
}

/// Cloneable handle used by spawned tasks to queue events.
#[derive(Clone, Debug)]
pub struct ComposerEventSender {
    tx: UnboundedSender<ComposerEvent>,
}

impl ComposerEventSender {
    pub fn new(tx: UnboundedSender<ComposerEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event. Failure means the receiver is gone (the host shut
    /// down mid-flight), which is not an error worth propagating.
    pub fn send(&self, event: ComposerEvent) {
        if let Err(err) = self.tx.send(event) {
            tracing::debug!("composer event dropped, receiver closed: {err}");
        }
    }
}
