//! Submission gating and hand-off.
//!
//! `submit()` refuses to run while the buffer is blank or any upload is
//! unresolved; a permanently stuck upload therefore blocks submission rather
//! than silently dropping its attachment. Failed uploads are resolved and
//! simply omitted from the attachment list.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::collab::ContentSubmitter;
use crate::error::SubmitBlocked;
use crate::error::SubmitError;
use crate::events::ComposerEvent;
use crate::events::ComposerEventSender;
use crate::state::TextBuffer;
use crate::upload::UploadBatch;
use crate::upload::UploadPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The collaborator was invoked; a `SubmitFinished` event will follow.
    Started,
    /// Validation declined to submit; nothing was invoked.
    Blocked(SubmitBlocked),
}

pub struct SubmissionCoordinator {
    submitter: Arc<dyn ContentSubmitter>,
    tx: ComposerEventSender,
    alive: Arc<AtomicBool>,
    in_flight: bool,
}

impl SubmissionCoordinator {
    pub fn new(
        submitter: Arc<dyn ContentSubmitter>,
        tx: ComposerEventSender,
        alive: Arc<AtomicBool>,
    ) -> Self {
        Self {
            submitter,
            tx,
            alive,
            in_flight: false,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Gate and, when clear, hand the final text plus the URLs of all
    /// succeeded uploads to the submit collaborator.
    pub fn submit(&mut self, buffer: &TextBuffer, batch: &UploadBatch) -> SubmitOutcome {
        if self.in_flight {
            return SubmitOutcome::Blocked(SubmitBlocked::InFlight);
        }
        if buffer.state().is_blank() {
            return SubmitOutcome::Blocked(SubmitBlocked::EmptyContent);
        }
        if batch.pending_count() > 0 {
            return SubmitOutcome::Blocked(SubmitBlocked::UploadsPending);
        }

        let text = buffer.text().to_string();
        let attachment_urls = batch.succeeded_urls();
        let submitter = Arc::clone(&self.submitter);
        let tx = self.tx.clone();
        let alive = Arc::clone(&self.alive);
        tokio::spawn(async move {
            let result = submitter
                .submit(&text, &attachment_urls)
                .await
                .map_err(SubmitError::from);
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            tx.send(ComposerEvent::SubmitFinished { result });
        });

        self.in_flight = true;
        SubmitOutcome::Started
    }

    /// Apply the collaborator's verdict: success resets buffer and batch for
    /// the next draft, failure preserves both so the user can retry.
    /// Returns whether a reset happened.
    pub fn on_finished(
        &mut self,
        result: &Result<(), SubmitError>,
        buffer: &mut TextBuffer,
        uploads: &mut UploadPipeline,
    ) -> bool {
        self.in_flight = false;
        match result {
            Ok(()) => {
                buffer.clear();
                uploads.clear();
                true
            }
            Err(err) => {
                tracing::debug!("submission failed, keeping draft: {err}");
                false
            }
        }
    }
}
