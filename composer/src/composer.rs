//! The composer orchestrator: one owner for the buffer and the engines.
//!
//! Every mutation — a keystroke, a toolbar command, an applied mention, an
//! upload splice, a post-submit reset — funnels through this type, which
//! then synchronously fans the edit out (upload edit log, mention re-scan,
//! value-changed notification) before accepting anything else. Async
//! completions re-enter through [`Composer::handle_event`]; from the host's
//! perspective the whole core is single-threaded and event-driven.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::collab::ContentSubmitter;
use crate::collab::FileUploader;
use crate::collab::MentionSource;
use crate::collab::UploadRequest;
use crate::command;
use crate::config::ComposerConfig;
use crate::events::ComposerEvent;
use crate::events::ComposerEventSender;
use crate::mention::MentionEngine;
use crate::mention::MentionState;
use crate::state::EditDelta;
use crate::state::TextBuffer;
use crate::state::TextState;
use crate::submit::SubmissionCoordinator;
use crate::submit::SubmitOutcome;
use crate::upload::UploadBatch;
use crate::upload::UploadPipeline;
use crate::upload::UploadProgress;

/// The external services the composer talks to. All opaque; see `collab.rs`.
#[derive(Clone)]
pub struct Collaborators {
    pub mention_source: Arc<dyn MentionSource>,
    pub uploader: Arc<dyn FileUploader>,
    pub submitter: Arc<dyn ContentSubmitter>,
}

pub struct Composer {
    buffer: TextBuffer,
    mention: MentionEngine,
    uploads: UploadPipeline,
    submission: SubmissionCoordinator,
    tx: ComposerEventSender,
    alive: Arc<AtomicBool>,
    config: ComposerConfig,
}

impl Composer {
    pub fn new(
        config: ComposerConfig,
        collaborators: Collaborators,
        tx: ComposerEventSender,
    ) -> Self {
        Self::with_initial_content(config, collaborators, tx, "")
    }

    /// Construct with the buffer seeded (draft restoration, edit flows);
    /// the caret starts at the end of the content.
    pub fn with_initial_content(
        config: ComposerConfig,
        collaborators: Collaborators,
        tx: ComposerEventSender,
        initial: &str,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        Self {
            buffer: TextBuffer::new(initial),
            mention: MentionEngine::new(
                config.trigger_char,
                collaborators.mention_source,
                tx.clone(),
                Arc::clone(&alive),
            ),
            uploads: UploadPipeline::new(
                collaborators.uploader,
                tx.clone(),
                Arc::clone(&alive),
                &config,
            ),
            submission: SubmissionCoordinator::new(
                collaborators.submitter,
                tx.clone(),
                Arc::clone(&alive),
            ),
            tx,
            alive,
            config,
        }
    }

    pub fn text(&self) -> &str {
        self.buffer.text()
    }

    pub fn state(&self) -> &TextState {
        self.buffer.state()
    }

    pub fn cursor(&self) -> usize {
        self.buffer.cursor()
    }

    pub fn mention_state(&self) -> &MentionState {
        self.mention.state()
    }

    /// Anchor offset for a host-rendered suggestion tooltip.
    pub fn mention_anchor(&self) -> Option<usize> {
        self.mention.anchor_offset()
    }

    pub fn uploads(&self) -> &UploadBatch {
        self.uploads.batch()
    }

    pub fn upload_progress(&self) -> UploadProgress {
        self.uploads.batch().progress()
    }

    pub fn is_disposed(&self) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }

    // --- user input -------------------------------------------------------

    /// Insert text at the caret (replacing any active selection).
    pub fn insert_str(&mut self, text: &str) {
        if self.is_disposed() {
            return;
        }
        let delta = self.buffer.insert_str(text);
        self.after_edit(delta);
    }

    pub fn replace_range(&mut self, range: Range<usize>, text: &str) {
        if self.is_disposed() {
            return;
        }
        let delta = self.buffer.replace_range(range, text);
        self.after_edit(delta);
    }

    /// Move the caret without editing. Caret-dependent state (the mention
    /// context) still re-syncs: leaving the token destroys the query.
    pub fn set_cursor(&mut self, pos: usize) {
        if self.is_disposed() {
            return;
        }
        self.buffer.set_cursor(pos);
        self.sync_mention();
    }

    pub fn set_selection(&mut self, start: usize, end: usize) {
        if self.is_disposed() {
            return;
        }
        self.buffer.set_selection(start, end);
        self.sync_mention();
    }

    // --- toolbar commands -------------------------------------------------

    /// Markdown link command (`[selection](url)` or a placeholder link).
    pub fn insert_link_command(&mut self) {
        if self.is_disposed() {
            return;
        }
        let delta = command::insert_link(&mut self.buffer, &self.config.link_placeholder);
        self.after_edit(delta);
    }

    /// Toolbar mention command: splice a trigger at the caret and open the
    /// suggestion context immediately.
    pub fn insert_mention_command(&mut self) {
        if self.is_disposed() {
            return;
        }
        let delta = command::insert_trigger(&mut self.buffer, self.config.trigger_char);
        self.after_edit(delta);
    }

    // --- mention popup ----------------------------------------------------

    pub fn mention_move_up(&mut self) {
        self.mention.move_up();
    }

    pub fn mention_move_down(&mut self) {
        self.mention.move_down();
    }

    /// Replace the open trigger context with the highlighted candidate.
    pub fn apply_mention(&mut self) {
        if self.is_disposed() {
            return;
        }
        if let Some(delta) = self.mention.apply(&mut self.buffer) {
            self.after_edit(delta);
        }
    }

    /// Dismiss the suggestion popup without touching the buffer.
    pub fn close_mention(&mut self) {
        self.mention.close();
    }

    // --- uploads ----------------------------------------------------------

    /// Enqueue files for upload, capturing the current caret as the
    /// insertion point for each. Returns the task ids.
    pub fn attach_files(&mut self, files: Vec<UploadRequest>) -> Vec<u64> {
        if self.is_disposed() {
            return Vec::new();
        }
        self.uploads.enqueue(files, self.buffer.cursor())
    }

    // --- submission -------------------------------------------------------

    pub fn submit(&mut self) -> SubmitOutcome {
        if self.is_disposed() {
            return SubmitOutcome::Blocked(crate::error::SubmitBlocked::Disposed);
        }
        self.submission.submit(&self.buffer, self.uploads.batch())
    }

    // --- async re-entry ---------------------------------------------------

    /// Apply one queued event. The owner calls this for every event drained
    /// from the receiver; after disposal everything becomes a no-op.
    pub fn handle_event(&mut self, event: ComposerEvent) {
        if self.is_disposed() {
            return;
        }
        match event {
            ComposerEvent::ValueChanged { .. } => {}
            ComposerEvent::MentionSearchResult {
                generation,
                candidates,
            } => self.mention.on_search_result(generation, candidates),
            ComposerEvent::UploadStarted { id } => self.uploads.on_started(id),
            ComposerEvent::UploadFinished { id, result } => {
                // The pipeline records the splice in its own edit log, so the
                // fan-out here must not log it a second time.
                if self.uploads.on_finished(id, result, &mut self.buffer).is_some() {
                    self.sync_mention();
                    self.emit_value_changed();
                }
            }
            ComposerEvent::SubmitFinished { result } => {
                if self
                    .submission
                    .on_finished(&result, &mut self.buffer, &mut self.uploads)
                {
                    self.sync_mention();
                    self.emit_value_changed();
                }
            }
        }
    }

    /// Retire the composer. Pending async completions check the flag and
    /// become no-ops instead of writing into a retired buffer.
    pub fn dispose(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    // --- internal ---------------------------------------------------------

    fn after_edit(&mut self, delta: EditDelta) {
        self.uploads.note_edit(delta);
        self.sync_mention();
        self.emit_value_changed();
    }

    fn sync_mention(&mut self) {
        self.mention.sync(self.buffer.text(), self.buffer.cursor());
        self.mention.maybe_start_search();
    }

    fn emit_value_changed(&self) {
        self.tx.send(ComposerEvent::ValueChanged {
            text: self.buffer.text().to_string(),
        });
    }
}
