//! Caret-aware mention autocomplete.
//!
//! The engine re-scans the buffer after every edit or caret move, keeps at
//! most one logically active search in flight per open trigger context, and
//! only ever touches the buffer through a single `replace_range` when a
//! candidate is applied.
//!
//! # State machine
//!
//! `Idle → TriggerOpen → Searching → Resolved → Idle`, where `Searching` and
//! `Resolved` cycle as the query text changes under the caret. A search
//! response is tagged with the generation that issued it and dropped on
//! receipt when a newer query has superseded it, so closures over stale
//! query strings cannot repopulate the candidate list.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use draftpad_utils_string::clamp_to_char_boundary;

use crate::collab::MentionCandidate;
use crate::collab::MentionSource;
use crate::events::ComposerEvent;
use crate::events::ComposerEventSender;
use crate::state::EditDelta;
use crate::state::TextBuffer;

/// An open trigger context: where the trigger character sits and the query
/// text between it and the caret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionQuery {
    pub trigger_offset: usize,
    pub query_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionState {
    Idle,
    /// A trigger context is open but no search has been issued for it yet.
    TriggerOpen { query: MentionQuery },
    /// A search for `query` is in flight.
    Searching { query: MentionQuery },
    /// Candidates for `query` are available; `highlighted` is clamped to the
    /// candidate list bounds.
    Resolved {
        query: MentionQuery,
        candidates: Vec<MentionCandidate>,
        highlighted: usize,
    },
}

impl MentionState {
    pub fn query(&self) -> Option<&MentionQuery> {
        match self {
            MentionState::Idle => None,
            MentionState::TriggerOpen { query }
            | MentionState::Searching { query }
            | MentionState::Resolved { query, .. } => Some(query),
        }
    }

    pub fn is_open(&self) -> bool {
        self.query().is_some()
    }
}

/// Extract the trigger context under the caret, if any.
///
/// Walk back from the caret to the nearest trigger character with no
/// whitespace in between; the character before the trigger must not be
/// alphanumeric, so `a@b` (an email local part) never opens a context while
/// `(@da` does.
pub fn current_trigger_token(text: &str, caret: usize, trigger: char) -> Option<MentionQuery> {
    let caret = clamp_to_char_boundary(text, caret);
    let before = &text[..caret];

    let mut trigger_offset = None;
    for (idx, ch) in before.char_indices().rev() {
        if ch.is_whitespace() {
            break;
        }
        if ch == trigger {
            trigger_offset = Some(idx);
            break;
        }
    }
    let start = trigger_offset?;

    if before[..start]
        .chars()
        .next_back()
        .is_some_and(char::is_alphanumeric)
    {
        return None;
    }

    Some(MentionQuery {
        trigger_offset: start,
        query_text: text[start + trigger.len_utf8()..caret].to_string(),
    })
}

pub struct MentionEngine {
    state: MentionState,
    generation: u64,
    /// Query text the user explicitly dismissed; suppresses reopening until
    /// the token under the caret changes.
    dismissed_token: Option<String>,
    trigger: char,
    source: Arc<dyn MentionSource>,
    tx: ComposerEventSender,
    alive: Arc<AtomicBool>,
}

impl MentionEngine {
    pub fn new(
        trigger: char,
        source: Arc<dyn MentionSource>,
        tx: ComposerEventSender,
        alive: Arc<AtomicBool>,
    ) -> Self {
        Self {
            state: MentionState::Idle,
            generation: 0,
            dismissed_token: None,
            trigger,
            source,
            tx,
            alive,
        }
    }

    pub fn state(&self) -> &MentionState {
        &self.state
    }

    /// Offset of the trigger character for the open context, used by hosts
    /// to anchor a suggestion tooltip. Pixel geometry stays host-side.
    pub fn anchor_offset(&self) -> Option<usize> {
        self.state.query().map(|q| q.trigger_offset)
    }

    /// Re-derive the trigger context from the current buffer text and caret.
    ///
    /// Call after every buffer or caret change. Leaves `Searching`/`Resolved`
    /// untouched when the context is unchanged; otherwise moves to
    /// `TriggerOpen` (new or edited context) or `Idle` (context destroyed),
    /// discarding any candidates.
    pub fn sync(&mut self, text: &str, caret: usize) {
        let Some(query) = current_trigger_token(text, caret, self.trigger) else {
            self.state = MentionState::Idle;
            self.dismissed_token = None;
            return;
        };

        if self
            .dismissed_token
            .as_ref()
            .is_some_and(|tok| *tok == query.query_text)
        {
            self.state = MentionState::Idle;
            return;
        }
        self.dismissed_token = None;

        if self.state.query() == Some(&query) {
            return;
        }
        self.state = MentionState::TriggerOpen { query };
    }

    /// Issue the search for a freshly opened context.
    ///
    /// Separate from [`MentionEngine::sync`] so the scan itself stays pure;
    /// the orchestrator calls the two back to back. Each issued search bumps
    /// the generation counter, invalidating everything in flight.
    pub fn maybe_start_search(&mut self) {
        let MentionState::TriggerOpen { query } = &self.state else {
            return;
        };
        let query = query.clone();

        self.generation += 1;
        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let alive = Arc::clone(&self.alive);
        let query_text = query.query_text.clone();
        tokio::spawn(async move {
            let candidates = match source.search(&query_text).await {
                Ok(candidates) => candidates,
                Err(err) => {
                    // Not fatal: an empty suggestion list renders fine.
                    tracing::warn!("mention search failed for {query_text:?}: {err}");
                    Vec::new()
                }
            };
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            tx.send(ComposerEvent::MentionSearchResult {
                generation,
                candidates,
            });
        });

        self.state = MentionState::Searching { query };
    }

    /// Apply a search response. Responses from superseded generations, or
    /// arriving after the context closed, are discarded.
    pub fn on_search_result(&mut self, generation: u64, candidates: Vec<MentionCandidate>) {
        if generation != self.generation {
            return;
        }
        let query = match &self.state {
            MentionState::Searching { query } | MentionState::Resolved { query, .. } => {
                query.clone()
            }
            MentionState::Idle | MentionState::TriggerOpen { .. } => return,
        };
        self.state = MentionState::Resolved {
            query,
            candidates,
            highlighted: 0,
        };
    }

    pub fn candidates(&self) -> &[MentionCandidate] {
        match &self.state {
            MentionState::Resolved { candidates, .. } => candidates,
            _ => &[],
        }
    }

    pub fn highlighted(&self) -> Option<&MentionCandidate> {
        match &self.state {
            MentionState::Resolved {
                candidates,
                highlighted,
                ..
            } => candidates.get(*highlighted),
            _ => None,
        }
    }

    /// Move the highlight up one row, stopping at the top.
    pub fn move_up(&mut self) {
        if let MentionState::Resolved { highlighted, .. } = &mut self.state {
            *highlighted = highlighted.saturating_sub(1);
        }
    }

    /// Move the highlight down one row, stopping at the last candidate.
    pub fn move_down(&mut self) {
        if let MentionState::Resolved {
            candidates,
            highlighted,
            ..
        } = &mut self.state
        {
            if !candidates.is_empty() {
                *highlighted = (*highlighted + 1).min(candidates.len() - 1);
            }
        }
    }

    /// Replace the open trigger context with the highlighted candidate's
    /// canonical text plus a trailing space, leaving the caret at the end of
    /// the insertion. Returns the edit so the caller can fan it out.
    pub fn apply(&mut self, buffer: &mut TextBuffer) -> Option<EditDelta> {
        let MentionState::Resolved {
            query,
            candidates,
            highlighted,
        } = &self.state
        else {
            return None;
        };
        let candidate = candidates.get(*highlighted)?;

        let inserted = format!("{}{} ", self.trigger, candidate.handle);
        let delta = buffer.replace_range(query.trigger_offset..buffer.cursor(), &inserted);
        self.state = MentionState::Idle;
        self.dismissed_token = None;
        Some(delta)
    }

    /// Dismiss the open context without touching the buffer, remembering the
    /// token so the same context does not immediately reopen.
    pub fn close(&mut self) {
        if let Some(query) = self.state.query() {
            self.dismissed_token = Some(query.query_text.clone());
        }
        self.state = MentionState::Idle;
    }
}
