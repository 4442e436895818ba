//! The text buffer value type and its pure edit transitions.
//!
//! Every edit produces a whole new [`TextState`] from its inputs; nothing is
//! mutated in place mid-edit, so observers never see a buffer whose caret or
//! selection is out of sync with its text. The [`EditDelta`] returned by each
//! transition is what the rest of the core uses to keep previously captured
//! offsets valid (see `upload.rs`).

use std::ops::Range;

use draftpad_utils_string::clamp_to_char_boundary;

/// A `(position, delta)` pair describing one splice applied to the buffer.
///
/// `delta` is the signed change in byte length introduced at `position`. Any
/// offset captured before this edit and located at or after `position` must
/// be shifted by `delta` before it is used again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditDelta {
    pub position: usize,
    pub delta: isize,
}

impl EditDelta {
    /// Shift a previously captured offset across this edit.
    pub fn remap(&self, offset: usize) -> usize {
        if offset >= self.position {
            offset.saturating_add_signed(self.delta).max(self.position)
        } else {
            offset
        }
    }
}

/// Immutable snapshot of the composer's text, caret and selection.
///
/// Invariants: `caret <= value.len()`, and both selection bounds lie within
/// `[0, value.len()]` on char boundaries. All offsets are byte offsets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextState {
    pub value: String,
    pub caret: usize,
    pub selection_start: usize,
    pub selection_end: usize,
}

impl TextState {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let caret = value.len();
        Self {
            value,
            caret,
            selection_start: caret,
            selection_end: caret,
        }
    }

    pub fn selection(&self) -> Range<usize> {
        self.selection_start..self.selection_end
    }

    pub fn has_selection(&self) -> bool {
        self.selection_start < self.selection_end
    }

    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    /// Splice `text` into the buffer at `offset`, shifting the caret and
    /// selection bounds only when they sit at or after the insertion point.
    pub fn insert_at(&self, offset: usize, text: &str) -> (Self, EditDelta) {
        let offset = clamp_to_char_boundary(&self.value, offset);
        let mut value = String::with_capacity(self.value.len() + text.len());
        value.push_str(&self.value[..offset]);
        value.push_str(text);
        value.push_str(&self.value[offset..]);

        let shift = |pos: usize| {
            if pos >= offset {
                pos + text.len()
            } else {
                pos
            }
        };
        let next = Self {
            value,
            caret: shift(self.caret),
            selection_start: shift(self.selection_start),
            selection_end: shift(self.selection_end),
        };
        let delta = EditDelta {
            position: offset,
            delta: text.len() as isize,
        };
        (next, delta)
    }

    /// Replace `[start, end)` with `text`. The caret lands at the end of the
    /// replacement when it was inside or at the edge of the replaced range,
    /// and shifts by the length delta when it was after it. The selection
    /// collapses to the caret.
    pub fn replace_range(&self, range: Range<usize>, text: &str) -> (Self, EditDelta) {
        let start = clamp_to_char_boundary(&self.value, range.start);
        let end = clamp_to_char_boundary(&self.value, range.end.max(start));
        let removed = end - start;

        let mut value = String::with_capacity(self.value.len() - removed + text.len());
        value.push_str(&self.value[..start]);
        value.push_str(text);
        value.push_str(&self.value[end..]);

        let delta = text.len() as isize - removed as isize;
        let caret = if self.caret < start {
            self.caret
        } else if self.caret <= end {
            start + text.len()
        } else {
            self.caret.saturating_add_signed(delta)
        };
        let next = Self {
            value,
            caret,
            selection_start: caret,
            selection_end: caret,
        };
        (next, EditDelta { position: start, delta })
    }
}

/// Sole owner and mutation point for the composer's [`TextState`].
///
/// Callers never reach into the state to edit it; they go through the methods
/// here, each of which swaps in a complete replacement state and hands back
/// the [`EditDelta`] the orchestrator fans out to interested parties.
#[derive(Debug, Default)]
pub struct TextBuffer {
    state: TextState,
}

impl TextBuffer {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            state: TextState::new(initial),
        }
    }

    pub fn state(&self) -> &TextState {
        &self.state
    }

    pub fn text(&self) -> &str {
        &self.state.value
    }

    pub fn cursor(&self) -> usize {
        self.state.caret
    }

    pub fn set_cursor(&mut self, pos: usize) {
        let pos = clamp_to_char_boundary(&self.state.value, pos);
        self.state.caret = pos;
        self.state.selection_start = pos;
        self.state.selection_end = pos;
    }

    pub fn set_selection(&mut self, start: usize, end: usize) {
        let start = clamp_to_char_boundary(&self.state.value, start);
        let end = clamp_to_char_boundary(&self.state.value, end.max(start));
        self.state.selection_start = start;
        self.state.selection_end = end;
        self.state.caret = end;
    }

    pub fn insert_at(&mut self, offset: usize, text: &str) -> EditDelta {
        let (next, delta) = self.state.insert_at(offset, text);
        self.state = next;
        delta
    }

    pub fn replace_range(&mut self, range: Range<usize>, text: &str) -> EditDelta {
        let (next, delta) = self.state.replace_range(range, text);
        self.state = next;
        delta
    }

    /// Insert at the caret, replacing the selection when one is active.
    pub fn insert_str(&mut self, text: &str) -> EditDelta {
        if self.state.has_selection() {
            self.replace_range(self.state.selection(), text)
        } else {
            self.insert_at(self.state.caret, text)
        }
    }

    /// Swap in a replacement state produced by a pure transition.
    pub fn apply(&mut self, state: TextState) {
        self.state = state;
    }

    pub fn clear(&mut self) -> EditDelta {
        self.replace_range(0..self.state.value.len(), "")
    }
}
