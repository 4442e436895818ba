//! Generic selection-wrapping and toolbar insertion commands.

use draftpad_utils_string::clamp_to_char_boundary;

use crate::state::EditDelta;
use crate::state::TextBuffer;
use crate::state::TextState;

/// Wrap the active selection in `prefix`/`suffix`, or, with no selection,
/// insert `prefix + placeholder + suffix` with the caret parked between
/// prefix and placeholder and the placeholder selected so typing replaces it.
///
/// Selection bounds are clamped to char boundaries before slicing; a
/// hand-built state with bad bounds degrades to the nearest valid
/// selection instead of panicking.
pub fn wrap_selection(
    state: &TextState,
    prefix: &str,
    suffix: &str,
    placeholder: &str,
) -> (TextState, EditDelta) {
    let start = clamp_to_char_boundary(&state.value, state.selection_start);
    let end = clamp_to_char_boundary(&state.value, state.selection_end.max(start));
    if start < end {
        let selected = &state.value[start..end];
        let wrapped = format!("{prefix}{selected}{suffix}");
        state.replace_range(start..end, &wrapped)
    } else {
        let inserted = format!("{prefix}{placeholder}{suffix}");
        let (mut next, delta) = state.replace_range(state.caret..state.caret, &inserted);
        let caret = delta.position + prefix.len();
        next.caret = caret;
        next.selection_start = caret;
        next.selection_end = caret + placeholder.len();
        (next, delta)
    }
}

/// Markdown link command: `[selection](url)`, or a placeholder link when
/// nothing is selected.
pub fn insert_link(buffer: &mut TextBuffer, placeholder: &str) -> EditDelta {
    let (next, delta) = wrap_selection(buffer.state(), "[", "](url)", placeholder);
    buffer.apply(next);
    delta
}

/// Toolbar mention command: splice the trigger character at the caret,
/// separating it from a preceding word so the trigger context qualifies.
pub fn insert_trigger(buffer: &mut TextBuffer, trigger: char) -> EditDelta {
    let preceded_by_word = buffer.state().value[..buffer.cursor()]
        .chars()
        .next_back()
        .is_some_and(char::is_alphanumeric);
    let inserted = if preceded_by_word {
        format!(" {trigger}")
    } else {
        trigger.to_string()
    };
    buffer.insert_str(&inserted)
}
