use std::num::NonZeroUsize;

/// Tunables for the composer core.
///
/// The defaults match the original product behavior; hosts embedding the
/// composer in other surfaces can override individual knobs.
#[derive(Clone, Debug)]
pub struct ComposerConfig {
    /// Character that opens mention search at the caret.
    pub trigger_char: char,
    /// Placeholder text inserted by the link command when nothing is selected.
    pub link_placeholder: String,
    /// Upper bound on uploads running at once. `None` leaves concurrency to
    /// whatever the upload collaborator enforces.
    pub max_concurrent_uploads: Option<NonZeroUsize>,
    /// Extra attempts for uploads that fail with a transient network error.
    pub upload_retry_limit: u32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            trigger_char: '@',
            link_placeholder: "your link".to_string(),
            max_concurrent_uploads: None,
            upload_retry_limit: 0,
        }
    }
}
