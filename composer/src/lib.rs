//! Core text-input controller for a markdown post composer.
//!
//! This crate owns a single mutable text buffer and keeps it correct under
//! interleaved synchronous edits and asynchronous completions: caret-aware
//! mention autocomplete, concurrent per-file uploads that splice markdown
//! back in at remapped offsets, and submission gating over both. Rendering,
//! transport and persistence live with the host behind the collaborator
//! traits in [`collab`].

mod collab;
mod command;
mod composer;
mod config;
mod error;
mod events;
mod mention;
mod state;
mod submit;
mod upload;

pub use collab::AssetKind;
pub use collab::ContentSubmitter;
pub use collab::FileUploader;
pub use collab::MentionCandidate;
pub use collab::MentionSource;
pub use collab::UploadRequest;
pub use collab::UploadedAsset;
pub use command::wrap_selection;
pub use composer::Collaborators;
pub use composer::Composer;
pub use config::ComposerConfig;
pub use error::SubmitBlocked;
pub use error::SubmitError;
pub use error::UploadError;
pub use events::ComposerEvent;
pub use events::ComposerEventSender;
pub use mention::MentionQuery;
pub use mention::MentionState;
pub use state::EditDelta;
pub use state::TextBuffer;
pub use state::TextState;
pub use submit::SubmitOutcome;
pub use upload::UploadBatch;
pub use upload::UploadProgress;
pub use upload::UploadStatus;
pub use upload::UploadTask;
