//! Collaborator seams consumed by the core.
//!
//! The core owns no wire format: mention search, file upload and content
//! submission are all opaque async calls behind these traits. Implementations
//! are shared via `Arc` so spawned tasks can hold them across awaits.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::error::UploadError;

/// One entry in the mention suggestion list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionCandidate {
    pub id: String,
    pub display_name: String,
    pub handle: String,
}

/// A file handed to the upload pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Which markdown syntax a finished upload should be spliced in with.
///
/// Resolved once from the collaborator's reported MIME category at upload
/// completion; nothing downstream re-inspects the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    Image,
    File,
}

/// Successful upload result reported by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub url: String,
    pub kind: AssetKind,
}

/// Asynchronous mention lookup. Results for superseded queries are discarded
/// by the caller, so implementations are free to resolve late.
#[async_trait]
pub trait MentionSource: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<MentionCandidate>>;
}

/// Uploads a single file. Called once per file, concurrently across a batch.
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadedAsset, UploadError>;
}

/// Final hand-off of the composed text plus successfully uploaded
/// attachment URLs. A failure here must leave composer state untouched.
#[async_trait]
pub trait ContentSubmitter: Send + Sync {
    async fn submit(&self, text: &str, attachment_urls: &[String]) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn uploaded_asset_serializes_with_tagged_kind() {
        let asset = UploadedAsset {
            url: "https://cdn.example.com/x.png".to_string(),
            kind: AssetKind::Image,
        };
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"url": "https://cdn.example.com/x.png", "kind": "Image"})
        );
    }

    #[test]
    fn mention_candidate_deserializes_from_search_payload() {
        let candidate: MentionCandidate = serde_json::from_str(
            r#"{"id": "u-1", "display_name": "Dana", "handle": "dana"}"#,
        )
        .unwrap();
        assert_eq!(candidate.handle, "dana");
        assert_eq!(candidate.display_name, "Dana");
    }
}
