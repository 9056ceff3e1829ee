//! The remote object-store abstraction.
//!
//! Two families of calls live here:
//! - the low-level object API (`create_blob`, `create_tree`, `create_commit`,
//!   `update_ref`) used to build one atomic multi-file commit;
//! - the simple contents API (`get_file`, `put_file`, `delete_file`) that
//!   creates one commit per file.
//!
//! The contents API carries base64 payloads while `create_blob` takes raw
//! utf-8 text. Callers encode; implementations send what they are given.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::hash::ObjectHash;
use crate::RemoteResult;

/// File mode for a regular, non-executable file.
pub const BLOB_MODE: &str = "100644";

/// Git object kind as reported by tree listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
    /// Submodule pointer
    Commit,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTreeEntry {
    /// Path relative to the repository root
    pub path: String,
    pub hash: ObjectHash,
    pub kind: ObjectKind,
}

/// A file fetched through the contents API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub path: String,
    pub hash: ObjectHash,
    /// Base64 payload exactly as the remote sent it (may contain line breaks)
    pub content_base64: String,
}

/// The commit a ref currently points at, with its root tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadCommit {
    pub commit: ObjectHash,
    pub tree: ObjectHash,
}

/// An entry to merge into a base tree when creating a new tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    #[serde(rename = "sha")]
    pub hash: ObjectHash,
}

impl NewTreeEntry {
    /// A regular file entry pointing at an existing blob.
    pub fn blob(path: impl Into<String>, hash: ObjectHash) -> Self {
        Self {
            path: path.into(),
            mode: BLOB_MODE.to_string(),
            kind: ObjectKind::Blob,
            hash,
        }
    }
}

/// Create-or-update request for the contents API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutFileRequest {
    #[serde(skip)]
    pub path: String,
    pub message: String,
    /// Base64-encoded file content
    #[serde(rename = "content")]
    pub content_base64: String,
    /// Current blob hash when updating; `None` when creating
    #[serde(rename = "sha", skip_serializing_if = "Option::is_none")]
    pub expected_hash: Option<ObjectHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Delete request for the contents API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFileRequest {
    #[serde(skip)]
    pub path: String,
    pub message: String,
    /// Current blob hash; the remote rejects the delete if it is stale
    #[serde(rename = "sha")]
    pub expected_hash: ObjectHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// A git-backed repository reachable only through its object API.
///
/// Implementations are read-only after construction and safe to share
/// across concurrent requests.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Recursive listing of the tree at `reference` (branch, commit or `HEAD`).
    /// Must bypass any response cache.
    async fn list_tree(&self, reference: &str) -> RemoteResult<Vec<RemoteTreeEntry>>;

    /// Fetch one file through the contents API. Directories and missing paths
    /// are `RemoteError::NotFound`.
    async fn get_file(&self, path: &str, reference: Option<&str>) -> RemoteResult<RemoteFile>;

    /// Create or update one file; returns the new blob hash.
    async fn put_file(&self, request: PutFileRequest) -> RemoteResult<ObjectHash>;

    /// Delete one file.
    async fn delete_file(&self, request: DeleteFileRequest) -> RemoteResult<()>;

    /// Store `content` (sent as utf-8 text) as a blob; returns its hash.
    async fn create_blob(&self, content: &str) -> RemoteResult<ObjectHash>;

    /// Create a tree from `base_tree` with `entries` merged in by path.
    async fn create_tree(
        &self,
        base_tree: &ObjectHash,
        entries: &[NewTreeEntry],
    ) -> RemoteResult<ObjectHash>;

    /// Create a commit object. Nothing references it until a ref is moved.
    async fn create_commit(
        &self,
        message: &str,
        tree: &ObjectHash,
        parents: &[ObjectHash],
    ) -> RemoteResult<ObjectHash>;

    /// Name of the repository's default branch.
    async fn default_branch(&self) -> RemoteResult<String>;

    /// The commit `reference` resolves to, with its root tree.
    async fn latest_commit(&self, reference: &str) -> RemoteResult<HeadCommit>;

    /// Move `refs/heads/<branch>` to `commit`.
    async fn update_ref(&self, branch: &str, commit: &ObjectHash) -> RemoteResult<()>;
}
