//! One-file-at-a-time publishing through the contents API.
//!
//! Each call produces its own commit on the default branch. The blob hash of
//! the remote file is sent as the optimistic-concurrency token, so a write
//! based on a stale view of the remote is rejected rather than applied.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use garden_remote::{DeleteFileRequest, ObjectHash, PutFileRequest, RemoteError, RemoteStore};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::GardenConfig;
use crate::document::LocalDocument;
use crate::error::{GardenError, Result};
use crate::obs;

/// What a single-file publish did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum FileOutcome {
    Created { path: String, hash: ObjectHash },
    Updated { path: String, hash: ObjectHash },
}

impl FileOutcome {
    /// Remote path that was written.
    pub fn path(&self) -> &str {
        match self {
            FileOutcome::Created { path, .. } | FileOutcome::Updated { path, .. } => path,
        }
    }

    /// Blob hash the remote now holds for the file.
    pub fn hash(&self) -> &ObjectHash {
        match self {
            FileOutcome::Created { hash, .. } | FileOutcome::Updated { hash, .. } => hash,
        }
    }
}

pub struct SingleFilePublisher {
    store: Arc<dyn RemoteStore>,
    config: GardenConfig,
}

impl SingleFilePublisher {
    pub fn new(store: Arc<dyn RemoteStore>, config: GardenConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Current hash of `remote_path`, or `None` if it cannot be found.
    ///
    /// Any lookup failure counts as absent; only not-found is expected, so
    /// the rest are logged.
    async fn lookup(&self, remote_path: &str) -> Option<ObjectHash> {
        match self.store.get_file(remote_path, None).await {
            Ok(file) => Some(file.hash),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(path = %remote_path, error = %e, "remote lookup failed; treating file as absent");
                None
            }
        }
    }

    /// Create or update one document on the remote.
    pub async fn publish(&self, document: &LocalDocument) -> Result<FileOutcome> {
        if !self.config.is_publishable(document.path()) {
            return Err(GardenError::NotEligible {
                path: document.path().to_string(),
            });
        }

        let remote_path = self.config.remote_path(document.path());
        let expected_hash = match document.remote_hash() {
            Some(hash) => Some(hash.clone()),
            None => self.lookup(&remote_path).await,
        };
        let message = match expected_hash {
            Some(_) => format!("Update content {remote_path}"),
            None => format!("Add content {remote_path}"),
        };
        let content = document.content().await?;
        debug!(path = %remote_path, bytes = content.len(), update = expected_hash.is_some(), "publishing file");

        let request = PutFileRequest {
            path: remote_path.clone(),
            message,
            content_base64: BASE64.encode(content),
            expected_hash: expected_hash.clone(),
            branch: None,
        };
        let hash = match self.store.put_file(request).await {
            Ok(hash) => hash,
            Err(source) => {
                obs::emit_write_failed("publish", &remote_path, &source);
                return Err(GardenError::Write {
                    what: remote_path,
                    source,
                });
            }
        };

        obs::emit_file_published(&remote_path, &hash, expected_hash.is_some());
        Ok(match expected_hash {
            Some(_) => FileOutcome::Updated {
                path: remote_path,
                hash,
            },
            None => FileOutcome::Created {
                path: remote_path,
                hash,
            },
        })
    }

    /// Delete a file by its repository path.
    ///
    /// Without `known_hash` the current hash is looked up first; a file that
    /// cannot be found is a [`GardenError::NotFound`] and nothing is sent.
    pub async fn delete(&self, remote_path: &str, known_hash: Option<ObjectHash>) -> Result<()> {
        let hash = match known_hash {
            Some(hash) => hash,
            None => self
                .lookup(remote_path)
                .await
                .ok_or_else(|| GardenError::NotFound {
                    path: remote_path.to_string(),
                })?,
        };

        let request = DeleteFileRequest {
            path: remote_path.to_string(),
            message: format!("Delete content {remote_path}"),
            expected_hash: hash,
            branch: None,
        };
        if let Err(source) = self.store.delete_file(request).await {
            obs::emit_write_failed("delete", remote_path, &source);
            return Err(GardenError::Write {
                what: remote_path.to_string(),
                source,
            });
        }

        obs::emit_file_deleted(remote_path);
        Ok(())
    }

    /// Delete a note given its corpus path, as reported in
    /// `PublishStatus::deleted`.
    pub async fn delete_note(&self, corpus_path: &str, known_hash: Option<ObjectHash>) -> Result<()> {
        let remote_path = self.config.remote_path(corpus_path);
        self.delete(&remote_path, known_hash).await
    }

    /// Published text of a note; empty if it has never been published.
    pub async fn remote_content(&self, corpus_path: &str) -> Result<String> {
        let remote_path = self.config.remote_path(corpus_path);
        let file = match self.store.get_file(&remote_path, None).await {
            Ok(file) => file,
            Err(e) if e.is_not_found() => return Ok(String::new()),
            Err(source) => {
                return Err(GardenError::Fetch {
                    what: remote_path,
                    source,
                })
            }
        };

        // The contents API wraps its base64 at 60 columns.
        let compact: String = file
            .content_base64
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let malformed = |message: String| GardenError::Fetch {
            what: remote_path.clone(),
            source: RemoteError::Malformed(message),
        };
        let bytes = BASE64
            .decode(compact)
            .map_err(|e| malformed(format!("content is not base64: {e}")))?;
        String::from_utf8(bytes).map_err(|e| malformed(format!("content is not utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garden_remote::fakes::{MemoryRemoteStore, RemoteOp};

    fn config() -> GardenConfig {
        GardenConfig::new("alice", "garden", "t")
            .with_note_path_base("notes/")
            .with_publish_folder("Garden/")
    }

    #[test]
    fn construction_validates_config() {
        let store = Arc::new(MemoryRemoteStore::new());
        assert!(matches!(
            SingleFilePublisher::new(store, GardenConfig::default()).err(),
            Some(GardenError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn remote_content_decodes_wrapped_base64() {
        let store = Arc::new(MemoryRemoteStore::new());
        let long = "line of text that is long enough to wrap\n".repeat(5);
        store.seed_file("notes/Garden/a.md", &long);
        let publisher = SingleFilePublisher::new(store.clone(), config()).unwrap();

        assert_eq!(publisher.remote_content("Garden/a.md").await.unwrap(), long);
        assert_eq!(publisher.remote_content("Garden/none.md").await.unwrap(), "");
    }

    #[tokio::test]
    async fn remote_content_surfaces_other_failures() {
        let store = Arc::new(MemoryRemoteStore::new());
        store.fail(RemoteOp::GetFile);
        let publisher = SingleFilePublisher::new(store, config()).unwrap();
        assert!(matches!(
            publisher.remote_content("Garden/a.md").await,
            Err(GardenError::Fetch { .. })
        ));
    }

    #[test]
    fn outcome_serializes_with_action_tag() {
        let outcome = FileOutcome::Created {
            path: "notes/a.md".into(),
            hash: garden_remote::blob_hash(b"a"),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["action"], "created");
        assert_eq!(outcome.path(), "notes/a.md");
    }
}
