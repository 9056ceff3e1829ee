//! Atomic multi-file publishing through the low-level object API.
//!
//! A batch is landed as one commit:
//!
//! 1. fetch the head commit and the default branch name (concurrently)
//! 2. create one blob per document (bounded fan-out, transient failures
//!    retried)
//! 3. create a tree on top of the head's tree
//! 4. create a commit whose sole parent is the head
//! 5. move the branch ref to that commit
//!
//! Objects created in steps 2-4 are unreachable until step 5, so any failure
//! before the ref update leaves the branch exactly as it was.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use garden_remote::{HeadCommit, NewTreeEntry, ObjectHash, RemoteError, RemoteStore};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::{BlobFailurePolicy, GardenConfig};
use crate::document::LocalDocument;
use crate::error::{GardenError, Result};
use crate::obs;

pub const BATCH_COMMIT_MESSAGE: &str = "Published multiple files";

/// First delay between blob attempts; doubles each retry.
const BLOB_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Progress of one batch publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Idle,
    FetchingBaseline,
    CreatingBlobs,
    BuildingTree,
    CreatingCommit,
    UpdatingRef,
    Done,
    Failed,
}

impl BatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchPhase::Idle => "idle",
            BatchPhase::FetchingBaseline => "fetching baseline",
            BatchPhase::CreatingBlobs => "creating blobs",
            BatchPhase::BuildingTree => "building tree",
            BatchPhase::CreatingCommit => "creating commit",
            BatchPhase::UpdatingRef => "updating ref",
            BatchPhase::Done => "done",
            BatchPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchPhase::Done | BatchPhase::Failed)
    }
}

impl std::fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document that made it into the batch commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedBlob {
    /// Corpus path
    pub path: String,
    pub remote_path: String,
    pub hash: ObjectHash,
}

/// Result of [`BatchCommitBuilder::publish_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// New head of the branch; `None` when there was nothing to publish
    pub commit: Option<ObjectHash>,
    pub branch: Option<String>,
    /// Sorted by path
    pub published: Vec<PublishedBlob>,
    /// Corpus paths left out under the best-effort policy, sorted
    pub skipped: Vec<String>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.commit.is_none()
    }
}

/// Bookkeeping for one run; never outlives `publish_batch`.
struct CommitBuildState {
    phase: BatchPhase,
    head: Option<HeadCommit>,
    branch: Option<String>,
    entries: Vec<NewTreeEntry>,
    tree: Option<ObjectHash>,
    commit: Option<ObjectHash>,
}

impl CommitBuildState {
    fn new() -> Self {
        Self {
            phase: BatchPhase::Idle,
            head: None,
            branch: None,
            entries: Vec::new(),
            tree: None,
            commit: None,
        }
    }

    fn advance(&mut self, next: BatchPhase) {
        debug!(from = %self.phase, to = %next, "batch phase");
        self.phase = next;
    }

    /// Move to `Failed` and log the objects left unreachable.
    fn mark_failed(&mut self) {
        self.advance(BatchPhase::Failed);
        if let Some(head) = &self.head {
            warn!(
                head = %head.commit.short(),
                orphan_blobs = self.entries.len(),
                orphan_tree = ?self.tree.as_ref().map(ObjectHash::short),
                orphan_commit = ?self.commit.as_ref().map(ObjectHash::short),
                "branch left at previous head"
            );
        }
    }

    /// Mark the run failed and build the error for the phase it failed in.
    fn fail(&mut self, source: RemoteError) -> GardenError {
        let phase = self.phase;
        self.mark_failed();
        obs::emit_batch_failed(phase, &source);
        GardenError::Batch { phase, source }
    }
}

/// Outcome of uploading one document.
struct BlobUpload {
    path: String,
    remote_path: String,
    result: std::result::Result<ObjectHash, String>,
}

pub struct BatchCommitBuilder {
    store: Arc<dyn RemoteStore>,
    config: GardenConfig,
}

impl BatchCommitBuilder {
    pub fn new(store: Arc<dyn RemoteStore>, config: GardenConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Publish `documents` as a single commit on the default branch.
    ///
    /// Documents outside the publish folder are dropped first; if none remain
    /// nothing is sent and an empty report is returned.
    pub async fn publish_batch(&self, documents: &[LocalDocument]) -> Result<BatchReport> {
        let eligible: Vec<&LocalDocument> = documents
            .iter()
            .filter(|doc| self.config.is_publishable(doc.path()))
            .collect();
        if eligible.is_empty() {
            debug!("nothing eligible to publish");
            return Ok(BatchReport::default());
        }

        let started = Instant::now();
        let mut state = CommitBuildState::new();

        state.advance(BatchPhase::FetchingBaseline);
        let (head, branch) = tokio::join!(
            self.store.latest_commit("HEAD"),
            self.store.default_branch()
        );
        let head = head.map_err(|e| state.fail(e))?;
        let branch = branch.map_err(|e| state.fail(e))?;
        debug!(head = %head.commit.short(), branch = %branch, "baseline");
        state.head = Some(head.clone());
        state.branch = Some(branch.clone());

        state.advance(BatchPhase::CreatingBlobs);
        let uploads = self.upload_blobs(&eligible).await;

        let mut published = Vec::new();
        let mut failed = Vec::new();
        for upload in uploads {
            match upload.result {
                Ok(hash) => {
                    state
                        .entries
                        .push(NewTreeEntry::blob(upload.remote_path.clone(), hash.clone()));
                    published.push(PublishedBlob {
                        path: upload.path,
                        remote_path: upload.remote_path,
                        hash,
                    });
                }
                Err(reason) => {
                    warn!(path = %upload.path, error = %reason, "blob upload failed");
                    failed.push(upload.path);
                }
            }
        }
        published.sort_by(|a, b| a.path.cmp(&b.path));
        failed.sort();

        let abort = match self.config.blob_failure_policy {
            BlobFailurePolicy::AllOrNothing => !failed.is_empty(),
            BlobFailurePolicy::BestEffort => published.is_empty(),
        };
        if abort {
            state.mark_failed();
            obs::emit_batch_aborted(failed.len(), eligible.len());
            return Err(GardenError::PartialBatch {
                failed,
                attempted: eligible.len(),
            });
        }

        state.advance(BatchPhase::BuildingTree);
        let tree = self
            .store
            .create_tree(&head.tree, &state.entries)
            .await
            .map_err(|e| state.fail(e))?;
        state.tree = Some(tree.clone());

        state.advance(BatchPhase::CreatingCommit);
        let commit = self
            .store
            .create_commit(BATCH_COMMIT_MESSAGE, &tree, std::slice::from_ref(&head.commit))
            .await
            .map_err(|e| state.fail(e))?;
        state.commit = Some(commit.clone());

        state.advance(BatchPhase::UpdatingRef);
        self.store
            .update_ref(&branch, &commit)
            .await
            .map_err(|e| state.fail(e))?;

        state.advance(BatchPhase::Done);
        info!(
            commit = %commit.short(),
            branch = %branch,
            published = published.len(),
            skipped = failed.len(),
            "batch landed"
        );
        obs::emit_batch_committed(
            &commit,
            &branch,
            published.len(),
            failed.len(),
            started.elapsed().as_millis() as u64,
        );

        Ok(BatchReport {
            commit: state.commit,
            branch: state.branch,
            published,
            skipped: failed,
        })
    }

    /// Create every blob, at most `max_concurrent_uploads` at a time.
    async fn upload_blobs(&self, documents: &[&LocalDocument]) -> Vec<BlobUpload> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_uploads.max(1)));

        let tasks = documents.iter().map(|doc| {
            let permits = Arc::clone(&permits);
            async move {
                let _permit = permits.acquire_owned().await.ok();
                let remote_path = self.config.remote_path(doc.path());
                let result = match doc.content().await {
                    Ok(content) => self
                        .create_blob_with_retry(&remote_path, content)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                BlobUpload {
                    path: doc.path().to_string(),
                    remote_path,
                    result,
                }
            }
        });

        join_all(tasks).await
    }

    /// Blobs are content-addressed, so repeating a create is harmless.
    async fn create_blob_with_retry(
        &self,
        remote_path: &str,
        content: &str,
    ) -> std::result::Result<ObjectHash, RemoteError> {
        let max_attempts = self.config.blob_retry_attempts.saturating_add(1);

        for attempt in 1..=max_attempts {
            match self.store.create_blob(content).await {
                Ok(hash) => return Ok(hash),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = retry_delay(attempt);
                    warn!(
                        path = %remote_path,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "blob upload failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(RemoteError::Transport(format!(
            "blob for {remote_path} not created after {max_attempts} attempts"
        )))
    }
}

/// Backoff before retry `attempt + 1`: the base delay doubled per attempt.
fn retry_delay(attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    BLOB_RETRY_BASE_DELAY.saturating_mul(factor)
}
