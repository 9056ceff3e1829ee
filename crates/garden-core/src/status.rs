//! Status reconciliation: local notes against one remote tree snapshot.
//!
//! Every publishable note lands in exactly one of `unpublished`, `published`
//! or `changed`. Remote notes with no local counterpart are reported in
//! `deleted`, together with the hash needed to delete them. Comparison is by
//! git blob hash, so no remote content is downloaded.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use garden_remote::{ObjectHash, ObjectKind, RemoteStore, RemoteTreeEntry};
use serde::Serialize;
use tracing::debug;

use crate::config::{relative_note_path, GardenConfig};
use crate::corpus::Corpus;
use crate::document::{collect_publishable, LocalDocument};
use crate::error::{GardenError, Result};
use crate::obs;

/// A remote note with no local counterpart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DeletedPath {
    /// Path relative to the remote note root (same form as corpus paths)
    pub path: String,
    pub hash: ObjectHash,
}

/// Outcome of one reconciliation pass. Each list is sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishStatus {
    pub unpublished: Vec<LocalDocument>,
    pub published: Vec<LocalDocument>,
    pub changed: Vec<LocalDocument>,
    pub deleted: Vec<DeletedPath>,
}

impl PublishStatus {
    /// Documents that a publish would upload: unpublished then changed.
    pub fn pending(&self) -> Vec<LocalDocument> {
        self.unpublished
            .iter()
            .chain(self.changed.iter())
            .cloned()
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.unpublished.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }

    pub fn summary(&self) -> StatusSummary {
        fn note(doc: &LocalDocument) -> NoteSummary {
            NoteSummary {
                path: doc.path().to_string(),
                remote_hash: doc.remote_hash().cloned(),
            }
        }
        StatusSummary {
            unpublished: self.unpublished.iter().map(note).collect(),
            published: self.published.iter().map(note).collect(),
            changed: self.changed.iter().map(note).collect(),
            deleted: self.deleted.clone(),
        }
    }
}

/// Serializable view of a [`PublishStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub unpublished: Vec<NoteSummary>,
    pub published: Vec<NoteSummary>,
    pub changed: Vec<NoteSummary>,
    pub deleted: Vec<DeletedPath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteSummary {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_hash: Option<ObjectHash>,
}

/// Non-document assets that live next to notes and are never deleted.
pub fn is_protected_asset(path: &str) -> bool {
    path.ends_with(".js")
}

/// Blob entries under `note_path_base`, keyed by their path relative to it.
///
/// Relative paths that are empty or begin with `.` are dropped: they either
/// escape the root or are dot-files such as `.github/`.
pub fn remote_note_hashes(
    snapshot: &[RemoteTreeEntry],
    note_path_base: &str,
) -> BTreeMap<String, ObjectHash> {
    snapshot
        .iter()
        .filter(|entry| entry.kind == ObjectKind::Blob)
        .filter_map(|entry| {
            let relative = entry.path.strip_prefix(note_path_base)?;
            if relative.is_empty() || relative.starts_with('.') {
                return None;
            }
            Some((relative.to_string(), entry.hash.clone()))
        })
        .collect()
}

/// Classify `documents` against `snapshot`.
///
/// Documents outside the publish folder are ignored. Content is read and
/// hashed one document at a time.
pub async fn reconcile(
    documents: Vec<LocalDocument>,
    snapshot: &[RemoteTreeEntry],
    config: &GardenConfig,
) -> Result<PublishStatus> {
    let remote = remote_note_hashes(snapshot, &config.note_path_base);
    let mut status = PublishStatus::default();
    let mut seen = HashSet::new();

    for mut doc in documents {
        if !config.is_publishable(doc.path()) {
            continue;
        }
        let key = relative_note_path(doc.path()).to_string();
        let local = doc.local_hash().await?;

        match remote.get(&key) {
            None => status.unpublished.push(doc),
            Some(remote_hash) => {
                doc.set_remote_hash(remote_hash.clone());
                if *remote_hash == local {
                    status.published.push(doc);
                } else {
                    debug!(path = %key, local = %local.short(), remote = %remote_hash.short(), "changed");
                    status.changed.push(doc);
                }
            }
        }
        seen.insert(key);
    }

    status.deleted = remote
        .into_iter()
        .filter(|(path, _)| !seen.contains(path) && !is_protected_asset(path))
        .map(|(path, hash)| DeletedPath { path, hash })
        .collect();

    status.unpublished.sort_by(|a, b| a.path().cmp(b.path()));
    status.published.sort_by(|a, b| a.path().cmp(b.path()));
    status.changed.sort_by(|a, b| a.path().cmp(b.path()));
    status.deleted.sort();

    Ok(status)
}

/// Computes the publish status of a corpus against the remote head.
pub struct StatusReconciler {
    store: Arc<dyn RemoteStore>,
    corpus: Arc<dyn Corpus>,
    config: GardenConfig,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn RemoteStore>, corpus: Arc<dyn Corpus>, config: GardenConfig) -> Self {
        Self {
            store,
            corpus,
            config,
        }
    }

    /// One full pass. Fails without partial results if the remote tree cannot
    /// be listed.
    pub async fn publish_status(&self) -> Result<PublishStatus> {
        let started = Instant::now();
        let snapshot = self
            .store
            .list_tree("HEAD")
            .await
            .map_err(|source| GardenError::Fetch {
                what: format!("tree of {}", self.config.repository_name()),
                source,
            })?;

        let documents = collect_publishable(self.corpus.clone(), &self.config).await?;
        let status = reconcile(documents, &snapshot, &self.config).await?;

        obs::emit_status_computed(&status, started.elapsed().as_millis() as u64);
        Ok(status)
    }
}
