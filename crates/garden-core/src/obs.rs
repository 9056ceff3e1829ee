//! Structured observability hooks for garden lifecycle events.
//!
//! This module provides:
//! - An operation-scoped tracing span via the `OperationSpan` RAII guard
//! - Emission functions for status passes, single-file writes and batches
//!
//! Events are emitted at `info!` level (configurable via `GARDEN_LOG`).
//! Failures are emitted at `warn!`.

use garden_remote::{ObjectHash, RemoteError};
use tracing::{info, warn};

use crate::batch::BatchPhase;
use crate::status::PublishStatus;

/// RAII guard that enters a span tagged with the operation and repository.
///
/// # Example
///
/// ```ignore
/// let _span = OperationSpan::enter("publish", "alice/garden");
/// // every event until the guard drops carries op=publish repo=alice/garden
/// ```
pub struct OperationSpan {
    _span: tracing::span::EnteredSpan,
}

impl OperationSpan {
    pub fn enter(operation: &str, repository: &str) -> Self {
        let span = tracing::info_span!("garden.op", op = %operation, repo = %repository);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: one reconciliation pass finished.
pub fn emit_status_computed(status: &PublishStatus, duration_ms: u64) {
    info!(
        event = "status.computed",
        unpublished = status.unpublished.len(),
        published = status.published.len(),
        changed = status.changed.len(),
        deleted = status.deleted.len(),
        duration_ms = duration_ms,
    );
}

/// Emit event: a file was created or updated through the contents API.
pub fn emit_file_published(path: &str, hash: &ObjectHash, updated: bool) {
    info!(event = "file.published", path = %path, hash = %hash, updated = updated);
}

pub fn emit_file_deleted(path: &str) {
    info!(event = "file.deleted", path = %path);
}

/// Emit event: a contents API write was rejected or failed (warning level).
pub fn emit_write_failed(action: &str, path: &str, error: &RemoteError) {
    warn!(event = "file.write_failed", action = %action, path = %path, error = %error);
}

/// Emit event: the branch now points at a new batch commit.
pub fn emit_batch_committed(
    commit: &ObjectHash,
    branch: &str,
    published: usize,
    skipped: usize,
    duration_ms: u64,
) {
    info!(
        event = "batch.committed",
        commit = %commit,
        branch = %branch,
        published = published,
        skipped = skipped,
        duration_ms = duration_ms,
    );
}

/// Emit event: blobs failed under the all-or-nothing policy; nothing was committed.
pub fn emit_batch_aborted(failed: usize, attempted: usize) {
    warn!(event = "batch.aborted", failed = failed, attempted = attempted);
}

pub fn emit_batch_failed(phase: BatchPhase, error: &RemoteError) {
    warn!(event = "batch.failed", phase = %phase, error = %error);
}
