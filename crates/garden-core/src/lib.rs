//! Garden Core Library
//!
//! Keeps a local note corpus in sync with a git-backed repository that is
//! reached only through its HTTP object API.
//!
//! ## Key Components
//!
//! - `StatusReconciler`: classifies every publishable note as unpublished,
//!   published, changed or deleted by comparing blob hashes
//! - `BatchCommitBuilder`: lands many notes as one commit
//!   (blobs → tree → commit → ref update)
//! - `SingleFilePublisher`: one commit per file through the contents API
//! - `Corpus` / `FsCorpus`: read-only access to the local notes

pub mod batch;
pub mod config;
pub mod corpus;
pub mod diff;
pub mod document;
pub mod error;
pub mod fakes;
pub mod frontmatter;
pub mod obs;
pub mod publisher;
pub mod status;
pub mod telemetry;

pub use batch::{
    BatchCommitBuilder, BatchPhase, BatchReport, PublishedBlob, BATCH_COMMIT_MESSAGE,
};
pub use config::{relative_note_path, BlobFailurePolicy, GardenConfig, MAX_BLOB_RETRY_ATTEMPTS};
pub use corpus::{Corpus, FsCorpus};
pub use diff::{unified_diff, DiffStats};
pub use document::{collect_publishable, LocalDocument};
pub use error::{ConfigError, GardenError, Result};
pub use frontmatter::{parse_frontmatter, Frontmatter};
pub use publisher::{FileOutcome, SingleFilePublisher};
pub use status::{
    is_protected_asset, reconcile, remote_note_hashes, DeletedPath, NoteSummary, PublishStatus,
    StatusReconciler, StatusSummary,
};

pub use telemetry::init_tracing;

pub use garden_remote::{blob_hash, ObjectHash, RemoteError, RemoteStore};
