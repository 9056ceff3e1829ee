//! Garden-Remote: the remote object store, seen through its HTTP API
//!
//! This crate owns everything that talks to (or pretends to be) the
//! git-backed repository a garden is published to. It never touches a
//! local git checkout.
//!
//! ## Key Components
//!
//! - `ObjectHash`: git object id, and the blob hasher used to compare local
//!   content with remote content without a network round-trip
//! - `RemoteStore`: async trait over the object API (trees, blobs, commits,
//!   refs and the simple contents API)
//! - `GithubStore`: `RemoteStore` backed by the GitHub REST API
//! - `fakes::MemoryRemoteStore`: in-memory git model with failure injection

mod error;
pub mod fakes;
mod github;
mod hash;
pub mod store;

pub use error::RemoteError;
pub use github::{GithubConfig, GithubStore, DEFAULT_API_URL};
pub use hash::{blob_hash, ObjectHash};
pub use store::{
    DeleteFileRequest, HeadCommit, NewTreeEntry, ObjectKind, PutFileRequest, RemoteFile,
    RemoteStore, RemoteTreeEntry, BLOB_MODE,
};

/// Result type for remote store operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
