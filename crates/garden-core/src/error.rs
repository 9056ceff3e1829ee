//! Error taxonomy for garden operations.

use std::path::PathBuf;

use garden_remote::RemoteError;

use crate::batch::BatchPhase;

/// Problems with the settings, detected before any network call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("repository owner is not set (GARDEN_OWNER or githubUserName)")]
    MissingOwner,

    #[error("repository name is not set (GARDEN_REPOSITORY or githubRepo)")]
    MissingRepository,

    #[error("access token is not set (GARDEN_TOKEN or githubToken)")]
    MissingToken,

    #[error("max_concurrent_uploads must be at least 1")]
    ZeroUploadBound,

    #[error("blob_retry_attempts is {attempts}; at most {max} are allowed")]
    TooManyRetries { attempts: u32, max: u32 },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Garden domain errors.
#[derive(Debug, thiserror::Error)]
pub enum GardenError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A read against the remote failed where a baseline is required.
    #[error("could not fetch {what}: {source}")]
    Fetch {
        what: String,
        #[source]
        source: RemoteError,
    },

    /// A create/update/delete call was rejected or failed.
    #[error("could not write {what}: {source}")]
    Write {
        what: String,
        #[source]
        source: RemoteError,
    },

    #[error("{path} is outside the publish folder")]
    NotEligible { path: String },

    #[error("{path} does not exist on the remote")]
    NotFound { path: String },

    /// Some documents of a batch could not be turned into blobs; nothing was
    /// committed.
    #[error("batch aborted: {} of {attempted} documents failed to upload ({})", .failed.len(), .failed.join(", "))]
    PartialBatch {
        failed: Vec<String>,
        attempted: usize,
    },

    /// A batch failed in `phase`; the branch was not moved.
    #[error("batch publish failed while {phase}: {source}")]
    Batch {
        phase: BatchPhase,
        #[source]
        source: RemoteError,
    },

    #[error("cannot read {path} from the corpus: {message}")]
    Corpus { path: String, message: String },
}

impl GardenError {
    /// Remote failure behind this error, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            GardenError::Fetch { source, .. }
            | GardenError::Write { source, .. }
            | GardenError::Batch { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for garden operations.
pub type Result<T> = std::result::Result<T, GardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_batch_lists_failures() {
        let err = GardenError::PartialBatch {
            failed: vec!["notes/a.md".into(), "notes/b.md".into()],
            attempted: 5,
        };
        let text = err.to_string();
        assert!(text.contains("2 of 5"));
        assert!(text.contains("notes/a.md, notes/b.md"));
    }

    #[test]
    fn batch_error_names_phase() {
        let err = GardenError::Batch {
            phase: BatchPhase::UpdatingRef,
            source: RemoteError::from_status(409, "refs/heads/main", "not a fast forward"),
        };
        assert!(err.to_string().contains("updating ref"));
        assert!(err.remote().is_some());
    }

    #[test]
    fn config_error_converts() {
        let err: GardenError = ConfigError::MissingToken.into();
        assert!(matches!(err, GardenError::Configuration(_)));
        assert!(err.to_string().contains("access token"));
    }
}
