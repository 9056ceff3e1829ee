//! Error types for garden-remote

use thiserror::Error;

/// Errors returned by a [`RemoteStore`](crate::RemoteStore).
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The requested object, path or ref does not exist (HTTP 404)
    #[error("not found on remote: {what}")]
    NotFound { what: String },

    /// The remote refused a write because the supplied hash or parent is
    /// stale (HTTP 409 / 422)
    #[error("remote rejected write to {what}: {message}")]
    Conflict { what: String, message: String },

    /// Credentials were missing, invalid or lack access (HTTP 401 / 403)
    #[error("remote rejected credentials for {what} (status {status})")]
    Unauthorized { what: String, status: u16 },

    /// Any other non-success status
    #[error("remote API error {status} for {what}: {message}")]
    Api {
        what: String,
        status: u16,
        message: String,
    },

    /// Network or TLS failure before a status was received
    #[error("HTTP transport failed: {0}")]
    Transport(String),

    /// The remote answered with a body we could not interpret
    #[error("malformed remote response: {0}")]
    Malformed(String),

    /// The configured API base URL cannot address a repository
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    /// A string that is not a 40-char hex git object id
    #[error("invalid object hash: {hash}")]
    InvalidHash { hash: String },
}

impl RemoteError {
    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(status: u16, what: impl Into<String>, message: impl Into<String>) -> Self {
        let what = what.into();
        match status {
            404 => RemoteError::NotFound { what },
            409 | 422 => RemoteError::Conflict {
                what,
                message: message.into(),
            },
            401 | 403 => RemoteError::Unauthorized { what, status },
            _ => RemoteError::Api {
                what,
                status,
                message: message.into(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }

    /// Failures worth retrying for idempotent calls: transport errors,
    /// rate limiting and server-side 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Transport(_) => true,
            RemoteError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Malformed(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(RemoteError::from_status(404, "a.md", "").is_not_found());
        assert!(matches!(
            RemoteError::from_status(422, "a.md", "sha mismatch"),
            RemoteError::Conflict { .. }
        ));
        assert!(matches!(
            RemoteError::from_status(409, "a.md", ""),
            RemoteError::Conflict { .. }
        ));
        assert!(matches!(
            RemoteError::from_status(401, "repo", ""),
            RemoteError::Unauthorized { status: 401, .. }
        ));
        assert!(matches!(
            RemoteError::from_status(502, "repo", "bad gateway"),
            RemoteError::Api { status: 502, .. }
        ));
    }

    #[test]
    fn transient_classification() {
        assert!(RemoteError::Transport("reset".into()).is_transient());
        assert!(RemoteError::from_status(503, "blob", "").is_transient());
        assert!(RemoteError::from_status(429, "blob", "").is_transient());
        assert!(!RemoteError::from_status(422, "blob", "").is_transient());
        assert!(!RemoteError::from_status(401, "blob", "").is_transient());
        assert!(!RemoteError::Malformed("x".into()).is_transient());
    }

    #[test]
    fn display_names_the_target() {
        let err = RemoteError::from_status(404, "notes/a.md", "");
        assert!(err.to_string().contains("notes/a.md"));
    }
}
