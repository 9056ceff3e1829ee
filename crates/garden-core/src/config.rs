//! Garden settings.
//!
//! A [`GardenConfig`] is built once (from the environment or a settings file),
//! validated, and then passed by reference into every operation. Nothing
//! mutates it afterwards.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use garden_remote::{GithubConfig, GithubStore, DEFAULT_API_URL};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, GardenError, Result};

/// Largest accepted `blob_retry_attempts`.
pub const MAX_BLOB_RETRY_ATTEMPTS: u32 = 10;

/// A corpus path relative to the note root: one leading `/` removed.
pub fn relative_note_path(corpus_path: &str) -> &str {
    corpus_path.strip_prefix('/').unwrap_or(corpus_path)
}

/// What a batch publish does when some blobs cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlobFailurePolicy {
    /// Abort before building the tree; the branch is untouched.
    #[default]
    AllOrNothing,
    /// Commit whatever uploaded and report the rest as skipped.
    BestEffort,
}

impl FromStr for BlobFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all-or-nothing" => Ok(BlobFailurePolicy::AllOrNothing),
            "best-effort" => Ok(BlobFailurePolicy::BestEffort),
            other => Err(ConfigError::InvalidValue {
                key: "blob_failure_policy".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Settings for one garden.
///
/// Field aliases accept the host plugin's `data.json` names so an existing
/// settings file can be pointed at directly.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GardenConfig {
    #[serde(alias = "githubUserName")]
    pub owner: String,
    #[serde(alias = "githubRepo")]
    pub repository: String,
    #[serde(alias = "githubToken")]
    pub token: String,
    /// Prefix mapping corpus paths into the repository (e.g. `src/site/notes/`)
    #[serde(alias = "notePathBase")]
    pub note_path_base: String,
    /// Only corpus paths starting with this prefix are publishable
    #[serde(alias = "publishFolderPath")]
    pub publish_folder_path: String,
    pub api_base_url: String,
    /// Upper bound on concurrent blob uploads during a batch
    pub max_concurrent_uploads: usize,
    /// Extra attempts for a blob upload that failed transiently
    pub blob_retry_attempts: u32,
    pub blob_failure_policy: BlobFailurePolicy,
    pub request_timeout_secs: u64,
}

impl Default for GardenConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repository: String::new(),
            token: String::new(),
            note_path_base: String::new(),
            publish_folder_path: String::new(),
            api_base_url: DEFAULT_API_URL.to_string(),
            max_concurrent_uploads: 8,
            blob_retry_attempts: 2,
            blob_failure_policy: BlobFailurePolicy::AllOrNothing,
            request_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for GardenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GardenConfig")
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .field("note_path_base", &self.note_path_base)
            .field("publish_folder_path", &self.publish_folder_path)
            .field("api_base_url", &self.api_base_url)
            .field("max_concurrent_uploads", &self.max_concurrent_uploads)
            .field("blob_retry_attempts", &self.blob_retry_attempts)
            .field("blob_failure_policy", &self.blob_failure_policy)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl GardenConfig {
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repository: repository.into(),
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn with_note_path_base(mut self, base: impl Into<String>) -> Self {
        self.note_path_base = base.into();
        self
    }

    pub fn with_publish_folder(mut self, folder: impl Into<String>) -> Self {
        self.publish_folder_path = folder.into();
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_max_concurrent_uploads(mut self, bound: usize) -> Self {
        self.max_concurrent_uploads = bound;
        self
    }

    pub fn with_blob_retry_attempts(mut self, attempts: u32) -> Self {
        self.blob_retry_attempts = attempts;
        self
    }

    pub fn with_blob_failure_policy(mut self, policy: BlobFailurePolicy) -> Self {
        self.blob_failure_policy = policy;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - GARDEN_OWNER, GARDEN_REPOSITORY, GARDEN_TOKEN
    /// - GARDEN_NOTE_PATH_BASE (optional, default: "")
    /// - GARDEN_PUBLISH_FOLDER (optional, default: "")
    /// - GARDEN_API_URL (optional, default: https://api.github.com)
    /// - GARDEN_MAX_UPLOADS (optional, default: 8)
    /// - GARDEN_BLOB_FAILURE_POLICY (optional, `all-or-nothing` | `best-effort`)
    ///
    /// Missing required values are reported by [`validate`](Self::validate),
    /// not here.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let text = |key: &str| lookup(key).unwrap_or_default();

        config.owner = text("GARDEN_OWNER");
        config.repository = text("GARDEN_REPOSITORY");
        config.token = text("GARDEN_TOKEN");
        config.note_path_base = text("GARDEN_NOTE_PATH_BASE");
        config.publish_folder_path = text("GARDEN_PUBLISH_FOLDER");
        if let Some(url) = lookup("GARDEN_API_URL") {
            config.api_base_url = url;
        }
        if let Some(raw) = lookup("GARDEN_MAX_UPLOADS") {
            config.max_concurrent_uploads =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "GARDEN_MAX_UPLOADS".to_string(),
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = lookup("GARDEN_BLOB_FAILURE_POLICY") {
            config.blob_failure_policy = raw.trim().parse()?;
        }
        Ok(config)
    }

    /// Load a JSON settings file. Unknown keys are ignored.
    pub fn from_file(path: &Path) -> std::result::Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check the fields every remote operation needs.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.repository.trim().is_empty() {
            return Err(ConfigError::MissingRepository);
        }
        if self.owner.trim().is_empty() {
            return Err(ConfigError::MissingOwner);
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.max_concurrent_uploads == 0 {
            return Err(ConfigError::ZeroUploadBound);
        }
        if self.blob_retry_attempts > MAX_BLOB_RETRY_ATTEMPTS {
            return Err(ConfigError::TooManyRetries {
                attempts: self.blob_retry_attempts,
                max: MAX_BLOB_RETRY_ATTEMPTS,
            });
        }
        Ok(())
    }

    /// Eligibility is decided by the path prefix alone.
    pub fn is_publishable(&self, corpus_path: &str) -> bool {
        corpus_path.starts_with(&self.publish_folder_path)
    }

    /// Repository path for a corpus path: leading `/` stripped, then the
    /// note path base prepended.
    pub fn remote_path(&self, corpus_path: &str) -> String {
        format!("{}{}", self.note_path_base, relative_note_path(corpus_path))
    }

    pub fn repository_name(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }

    pub fn github_config(&self) -> GithubConfig {
        GithubConfig::new(&self.owner, &self.repository, &self.token)
            .with_api_base_url(&self.api_base_url)
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    /// Validate and open an HTTP connection to the configured repository.
    pub fn connect(&self) -> Result<GithubStore> {
        self.validate()?;
        GithubStore::new(self.github_config()).map_err(|source| GardenError::Fetch {
            what: self.repository_name(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = GardenConfig::default();
        assert_eq!(config.api_base_url, "https://api.github.com");
        assert_eq!(config.max_concurrent_uploads, 8);
        assert_eq!(config.blob_failure_policy, BlobFailurePolicy::AllOrNothing);
    }

    #[test]
    fn validate_reports_first_missing_field() {
        assert!(matches!(
            GardenConfig::default().validate(),
            Err(ConfigError::MissingRepository)
        ));
        assert!(matches!(
            GardenConfig::new("", "garden", "t").validate(),
            Err(ConfigError::MissingOwner)
        ));
        assert!(matches!(
            GardenConfig::new("alice", "garden", "  ").validate(),
            Err(ConfigError::MissingToken)
        ));
        assert!(matches!(
            GardenConfig::new("alice", "garden", "t")
                .with_max_concurrent_uploads(0)
                .validate(),
            Err(ConfigError::ZeroUploadBound)
        ));
        assert!(GardenConfig::new("alice", "garden", "t").validate().is_ok());
    }

    #[test]
    fn retry_attempts_are_capped() {
        let config = GardenConfig::new("alice", "garden", "t");
        assert!(config
            .clone()
            .with_blob_retry_attempts(MAX_BLOB_RETRY_ATTEMPTS)
            .validate()
            .is_ok());
        assert!(matches!(
            config.with_blob_retry_attempts(u32::MAX).validate(),
            Err(ConfigError::TooManyRetries {
                attempts: u32::MAX,
                max: MAX_BLOB_RETRY_ATTEMPTS
            })
        ));
    }

    #[test]
    fn single_leading_slash_is_stripped() {
        let config = GardenConfig::new("alice", "garden", "t").with_note_path_base("notes/");
        assert_eq!(relative_note_path("/a.md"), "a.md");
        assert_eq!(relative_note_path("//a.md"), "/a.md");
        assert_eq!(config.remote_path("//a.md"), "notes//a.md");
    }

    #[test]
    fn from_lookup_reads_variables() {
        let config = GardenConfig::from_lookup(env(&[
            ("GARDEN_OWNER", "alice"),
            ("GARDEN_REPOSITORY", "garden"),
            ("GARDEN_TOKEN", "t"),
            ("GARDEN_NOTE_PATH_BASE", "src/site/notes/"),
            ("GARDEN_PUBLISH_FOLDER", "public/"),
            ("GARDEN_MAX_UPLOADS", "3"),
            ("GARDEN_BLOB_FAILURE_POLICY", "best-effort"),
        ]))
        .unwrap();
        assert_eq!(config.repository_name(), "alice/garden");
        assert_eq!(config.note_path_base, "src/site/notes/");
        assert_eq!(config.max_concurrent_uploads, 3);
        assert_eq!(config.blob_failure_policy, BlobFailurePolicy::BestEffort);
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
    }

    #[test]
    fn from_lookup_rejects_bad_numbers() {
        let err = GardenConfig::from_lookup(env(&[("GARDEN_MAX_UPLOADS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn plugin_settings_file_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(
            &path,
            r#"{
                "githubToken": "t",
                "githubRepo": "garden",
                "githubUserName": "alice",
                "gardenBaseUrl": "https://example.com",
                "notePathBase": "src/site/notes/",
                "publishFolderPath": "Garden/",
                "logLevel": null
            }"#,
        )
        .unwrap();

        let config = GardenConfig::from_file(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.publish_folder_path, "Garden/");
        assert_eq!(config.max_concurrent_uploads, 8);
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let err = GardenConfig::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn path_mapping() {
        let config = GardenConfig::new("a", "b", "c")
            .with_note_path_base("src/site/notes/")
            .with_publish_folder("Garden/");
        assert!(config.is_publishable("Garden/a.md"));
        assert!(!config.is_publishable("Private/a.md"));
        assert_eq!(config.remote_path("Garden/a.md"), "src/site/notes/Garden/a.md");
        assert_eq!(config.remote_path("/Garden/a.md"), "src/site/notes/Garden/a.md");
    }

    #[test]
    fn debug_hides_token() {
        let config = GardenConfig::new("a", "b", "ghp_secret");
        assert!(!format!("{config:?}").contains("ghp_secret"));
    }

    #[test]
    fn connect_validates_first() {
        let err = GardenConfig::default().connect().err().unwrap();
        assert!(matches!(err, GardenError::Configuration(_)));
    }
}
