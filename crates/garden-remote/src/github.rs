//! GitHub REST client
//!
//! Implements [`RemoteStore`] against `api.github.com` (or any compatible
//! endpoint such as GitHub Enterprise). Every request carries the bearer
//! token and is scoped to one owner/repository pair.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, IF_NONE_MATCH};
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::RemoteError;
use crate::hash::ObjectHash;
use crate::store::{
    DeleteFileRequest, HeadCommit, NewTreeEntry, ObjectKind, PutFileRequest, RemoteFile,
    RemoteStore, RemoteTreeEntry,
};
use crate::RemoteResult;

/// Public GitHub API endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Coordinates and credentials for one repository.
#[derive(Clone)]
pub struct GithubConfig {
    /// API base URL, without a trailing `/repos`
    pub api_base_url: String,
    pub owner: String,
    pub repository: String,
    pub token: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl GithubConfig {
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            owner: owner.into(),
            repository: repository.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("api_base_url", &self.api_base_url)
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// [`RemoteStore`] backed by the GitHub REST API.
pub struct GithubStore {
    config: GithubConfig,
    base_url: Url,
    http_client: reqwest::Client,
}

// Wire shapes. Only the fields we read are declared.

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    sha: ObjectHash,
    #[serde(rename = "type")]
    kind: ObjectKind,
}

#[derive(Deserialize)]
struct ShaResponse {
    sha: ObjectHash,
}

#[derive(Deserialize)]
struct PutResponse {
    content: ShaResponse,
}

#[derive(Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: ObjectHash,
    commit: CommitBody,
}

#[derive(Deserialize)]
struct CommitBody {
    tree: ShaResponse,
}

impl GithubStore {
    /// Create a client. Fails only if the base URL is unusable or the TLS
    /// backend cannot be initialised.
    pub fn new(config: GithubConfig) -> RemoteResult<Self> {
        let base_url = Url::parse(&config.api_base_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {e}", config.api_base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(config.api_base_url.clone()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("garden-remote/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(GithubStore {
            config,
            base_url,
            http_client,
        })
    }

    /// `owner/repository`, for log lines and notices.
    pub fn repository_name(&self) -> String {
        format!("{}/{}", self.config.owner, self.config.repository)
    }

    /// `<base>/repos/<owner>/<repo>/<segments...>` with every segment
    /// percent-encoded. Segments containing `/` are split so that file paths
    /// and branch names keep their hierarchy.
    fn repo_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        {
            // cannot_be_a_base was rejected in new(), so this is always Ok.
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty()
                    .extend([
                        "repos",
                        self.config.owner.as_str(),
                        self.config.repository.as_str(),
                    ])
                    .extend(segments.iter().copied().flat_map(|s| s.split('/')));
            }
        }
        url
    }

    /// Send with auth and turn non-success statuses into typed errors.
    async fn send(&self, request: RequestBuilder, what: &str) -> RemoteResult<Response> {
        let response = request.bearer_auth(&self.config.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), what, "remote request rejected");
        Err(RemoteError::from_status(status.as_u16(), what, message))
    }
}

#[async_trait]
impl RemoteStore for GithubStore {
    #[instrument(skip(self), fields(repo = %self.repository_name()))]
    async fn list_tree(&self, reference: &str) -> RemoteResult<Vec<RemoteTreeEntry>> {
        let url = self.repo_url(&["git", "trees", reference]);
        let request = self
            .http_client
            .get(url)
            .query(&[("recursive", "true")])
            // An empty validator never matches, so the listing is always fresh.
            .header(IF_NONE_MATCH, "");
        let body: TreeResponse = self
            .send(request, &format!("tree {reference}"))
            .await?
            .json()
            .await?;

        if body.truncated {
            warn!(
                reference,
                entries = body.tree.len(),
                "remote tree listing was truncated"
            );
        }

        Ok(body
            .tree
            .into_iter()
            .map(|item| RemoteTreeEntry {
                path: item.path,
                hash: item.sha,
                kind: item.kind,
            })
            .collect())
    }

    #[instrument(skip(self), fields(repo = %self.repository_name()))]
    async fn get_file(&self, path: &str, reference: Option<&str>) -> RemoteResult<RemoteFile> {
        let url = self.repo_url(&["contents", path]);
        let mut request = self.http_client.get(url);
        if let Some(reference) = reference {
            request = request.query(&[("ref", reference)]);
        }
        let body: serde_json::Value = self.send(request, path).await?.json().await?;

        // A directory comes back as an array; symlinks and submodules carry
        // another type. Only plain files count.
        if body.get("type").and_then(|t| t.as_str()) != Some("file") {
            return Err(RemoteError::NotFound {
                what: format!("file {path}"),
            });
        }

        let hash = body
            .get("sha")
            .and_then(|s| s.as_str())
            .ok_or_else(|| RemoteError::Malformed(format!("contents of {path} lack a sha")))?
            .parse()?;
        let content_base64 = body
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(RemoteFile {
            path: path.to_string(),
            hash,
            content_base64,
        })
    }

    #[instrument(skip(self, request), fields(repo = %self.repository_name(), path = %request.path))]
    async fn put_file(&self, request: PutFileRequest) -> RemoteResult<ObjectHash> {
        let url = self.repo_url(&["contents", &request.path]);
        let body: PutResponse = self
            .send(self.http_client.put(url).json(&request), &request.path)
            .await?
            .json()
            .await?;
        Ok(body.content.sha)
    }

    #[instrument(skip(self, request), fields(repo = %self.repository_name(), path = %request.path))]
    async fn delete_file(&self, request: DeleteFileRequest) -> RemoteResult<()> {
        let url = self.repo_url(&["contents", &request.path]);
        self.send(self.http_client.delete(url).json(&request), &request.path)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, content), fields(repo = %self.repository_name(), bytes = content.len()))]
    async fn create_blob(&self, content: &str) -> RemoteResult<ObjectHash> {
        let url = self.repo_url(&["git", "blobs"]);
        let payload = serde_json::json!({ "content": content, "encoding": "utf-8" });
        let body: ShaResponse = self
            .send(self.http_client.post(url).json(&payload), "blob")
            .await?
            .json()
            .await?;
        Ok(body.sha)
    }

    #[instrument(skip(self, entries), fields(repo = %self.repository_name(), entries = entries.len()))]
    async fn create_tree(
        &self,
        base_tree: &ObjectHash,
        entries: &[NewTreeEntry],
    ) -> RemoteResult<ObjectHash> {
        let url = self.repo_url(&["git", "trees"]);
        let payload = serde_json::json!({ "base_tree": base_tree, "tree": entries });
        let body: ShaResponse = self
            .send(self.http_client.post(url).json(&payload), "tree")
            .await?
            .json()
            .await?;
        Ok(body.sha)
    }

    #[instrument(skip(self, message), fields(repo = %self.repository_name()))]
    async fn create_commit(
        &self,
        message: &str,
        tree: &ObjectHash,
        parents: &[ObjectHash],
    ) -> RemoteResult<ObjectHash> {
        let url = self.repo_url(&["git", "commits"]);
        let payload = serde_json::json!({ "message": message, "tree": tree, "parents": parents });
        let body: ShaResponse = self
            .send(self.http_client.post(url).json(&payload), "commit")
            .await?
            .json()
            .await?;
        Ok(body.sha)
    }

    #[instrument(skip(self), fields(repo = %self.repository_name()))]
    async fn default_branch(&self) -> RemoteResult<String> {
        let url = self.repo_url(&[]);
        let what = self.repository_name();
        let body: RepoResponse = self
            .send(self.http_client.get(url), &what)
            .await?
            .json()
            .await?;
        Ok(body.default_branch)
    }

    #[instrument(skip(self), fields(repo = %self.repository_name()))]
    async fn latest_commit(&self, reference: &str) -> RemoteResult<HeadCommit> {
        let url = self.repo_url(&["commits", reference]);
        let request = self
            .http_client
            .get(url)
            .header(IF_NONE_MATCH, "")
            .header(CACHE_CONTROL, "no-cache");
        let body: CommitResponse = self
            .send(request, &format!("commit {reference}"))
            .await?
            .json()
            .await?;
        Ok(HeadCommit {
            commit: body.sha,
            tree: body.commit.tree.sha,
        })
    }

    #[instrument(skip(self), fields(repo = %self.repository_name()))]
    async fn update_ref(&self, branch: &str, commit: &ObjectHash) -> RemoteResult<()> {
        let url = self.repo_url(&["git", "refs", "heads", branch]);
        let payload = serde_json::json!({ "sha": commit });
        self.send(
            self.http_client.patch(url).json(&payload),
            &format!("refs/heads/{branch}"),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base: &str) -> GithubStore {
        GithubStore::new(GithubConfig::new("alice", "garden", "t0k3n").with_api_base_url(base))
            .unwrap()
    }

    #[test]
    fn repo_url_splits_and_encodes_paths() {
        let s = store("https://api.github.com");
        let url = s.repo_url(&["contents", "notes/My Note #1.md"]);
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/alice/garden/contents/notes/My%20Note%20%231.md"
        );
    }

    #[test]
    fn repo_url_keeps_enterprise_prefix() {
        let s = store("https://ghe.example.com/api/v3/");
        let url = s.repo_url(&["git", "refs", "heads", "main"]);
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/alice/garden/git/refs/heads/main"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        let err = GithubStore::new(GithubConfig::new("a", "b", "c").with_api_base_url("not a url"))
            .err()
            .unwrap();
        assert!(matches!(err, RemoteError::InvalidUrl(_)));
    }

    #[test]
    fn debug_redacts_token() {
        let config = GithubConfig::new("alice", "garden", "super-secret");
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
