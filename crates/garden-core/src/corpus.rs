//! Read-only access to the local note corpus.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{GardenError, Result};
use crate::frontmatter::{parse_frontmatter, Frontmatter};

/// Source of documents to publish.
///
/// Paths are `/`-separated and relative to the corpus root.
#[async_trait]
pub trait Corpus: Send + Sync {
    /// Every document path in the corpus, in no particular order.
    async fn list_documents(&self) -> Result<Vec<String>>;

    /// Full text of one document.
    async fn read(&self, path: &str) -> Result<String>;

    /// Frontmatter of one document.
    async fn metadata(&self, path: &str) -> Result<Frontmatter> {
        let text = self.read(path).await?;
        Ok(parse_frontmatter(&text))
    }
}

/// A directory of markdown notes. Hidden files and directories are ignored.
#[derive(Debug, Clone)]
pub struct FsCorpus {
    root: PathBuf,
}

impl FsCorpus {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(GardenError::Corpus {
                path: root.display().to_string(),
                message: "not a directory".to_string(),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a corpus path; refuses to leave the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(GardenError::Corpus {
                path: path.to_string(),
                message: "path is outside the corpus".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

fn is_note(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("md")
}

/// `/`-joined path of `path` relative to `root`.
fn corpus_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

#[async_trait]
impl Corpus for FsCorpus {
    async fn list_documents(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        let walked = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut paths = Vec::new();
            for entry in WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| !is_hidden(e))
            {
                let entry = entry.map_err(|e| GardenError::Corpus {
                    path: e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string()),
                    message: e.to_string(),
                })?;
                if !entry.file_type().is_file() || !is_note(entry.path()) {
                    continue;
                }
                match corpus_path(&root, entry.path()) {
                    Some(path) => paths.push(path),
                    None => debug!(path = %entry.path().display(), "skipping non-utf8 path"),
                }
            }
            Ok(paths)
        })
        .await
        .map_err(|e| GardenError::Corpus {
            path: self.root.display().to_string(),
            message: format!("scan task failed: {e}"),
        })??;

        debug!(root = %self.root.display(), count = walked.len(), "scanned corpus");
        Ok(walked)
    }

    async fn read(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| GardenError::Corpus {
                path: path.to_string(),
                message: e.to_string(),
            })
    }
}
