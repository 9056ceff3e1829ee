//! A publishable note and its lazily read content.

use std::sync::Arc;

use garden_remote::{blob_hash, ObjectHash};
use tokio::sync::OnceCell;

use crate::config::GardenConfig;
use crate::corpus::Corpus;
use crate::error::Result;
use crate::fakes::MemoryCorpus;
use crate::frontmatter::Frontmatter;

/// One document of the corpus.
///
/// Content is read at most once, on first use, and shared between clones.
/// The remote hash is filled in by reconciliation once a matching remote
/// object is known.
#[derive(Clone)]
pub struct LocalDocument {
    path: String,
    corpus: Arc<dyn Corpus>,
    content: Arc<OnceCell<String>>,
    remote_hash: Option<ObjectHash>,
}

impl LocalDocument {
    pub fn new(path: impl Into<String>, corpus: Arc<dyn Corpus>) -> Self {
        Self {
            path: path.into(),
            corpus,
            content: Arc::new(OnceCell::new()),
            remote_hash: None,
        }
    }

    /// A standalone document with known text.
    pub fn from_text(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = path.into();
        let text = text.into();
        let corpus = MemoryCorpus::from_docs([(path.clone(), text.clone())]);
        Self {
            path,
            corpus: Arc::new(corpus),
            content: Arc::new(OnceCell::new_with(Some(text))),
            remote_hash: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn content(&self) -> Result<&str> {
        let text = self
            .content
            .get_or_try_init(|| async { self.corpus.read(&self.path).await })
            .await?;
        Ok(text.as_str())
    }

    pub async fn frontmatter(&self) -> Result<Frontmatter> {
        self.corpus.metadata(&self.path).await
    }

    /// Blob hash of the current content.
    pub async fn local_hash(&self) -> Result<ObjectHash> {
        Ok(blob_hash(self.content().await?.as_bytes()))
    }

    pub fn remote_hash(&self) -> Option<&ObjectHash> {
        self.remote_hash.as_ref()
    }

    pub fn set_remote_hash(&mut self, hash: ObjectHash) {
        self.remote_hash = Some(hash);
    }

    pub fn with_remote_hash(mut self, hash: ObjectHash) -> Self {
        self.remote_hash = Some(hash);
        self
    }
}

impl PartialEq for LocalDocument {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.remote_hash == other.remote_hash
    }
}

impl Eq for LocalDocument {}

impl std::fmt::Debug for LocalDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDocument")
            .field("path", &self.path)
            .field("remote_hash", &self.remote_hash)
            .field("loaded", &self.content.initialized())
            .finish()
    }
}

/// Every publishable document of `corpus`, sorted by path.
pub async fn collect_publishable(
    corpus: Arc<dyn Corpus>,
    config: &GardenConfig,
) -> Result<Vec<LocalDocument>> {
    let mut paths: Vec<String> = corpus
        .list_documents()
        .await?
        .into_iter()
        .filter(|path| config.is_publishable(path))
        .collect();
    paths.sort();
    paths.dedup();

    Ok(paths
        .into_iter()
        .map(|path| LocalDocument::new(path, corpus.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn content_is_read_once() {
        let corpus = Arc::new(MemoryCorpus::from_docs([("Garden/a.md", "hello world\n")]));
        let doc = LocalDocument::new("Garden/a.md", corpus.clone());
        let copy = doc.clone();

        assert_eq!(doc.content().await.unwrap(), "hello world\n");
        assert_eq!(
            copy.local_hash().await.unwrap().as_str(),
            "3b18e512dba79e4c8300dd08aeb37f8e728b8dad"
        );
        assert_eq!(corpus.read_count("Garden/a.md"), 1);
    }

    #[tokio::test]
    async fn read_failure_propagates() {
        let corpus = Arc::new(MemoryCorpus::new());
        let doc = LocalDocument::new("Garden/missing.md", corpus);
        assert!(doc.content().await.is_err());
    }

    #[tokio::test]
    async fn collects_only_publish_folder_sorted() {
        let corpus: Arc<dyn Corpus> = Arc::new(MemoryCorpus::from_docs([
            ("Garden/z.md", "z"),
            ("Private/p.md", "p"),
            ("Garden/a.md", "a"),
        ]));
        let config = GardenConfig::new("o", "r", "t").with_publish_folder("Garden/");
        let docs = collect_publishable(corpus, &config).await.unwrap();
        let paths: Vec<&str> = docs.iter().map(|d| d.path()).collect();
        assert_eq!(paths, vec!["Garden/a.md", "Garden/z.md"]);
    }

    #[tokio::test]
    async fn frontmatter_comes_from_corpus() {
        let doc = LocalDocument::from_text("a.md", "---\ndg-home: true\n---\n");
        let fm = doc.frontmatter().await.unwrap();
        assert_eq!(fm["dg-home"], serde_json::json!(true));
        assert!(doc.remote_hash().is_none());
    }
}
