//! In-memory corpus (testing only)

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::corpus::Corpus;
use crate::error::{GardenError, Result};

/// Corpus backed by a map, with per-path read counters and read failures.
#[derive(Debug, Default)]
pub struct MemoryCorpus {
    docs: Mutex<BTreeMap<String, String>>,
    reads: Mutex<HashMap<String, usize>>,
    unreadable: Mutex<HashSet<String>>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_docs<I, P, C>(docs: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let corpus = Self::new();
        for (path, content) in docs {
            corpus.insert(path, content);
        }
        corpus
    }

    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.docs
            .lock()
            .unwrap()
            .insert(path.into(), content.into());
    }

    pub fn remove(&self, path: &str) {
        self.docs.lock().unwrap().remove(path);
    }

    /// Make `read` of `path` fail from now on.
    pub fn make_unreadable(&self, path: &str) {
        self.unreadable.lock().unwrap().insert(path.to_string());
    }

    pub fn read_count(&self, path: &str) -> usize {
        self.reads.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Corpus for MemoryCorpus {
    async fn list_documents(&self) -> Result<Vec<String>> {
        Ok(self.docs.lock().unwrap().keys().cloned().collect())
    }

    async fn read(&self, path: &str) -> Result<String> {
        *self
            .reads
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default() += 1;

        if self.unreadable.lock().unwrap().contains(path) {
            return Err(GardenError::Corpus {
                path: path.to_string(),
                message: "injected read failure".to_string(),
            });
        }
        self.docs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| GardenError::Corpus {
                path: path.to_string(),
                message: "no such document".to_string(),
            })
    }
}
