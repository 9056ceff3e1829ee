//! In-memory fake of the remote store (testing only)
//!
//! `MemoryRemoteStore` models just enough of git to exercise the publish
//! paths end to end: content-addressed blobs, flat path→blob trees, commits
//! with parents, and branch refs that only fast-forward. It also counts
//! calls per operation and can be told to fail specific operations.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::RemoteError;
use crate::hash::ObjectHash;
use crate::store::*;
use crate::RemoteResult;

/// Operations of [`RemoteStore`], for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    ListTree,
    GetFile,
    PutFile,
    DeleteFile,
    CreateBlob,
    CreateTree,
    CreateCommit,
    DefaultBranch,
    LatestCommit,
    UpdateRef,
}

type FlatTree = BTreeMap<String, ObjectHash>;

#[derive(Debug, Clone)]
struct CommitObject {
    tree: ObjectHash,
    parents: Vec<ObjectHash>,
    message: String,
}

#[derive(Debug, Default)]
struct State {
    blobs: HashMap<ObjectHash, Vec<u8>>,
    trees: HashMap<ObjectHash, FlatTree>,
    commits: HashMap<ObjectHash, CommitObject>,
    refs: BTreeMap<String, ObjectHash>,
    default_branch: String,
    calls: HashMap<RemoteOp, usize>,
    failing: HashSet<RemoteOp>,
    failing_blob_markers: Vec<String>,
    transient_blob_failures: usize,
    blob_delay: Option<Duration>,
    blobs_in_flight: usize,
    max_blobs_in_flight: usize,
}

impl State {
    /// Count the call and apply injected failures.
    fn enter(&mut self, op: RemoteOp) -> RemoteResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.failing.contains(&op) {
            return Err(RemoteError::Api {
                what: format!("{op:?}"),
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn store_tree(&mut self, tree: FlatTree) -> ObjectHash {
        let mut body = String::new();
        for (path, hash) in &tree {
            body.push_str(&format!("{BLOB_MODE} blob {hash}\t{path}\n"));
        }
        let hash = ObjectHash::for_object(ObjectKind::Tree, body.as_bytes());
        self.trees.insert(hash.clone(), tree);
        hash
    }

    fn store_commit(
        &mut self,
        message: &str,
        tree: ObjectHash,
        parents: Vec<ObjectHash>,
    ) -> ObjectHash {
        let mut body = format!("tree {tree}\n");
        for parent in &parents {
            body.push_str(&format!("parent {parent}\n"));
        }
        body.push('\n');
        body.push_str(message);
        let hash = ObjectHash::for_object(ObjectKind::Commit, body.as_bytes());
        self.commits.insert(
            hash.clone(),
            CommitObject {
                tree,
                parents,
                message: message.to_string(),
            },
        );
        hash
    }

    /// Resolve `HEAD`, a branch name or a commit hash to a commit.
    fn resolve(&self, reference: &str) -> RemoteResult<ObjectHash> {
        if reference == "HEAD" {
            return self.branch_head(&self.default_branch);
        }
        if let Some(commit) = self.refs.get(reference) {
            return Ok(commit.clone());
        }
        match reference.parse::<ObjectHash>() {
            Ok(hash) if self.commits.contains_key(&hash) => Ok(hash),
            _ => Err(RemoteError::NotFound {
                what: format!("ref {reference}"),
            }),
        }
    }

    fn branch_head(&self, branch: &str) -> RemoteResult<ObjectHash> {
        self.refs
            .get(branch)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound {
                what: format!("refs/heads/{branch}"),
            })
    }

    fn tree_of(&self, commit: &ObjectHash) -> FlatTree {
        self.commits
            .get(commit)
            .and_then(|c| self.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default()
    }

    fn descends_from(&self, commit: &ObjectHash, ancestor: &ObjectHash) -> bool {
        let mut pending = vec![commit.clone()];
        let mut seen = HashSet::new();
        while let Some(next) = pending.pop() {
            if &next == ancestor {
                return true;
            }
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(c) = self.commits.get(&next) {
                pending.extend(c.parents.iter().cloned());
            }
        }
        false
    }

    /// Commit `tree` on top of `branch` and move the branch (contents API).
    fn commit_on_branch(&mut self, branch: &str, message: &str, tree: FlatTree) -> RemoteResult<()> {
        let parent = self.branch_head(branch)?;
        let tree_hash = self.store_tree(tree);
        let commit = self.store_commit(message, tree_hash, vec![parent]);
        self.refs.insert(branch.to_string(), commit);
        Ok(())
    }
}

/// In-memory remote repository with a single initial (empty) commit on
/// `main`.
#[derive(Debug)]
pub struct MemoryRemoteStore {
    state: Mutex<State>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::with_default_branch("main")
    }

    pub fn with_default_branch(branch: &str) -> Self {
        let mut state = State {
            default_branch: branch.to_string(),
            ..State::default()
        };
        let empty = state.store_tree(FlatTree::new());
        let root = state.store_commit("Initial commit", empty, Vec::new());
        state.refs.insert(branch.to_string(), root);
        Self {
            state: Mutex::new(state),
        }
    }

    /// Commit a file directly onto the default branch, bypassing counters
    /// and failure injection. Returns the blob hash.
    pub fn seed_file(&self, path: &str, content: &str) -> ObjectHash {
        let mut state = self.state.lock().unwrap();
        let hash = ObjectHash::for_blob(content.as_bytes());
        state.blobs.insert(hash.clone(), content.as_bytes().to_vec());
        let branch = state.default_branch.clone();
        let head = state.refs[&branch].clone();
        let mut tree = state.tree_of(&head);
        tree.insert(path.to_string(), hash.clone());
        state
            .commit_on_branch(&branch, &format!("Seed {path}"), tree)
            .unwrap();
        hash
    }

    /// Current commit of the default branch.
    pub fn head(&self) -> ObjectHash {
        let state = self.state.lock().unwrap();
        state.refs[&state.default_branch].clone()
    }

    /// Text of `path` at the head of the default branch.
    pub fn file_content(&self, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        let head = state.refs[&state.default_branch].clone();
        let hash = state.tree_of(&head).get(path).cloned()?;
        state
            .blobs
            .get(&hash)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Parents of `commit`, if it exists.
    pub fn parents_of(&self, commit: &ObjectHash) -> Option<Vec<ObjectHash>> {
        let state = self.state.lock().unwrap();
        state.commits.get(commit).map(|c| c.parents.clone())
    }

    /// Message of `commit`, if it exists.
    pub fn message_of(&self, commit: &ObjectHash) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.commits.get(commit).map(|c| c.message.clone())
    }

    /// Whether a blob with this hash has been stored (reachable or not).
    pub fn has_blob(&self, hash: &ObjectHash) -> bool {
        self.state.lock().unwrap().blobs.contains_key(hash)
    }

    /// Number of commit objects, including the initial one.
    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commits.len()
    }

    pub fn call_count(&self, op: RemoteOp) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.get(&op).copied().unwrap_or(0)
    }

    /// Make every subsequent `op` fail with a 500.
    pub fn fail(&self, op: RemoteOp) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub fn recover(&self, op: RemoteOp) {
        self.state.lock().unwrap().failing.remove(&op);
    }

    /// Reject `create_blob` (non-transient 422) for any content containing `marker`.
    pub fn fail_blobs_containing(&self, marker: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_blob_markers
            .push(marker.to_string());
    }

    /// Fail the next `count` `create_blob` calls with a transient 502.
    pub fn fail_next_blobs(&self, count: usize) {
        self.state.lock().unwrap().transient_blob_failures = count;
    }

    /// Hold each `create_blob` call open for `delay` so overlap is observable.
    pub fn set_blob_delay(&self, delay: Duration) {
        self.state.lock().unwrap().blob_delay = Some(delay);
    }

    /// Highest number of `create_blob` calls observed in flight at once.
    pub fn max_concurrent_blobs(&self) -> usize {
        self.state.lock().unwrap().max_blobs_in_flight
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn list_tree(&self, reference: &str) -> RemoteResult<Vec<RemoteTreeEntry>> {
        let mut state = self.state.lock().unwrap();
        state.enter(RemoteOp::ListTree)?;
        let commit = state.resolve(reference)?;
        let tree = state.tree_of(&commit);

        // Recursive listings also report every directory as a tree entry.
        let mut dirs = BTreeSet::new();
        for path in tree.keys() {
            let mut prefix = path.as_str();
            while let Some((parent, _)) = prefix.rsplit_once('/') {
                dirs.insert(parent.to_string());
                prefix = parent;
            }
        }

        let mut entries: Vec<RemoteTreeEntry> = tree
            .iter()
            .map(|(path, hash)| RemoteTreeEntry {
                path: path.clone(),
                hash: hash.clone(),
                kind: ObjectKind::Blob,
            })
            .chain(dirs.into_iter().map(|dir| RemoteTreeEntry {
                hash: ObjectHash::for_object(ObjectKind::Tree, dir.as_bytes()),
                path: dir,
                kind: ObjectKind::Tree,
            }))
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn get_file(&self, path: &str, reference: Option<&str>) -> RemoteResult<RemoteFile> {
        let mut state = self.state.lock().unwrap();
        state.enter(RemoteOp::GetFile)?;
        let commit = state.resolve(reference.unwrap_or("HEAD"))?;
        let not_found = || RemoteError::NotFound {
            what: format!("file {path}"),
        };
        let hash = state.tree_of(&commit).get(path).cloned().ok_or_else(not_found)?;
        let bytes = state.blobs.get(&hash).ok_or_else(not_found)?;
        Ok(RemoteFile {
            path: path.to_string(),
            content_base64: BASE64.encode(bytes),
            hash,
        })
    }

    async fn put_file(&self, request: PutFileRequest) -> RemoteResult<ObjectHash> {
        let mut state = self.state.lock().unwrap();
        state.enter(RemoteOp::PutFile)?;
        let branch = request
            .branch
            .clone()
            .unwrap_or_else(|| state.default_branch.clone());
        let head = state.branch_head(&branch)?;
        let mut tree = state.tree_of(&head);

        if tree.get(&request.path) != request.expected_hash.as_ref() {
            return Err(RemoteError::Conflict {
                what: request.path.clone(),
                message: "sha does not match current content".to_string(),
            });
        }

        let bytes = BASE64
            .decode(request.content_base64.as_bytes())
            .map_err(|e| RemoteError::Api {
                what: request.path.clone(),
                status: 400,
                message: format!("content is not valid base64: {e}"),
            })?;
        let hash = ObjectHash::for_blob(&bytes);
        state.blobs.insert(hash.clone(), bytes);
        tree.insert(request.path.clone(), hash.clone());
        state.commit_on_branch(&branch, &request.message, tree)?;
        Ok(hash)
    }

    async fn delete_file(&self, request: DeleteFileRequest) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        state.enter(RemoteOp::DeleteFile)?;
        let branch = request
            .branch
            .clone()
            .unwrap_or_else(|| state.default_branch.clone());
        let head = state.branch_head(&branch)?;
        let mut tree = state.tree_of(&head);

        match tree.get(&request.path) {
            None => {
                return Err(RemoteError::NotFound {
                    what: format!("file {}", request.path),
                })
            }
            Some(current) if current != &request.expected_hash => {
                return Err(RemoteError::Conflict {
                    what: request.path.clone(),
                    message: "sha does not match current content".to_string(),
                })
            }
            Some(_) => {}
        }

        tree.remove(&request.path);
        state.commit_on_branch(&branch, &request.message, tree)
    }

    async fn create_blob(&self, content: &str) -> RemoteResult<ObjectHash> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.enter(RemoteOp::CreateBlob)?;
            state.blobs_in_flight += 1;
            state.max_blobs_in_flight = state.max_blobs_in_flight.max(state.blobs_in_flight);
            state.blob_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.blobs_in_flight -= 1;

        if state.transient_blob_failures > 0 {
            state.transient_blob_failures -= 1;
            return Err(RemoteError::Api {
                what: "blob".to_string(),
                status: 502,
                message: "transient failure".to_string(),
            });
        }
        if state
            .failing_blob_markers
            .iter()
            .any(|marker| content.contains(marker.as_str()))
        {
            return Err(RemoteError::Api {
                what: "blob".to_string(),
                status: 422,
                message: "content rejected".to_string(),
            });
        }

        let hash = ObjectHash::for_blob(content.as_bytes());
        state.blobs.insert(hash.clone(), content.as_bytes().to_vec());
        Ok(hash)
    }

    async fn create_tree(
        &self,
        base_tree: &ObjectHash,
        entries: &[NewTreeEntry],
    ) -> RemoteResult<ObjectHash> {
        let mut state = self.state.lock().unwrap();
        state.enter(RemoteOp::CreateTree)?;
        let mut tree = state
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound {
                what: format!("tree {base_tree}"),
            })?;
        for entry in entries {
            if entry.kind != ObjectKind::Blob || !state.blobs.contains_key(&entry.hash) {
                return Err(RemoteError::Conflict {
                    what: entry.path.clone(),
                    message: format!("{} {} is not a known blob", entry.kind, entry.hash),
                });
            }
            tree.insert(entry.path.clone(), entry.hash.clone());
        }
        Ok(state.store_tree(tree))
    }

    async fn create_commit(
        &self,
        message: &str,
        tree: &ObjectHash,
        parents: &[ObjectHash],
    ) -> RemoteResult<ObjectHash> {
        let mut state = self.state.lock().unwrap();
        state.enter(RemoteOp::CreateCommit)?;
        if !state.trees.contains_key(tree) {
            return Err(RemoteError::Conflict {
                what: format!("tree {tree}"),
                message: "unknown tree".to_string(),
            });
        }
        if let Some(missing) = parents.iter().find(|p| !state.commits.contains_key(*p)) {
            return Err(RemoteError::Conflict {
                what: format!("commit {missing}"),
                message: "unknown parent".to_string(),
            });
        }
        Ok(state.store_commit(message, tree.clone(), parents.to_vec()))
    }

    async fn default_branch(&self) -> RemoteResult<String> {
        let mut state = self.state.lock().unwrap();
        state.enter(RemoteOp::DefaultBranch)?;
        Ok(state.default_branch.clone())
    }

    async fn latest_commit(&self, reference: &str) -> RemoteResult<HeadCommit> {
        let mut state = self.state.lock().unwrap();
        state.enter(RemoteOp::LatestCommit)?;
        let commit = state.resolve(reference)?;
        let tree = state.commits[&commit].tree.clone();
        Ok(HeadCommit { commit, tree })
    }

    async fn update_ref(&self, branch: &str, commit: &ObjectHash) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        state.enter(RemoteOp::UpdateRef)?;
        let current = state.branch_head(branch)?;
        if !state.commits.contains_key(commit) {
            return Err(RemoteError::Conflict {
                what: format!("refs/heads/{branch}"),
                message: format!("unknown commit {commit}"),
            });
        }
        if !state.descends_from(commit, &current) {
            return Err(RemoteError::Conflict {
                what: format!("refs/heads/{branch}"),
                message: "update is not a fast forward".to_string(),
            });
        }
        state.refs.insert(branch.to_string(), commit.clone());
        Ok(())
    }
}
