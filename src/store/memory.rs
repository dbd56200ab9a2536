//! store::memory
//!
//! In-memory object store for deterministic testing.
//!
//! # Design
//!
//! `MemoryStore` keeps commits, trees and refs in memory behind an
//! `Arc<Mutex<..>>`, so clones share state: a test can hold one clone as "the
//! other writer" while the engine works on another. Failure scenarios are
//! configured with [`FailOn`], and every mutating call is recorded as a
//! [`StoreOperation`] for later assertions.
//!
//! Like a real object database, [`ObjectStore::write_commit`] hashes the
//! encoded bytes itself and returns that id, whatever the node's `id` says.
//!
//! # Example
//!
//! ```
//! use reweave::core::types::{BranchName, RefName};
//! use reweave::store::{CasOutcome, MemoryStore, ObjectStore};
//!
//! let store = MemoryStore::new();
//! let main = BranchName::new("main").unwrap();
//! let a = store.add_commit(&[], "A\n");
//! let b = store.add_commit(&[a.clone()], "B\n");
//! store.set_branch(&main, &b);
//!
//! assert_eq!(store.resolve_branch_tip(&main).unwrap(), Some(b.clone()));
//! let outcome = store
//!     .compare_and_swap_ref(&RefName::for_branch(&main), Some(&a), &a, "test")
//!     .unwrap();
//! assert_eq!(outcome, CasOutcome::Mismatch { current: Some(b) });
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration};

use crate::core::commit::{CommitNode, HashAlgorithm, Signature};
use crate::core::types::{BranchName, Oid, RefName};

use super::traits::{CasOutcome, ObjectStore, StoreError};

/// Id of the empty tree in SHA-1 repositories.
pub const EMPTY_TREE_SHA1: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Timestamp used by [`MemoryStore::add_commit`] for the first commit.
const BASE_TIME: i64 = 1_700_000_000;

/// In-memory store. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug)]
struct MemoryStoreInner {
    algorithm: HashAlgorithm,
    commits: HashMap<Oid, CommitNode>,
    trees: HashSet<Oid>,
    refs: BTreeMap<RefName, Oid>,
    shallow: HashSet<Oid>,
    fail_on: Vec<FailOn>,
    writes: usize,
    operations: Vec<StoreOperation>,
}

/// Failure scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOn {
    /// Fail every `write_commit` after `after` successful writes.
    WriteCommit {
        /// Successful writes before failing
        after: usize,
    },
    /// Report a CAS mismatch (with the ref's real value) for the next `times` swaps.
    Cas {
        /// Remaining forced mismatches
        times: usize,
    },
    /// Move `refname` to `to` just before the next CAS on it, as a concurrent writer would.
    RaceCas {
        /// Ref the other writer moves
        refname: RefName,
        /// Where it moves it
        to: Oid,
    },
    /// Fail reads of this commit with an I/O error.
    ReadCommit(Oid),
}

/// Recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    /// A commit object was written.
    WriteCommit {
        /// The id assigned
        id: Oid,
    },
    /// A CAS was attempted.
    Cas {
        /// The ref
        refname: RefName,
        /// Expected value
        expected: Option<Oid>,
        /// Requested value
        new: Oid,
        /// Whether it took effect
        updated: bool,
    },
}

impl MemoryStore {
    /// Create an empty SHA-1 store containing only the empty tree.
    pub fn new() -> Self {
        Self::with_algorithm(HashAlgorithm::Sha1)
    }

    /// Create an empty store for the given hash function.
    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        let mut trees = HashSet::new();
        trees.insert(Self::empty_tree_for(algorithm));
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner {
                algorithm,
                commits: HashMap::new(),
                trees,
                refs: BTreeMap::new(),
                shallow: HashSet::new(),
                fail_on: Vec::new(),
                writes: 0,
                operations: Vec::new(),
            })),
        }
    }

    fn empty_tree_for(algorithm: HashAlgorithm) -> Oid {
        algorithm.hash_object("tree", b"")
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The empty tree of this store's hash function.
    pub fn empty_tree(&self) -> Oid {
        Self::empty_tree_for(self.lock().algorithm)
    }

    /// Register a tree id as present.
    pub fn insert_tree(&self, id: Oid) {
        self.lock().trees.insert(id);
    }

    /// Insert a commit as-is (its id is trusted, not recomputed).
    pub fn insert_commit(&self, commit: CommitNode) {
        self.lock().commits.insert(commit.id.clone(), commit);
    }

    /// Remove a commit, leaving dangling references to it.
    pub fn remove_commit(&self, id: &Oid) -> Option<CommitNode> {
        self.lock().commits.remove(id)
    }

    /// Build a commit with the standard test identity on the empty tree,
    /// store it and return its id.
    ///
    /// Timestamps increase by one hour per stored commit so that otherwise
    /// identical commits get distinct ids.
    pub fn add_commit(&self, parents: &[Oid], message: &str) -> Oid {
        let seconds = BASE_TIME + 3600 * self.commit_count() as i64;
        let when = (DateTime::UNIX_EPOCH + Duration::seconds(seconds)).fixed_offset();
        let sig = Signature::new("Test Author", "test@example.com", when);
        self.add_commit_with(parents, message, sig.clone(), sig)
    }

    /// Build and store a commit with explicit signatures.
    pub fn add_commit_with(
        &self,
        parents: &[Oid],
        message: &str,
        author: Signature,
        committer: Signature,
    ) -> Oid {
        let algorithm = self.hash_algorithm();
        let tree = Self::empty_tree_for(algorithm);
        let node = CommitNode {
            id: tree.clone(),
            tree,
            parents: parents.to_vec(),
            author,
            committer,
            message: message.to_string(),
            raw: Default::default(),
        }
        .rehashed(algorithm);
        let id = node.id.clone();
        self.insert_commit(node);
        id
    }

    /// Point a ref at a commit unconditionally.
    pub fn set_ref(&self, name: &RefName, id: &Oid) {
        self.lock().refs.insert(name.clone(), id.clone());
    }

    /// Point `refs/heads/<branch>` at a commit unconditionally.
    pub fn set_branch(&self, branch: &BranchName, id: &Oid) {
        self.set_ref(&RefName::for_branch(branch), id);
    }

    /// Flag a commit as a shallow-clone boundary.
    pub fn mark_shallow(&self, id: &Oid) {
        self.lock().shallow.insert(id.clone());
    }

    /// Add a failure scenario.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on.push(fail_on);
        self
    }

    /// Remove all failure scenarios.
    pub fn clear_fail_on(&self) {
        self.lock().fail_on.clear();
    }

    /// Recorded mutations, oldest first.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.lock().operations.clone()
    }

    /// Ids of all commits written through `write_commit`.
    pub fn written_commits(&self) -> Vec<Oid> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                StoreOperation::WriteCommit { id } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of stored commits.
    pub fn commit_count(&self) -> usize {
        self.lock().commits.len()
    }

    /// Whether a commit is stored.
    pub fn contains_commit(&self, id: &Oid) -> bool {
        self.lock().commits.contains_key(id)
    }

    /// Snapshot of all refs.
    pub fn refs(&self) -> BTreeMap<RefName, Oid> {
        self.lock().refs.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryStore {
    fn hash_algorithm(&self) -> HashAlgorithm {
        self.lock().algorithm
    }

    fn resolve_ref(&self, name: &RefName) -> Result<Option<Oid>, StoreError> {
        Ok(self.lock().refs.get(name).cloned())
    }

    fn read_commit(&self, id: &Oid) -> Result<Option<CommitNode>, StoreError> {
        let inner = self.lock();
        if inner.fail_on.contains(&FailOn::ReadCommit(id.clone())) {
            return Err(StoreError::Io {
                message: format!("injected read failure for {}", id),
            });
        }
        Ok(inner.commits.get(id).cloned())
    }

    fn contains_tree(&self, id: &Oid) -> Result<bool, StoreError> {
        Ok(self.lock().trees.contains(id))
    }

    fn write_commit(&self, commit: &CommitNode) -> Result<Oid, StoreError> {
        let mut inner = self.lock();
        let limit = inner.fail_on.iter().find_map(|f| match f {
            FailOn::WriteCommit { after } => Some(*after),
            _ => None,
        });
        if limit.is_some_and(|after| inner.writes >= after) {
            return Err(StoreError::Io {
                message: "injected write failure".to_string(),
            });
        }

        let id = commit.compute_id(inner.algorithm);
        let mut stored = commit.clone();
        stored.id = id.clone();
        inner.commits.insert(id.clone(), stored);
        inner.writes += 1;
        inner
            .operations
            .push(StoreOperation::WriteCommit { id: id.clone() });
        Ok(id)
    }

    fn compare_and_swap_ref(
        &self,
        name: &RefName,
        expected: Option<&Oid>,
        new: &Oid,
        _message: &str,
    ) -> Result<CasOutcome, StoreError> {
        let mut inner = self.lock();

        // A concurrent writer gets in first.
        if let Some(pos) = inner
            .fail_on
            .iter()
            .position(|f| matches!(f, FailOn::RaceCas { refname, .. } if refname == name))
        {
            if let FailOn::RaceCas { refname, to } = inner.fail_on.remove(pos) {
                inner.refs.insert(refname, to);
            }
        }

        let current = inner.refs.get(name).cloned();
        let mut forced = false;
        for f in inner.fail_on.iter_mut() {
            if let FailOn::Cas { times } = f {
                if *times > 0 {
                    *times -= 1;
                    forced = true;
                    break;
                }
            }
        }

        let updated = !forced && current.as_ref() == expected;
        if updated {
            inner.refs.insert(name.clone(), new.clone());
        }
        inner.operations.push(StoreOperation::Cas {
            refname: name.clone(),
            expected: expected.cloned(),
            new: new.clone(),
            updated,
        });

        Ok(if updated {
            CasOutcome::Updated
        } else {
            CasOutcome::Mismatch { current }
        })
    }

    fn shallow_boundary(&self) -> Result<HashSet<Oid>, StoreError> {
        Ok(self.lock().shallow.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_branch() -> BranchName {
        BranchName::new("main").unwrap()
    }

    #[test]
    fn empty_tree_is_present() {
        let store = MemoryStore::new();
        assert_eq!(store.empty_tree().as_str(), EMPTY_TREE_SHA1);
        assert!(store.contains_tree(&store.empty_tree()).unwrap());
    }

    #[test]
    fn sha256_store_uses_long_ids() {
        let store = MemoryStore::with_algorithm(HashAlgorithm::Sha256);
        let id = store.add_commit(&[], "root\n");
        assert_eq!(id.as_str().len(), 64);
        assert_eq!(store.empty_tree().as_str().len(), 64);
    }

    #[test]
    fn added_commits_are_readable_and_distinct() {
        let store = MemoryStore::new();
        let a = store.add_commit(&[], "same\n");
        let b = store.add_commit(&[], "same\n");
        assert_ne!(a, b);
        let node = store.read_commit(&a).unwrap().unwrap();
        assert_eq!(node.compute_id(HashAlgorithm::Sha1), a);
    }

    #[test]
    fn write_commit_assigns_content_id() {
        let store = MemoryStore::new();
        let a = store.add_commit(&[], "A\n");
        let mut node = store.read_commit(&a).unwrap().unwrap();
        node.message = "changed\n".into();

        // The stale id on the node is ignored.
        let written = store.write_commit(&node).unwrap();
        assert_ne!(written, a);
        assert_eq!(written, node.compute_id(HashAlgorithm::Sha1));
        assert_eq!(store.written_commits(), vec![written]);
    }

    #[test]
    fn cas_updates_only_on_match() {
        let store = MemoryStore::new();
        let a = store.add_commit(&[], "A\n");
        let b = store.add_commit(&[a.clone()], "B\n");
        let name = RefName::for_branch(&main_branch());

        assert_eq!(
            store.compare_and_swap_ref(&name, None, &a, "create").unwrap(),
            CasOutcome::Updated
        );
        assert_eq!(
            store.compare_and_swap_ref(&name, None, &b, "create again").unwrap(),
            CasOutcome::Mismatch {
                current: Some(a.clone())
            }
        );
        assert_eq!(
            store.compare_and_swap_ref(&name, Some(&a), &b, "advance").unwrap(),
            CasOutcome::Updated
        );
        assert_eq!(store.resolve_branch_tip(&main_branch()).unwrap(), Some(b));
    }

    #[test]
    fn forced_cas_mismatch_is_transient() {
        let store = MemoryStore::new().fail_on(FailOn::Cas { times: 1 });
        let a = store.add_commit(&[], "A\n");
        store.set_branch(&main_branch(), &a);
        let name = RefName::for_branch(&main_branch());

        let first = store.compare_and_swap_ref(&name, Some(&a), &a, "t").unwrap();
        assert_eq!(first, CasOutcome::Mismatch { current: Some(a.clone()) });
        let second = store.compare_and_swap_ref(&name, Some(&a), &a, "t").unwrap();
        assert_eq!(second, CasOutcome::Updated);
    }

    #[test]
    fn race_moves_ref_before_swap() {
        let store = MemoryStore::new();
        let a = store.add_commit(&[], "A\n");
        let other = store.add_commit(&[a.clone()], "other writer\n");
        store.set_branch(&main_branch(), &a);
        let name = RefName::for_branch(&main_branch());
        let store = store.fail_on(FailOn::RaceCas {
            refname: name.clone(),
            to: other.clone(),
        });

        let outcome = store.compare_and_swap_ref(&name, Some(&a), &a, "t").unwrap();
        assert_eq!(outcome, CasOutcome::Mismatch { current: Some(other.clone()) });
        // One-shot: the race does not repeat.
        let outcome = store.compare_and_swap_ref(&name, Some(&other), &a, "t").unwrap();
        assert_eq!(outcome, CasOutcome::Updated);
    }

    #[test]
    fn injected_failures() {
        let store = MemoryStore::new();
        let a = store.add_commit(&[], "A\n");
        let store = store
            .fail_on(FailOn::ReadCommit(a.clone()))
            .fail_on(FailOn::WriteCommit { after: 0 });

        assert!(store.read_commit(&a).is_err());
        let node = CommitNode {
            id: a.clone(),
            tree: store.empty_tree(),
            parents: vec![],
            author: Signature::from_raw("X", "x@example.com", 0, 0).unwrap(),
            committer: Signature::from_raw("X", "x@example.com", 0, 0).unwrap(),
            message: "x\n".into(),
            raw: Default::default(),
        };
        assert!(store.write_commit(&node).is_err());

        store.clear_fail_on();
        assert!(store.read_commit(&a).unwrap().is_some());
        assert!(store.write_commit(&node).is_ok());
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        let a = other.add_commit(&[], "A\n");
        other.set_branch(&main_branch(), &a);
        assert!(store.contains_commit(&a));
        assert_eq!(store.refs().len(), 1);
    }
}
