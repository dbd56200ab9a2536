//! core::graph
//!
//! In-memory commit history graph.
//!
//! # Architecture
//!
//! The history graph is a DAG where:
//! - Nodes are commits, keyed by their content-addressed id
//! - Edges point from child to parent (the commit's own parent list)
//! - A cached children index supports descendant queries
//! - Branch tips name entry points into the graph
//!
//! # Boundary Commits
//!
//! A partial history (shallow clone, or a load truncated by a commit limit)
//! has commits whose parents were never loaded. Those commits are flagged as
//! *boundary* commits. Rules never change a boundary commit's own fields, and
//! its edges to unloaded parents are ignored, so their ids are written back
//! unchanged. Edges to parents that *were* loaded (a merge straddling the
//! limit) stay in the graph: when such a parent is rewritten, the boundary
//! commit is re-encoded with the new parent id like any other descendant.
//!
//! # Invariants
//!
//! - Graph must be acyclic
//! - Every parent of a non-boundary commit is present in the graph

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use thiserror::Error;

use super::commit::CommitNode;
use super::types::{BranchName, Oid};

/// Structural problems in a history graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A non-boundary commit references a parent that is not in the graph.
    #[error("commit {commit} references missing parent {parent}")]
    DanglingParent {
        /// The referencing commit
        commit: Oid,
        /// The missing parent
        parent: Oid,
    },

    /// The parent relation contains a cycle.
    #[error("cycle detected in history involving commit {commit}")]
    Cycle {
        /// A commit on the cycle
        commit: Oid,
    },

    /// A branch tip points outside the graph.
    #[error("branch {branch} points at {tip}, which is not in the graph")]
    TipMissing {
        /// The branch
        branch: BranchName,
        /// Its tip
        tip: Oid,
    },
}

/// The commit DAG of one or more branches.
#[derive(Debug, Clone, Default)]
pub struct HistoryGraph {
    /// All loaded commits
    commits: HashMap<Oid, CommitNode>,
    /// Cached children sets (derived from parent lists)
    children: HashMap<Oid, BTreeSet<Oid>>,
    /// Synthetic roots of a partial history
    boundary: HashSet<Oid>,
    /// Branch name -> tip id
    branches: BTreeMap<BranchName, Oid>,
}

impl HistoryGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a commit.
    ///
    /// This also updates the children cache. Re-inserting an id replaces the
    /// stored node.
    pub fn insert(&mut self, commit: CommitNode) {
        for parent in &commit.parents {
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(commit.id.clone());
        }
        self.commits.insert(commit.id.clone(), commit);
    }

    /// Flag a commit as a synthetic root.
    pub fn mark_boundary(&mut self, id: Oid) {
        self.boundary.insert(id);
    }

    /// Record a branch tip.
    pub fn set_branch(&mut self, branch: BranchName, tip: Oid) {
        self.branches.insert(branch, tip);
    }

    /// Get a commit by id.
    pub fn get(&self, id: &Oid) -> Option<&CommitNode> {
        self.commits.get(id)
    }

    /// Check if a commit is loaded.
    pub fn contains(&self, id: &Oid) -> bool {
        self.commits.contains_key(id)
    }

    /// Number of loaded commits.
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// Whether the graph has no commits.
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Check if a commit is a synthetic root.
    pub fn is_boundary(&self, id: &Oid) -> bool {
        self.boundary.contains(id)
    }

    /// All boundary commits, sorted.
    pub fn boundary(&self) -> Vec<&Oid> {
        let mut ids: Vec<_> = self.boundary.iter().collect();
        ids.sort();
        ids
    }

    /// Tip of a branch, if recorded.
    pub fn tip(&self, branch: &BranchName) -> Option<&Oid> {
        self.branches.get(branch)
    }

    /// All recorded branches and their tips.
    pub fn branches(&self) -> impl Iterator<Item = (&BranchName, &Oid)> {
        self.branches.iter()
    }

    /// All commit ids (unordered).
    pub fn ids(&self) -> impl Iterator<Item = &Oid> {
        self.commits.keys()
    }

    /// Parents that participate in the graph walk, in order.
    ///
    /// For a boundary commit, only the parents that were loaded.
    pub fn graph_parents(&self, id: &Oid) -> Vec<&Oid> {
        let Some(commit) = self.commits.get(id) else {
            return Vec::new();
        };
        let boundary = self.boundary.contains(id);
        commit
            .parents
            .iter()
            .filter(|parent| !boundary || self.commits.contains_key(*parent))
            .collect()
    }

    /// Children of a commit.
    pub fn children(&self, id: &Oid) -> impl Iterator<Item = &Oid> {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .filter(move |child| self.commits.contains_key(*child))
    }

    /// Check structural invariants: no dangling parents, no dangling tips, no cycles.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut ids: Vec<&Oid> = self.commits.keys().collect();
        ids.sort();
        for id in ids {
            for parent in self.graph_parents(id) {
                if !self.commits.contains_key(parent) {
                    return Err(GraphError::DanglingParent {
                        commit: id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }
        for (branch, tip) in &self.branches {
            if !self.commits.contains_key(tip) {
                return Err(GraphError::TipMissing {
                    branch: branch.clone(),
                    tip: tip.clone(),
                });
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Compute a topological ordering: every parent precedes its children.
    ///
    /// Kahn's algorithm over in-graph parent edges. Ties are broken by id so
    /// the order is deterministic for a given graph.
    ///
    /// # Errors
    ///
    /// [`GraphError::Cycle`] if some commits can never become ready, and
    /// [`GraphError::DanglingParent`] if a parent edge leaves the graph.
    ///
    /// # Example
    ///
    /// ```
    /// use reweave::core::graph::HistoryGraph;
    /// # use reweave::core::commit::{CommitNode, Signature};
    /// # use reweave::core::types::Oid;
    /// # let sig = Signature::from_raw("A", "a@example.com", 0, 0).unwrap();
    /// # let node = |id: &str, parents: Vec<Oid>| CommitNode {
    /// #     id: Oid::new(id.repeat(40)).unwrap(),
    /// #     tree: Oid::new("f".repeat(40)).unwrap(),
    /// #     parents,
    /// #     author: sig.clone(),
    /// #     committer: sig.clone(),
    /// #     message: String::new(),
    /// #     raw: Default::default(),
    /// # };
    /// let a = node("a", vec![]);
    /// let b = node("b", vec![a.id.clone()]);
    /// let (a_id, b_id) = (a.id.clone(), b.id.clone());
    ///
    /// let mut graph = HistoryGraph::new();
    /// graph.insert(b);
    /// graph.insert(a);
    ///
    /// assert_eq!(graph.topological_order().unwrap(), vec![a_id, b_id]);
    /// ```
    pub fn topological_order(&self) -> Result<Vec<Oid>, GraphError> {
        let mut pending: HashMap<&Oid, usize> = HashMap::with_capacity(self.commits.len());
        let mut ready: BTreeSet<&Oid> = BTreeSet::new();

        for id in self.commits.keys() {
            let parents = self.graph_parents(id);
            for parent in &parents {
                if !self.commits.contains_key(*parent) {
                    return Err(GraphError::DanglingParent {
                        commit: id.clone(),
                        parent: (*parent).clone(),
                    });
                }
            }
            // A commit listing the same parent twice still waits on it once.
            let distinct: HashSet<&Oid> = parents.into_iter().collect();
            if distinct.is_empty() {
                ready.insert(id);
            } else {
                pending.insert(id, distinct.len());
            }
        }

        let mut order = Vec::with_capacity(self.commits.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            for child in self.children(id) {
                if let Some(remaining) = pending.get_mut(child) {
                    *remaining -= 1;
                    if *remaining == 0 {
                        pending.remove(child);
                        ready.insert(child);
                    }
                }
            }
        }

        if let Some(stuck) = pending.keys().min() {
            return Err(GraphError::Cycle {
                commit: (*stuck).clone(),
            });
        }
        Ok(order)
    }

    /// All commits reachable from `id` via the children relation.
    pub fn descendants(&self, id: &Oid) -> HashSet<Oid> {
        let mut result = HashSet::new();
        let mut queue: VecDeque<&Oid> = self.children(id).collect();

        while let Some(current) = queue.pop_front() {
            if result.insert(current.clone()) {
                queue.extend(self.children(current));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commit::Signature;

    fn oid(c: char) -> Oid {
        Oid::new(c.to_string().repeat(40)).unwrap()
    }

    fn node(id: char, parents: &[char]) -> CommitNode {
        let sig = Signature::from_raw("Test", "test@example.com", 1_700_000_000, 0).unwrap();
        CommitNode {
            id: oid(id),
            tree: Oid::new("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap(),
            parents: parents.iter().map(|p| oid(*p)).collect(),
            author: sig.clone(),
            committer: sig,
            message: format!("commit {id}\n"),
            raw: Default::default(),
        }
    }

    fn graph(nodes: &[(char, &[char])]) -> HistoryGraph {
        let mut g = HistoryGraph::new();
        for (id, parents) in nodes {
            g.insert(node(*id, parents));
        }
        g
    }

    fn position(order: &[Oid], c: char) -> usize {
        order.iter().position(|x| x == &oid(c)).unwrap()
    }

    #[test]
    fn empty_graph_is_valid() {
        let g = HistoryGraph::new();
        assert!(g.validate().is_ok());
        assert!(g.topological_order().unwrap().is_empty());
    }

    #[test]
    fn linear_history_orders_parents_first() {
        // a <- b <- c
        let g = graph(&[('c', &['b']), ('a', &[]), ('b', &['a'])]);
        let order = g.topological_order().unwrap();
        assert_eq!(order, vec![oid('a'), oid('b'), oid('c')]);
    }

    #[test]
    fn merge_waits_for_both_parents() {
        //   a <- b <- d
        //    \- c <-/
        let g = graph(&[('a', &[]), ('b', &['a']), ('c', &['a']), ('d', &['b', 'c'])]);
        let order = g.topological_order().unwrap();
        assert!(position(&order, 'b') < position(&order, 'd'));
        assert!(position(&order, 'c') < position(&order, 'd'));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn order_is_deterministic() {
        let g = graph(&[('a', &[]), ('b', &['a']), ('c', &['a']), ('d', &['a'])]);
        assert_eq!(g.topological_order().unwrap(), g.topological_order().unwrap());
    }

    #[test]
    fn cycle_detected() {
        let g = graph(&[('a', &['c']), ('b', &['a']), ('c', &['b'])]);
        assert!(matches!(g.topological_order(), Err(GraphError::Cycle { .. })));
        assert!(matches!(g.validate(), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn dangling_parent_detected() {
        let g = graph(&[('b', &['a'])]);
        assert_eq!(
            g.validate(),
            Err(GraphError::DanglingParent {
                commit: oid('b'),
                parent: oid('a'),
            })
        );
    }

    #[test]
    fn boundary_commit_acts_as_root() {
        let mut g = graph(&[('b', &['a']), ('c', &['b'])]);
        g.mark_boundary(oid('b'));
        assert!(g.validate().is_ok());
        assert!(g.graph_parents(&oid('b')).is_empty());
        assert_eq!(g.topological_order().unwrap(), vec![oid('b'), oid('c')]);
    }

    #[test]
    fn boundary_merge_keeps_loaded_parent_edges() {
        // d merges c (loaded) and x (never loaded)
        let mut g = graph(&[('a', &[]), ('c', &['a']), ('d', &['c', 'x'])]);
        g.mark_boundary(oid('d'));
        assert!(g.validate().is_ok());
        assert_eq!(g.graph_parents(&oid('d')), vec![&oid('c')]);
        assert!(g.descendants(&oid('a')).contains(&oid('d')));
        let order = g.topological_order().unwrap();
        assert_eq!(order, vec![oid('a'), oid('c'), oid('d')]);
    }

    #[test]
    fn missing_tip_detected() {
        let mut g = graph(&[('a', &[])]);
        g.set_branch(BranchName::new("main").unwrap(), oid('f'));
        assert!(matches!(g.validate(), Err(GraphError::TipMissing { .. })));
    }

    #[test]
    fn descendants_follow_children() {
        // a <- b <- c, a <- d
        let g = graph(&[('a', &[]), ('b', &['a']), ('c', &['b']), ('d', &['a'])]);

        let below_a = g.descendants(&oid('a'));
        assert_eq!(below_a.len(), 3);
        assert!(g.descendants(&oid('c')).is_empty());
        assert_eq!(g.descendants(&oid('b')), [oid('c')].into_iter().collect());
    }

    #[test]
    fn duplicate_parent_entries_do_not_stall_walk() {
        let g = graph(&[('a', &[]), ('b', &['a', 'a'])]);
        assert_eq!(g.topological_order().unwrap(), vec![oid('a'), oid('b')]);
    }
}
