//! engine::load
//!
//! Read the commit DAG reachable from a branch tip.
//!
//! # Design
//!
//! Loading is read-only and breadth-first from the tip, following parents in
//! order. Every commit's tree must resolve; a parent that cannot be read is
//! corruption, unless the store reports the child as a shallow boundary.
//!
//! Partial histories are represented with boundary commits (see
//! [`HistoryGraph`]): shallow roots, and commits with a parent beyond
//! [`LoadOptions::max_commits`]. A merge whose parents straddle the limit
//! keeps its own fields, but still follows its loaded parents when they are
//! rewritten.

use std::collections::{HashSet, VecDeque};

use crate::core::commit::CommitNode;
use crate::core::graph::HistoryGraph;
use crate::core::types::{BranchName, Oid};
use crate::store::ObjectStore;

use super::RewriteError;

/// Options for [`load_history`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Stop after this many commits (the tip always loads).
    pub max_commits: Option<usize>,
}

impl LoadOptions {
    /// Load at most `max` commits.
    pub fn limited(max: usize) -> Self {
        Self {
            max_commits: Some(max),
        }
    }
}

/// Load the history of `branch` into a graph.
///
/// # Errors
///
/// - [`RewriteError::NotFound`] if the branch does not exist
/// - [`RewriteError::Corruption`] if a parent commit or a tree is missing
/// - [`RewriteError::Store`] on read failures
pub fn load_history<S: ObjectStore + ?Sized>(
    store: &S,
    branch: &BranchName,
    options: &LoadOptions,
) -> Result<HistoryGraph, RewriteError> {
    let tip = store
        .resolve_branch_tip(branch)?
        .ok_or_else(|| RewriteError::NotFound {
            what: format!("branch '{}'", branch),
        })?;
    let shallow = store.shallow_boundary()?;
    let limit = options.max_commits.unwrap_or(usize::MAX).max(1);

    let mut graph = HistoryGraph::new();
    let mut scheduled: HashSet<Oid> = HashSet::from([tip.clone()]);
    let mut queue = VecDeque::from([tip.clone()]);
    let mut trees: HashSet<Oid> = HashSet::new();

    while let Some(id) = queue.pop_front() {
        let commit = store.read_commit(&id)?.ok_or_else(|| {
            RewriteError::corruption(format!("commit {} is referenced but cannot be read", id))
        })?;

        if trees.insert(commit.tree.clone()) && !store.contains_tree(&commit.tree)? {
            return Err(RewriteError::corruption(format!(
                "commit {} references missing tree {}",
                id, commit.tree
            )));
        }

        if shallow.contains(&id) {
            graph.mark_boundary(id.clone());
        } else {
            for parent in &commit.parents {
                if scheduled.len() >= limit {
                    break;
                }
                if scheduled.insert(parent.clone()) {
                    queue.push_back(parent.clone());
                }
            }
        }
        graph.insert(commit);
    }

    // Commits cut off by the limit become synthetic roots.
    let truncated: Vec<Oid> = graph
        .ids()
        .filter(|id| !graph.is_boundary(id))
        .filter(|id| {
            graph
                .get(id)
                .is_some_and(|c| c.parents.iter().any(|p| !graph.contains(p)))
        })
        .cloned()
        .collect();
    for id in truncated {
        graph.mark_boundary(id);
    }

    graph.set_branch(branch.clone(), tip);
    graph.validate()?;

    tracing::debug!(
        branch = %branch,
        commits = graph.len(),
        boundary = graph.boundary().len(),
        "loaded history"
    );
    Ok(graph)
}

/// Commits of `branch`, children before parents (newest first on linear history).
pub fn list_history<S: ObjectStore + ?Sized>(
    store: &S,
    branch: &BranchName,
    limit: Option<usize>,
) -> Result<Vec<CommitNode>, RewriteError> {
    let graph = load_history(store, branch, &LoadOptions { max_commits: limit })?;
    let mut order = graph.topological_order()?;
    order.reverse();
    Ok(order
        .iter()
        .filter_map(|id| graph.get(id).cloned())
        .collect())
}
