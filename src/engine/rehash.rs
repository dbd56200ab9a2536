//! engine::rehash
//!
//! Recompute content-addressed ids after a rewrite.
//!
//! # Algorithm
//!
//! Commits are visited parents-first. For each commit:
//!
//! 1. Start from its draft (or the original when no rule applied)
//! 2. Replace every parent with that parent's rehashed id, keeping order
//! 3. If nothing differs from the original, keep the original node as-is;
//!    otherwise recompute the id from the new contents
//!
//! Step 3 is what makes rehashing idempotent: untouched commits are never
//! re-encoded, so their ids and signatures survive. A commit that does get
//! new contents loses its `gpgsig` header. Boundary commits ignore their
//! draft; they change only when a loaded parent does.
//!
//! # Concurrency
//!
//! [`rehash_concurrent`] dispatches ready commits (all parents rehashed) to
//! blocking tasks on a [`JoinSet`], at most `workers` at a time. The
//! coordinator alone owns the old -> new mapping; a commit is dispatched only
//! once its last parent result has been recorded, so no commit is processed
//! twice and the result equals the sequential walk.
//!
//! Both variants observe a [`CancellationToken`] between steps. Nothing is
//! written to a store here, so cancelling discards all work.

use std::collections::{BTreeSet, HashMap, HashSet};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::commit::{CommitNode, HashAlgorithm};
use crate::core::graph::HistoryGraph;
use crate::core::types::Oid;

use super::plan::Draft;
use super::RewriteError;

/// Output of a rehash walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rehashed {
    /// Original ids, parents before children
    pub order: Vec<Oid>,
    /// Original id -> resulting node (the original itself when unchanged)
    pub nodes: HashMap<Oid, CommitNode>,
}

impl Rehashed {
    /// New id of a commit, by its original id.
    pub fn new_id(&self, old: &Oid) -> Option<&Oid> {
        self.nodes.get(old).map(|node| &node.id)
    }

    /// Number of commits whose id changed.
    pub fn changed_count(&self) -> usize {
        self.nodes.iter().filter(|(old, node)| **old != node.id).count()
    }
}

/// Sequential rehash.
///
/// # Errors
///
/// [`RewriteError::Corruption`] if the graph has a cycle or a dangling
/// parent, [`RewriteError::Cancelled`] if `cancel` fires.
pub fn rehash(
    graph: &HistoryGraph,
    drafts: &[Draft],
    algorithm: HashAlgorithm,
    cancel: &CancellationToken,
) -> Result<Rehashed, RewriteError> {
    let order = graph.topological_order()?;
    let index = draft_index(drafts);
    let mut nodes: HashMap<Oid, CommitNode> = HashMap::with_capacity(order.len());

    for id in &order {
        if cancel.is_cancelled() {
            return Err(RewriteError::Cancelled);
        }
        let original = lookup(graph, id)?;
        let parents = remap_parents(original, &nodes);
        let node = rehash_node(
            original,
            index.get(id).copied(),
            parents,
            graph.is_boundary(id),
            algorithm,
        );
        nodes.insert(id.clone(), node);
    }

    let rehashed = Rehashed { order, nodes };
    tracing::debug!(
        commits = rehashed.order.len(),
        changed = rehashed.changed_count(),
        "rehashed history"
    );
    Ok(rehashed)
}

/// Rehash with up to `workers` commits in flight.
///
/// Must be awaited inside a Tokio runtime. Produces exactly what [`rehash`]
/// produces for the same input.
pub async fn rehash_concurrent(
    graph: &HistoryGraph,
    drafts: &[Draft],
    algorithm: HashAlgorithm,
    workers: usize,
    cancel: &CancellationToken,
) -> Result<Rehashed, RewriteError> {
    let order = graph.topological_order()?;
    let index = draft_index(drafts);
    let workers = workers.max(1);

    let mut pending: HashMap<&Oid, usize> = HashMap::with_capacity(order.len());
    let mut ready: BTreeSet<Oid> = BTreeSet::new();
    for id in &order {
        let distinct: HashSet<&Oid> = graph.graph_parents(id).into_iter().collect();
        if distinct.is_empty() {
            ready.insert(id.clone());
        } else {
            pending.insert(id, distinct.len());
        }
    }

    let mut nodes: HashMap<Oid, CommitNode> = HashMap::with_capacity(order.len());
    let mut tasks: JoinSet<(Oid, CommitNode)> = JoinSet::new();

    loop {
        while tasks.len() < workers {
            let Some(id) = ready.pop_first() else {
                break;
            };
            if cancel.is_cancelled() {
                tasks.abort_all();
                return Err(RewriteError::Cancelled);
            }
            let original = lookup(graph, &id)?.clone();
            let draft = index.get(&id).map(|node| (*node).clone());
            let parents = remap_parents(&original, &nodes);
            let boundary = graph.is_boundary(&id);
            tasks.spawn_blocking(move || {
                let node = rehash_node(&original, draft.as_ref(), parents, boundary, algorithm);
                (id, node)
            });
        }

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                return Err(RewriteError::Cancelled);
            }
            joined = tasks.join_next() => joined,
        };
        let Some(joined) = joined else {
            break;
        };
        let (id, node) = match joined {
            Ok(done) => done,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => return Err(RewriteError::Cancelled),
        };

        for child in graph.children(&id) {
            if let Some(remaining) = pending.get_mut(child) {
                *remaining -= 1;
                if *remaining == 0 {
                    pending.remove(child);
                    ready.insert(child.clone());
                }
            }
        }
        nodes.insert(id, node);
    }

    if nodes.len() != order.len() {
        return Err(RewriteError::corruption(format!(
            "rehash finished {} of {} commits",
            nodes.len(),
            order.len()
        )));
    }

    let rehashed = Rehashed { order, nodes };
    tracing::debug!(
        commits = rehashed.order.len(),
        changed = rehashed.changed_count(),
        workers,
        "rehashed history concurrently"
    );
    Ok(rehashed)
}

fn draft_index(drafts: &[Draft]) -> HashMap<&Oid, &CommitNode> {
    drafts
        .iter()
        .filter(|d| !d.skipped)
        .map(|d| (&d.id, &d.node))
        .collect()
}

fn lookup<'g>(graph: &'g HistoryGraph, id: &Oid) -> Result<&'g CommitNode, RewriteError> {
    graph
        .get(id)
        .ok_or_else(|| RewriteError::corruption(format!("commit {} vanished from the graph", id)))
}

/// Parents of `original`, each replaced by its rehashed id when known.
fn remap_parents(original: &CommitNode, nodes: &HashMap<Oid, CommitNode>) -> Vec<Oid> {
    original
        .parents
        .iter()
        .map(|p| nodes.get(p).map_or_else(|| p.clone(), |n| n.id.clone()))
        .collect()
}

fn rehash_node(
    original: &CommitNode,
    draft: Option<&CommitNode>,
    parents: Vec<Oid>,
    boundary: bool,
    algorithm: HashAlgorithm,
) -> CommitNode {
    let base = if boundary { original } else { draft.unwrap_or(original) };
    let mut candidate = base.clone();
    candidate.parents = parents;
    if original.changed_fields(&candidate).is_empty() {
        return original.clone();
    }
    if candidate.raw.strip_signatures() {
        tracing::debug!(commit = %original.id, "dropping signature of rewritten commit");
    }
    candidate.rehashed(algorithm)
}
