//! engine::plan
//!
//! Deterministic rewrite planning.
//!
//! # Architecture
//!
//! A [`RewritePlan`] is the sole intermediate representation between a
//! loaded history and any repository mutation. Plans are:
//! - **Deterministic**: the same history and rules always give the same plan
//! - **Previewable**: [`preview_rewrite`](super::preview_rewrite) needs nothing else
//! - **Self-contained**: they carry the rules, so a retry can re-plan
//!
//! # Invariants
//!
//! - Rules are validated before the history is even loaded
//! - Planning performs no writes
//! - Entries are in topological order (parents first)
//! - The original graph is moved into the plan and only read afterwards

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::core::commit::{CommitField, CommitNode, HashAlgorithm};
use crate::core::graph::HistoryGraph;
use crate::core::rules::{RuleError, RuleSet};
use crate::core::types::{BranchName, Oid};
use crate::store::ObjectStore;

use super::load::{load_history, LoadOptions};
use super::rehash::{rehash, rehash_concurrent, Rehashed};
use super::verify::verify_plan;
use super::RewriteError;

/// The rule engine's output for one commit, before rehashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Original id
    pub id: Oid,
    /// Transformed contents; `node.id` is still the original id
    pub node: CommitNode,
    /// Index of the first matching rule
    pub rule: Option<usize>,
    /// A rule matched a boundary commit, which was left alone
    pub skipped: bool,
}

/// Evaluate `rules` against every commit in `graph`.
///
/// Rules are tried in order and the first match applies; a commit with no
/// match gets an identical copy. Drafts come back sorted by id.
pub fn build_drafts(graph: &HistoryGraph, rules: &RuleSet) -> Vec<Draft> {
    let mut ids: Vec<&Oid> = graph.ids().collect();
    ids.sort();

    ids.into_iter()
        .filter_map(|id| graph.get(id))
        .map(|commit| match rules.first_match(commit) {
            Some((index, _)) if graph.is_boundary(&commit.id) => Draft {
                id: commit.id.clone(),
                node: commit.clone(),
                rule: Some(index),
                skipped: true,
            },
            Some((index, rule)) => Draft {
                id: commit.id.clone(),
                node: rule.set.apply(commit),
                rule: Some(index),
                skipped: false,
            },
            None => Draft {
                id: commit.id.clone(),
                node: commit.clone(),
                rule: None,
                skipped: false,
            },
        })
        .collect()
}

/// Options for [`plan_rewrite`].
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// How much history to load
    pub load: LoadOptions,
    /// Rehash workers; 1 walks sequentially
    pub workers: usize,
    /// Checked between rehash steps
    pub cancel: CancellationToken,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            load: LoadOptions::default(),
            workers: 1,
            cancel: CancellationToken::new(),
        }
    }
}

/// One commit of a planned rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// Id before the rewrite
    pub old_id: Oid,
    /// Id after the rewrite (equal to `old_id` when untouched)
    pub new_id: Oid,
    /// The rewritten commit
    pub node: CommitNode,
    /// Fields a rule changed on this commit itself
    pub changed_fields: Vec<CommitField>,
    /// The commit's parents were rewritten
    pub descendant_changed: bool,
    /// Index of the rule that matched, if any
    pub rule: Option<usize>,
}

impl PlanEntry {
    /// Whether the commit gets a new id.
    pub fn is_changed(&self) -> bool {
        self.old_id != self.new_id
    }
}

/// A complete, verified rewrite of one branch.
#[derive(Debug, Clone)]
pub struct RewritePlan {
    /// Branch being rewritten
    pub branch: BranchName,
    /// Tip the plan was built from; the swap expects it
    pub original_tip: Oid,
    /// Tip after the rewrite
    pub new_tip: Oid,
    /// Rules the plan was built from
    pub rules: RuleSet,
    /// Hash function of the store
    pub algorithm: HashAlgorithm,
    /// Every loaded commit, parents first
    pub entries: Vec<PlanEntry>,
    /// Old id -> new id for every loaded commit
    pub mapping: BTreeMap<Oid, Oid>,
    /// Boundary commits a rule matched but did not rewrite
    pub skipped_boundary: Vec<Oid>,
    graph: HistoryGraph,
}

impl RewritePlan {
    /// The history the plan was built from.
    pub fn graph(&self) -> &HistoryGraph {
        &self.graph
    }

    /// New id of a loaded commit.
    pub fn new_id(&self, old: &Oid) -> Option<&Oid> {
        self.mapping.get(old)
    }

    /// Whether the commit is part of the planned history.
    pub fn contains(&self, old: &Oid) -> bool {
        self.mapping.contains_key(old)
    }

    /// Entries whose id changes, parents first.
    pub fn changed(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.is_changed())
    }

    /// Number of commits whose id changes.
    pub fn changed_count(&self) -> usize {
        self.changed().count()
    }

    /// Whether applying the plan changes nothing.
    pub fn is_noop(&self) -> bool {
        self.original_tip == self.new_tip
    }

    /// Stable digest of the planned mapping.
    ///
    /// Two plans with equal digests move the same branch from the same tip
    /// through the same old -> new ids.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.branch.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.original_tip.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.new_tip.as_str().as_bytes());
        for entry in &self.entries {
            hasher.update(b"\n");
            hasher.update(entry.old_id.as_str().as_bytes());
            hasher.update(b" ");
            hasher.update(entry.new_id.as_str().as_bytes());
        }
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }
}

/// Plan a rewrite of `branch` with `rules`.
///
/// Validates the rules, loads the history, evaluates the rules and rehashes.
/// Nothing is written.
///
/// # Errors
///
/// - [`RewriteError::Validation`] for a rejected rule (before loading)
/// - [`RewriteError::NotFound`] / [`RewriteError::Corruption`] from loading
/// - [`RewriteError::Cancelled`] if `options.cancel` fires
pub fn plan_rewrite<S: ObjectStore + ?Sized>(
    store: &S,
    branch: &BranchName,
    rules: &RuleSet,
    options: &PlanOptions,
) -> Result<RewritePlan, RewriteError> {
    rules.validate()?;
    let graph = load_history(store, branch, &options.load)?;
    plan_from_graph(graph, branch, rules, store.hash_algorithm(), options)
}

/// Plan a rewrite over an already-loaded graph.
pub fn plan_from_graph(
    graph: HistoryGraph,
    branch: &BranchName,
    rules: &RuleSet,
    algorithm: HashAlgorithm,
    options: &PlanOptions,
) -> Result<RewritePlan, RewriteError> {
    rules.validate()?;
    let original_tip = graph
        .tip(branch)
        .cloned()
        .ok_or_else(|| RewriteError::NotFound {
            what: format!("branch '{}' in the loaded history", branch),
        })?;

    let drafts = build_drafts(&graph, rules);
    check_encodings(&graph, &drafts, rules)?;
    let mut rehashed = if options.workers > 1 {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(RewriteError::WorkerPool)?;
        runtime.block_on(rehash_concurrent(
            &graph,
            &drafts,
            algorithm,
            options.workers,
            &options.cancel,
        ))?
    } else {
        rehash(&graph, &drafts, algorithm, &options.cancel)?
    };

    let entries = build_entries(&graph, &drafts, &mut rehashed)?;
    let mapping: BTreeMap<Oid, Oid> = entries
        .iter()
        .map(|e| (e.old_id.clone(), e.new_id.clone()))
        .collect();
    let new_tip = mapping
        .get(&original_tip)
        .cloned()
        .ok_or_else(|| RewriteError::corruption(format!("tip {} was not rehashed", original_tip)))?;
    let skipped_boundary = drafts
        .iter()
        .filter(|d| d.skipped)
        .map(|d| d.id.clone())
        .collect();

    let plan = RewritePlan {
        branch: branch.clone(),
        original_tip,
        new_tip,
        rules: rules.clone(),
        algorithm,
        entries,
        mapping,
        skipped_boundary,
        graph,
    };
    verify_plan(&plan)?;

    tracing::info!(
        branch = %plan.branch,
        commits = plan.entries.len(),
        changed = plan.changed_count(),
        skipped_boundary = plan.skipped_boundary.len(),
        "planned rewrite"
    );
    Ok(plan)
}

/// Commits with a non-UTF-8 `encoding` header are kept as raw bytes. A rule
/// may move their dates, but new text would be written as UTF-8 under the
/// old header.
fn check_encodings(graph: &HistoryGraph, drafts: &[Draft], rules: &RuleSet) -> Result<(), RuleError> {
    for draft in drafts.iter().filter(|d| !d.skipped) {
        let (Some(index), Some(original)) = (draft.rule, graph.get(&draft.id)) else {
            continue;
        };
        let Some(encoding) = original.raw.legacy_encoding() else {
            continue;
        };
        let rewrites_text = original.changed_fields(&draft.node).iter().any(|field| {
            !matches!(
                field,
                CommitField::AuthorDate | CommitField::CommitterDate | CommitField::Parents
            )
        });
        if rewrites_text {
            let rule = rules.rules.get(index).map_or_else(|| format!("#{index}"), |r| r.label(index));
            return Err(RuleError::LegacyEncoding {
                rule,
                commit: draft.id.to_string(),
                encoding,
            });
        }
    }
    Ok(())
}

fn build_entries(
    graph: &HistoryGraph,
    drafts: &[Draft],
    rehashed: &mut Rehashed,
) -> Result<Vec<PlanEntry>, RewriteError> {
    let rules: BTreeMap<&Oid, Option<usize>> = drafts
        .iter()
        .map(|d| (&d.id, if d.skipped { None } else { d.rule }))
        .collect();

    let mut entries = Vec::with_capacity(rehashed.order.len());
    for old_id in &rehashed.order {
        let original = graph
            .get(old_id)
            .ok_or_else(|| RewriteError::corruption(format!("commit {} vanished from the graph", old_id)))?;
        let node = rehashed
            .nodes
            .remove(old_id)
            .ok_or_else(|| RewriteError::corruption(format!("commit {} was not rehashed", old_id)))?;

        let changed_fields = original
            .changed_fields(&node)
            .into_iter()
            .filter(|f| *f != CommitField::Parents)
            .collect();
        entries.push(PlanEntry {
            old_id: old_id.clone(),
            new_id: node.id.clone(),
            changed_fields,
            descendant_changed: node.parents != original.parents,
            rule: rules.get(old_id).copied().flatten(),
            node,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rules::{FieldPatch, Matcher, RewriteRule};
    use crate::store::MemoryStore;

    fn main_branch() -> BranchName {
        BranchName::new("main").unwrap()
    }

    fn email_rule(email: &str) -> RewriteRule {
        RewriteRule::new(
            Matcher::Any,
            FieldPatch {
                author_email: Some(email.to_string()),
                ..FieldPatch::default()
            },
        )
    }

    fn message_rule(matcher: Matcher, message: &str) -> RewriteRule {
        RewriteRule::new(
            matcher,
            FieldPatch {
                message: Some(message.to_string()),
                ..FieldPatch::default()
            },
        )
    }

    /// A <- B <- C on main.
    fn abc(store: &MemoryStore) -> (Oid, Oid, Oid) {
        let a = store.add_commit(&[], "A\n");
        let b = store.add_commit(&[a.clone()], "B\n");
        let c = store.add_commit(&[b.clone()], "C\n");
        store.set_branch(&main_branch(), &c);
        (a, b, c)
    }

    mod drafts {
        use super::*;
        use crate::engine::load::load_history;

        #[test]
        fn first_match_wins() {
            let store = MemoryStore::new();
            let (_, b, _) = abc(&store);
            let graph = load_history(&store, &main_branch(), &LoadOptions::default()).unwrap();

            let mut rules = RuleSet::new();
            rules.push(message_rule(
                Matcher::MessageContains { text: "B".into() },
                "first\n",
            ));
            rules.push(message_rule(Matcher::Any, "second\n"));

            let drafts = build_drafts(&graph, &rules);
            assert_eq!(drafts.len(), 3);
            let draft_b = drafts.iter().find(|d| d.id == b).unwrap();
            assert_eq!(draft_b.rule, Some(0));
            assert_eq!(draft_b.node.message, "first\n");
            assert!(drafts
                .iter()
                .filter(|d| d.id != b)
                .all(|d| d.rule == Some(1) && d.node.message == "second\n"));
        }

        #[test]
        fn no_match_is_identity() {
            let store = MemoryStore::new();
            abc(&store);
            let graph = load_history(&store, &main_branch(), &LoadOptions::default()).unwrap();
            let rules = RuleSet::single(message_rule(
                Matcher::AuthorEmail {
                    email: "nobody@example.com".into(),
                },
                "x\n",
            ));

            for draft in build_drafts(&graph, &rules) {
                assert_eq!(draft.rule, None);
                assert_eq!(&draft.node, graph.get(&draft.id).unwrap());
            }
        }

        #[test]
        fn boundary_match_is_skipped() {
            let store = MemoryStore::new();
            let (_, b, c) = abc(&store);
            let graph = load_history(&store, &main_branch(), &LoadOptions::limited(2)).unwrap();

            let drafts = build_drafts(&graph, &RuleSet::single(email_rule("new@example.com")));
            let draft_b = drafts.iter().find(|d| d.id == b).unwrap();
            assert!(draft_b.skipped);
            assert_eq!(draft_b.node.author.email, "test@example.com");
            let draft_c = drafts.iter().find(|d| d.id == c).unwrap();
            assert!(!draft_c.skipped);
        }

        #[test]
        fn drafts_are_sorted_by_id() {
            let store = MemoryStore::new();
            abc(&store);
            let graph = load_history(&store, &main_branch(), &LoadOptions::default()).unwrap();
            let drafts = build_drafts(&graph, &RuleSet::new());
            let ids: Vec<&Oid> = drafts.iter().map(|d| &d.id).collect();
            let mut sorted = ids.clone();
            sorted.sort();
            assert_eq!(ids, sorted);
        }
    }

    mod planning {
        use super::*;

        #[test]
        fn rewrite_middle_commit() {
            let store = MemoryStore::new();
            let (a, b, c) = abc(&store);
            let rules = RuleSet::single(message_rule(Matcher::Ids { ids: vec![b.as_str()[..8].to_string()] }, "B'\n"));

            let plan = plan_rewrite(&store, &main_branch(), &rules, &PlanOptions::default()).unwrap();
            assert_eq!(plan.original_tip, c);
            assert_eq!(plan.new_id(&a), Some(&a));
            assert_ne!(plan.new_id(&b), Some(&b));
            assert_ne!(plan.new_tip, c);
            assert_eq!(plan.changed_count(), 2);

            let entry_b = plan.entries.iter().find(|e| e.old_id == b).unwrap();
            assert_eq!(entry_b.changed_fields, vec![CommitField::Message]);
            assert!(!entry_b.descendant_changed);
            assert_eq!(entry_b.rule, Some(0));

            let entry_c = plan.entries.iter().find(|e| e.old_id == c).unwrap();
            assert!(entry_c.changed_fields.is_empty());
            assert!(entry_c.descendant_changed);
            assert_eq!(entry_c.rule, None);
            assert_eq!(entry_c.node.parents, vec![entry_b.new_id.clone()]);
        }

        #[test]
        fn entries_are_parents_first() {
            let store = MemoryStore::new();
            let (a, b, c) = abc(&store);
            let plan = plan_rewrite(&store, &main_branch(), &RuleSet::new(), &PlanOptions::default()).unwrap();
            let order: Vec<Oid> = plan.entries.iter().map(|e| e.old_id.clone()).collect();
            assert_eq!(order, vec![a, b, c]);
        }

        #[test]
        fn empty_rules_are_a_noop() {
            let store = MemoryStore::new();
            abc(&store);
            let plan = plan_rewrite(&store, &main_branch(), &RuleSet::new(), &PlanOptions::default()).unwrap();
            assert!(plan.is_noop());
            assert_eq!(plan.changed_count(), 0);
            assert!(plan.mapping.iter().all(|(old, new)| old == new));
        }

        #[test]
        fn invalid_rule_fails_before_loading() {
            // The branch does not exist: validation must still win.
            let store = MemoryStore::new();
            let rules = RuleSet::single(email_rule("not-an-email"));
            let err = plan_rewrite(&store, &main_branch(), &rules, &PlanOptions::default()).unwrap_err();
            assert!(matches!(err, RewriteError::Validation(_)));
        }

        #[test]
        fn cancelled_plan() {
            let store = MemoryStore::new();
            abc(&store);
            let options = PlanOptions::default();
            options.cancel.cancel();
            let err = plan_rewrite(&store, &main_branch(), &RuleSet::new(), &options).unwrap_err();
            assert!(matches!(err, RewriteError::Cancelled));
        }

        #[test]
        fn workers_do_not_change_the_plan() {
            let store = MemoryStore::new();
            let (a, _, c) = abc(&store);
            let side = store.add_commit(&[a.clone()], "side\n");
            let merge = store.add_commit(&[c, side], "merge\n");
            store.set_branch(&main_branch(), &merge);
            let rules = RuleSet::single(email_rule("new@example.com"));

            let sequential = plan_rewrite(&store, &main_branch(), &rules, &PlanOptions::default()).unwrap();
            let concurrent = plan_rewrite(
                &store,
                &main_branch(),
                &rules,
                &PlanOptions {
                    workers: 4,
                    ..PlanOptions::default()
                },
            )
            .unwrap();
            assert_eq!(sequential.entries, concurrent.entries);
            assert_eq!(sequential.digest(), concurrent.digest());
        }

        #[test]
        fn digest_is_stable_and_sensitive() {
            let store = MemoryStore::new();
            abc(&store);
            let rules = RuleSet::single(email_rule("new@example.com"));
            let first = plan_rewrite(&store, &main_branch(), &rules, &PlanOptions::default()).unwrap();
            let second = plan_rewrite(&store, &main_branch(), &rules, &PlanOptions::default()).unwrap();
            assert_eq!(first.digest(), second.digest());
            assert!(first.digest().starts_with("sha256:"));

            let other = RuleSet::single(email_rule("other@example.com"));
            let third = plan_rewrite(&store, &main_branch(), &other, &PlanOptions::default()).unwrap();
            assert_ne!(first.digest(), third.digest());
        }

        #[test]
        fn skipped_boundary_is_reported() {
            let store = MemoryStore::new();
            let (_, b, _) = abc(&store);
            let options = PlanOptions {
                load: LoadOptions::limited(2),
                ..PlanOptions::default()
            };
            let plan = plan_rewrite(&store, &main_branch(), &RuleSet::single(email_rule("new@example.com")), &options).unwrap();
            assert_eq!(plan.skipped_boundary, vec![b.clone()]);
            assert_eq!(plan.new_id(&b), Some(&b));
            assert_eq!(plan.changed_count(), 1);
        }

        #[test]
        fn truncated_merge_follows_rewritten_parent() {
            let store = MemoryStore::new();
            let r = store.add_commit(&[], "R\n");
            let p = store.add_commit(&[r.clone()], "P\n");
            let y = store.add_commit(&[r], "Y\n");
            let x = store.add_commit(&[p.clone()], "X\n");
            let m = store.add_commit(&[x.clone(), y.clone()], "M\n");
            let t = store.add_commit(&[m.clone(), p.clone()], "T\n");
            store.set_branch(&main_branch(), &t);

            // The limit loads T, M, P and X; M and P are boundary commits.
            let options = PlanOptions {
                load: LoadOptions::limited(4),
                ..PlanOptions::default()
            };
            let rules = RuleSet::single(RewriteRule::new(
                Matcher::Ids {
                    ids: vec![x.as_str().to_string()],
                },
                FieldPatch {
                    author_name: Some("Someone Else".into()),
                    ..FieldPatch::default()
                },
            ));
            let plan = plan_rewrite(&store, &main_branch(), &rules, &options).unwrap();
            assert!(plan.graph().is_boundary(&m));

            let new_x = plan.new_id(&x).unwrap().clone();
            let entry_m = plan.entries.iter().find(|e| e.old_id == m).unwrap();
            assert_ne!(x, new_x);
            assert!(entry_m.is_changed());
            assert!(entry_m.changed_fields.is_empty());
            assert_eq!(entry_m.node.parents, vec![new_x, y]);
            assert_eq!(entry_m.node.message, "M\n");
            assert_eq!(plan.new_id(&p), Some(&p));

            let entry_t = plan.entries.iter().find(|e| e.old_id == t).unwrap();
            assert_eq!(entry_t.node.parents, vec![entry_m.new_id.clone(), p]);
            assert_eq!(plan.new_tip, entry_t.new_id);
            assert_eq!(plan.changed_count(), 3);
        }

        fn latin1_branch(store: &MemoryStore) -> Oid {
            let a = store.add_commit(&[], "A\n");
            let b = store.add_commit(&[a], "B\n");
            let mut node = store.remove_commit(&b).unwrap();
            node.raw.headers.push(b"encoding ISO-8859-1".to_vec());
            let node = node.rehashed(store.hash_algorithm());
            let id = node.id.clone();
            store.insert_commit(node);
            store.set_branch(&main_branch(), &id);
            id
        }

        #[test]
        fn legacy_encoding_rejects_text_changes() {
            let store = MemoryStore::new();
            let b = latin1_branch(&store);
            let rules = RuleSet::single(email_rule("new@example.com"));

            let err = plan_rewrite(&store, &main_branch(), &rules, &PlanOptions::default()).unwrap_err();
            match err {
                RewriteError::Validation(RuleError::LegacyEncoding { commit, encoding, .. }) => {
                    assert_eq!(commit, b.to_string());
                    assert_eq!(encoding, "ISO-8859-1");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn legacy_encoding_allows_date_changes() {
            let store = MemoryStore::new();
            let b = latin1_branch(&store);
            let date = chrono::DateTime::parse_from_rfc3339("2024-03-01T12:00:00+01:00").unwrap();
            let rules = RuleSet::single(RewriteRule::new(
                Matcher::Any,
                FieldPatch {
                    author_date: Some(date),
                    ..FieldPatch::default()
                },
            ));

            let plan = plan_rewrite(&store, &main_branch(), &rules, &PlanOptions::default()).unwrap();
            let entry = plan.entries.iter().find(|e| e.old_id == b).unwrap();
            assert!(entry.is_changed());
            assert_eq!(entry.node.raw.legacy_encoding().as_deref(), Some("ISO-8859-1"));
        }
    }
}
