//! reweave - safe, deterministic bulk rewriting of git history
//!
//! reweave rewrites authorship, committer identity, dates and messages across
//! a branch's history. Every descendant of a changed commit is re-hashed, the
//! DAG's shape (parent order, trees, merges) is preserved, and the branch is
//! moved with a single compare-and-swap: either all of the new history
//! becomes visible or none of it does.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Orchestrates Load → Draft → Rehash → Preview | Apply
//! - [`core`] - Domain types, rules, configuration, and locking
//! - [`store`] - The object-store capability set the engine runs against
//! - [`git`] - Single interface for all Git operations
//! - [`ui`] - User interaction utilities
//!
//! # Correctness Invariants
//!
//! reweave maintains the following invariants:
//!
//! 1. Rules are validated before any history is read
//! 2. The branch ref is the only visible mutation, swapped atomically
//! 3. Commits that no rule touches keep their ids
//! 4. Old commits are never deleted; backup refs allow undo

pub mod cli;
pub mod core;
pub mod engine;
pub mod git;
pub mod store;
pub mod ui;
