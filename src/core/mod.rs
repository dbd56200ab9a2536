//! core
//!
//! Core domain types, rules, and supporting operations for reweave.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid, RefName
//! - [`commit`] - Commit nodes, signatures, and the commit object encoding
//! - [`graph`] - In-memory history DAG with boundary commits
//! - [`rules`] - Declarative rewrite rules (matchers and field patches)
//! - [`ops`] - Repository locking
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Centralized path routing for reweave storage
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Rules are pure data; evaluating them has no side effects
//! - Identical inputs produce identical ids

pub mod commit;
pub mod config;
pub mod graph;
pub mod ops;
pub mod paths;
pub mod rules;
pub mod types;
