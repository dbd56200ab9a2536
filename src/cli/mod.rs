//! cli
//!
//! Command-line interface layer for reweave.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Translate commands into rule sets
//! - Delegate to command handlers
//! - Does NOT write objects or move refs directly
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to the
//! [`crate::engine`] for execution. Every history change goes through the
//! engine's plan / verify / compare-and-swap pipeline.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use crate::engine;
use anyhow::Result;

/// Run the CLI application with already-parsed arguments.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    let ctx = engine::Context {
        cwd: cli.cwd.clone(),
        debug: cli.debug,
        quiet: cli.quiet,
        interactive: cli.interactive(),
    };

    commands::dispatch(cli.command, &ctx)
}
