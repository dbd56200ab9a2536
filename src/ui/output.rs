//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Output is formatted consistently and respects the quiet flag.
//! When `--json` is enabled, output is machine-readable JSON on stdout and
//! nothing else is printed there.

use std::fmt::Display;

use serde::Serialize;

use crate::core::commit::CommitNode;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Print a value as pretty JSON on stdout (always shown).
pub fn json<T: Serialize>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One-line commit description: short id, date, author, summary.
pub fn format_commit(commit: &CommitNode) -> String {
    format!(
        "{} {} {} <{}>  {}",
        commit.id.short(7),
        commit.author.when.format("%Y-%m-%d %H:%M:%S %z"),
        commit.author.name,
        commit.author.email,
        commit.summary()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commit::Signature;
    use crate::core::types::Oid;

    #[test]
    fn verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    }

    #[test]
    fn commit_line() {
        let sig = Signature::from_raw("Ada Lovelace", "ada@example.com", 0, 60).unwrap();
        let commit = CommitNode {
            id: Oid::new("abcdef1234567890abcdef1234567890abcdef12").unwrap(),
            tree: Oid::new("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap(),
            parents: vec![],
            author: sig.clone(),
            committer: sig,
            message: "Initial commit\n\nDetails\n".into(),
            raw: Default::default(),
        };
        assert_eq!(
            format_commit(&commit),
            "abcdef1 1970-01-01 01:00:00 +0100 Ada Lovelace <ada@example.com>  Initial commit"
        );
    }
}
