//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Run as if in that directory
//! - `--debug`: Enable debug logging
//! - `--interactive` / `--no-interactive`: Control prompts
//! - `--quiet` / `-q`: Minimal output

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::core::rules::DateTarget;

/// reweave - safe, deterministic bulk rewriting of git history
#[derive(Parser, Debug)]
#[command(name = "reweave")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if reweave was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output; implies --no-interactive
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable interactive prompts
    #[arg(long = "interactive", global = true, conflicts_with = "no_interactive")]
    pub interactive_flag: bool,

    /// Disable interactive prompts
    #[arg(long, global = true)]
    pub no_interactive: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Prompt choice made on the command line, if any.
    ///
    /// `--interactive` wins over `--quiet`. `None` leaves the decision to the
    /// `interactive` config key and then to whether stdin is a terminal.
    pub fn interactive(&self) -> Option<bool> {
        if self.interactive_flag {
            Some(true)
        } else if self.no_interactive || self.quiet {
            Some(false)
        } else {
            None
        }
    }
}

/// Flags shared by every command that rewrites history.
#[derive(Args, Debug, Clone, Default)]
pub struct RewriteArgs {
    /// Branch to rewrite (default: `branch` from config, then `main`).
    /// Other refs keep pointing at the old commits.
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Show what would change without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Load at most this many commits; older ones are kept as they are
    #[arg(long, value_name = "N")]
    pub max_commits: Option<usize>,

    /// Rehash with this many workers (default from config)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Retries when the branch moves during the rewrite (default from config)
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Do not record refs/reweave/ backup refs
    #[arg(long)]
    pub no_backup: bool,
}

/// Which signature dates are changed.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateTargetArg {
    Author,
    Committer,
    #[default]
    Both,
}

impl From<DateTargetArg> for DateTarget {
    fn from(arg: DateTargetArg) -> Self {
        match arg {
            DateTargetArg::Author => DateTarget::Author,
            DateTargetArg::Committer => DateTarget::Committer,
            DateTargetArg::Both => DateTarget::Both,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the commits of a branch
    #[command(
        name = "log",
        long_about = "List the commits of a branch, newest first.\n\n\
            Shows each commit's short id, author date, author and subject. Use the \
            ids (or any prefix of at least four characters) with `reweave edit` \
            and `--commit`.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Show the history of the configured branch
    reweave log

    # The last 20 commits of another branch, as JSON
    reweave log --branch release -n 20 --json"
    )]
    Log {
        /// Branch to list (default: `branch` from config, then `main`)
        #[arg(short, long)]
        branch: Option<String>,

        /// Show at most this many commits
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print commits as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change the fields of a single commit
    #[command(
        name = "edit",
        long_about = "Change the author, committer, date or message of one commit.\n\n\
            Every descendant of the commit on the branch gets a new id; the tree \
            and the merge structure are preserved. The branch is moved with a single \
            atomic update.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Fix the author of one commit
    reweave edit 1a2b3c4 --author-name 'Ada Lovelace' --author-email ada@example.com

    # Reword a commit and move it to a new date, previewing first
    reweave edit 1a2b3c4 --message 'Fix parser' --date '2024-03-01 12:00:00 +0100' --dry-run"
    )]
    Edit {
        /// Commit to edit (id, prefix, or any revision git understands)
        commit: String,

        /// New author name
        #[arg(long)]
        author_name: Option<String>,

        /// New author email
        #[arg(long)]
        author_email: Option<String>,

        /// New committer name
        #[arg(long)]
        committer_name: Option<String>,

        /// New committer email
        #[arg(long)]
        committer_email: Option<String>,

        /// New author and committer date
        #[arg(long, conflicts_with_all = ["author_date", "committer_date"])]
        date: Option<String>,

        /// New author date
        #[arg(long)]
        author_date: Option<String>,

        /// New committer date
        #[arg(long)]
        committer_date: Option<String>,

        /// New commit message
        #[arg(short, long)]
        message: Option<String>,

        #[command(flatten)]
        rewrite: RewriteArgs,
    },

    /// Set the author of many commits
    #[command(
        name = "author",
        long_about = "Set the author name and email of many commits at once.\n\n\
            Without filters every commit on the branch is changed. Filter by the \
            current author email with --match-email, or pick commits with --commit.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Replace an old identity everywhere
    reweave author --name 'Ada Lovelace' --email ada@example.com --match-email ada@old.example

    # Only two commits
    reweave author --name 'Ada Lovelace' --email ada@example.com --commit 1a2b3c4 --commit 5d6e7f8"
    )]
    Author {
        #[command(flatten)]
        identity: IdentityArgs,

        #[command(flatten)]
        rewrite: RewriteArgs,
    },

    /// Set the committer of many commits
    #[command(
        name = "committer",
        long_about = "Set the committer name and email of many commits at once.\n\n\
            Filters work as for `reweave author`, matching on the current committer email."
    )]
    Committer {
        #[command(flatten)]
        identity: IdentityArgs,

        #[command(flatten)]
        rewrite: RewriteArgs,
    },

    /// Spread commit dates over an interval
    #[command(
        name = "dates",
        long_about = "Assign every selected commit a date inside [start, end].\n\n\
            The date is derived from the commit's original id, so running the same \
            command twice on the same history gives the same result.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Spread the whole branch over March 2024
    reweave dates --start 2024-03-01T09:00:00Z --end 2024-03-31T18:00:00Z

    # Only author dates of selected commits
    reweave dates --start '2024-03-01 09:00:00' --end '2024-03-02 18:00:00' --apply-to author --commit 1a2b3c4"
    )]
    Dates {
        /// Start of the interval
        #[arg(long)]
        start: String,

        /// End of the interval
        #[arg(long)]
        end: String,

        /// Which dates to change
        #[arg(long, value_enum, default_value_t = DateTargetArg::Both)]
        apply_to: DateTargetArg,

        /// Only these commits (repeatable)
        #[arg(long = "commit", value_name = "COMMIT")]
        commits: Vec<String>,

        #[command(flatten)]
        rewrite: RewriteArgs,
    },

    /// Apply a TOML rule file
    #[command(
        name = "rewrite",
        long_about = "Rewrite history with an ordered list of rules from a TOML file.\n\n\
            Each [[rule]] has a `when` matcher and a `set` table. Rules are tried in \
            order and the first match applies. All rules are validated before any \
            history is read.",
        after_help = "\
RULE FILE EXAMPLE:
    [[rule]]
    name = \"fix work email\"
    when = { kind = \"author_email\", email = \"ada@old.example\" }
    set = { author_email = \"ada@example.com\", committer_email = \"ada@example.com\" }

    [[rule]]
    when = { kind = \"message_contains\", text = \"WIP\" }
    set = { message = \"Work in progress\" }"
    )]
    Rewrite {
        /// Path to the rule file
        #[arg(long, short = 'r')]
        rules: PathBuf,

        #[command(flatten)]
        rewrite: RewriteArgs,
    },

    /// Undo the last rewrite of a branch
    #[command(
        name = "restore",
        long_about = "Point a branch back at its tip from before the last rewrite.\n\n\
            Uses refs/reweave/original/<branch>. Refuses if the branch moved since \
            the rewrite unless --force is given."
    )]
    Restore {
        /// Branch to restore (default: `branch` from config, then `main`)
        #[arg(short, long)]
        branch: Option<String>,

        /// Restore even if the branch moved since the rewrite
        #[arg(long)]
        force: bool,

        /// Show what would happen without moving the branch
        #[arg(long)]
        dry_run: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Get, set, or list configuration values
    #[command(
        name = "config",
        long_about = "Get, set, or list configuration values.\n\n\
            Repository settings live in <git-common-dir>/reweave/config.toml, user \
            settings in ~/.reweave/config.toml. Repository settings win.",
        after_help = "\
WORKFLOW EXAMPLES:
    # List effective values
    reweave config list

    # Rewrite `trunk` by default in this repository
    reweave config set branch trunk

    # Never prompt
    reweave config set --global interactive false"
    )]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        long_about = "Generate shell completion scripts for tab-completion.\n\n\
            Outputs a completion script for the specified shell. Add the output \
            to your shell's configuration to enable tab-completion for reweave commands.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Bash (add to ~/.bashrc)
    reweave completion bash >> ~/.bashrc

    # Zsh (add to ~/.zshrc)
    reweave completion zsh >> ~/.zshrc

    # Fish
    reweave completion fish > ~/.config/fish/completions/reweave.fish

    # PowerShell
    reweave completion powershell >> $PROFILE"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Identity and filters for `author` / `committer`.
#[derive(Args, Debug, Clone)]
pub struct IdentityArgs {
    /// New name
    #[arg(long)]
    pub name: String,

    /// New email
    #[arg(long)]
    pub email: String,

    /// Only commits whose current email matches (case-insensitive)
    #[arg(long, value_name = "EMAIL")]
    pub match_email: Option<String>,

    /// Only these commits (repeatable)
    #[arg(long = "commit", value_name = "COMMIT")]
    pub commits: Vec<String>,
}

/// Config subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Value to set
        value: String,
        /// Write the user config instead of the repository config
        #[arg(long)]
        global: bool,
    },
    /// List all configuration values
    List,
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}
