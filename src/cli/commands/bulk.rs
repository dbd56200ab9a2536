//! author, committer and dates commands - Change many commits at once

use anyhow::{Context as _, Result};

use super::{run_rewrite, Session};
use crate::cli::args::{IdentityArgs, RewriteArgs};
use crate::core::commit::parse_date;
use crate::core::rules::{DateSpread, DateTarget, FieldPatch, Matcher, RewriteRule, RuleSet};
use crate::core::types::Oid;
use crate::engine::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Author,
    Committer,
}

/// Combine the optional filters into one matcher.
fn selector(commits: &[Oid], email: Option<(Role, &str)>) -> Matcher {
    let mut matchers = Vec::new();
    if !commits.is_empty() {
        matchers.push(Matcher::Ids {
            ids: commits.iter().map(|id| id.as_str().to_string()).collect(),
        });
    }
    if let Some((role, email)) = email {
        let email = email.to_string();
        matchers.push(match role {
            Role::Author => Matcher::AuthorEmail { email },
            Role::Committer => Matcher::CommitterEmail { email },
        });
    }

    match matchers.len() {
        0 => Matcher::Any,
        1 => matchers.remove(0),
        _ => Matcher::AllOf { matchers },
    }
}

fn identity_rule(role: Role, identity: &IdentityArgs, commits: &[Oid]) -> RuleSet {
    let name = Some(identity.name.clone());
    let email = Some(identity.email.clone());
    let (patch, label) = match role {
        Role::Author => (
            FieldPatch {
                author_name: name,
                author_email: email,
                ..FieldPatch::default()
            },
            "change author",
        ),
        Role::Committer => (
            FieldPatch {
                committer_name: name,
                committer_email: email,
                ..FieldPatch::default()
            },
            "change committer",
        ),
    };
    let when = selector(commits, identity.match_email.as_deref().map(|e| (role, e)));
    RuleSet::single(RewriteRule::new(when, patch).named(label))
}

fn run_identity(ctx: &Context, role: Role, identity: &IdentityArgs, args: &RewriteArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let commits = session.resolve_commits(&identity.commits)?;
    run_rewrite(&session, identity_rule(role, identity, &commits), args)
}

/// Set the author of every selected commit.
pub fn author(ctx: &Context, identity: &IdentityArgs, args: &RewriteArgs) -> Result<()> {
    run_identity(ctx, Role::Author, identity, args)
}

/// Set the committer of every selected commit.
pub fn committer(ctx: &Context, identity: &IdentityArgs, args: &RewriteArgs) -> Result<()> {
    run_identity(ctx, Role::Committer, identity, args)
}

fn dates_rule(spread: DateSpread, commits: &[Oid]) -> RuleSet {
    RuleSet::single(
        RewriteRule::new(
            selector(commits, None),
            FieldPatch {
                date_spread: Some(spread),
                ..FieldPatch::default()
            },
        )
        .named("spread dates"),
    )
}

/// Spread the dates of every selected commit over `[start, end]`.
pub fn dates(
    ctx: &Context,
    start: &str,
    end: &str,
    apply_to: DateTarget,
    commits: &[String],
    args: &RewriteArgs,
) -> Result<()> {
    let spread = DateSpread {
        start: parse_date(start).with_context(|| format!("Invalid start date '{}'", start))?,
        end: parse_date(end).with_context(|| format!("Invalid end date '{}'", end))?,
        apply_to,
    };
    let session = Session::open(ctx)?;
    let commits = session.resolve_commits(commits)?;
    run_rewrite(&session, dates_rule(spread, &commits), args)
}
