//! edit command - Change the fields of a single commit

use anyhow::{bail, Context as _, Result};

use super::{run_rewrite, Session};
use crate::cli::args::RewriteArgs;
use crate::core::commit::parse_date;
use crate::core::rules::{FieldPatch, Matcher, RewriteRule, RuleSet};
use crate::core::types::Oid;
use crate::engine::Context;

/// Field values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct EditFields {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    /// Sets both dates
    pub date: Option<String>,
    pub author_date: Option<String>,
    pub committer_date: Option<String>,
    pub message: Option<String>,
}

impl EditFields {
    /// Convert to a patch, parsing dates.
    fn into_patch(self) -> Result<FieldPatch> {
        let parse = |raw: Option<String>| -> Result<_> {
            raw.map(|raw| parse_date(&raw).with_context(|| format!("Invalid date '{}'", raw)))
                .transpose()
        };

        let both = parse(self.date)?;
        let patch = FieldPatch {
            author_name: self.author_name,
            author_email: self.author_email,
            committer_name: self.committer_name,
            committer_email: self.committer_email,
            author_date: parse(self.author_date)?.or(both),
            committer_date: parse(self.committer_date)?.or(both),
            message: self.message,
            date_spread: None,
        };
        if patch.is_empty() {
            bail!("Nothing to change. Pass at least one of --author-name, --author-email, --committer-name, --committer-email, --date, --author-date, --committer-date or --message.");
        }
        Ok(patch)
    }
}

/// The single rule that edits exactly `commit`.
pub(crate) fn edit_rule(commit: &Oid, patch: FieldPatch) -> RuleSet {
    RuleSet::single(
        RewriteRule::new(
            Matcher::Ids {
                ids: vec![commit.as_str().to_string()],
            },
            patch,
        )
        .named(format!("edit {}", commit.short(7))),
    )
}

/// Change the fields of one commit.
pub fn edit(ctx: &Context, commit: &str, fields: EditFields, args: &RewriteArgs) -> Result<()> {
    let patch = fields.into_patch()?;
    let session = Session::open(ctx)?;
    let id = session
        .git
        .resolve_revision(commit)
        .with_context(|| format!("Unknown commit '{}'", commit))?;

    run_rewrite(&session, edit_rule(&id, patch), args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_edit_is_rejected() {
        let err = EditFields::default().into_patch().unwrap_err();
        assert!(err.to_string().contains("Nothing to change"));
    }

    #[test]
    fn date_sets_both_signatures() {
        let patch = EditFields {
            date: Some("2024-03-01 12:00:00 +0100".into()),
            ..EditFields::default()
        }
        .into_patch()
        .unwrap();
        assert_eq!(patch.author_date, patch.committer_date);
        assert_eq!(
            patch.author_date.unwrap().to_rfc3339(),
            "2024-03-01T12:00:00+01:00"
        );
    }

    #[test]
    fn bad_date_is_reported() {
        let err = EditFields {
            author_date: Some("next tuesday".into()),
            ..EditFields::default()
        }
        .into_patch()
        .unwrap_err();
        assert!(err.to_string().contains("next tuesday"));
    }

    #[test]
    fn rule_targets_one_commit() {
        let id = Oid::new("0123456789abcdef0123456789abcdef01234567").unwrap();
        let rules = edit_rule(
            &id,
            FieldPatch {
                message: Some("Reworded".into()),
                ..FieldPatch::default()
            },
        );
        assert!(rules.validate().is_ok());
        assert_eq!(rules.rules[0].name.as_deref(), Some("edit 0123456"));
    }
}
