//! core::rules
//!
//! Declarative rewrite rules.
//!
//! # Overview
//!
//! A [`RewriteRule`] pairs a predicate ([`Matcher`]) with a field
//! transformation ([`FieldPatch`]). A [`RuleSet`] is an ordered list of rules
//! where the first matching rule wins and a commit that matches nothing is
//! copied unchanged.
//!
//! Rules are plain data. Evaluating one never touches a repository, so the
//! same rule set applied to the same commit always yields the same result.
//!
//! # File Format
//!
//! ```toml
//! [[rule]]
//! name = "fix work email"
//! when = { kind = "author_email", email = "me@old.example" }
//! set = { author_email = "me@new.example" }
//!
//! [[rule]]
//! when = { kind = "message_contains", text = "WIP" }
//! set = { date_spread = { start = "2024-01-01 09:00:00 +0000", end = "2024-01-31 18:00:00 +0000" } }
//! ```

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::commit::{parse_date, CommitNode, Signature};

/// Errors from loading or validating rules.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A name field would become empty or contain forbidden characters.
    #[error("rule {rule}: invalid {field} '{value}': {reason}")]
    InvalidName {
        /// Label of the rule
        rule: String,
        /// Patch field holding the name
        field: &'static str,
        /// The rejected value
        value: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// An email field is not `local@domain` syntax.
    #[error("rule {rule}: invalid {field} '{value}': expected local@domain")]
    InvalidEmail {
        /// Label of the rule
        rule: String,
        /// Patch field holding the email
        field: &'static str,
        /// The rejected value
        value: String,
    },

    /// A date spread whose end precedes its start.
    #[error("rule {rule}: date spread ends ({end}) before it starts ({start})")]
    InvalidSpread {
        /// Label of the rule
        rule: String,
        /// Start of the spread, as written
        start: String,
        /// End of the spread, as written
        end: String,
    },

    /// A commit id selector that is not a hex prefix.
    #[error("rule {rule}: '{prefix}' is not a commit id or id prefix (at least 4 hex characters)")]
    InvalidIdPrefix {
        /// Label of the rule
        rule: String,
        /// The rejected selector
        prefix: String,
    },

    /// A rule that sets nothing.
    #[error("rule {rule}: sets no fields")]
    EmptyPatch {
        /// Label of the rule
        rule: String,
    },

    /// A rule would re-encode text of a commit stored in a legacy encoding.
    #[error("rule {rule}: commit {commit} is encoded as {encoding}; only its dates can be rewritten")]
    LegacyEncoding {
        /// Label of the rule
        rule: String,
        /// The matched commit
        commit: String,
        /// Value of the commit's `encoding` header
        encoding: String,
    },

    /// The rules file could not be read.
    #[error("failed to read rules file '{path}': {source}")]
    ReadError {
        /// Path of the file
        path: std::path::PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The rules file is not valid TOML or has unknown keys.
    #[error("failed to parse rules file '{path}': {message}")]
    ParseError {
        /// Path of the file
        path: std::path::PathBuf,
        /// Parser message
        message: String,
    },
}

/// Which signature(s) a date transformation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateTarget {
    Author,
    Committer,
    #[default]
    Both,
}

impl DateTarget {
    fn author(self) -> bool {
        matches!(self, DateTarget::Author | DateTarget::Both)
    }

    fn committer(self) -> bool {
        matches!(self, DateTarget::Committer | DateTarget::Both)
    }
}

/// Predicate selecting the commits a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Matcher {
    /// Every commit.
    #[default]
    Any,
    /// Commits whose id starts with one of the given prefixes.
    Ids { ids: Vec<String> },
    /// Author email, compared case-insensitively.
    AuthorEmail { email: String },
    /// Author name, exact.
    AuthorName { name: String },
    /// Committer email, compared case-insensitively.
    CommitterEmail { email: String },
    /// Committer name, exact.
    CommitterName { name: String },
    /// Message contains the given text.
    MessageContains { text: String },
    /// All nested matchers match (vacuously true when empty).
    AllOf { matchers: Vec<Matcher> },
    /// At least one nested matcher matches.
    AnyOf { matchers: Vec<Matcher> },
}

impl Matcher {
    /// Evaluate against a commit.
    pub fn matches(&self, commit: &CommitNode) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Ids { ids } => ids.iter().any(|prefix| {
                commit
                    .id
                    .as_str()
                    .starts_with(prefix.to_ascii_lowercase().as_str())
            }),
            Matcher::AuthorEmail { email } => commit.author.email.eq_ignore_ascii_case(email),
            Matcher::AuthorName { name } => commit.author.name == *name,
            Matcher::CommitterEmail { email } => commit.committer.email.eq_ignore_ascii_case(email),
            Matcher::CommitterName { name } => commit.committer.name == *name,
            Matcher::MessageContains { text } => commit.message.contains(text.as_str()),
            Matcher::AllOf { matchers } => matchers.iter().all(|m| m.matches(commit)),
            Matcher::AnyOf { matchers } => matchers.iter().any(|m| m.matches(commit)),
        }
    }

    fn validate(&self, rule: &str) -> Result<(), RuleError> {
        match self {
            Matcher::Ids { ids } => {
                for prefix in ids {
                    if prefix.len() < 4 || prefix.len() > 64 || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(RuleError::InvalidIdPrefix {
                            rule: rule.to_string(),
                            prefix: prefix.clone(),
                        });
                    }
                }
                Ok(())
            }
            Matcher::AllOf { matchers } | Matcher::AnyOf { matchers } => {
                matchers.iter().try_for_each(|m| m.validate(rule))
            }
            _ => Ok(()),
        }
    }
}

/// Spread dates over an interval, deterministically per commit.
///
/// A commit's new date is `start + (h mod (span + 1))` seconds, where `h` is
/// derived from the commit's original id and `span` is the interval length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateSpread {
    #[serde(with = "date_format")]
    pub start: DateTime<FixedOffset>,
    #[serde(with = "date_format")]
    pub end: DateTime<FixedOffset>,
    #[serde(default)]
    pub apply_to: DateTarget,
}

impl DateSpread {
    /// Date assigned to the commit with the given (original) id.
    pub fn date_for(&self, commit: &CommitNode) -> DateTime<FixedOffset> {
        let span = (self.end - self.start).num_seconds();
        if span <= 0 {
            return self.start;
        }
        // The first 16 hex digits of the id are uniformly distributed.
        let seed = u64::from_str_radix(&commit.id.as_str()[..16], 16).unwrap_or(0);
        let offset = seed % (span as u64 + 1);
        self.start + Duration::seconds(offset as i64)
    }
}

/// Field assignments made by a rule. Unset fields are left alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_date_format")]
    pub author_date: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_date_format")]
    pub committer_date: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_spread: Option<DateSpread>,
}

impl FieldPatch {
    /// Whether the patch assigns nothing.
    pub fn is_empty(&self) -> bool {
        self == &FieldPatch::default()
    }

    /// Produce the transformed copy of `commit`.
    ///
    /// The id is left as-is; rehashing is the caller's job.
    pub fn apply(&self, commit: &CommitNode) -> CommitNode {
        let mut out = commit.clone();
        apply_identity(&mut out.author, &self.author_name, &self.author_email);
        apply_identity(&mut out.committer, &self.committer_name, &self.committer_email);

        if let Some(spread) = &self.date_spread {
            let when = spread.date_for(commit);
            if spread.apply_to.author() {
                out.author.when = when;
            }
            if spread.apply_to.committer() {
                out.committer.when = when;
            }
        }
        if let Some(when) = self.author_date {
            out.author.when = when;
        }
        if let Some(when) = self.committer_date {
            out.committer.when = when;
        }
        if let Some(message) = &self.message {
            out.message = normalize_message(message);
        }
        out
    }

    fn validate(&self, rule: &str) -> Result<(), RuleError> {
        let names = [
            ("author name", &self.author_name),
            ("committer name", &self.committer_name),
        ];
        for (field, value) in names {
            if let Some(value) = value {
                validate_name(value).map_err(|reason| RuleError::InvalidName {
                    rule: rule.to_string(),
                    field,
                    value: value.clone(),
                    reason,
                })?;
            }
        }

        let emails = [
            ("author email", &self.author_email),
            ("committer email", &self.committer_email),
        ];
        for (field, value) in emails {
            if let Some(value) = value {
                if !validate_email(value) {
                    return Err(RuleError::InvalidEmail {
                        rule: rule.to_string(),
                        field,
                        value: value.clone(),
                    });
                }
            }
        }

        if let Some(spread) = &self.date_spread {
            if spread.end < spread.start {
                return Err(RuleError::InvalidSpread {
                    rule: rule.to_string(),
                    start: spread.start.to_rfc3339(),
                    end: spread.end.to_rfc3339(),
                });
            }
        }
        Ok(())
    }
}

fn apply_identity(sig: &mut Signature, name: &Option<String>, email: &Option<String>) {
    if let Some(name) = name {
        sig.name = name.trim().to_string();
    }
    if let Some(email) = email {
        sig.email = email.trim().to_string();
    }
}

/// Messages always end with exactly the newlines the user gave, plus one if none.
fn normalize_message(message: &str) -> String {
    if message.ends_with('\n') {
        message.to_string()
    } else {
        format!("{message}\n")
    }
}

/// One rewrite rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteRule {
    /// Optional label used in reports and errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Commits the rule applies to (defaults to every commit)
    #[serde(default)]
    pub when: Matcher,
    /// Fields the rule assigns
    pub set: FieldPatch,
}

impl RewriteRule {
    /// Create a rule.
    pub fn new(when: Matcher, set: FieldPatch) -> Self {
        Self {
            name: None,
            when,
            set,
        }
    }

    /// Attach a label.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Human label: the name if present, else `#<index>`.
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => format!("#{index} ({name})"),
            None => format!("#{index}"),
        }
    }
}

/// Ordered rule list; first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default, rename = "rule")]
    pub rules: Vec<RewriteRule>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule set with a single rule.
    pub fn single(rule: RewriteRule) -> Self {
        Self { rules: vec![rule] }
    }

    /// Append a rule (lowest priority).
    pub fn push(&mut self, rule: RewriteRule) {
        self.rules.push(rule);
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse a TOML rules document.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load and validate a TOML rules file.
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path).map_err(|e| RuleError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let rules = Self::from_toml_str(&content).map_err(|e| RuleError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        rules.validate()?;
        Ok(rules)
    }

    /// Validate every rule. Fails on the first invalid one.
    pub fn validate(&self) -> Result<(), RuleError> {
        for (index, rule) in self.rules.iter().enumerate() {
            let label = rule.label(index);
            if rule.set.is_empty() {
                return Err(RuleError::EmptyPatch { rule: label });
            }
            rule.when.validate(&label)?;
            rule.set.validate(&label)?;
        }
        Ok(())
    }

    /// The first rule matching `commit`, with its index.
    pub fn first_match(&self, commit: &CommitNode) -> Option<(usize, &RewriteRule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.when.matches(commit))
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, rule) in self.rules.iter().enumerate() {
            writeln!(f, "{}: {:?} -> {:?}", rule.label(index), rule.when, rule.set)?;
        }
        Ok(())
    }
}

/// Validate a person name as Git stores it.
///
/// Returns the reason on failure.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("name cannot be empty");
    }
    if name.contains(&['<', '>'][..]) {
        return Err("name cannot contain '<' or '>'");
    }
    if name.contains(&['\n', '\r', '\0'][..]) {
        return Err("name cannot contain line breaks or NUL");
    }
    Ok(())
}

/// Basic RFC 5322 `local@domain` check (dot-atom local part, hostname domain).
pub fn validate_email(email: &str) -> bool {
    let Some((local, domain)) = email.trim().rsplit_once('@') else {
        return false;
    };

    let atext = |c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~".contains(c) || !c.is_ascii();
    let local_ok = !local.is_empty()
        && local.split('.').all(|atom| !atom.is_empty() && atom.chars().all(atext));

    let label_ok = |label: &str| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || (!c.is_ascii() && c.is_alphanumeric()))
    };
    let domain_ok = !domain.is_empty() && domain.split('.').all(label_ok);

    local_ok && domain_ok
}

mod date_format {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(when: &DateTime<FixedOffset>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&when.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<FixedOffset>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_date(&raw).map_err(serde::de::Error::custom)
    }
}

mod opt_date_format {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(when: &Option<DateTime<FixedOffset>>, s: S) -> Result<S::Ok, S::Error> {
        match when {
            Some(when) => super::date_format::serialize(when, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<FixedOffset>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|raw| super::parse_date(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Oid;

    fn commit(id: &str, email: &str, message: &str) -> CommitNode {
        let sig = Signature::from_raw("Old Name", email, 1_700_000_000, 60).unwrap();
        CommitNode {
            id: Oid::new(id).unwrap(),
            tree: Oid::new("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap(),
            parents: vec![],
            author: sig.clone(),
            committer: sig,
            message: message.to_string(),
            raw: Default::default(),
        }
    }

    fn sample() -> CommitNode {
        commit(
            "0123456789abcdef0123456789abcdef01234567",
            "old@example.com",
            "Add feature\n",
        )
    }

    mod matcher {
        use super::*;

        #[test]
        fn any_matches_everything() {
            assert!(Matcher::Any.matches(&sample()));
        }

        #[test]
        fn email_is_case_insensitive() {
            let m = Matcher::AuthorEmail {
                email: "OLD@Example.com".into(),
            };
            assert!(m.matches(&sample()));
            let m = Matcher::CommitterEmail {
                email: "other@example.com".into(),
            };
            assert!(!m.matches(&sample()));
        }

        #[test]
        fn ids_match_by_prefix() {
            let m = Matcher::Ids {
                ids: vec!["0123ABCD".into(), "0123456".into()],
            };
            assert!(m.matches(&sample()));
            let m = Matcher::Ids {
                ids: vec!["fedc".into()],
            };
            assert!(!m.matches(&sample()));
        }

        #[test]
        fn combinators() {
            let email = Matcher::AuthorEmail {
                email: "old@example.com".into(),
            };
            let wip = Matcher::MessageContains { text: "WIP".into() };

            let all = Matcher::AllOf {
                matchers: vec![email.clone(), wip.clone()],
            };
            let any = Matcher::AnyOf {
                matchers: vec![email, wip],
            };
            assert!(!all.matches(&sample()));
            assert!(any.matches(&sample()));
            assert!(Matcher::AllOf { matchers: vec![] }.matches(&sample()));
            assert!(!Matcher::AnyOf { matchers: vec![] }.matches(&sample()));
        }
    }

    mod patch {
        use super::*;

        #[test]
        fn sets_only_requested_fields() {
            let patch = FieldPatch {
                author_email: Some("new@example.com".into()),
                ..Default::default()
            };
            let original = sample();
            let out = patch.apply(&original);
            assert_eq!(out.author.email, "new@example.com");
            assert_eq!(out.author.name, original.author.name);
            assert_eq!(out.committer, original.committer);
            assert_eq!(out.message, original.message);
            assert_eq!(out.id, original.id);
        }

        #[test]
        fn message_gets_trailing_newline() {
            let patch = FieldPatch {
                message: Some("Reworded".into()),
                ..Default::default()
            };
            assert_eq!(patch.apply(&sample()).message, "Reworded\n");
        }

        #[test]
        fn explicit_date_overrides_spread() {
            let fixed = parse_date("2020-01-01 00:00:00 +0000").unwrap();
            let patch = FieldPatch {
                author_date: Some(fixed),
                date_spread: Some(DateSpread {
                    start: parse_date("2024-01-01 00:00:00 +0000").unwrap(),
                    end: parse_date("2024-02-01 00:00:00 +0000").unwrap(),
                    apply_to: DateTarget::Both,
                }),
                ..Default::default()
            };
            let out = patch.apply(&sample());
            assert_eq!(out.author.when, fixed);
            assert_ne!(out.committer.when, fixed);
        }

        #[test]
        fn spread_is_deterministic_and_in_range() {
            let spread = DateSpread {
                start: parse_date("2024-01-01 00:00:00 +0000").unwrap(),
                end: parse_date("2024-01-02 00:00:00 +0000").unwrap(),
                apply_to: DateTarget::Author,
            };
            let a = sample();
            let b = commit("fedcba9876543210fedcba9876543210fedcba98", "x@example.com", "m\n");

            for c in [&a, &b] {
                let when = spread.date_for(c);
                assert!(when >= spread.start && when <= spread.end);
                assert_eq!(when, spread.date_for(c));
            }
            assert_ne!(spread.date_for(&a), spread.date_for(&b));
        }

        #[test]
        fn zero_width_spread_uses_start() {
            let start = parse_date("2024-01-01 00:00:00 +0000").unwrap();
            let spread = DateSpread {
                start,
                end: start,
                apply_to: DateTarget::Committer,
            };
            let out = FieldPatch {
                date_spread: Some(spread),
                ..Default::default()
            }
            .apply(&sample());
            assert_eq!(out.committer.when, start);
            assert_eq!(out.author.when, sample().author.when);
        }
    }

    mod validation {
        use super::*;

        fn set(patch: FieldPatch) -> RuleSet {
            RuleSet::single(RewriteRule::new(Matcher::Any, patch))
        }

        #[test]
        fn valid_emails() {
            for email in ["a@b", "first.last@example.com", "x+tag@sub.example.org", "o'neil@ex-ample.io"] {
                assert!(validate_email(email), "{email}");
            }
        }

        #[test]
        fn invalid_emails() {
            for email in ["", "plain", "@example.com", "a@", "a..b@example.com", ".a@example.com", "a b@example.com", "a@-example.com", "a@example..com", "<a@b>"] {
                assert!(!validate_email(email), "{email}");
            }
        }

        #[test]
        fn names() {
            assert!(validate_name("Ada Lovelace").is_ok());
            assert!(validate_name("").is_err());
            assert!(validate_name("   ").is_err());
            assert!(validate_name("Ada <ada>").is_err());
            assert!(validate_name("Ada\nLovelace").is_err());
        }

        #[test]
        fn rejects_bad_email_in_patch() {
            let rules = set(FieldPatch {
                committer_email: Some("not-an-email".into()),
                ..Default::default()
            });
            assert!(matches!(rules.validate(), Err(RuleError::InvalidEmail { field: "committer email", .. })));
        }

        #[test]
        fn rejects_empty_name() {
            let rules = set(FieldPatch {
                author_name: Some(String::new()),
                ..Default::default()
            });
            assert!(matches!(rules.validate(), Err(RuleError::InvalidName { .. })));
        }

        #[test]
        fn rejects_inverted_spread() {
            let rules = set(FieldPatch {
                date_spread: Some(DateSpread {
                    start: parse_date("2024-02-01 00:00:00 +0000").unwrap(),
                    end: parse_date("2024-01-01 00:00:00 +0000").unwrap(),
                    apply_to: DateTarget::Both,
                }),
                ..Default::default()
            });
            assert!(matches!(rules.validate(), Err(RuleError::InvalidSpread { .. })));
        }

        #[test]
        fn rejects_empty_patch_and_bad_prefix() {
            assert!(matches!(set(FieldPatch::default()).validate(), Err(RuleError::EmptyPatch { .. })));

            let rules = RuleSet::single(RewriteRule::new(
                Matcher::AnyOf {
                    matchers: vec![Matcher::Ids { ids: vec!["xyz1".into()] }],
                },
                FieldPatch {
                    message: Some("m".into()),
                    ..Default::default()
                },
            ));
            assert!(matches!(rules.validate(), Err(RuleError::InvalidIdPrefix { .. })));
        }

        #[test]
        fn error_names_the_rule() {
            let rules = RuleSet::single(
                RewriteRule::new(
                    Matcher::Any,
                    FieldPatch {
                        author_email: Some("bad".into()),
                        ..Default::default()
                    },
                )
                .named("fix email"),
            );
            let message = rules.validate().unwrap_err().to_string();
            assert!(message.contains("#0 (fix email)"), "{message}");
        }
    }

    mod rule_set {
        use super::*;

        #[test]
        fn first_match_wins() {
            let mut rules = RuleSet::new();
            rules.push(RewriteRule::new(
                Matcher::MessageContains { text: "feature".into() },
                FieldPatch {
                    message: Some("first".into()),
                    ..Default::default()
                },
            ));
            rules.push(RewriteRule::new(
                Matcher::Any,
                FieldPatch {
                    message: Some("second".into()),
                    ..Default::default()
                },
            ));
            let (index, rule) = rules.first_match(&sample()).unwrap();
            assert_eq!(index, 0);
            assert_eq!(rule.set.message.as_deref(), Some("first"));
        }

        #[test]
        fn no_match() {
            let rules = RuleSet::single(RewriteRule::new(
                Matcher::AuthorName { name: "Nobody".into() },
                FieldPatch {
                    message: Some("x".into()),
                    ..Default::default()
                },
            ));
            assert!(rules.first_match(&sample()).is_none());
        }

        #[test]
        fn parses_toml() {
            let rules = RuleSet::from_toml_str(
                r#"
                [[rule]]
                name = "fix email"
                when = { kind = "author_email", email = "old@example.com" }
                set = { author_email = "new@example.com", author_date = "2024-03-01 12:00:00 +0100" }

                [[rule]]
                set = { date_spread = { start = "2024-01-01T00:00:00Z", end = "2024-01-31T00:00:00Z", apply_to = "committer" } }
                "#,
            )
            .unwrap();

            assert_eq!(rules.len(), 2);
            assert_eq!(rules.rules[0].name.as_deref(), Some("fix email"));
            assert_eq!(
                rules.rules[0].set.author_date.unwrap().to_rfc3339(),
                "2024-03-01T12:00:00+01:00"
            );
            assert_eq!(rules.rules[1].when, Matcher::Any);
            assert_eq!(
                rules.rules[1].set.date_spread.as_ref().unwrap().apply_to,
                DateTarget::Committer
            );
            assert!(rules.validate().is_ok());
        }

        #[test]
        fn rejects_unknown_fields() {
            let result = RuleSet::from_toml_str(
                r#"
                [[rule]]
                set = { author_mail = "x@example.com" }
                "#,
            );
            assert!(result.is_err());
        }

        #[test]
        fn load_from_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("rules.toml");
            std::fs::write(
                &path,
                "[[rule]]\nwhen = { kind = \"committer_name\", name = \"Bot\" }\nset = { committer_name = \"Release Bot\" }\n",
            )
            .unwrap();
            let rules = RuleSet::load(&path).unwrap();
            assert_eq!(rules.len(), 1);

            let missing = RuleSet::load(&dir.path().join("missing.toml"));
            assert!(matches!(missing, Err(RuleError::ReadError { .. })));
        }
    }
}
