//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Content-addressed object identifier (SHA-1 or SHA-256 hex)
//! - [`RefName`] - Validated Git reference name
//!
//! # Validation
//!
//! These types enforce validity at construction time. A rule file or CLI
//! argument carrying a malformed id or branch name is rejected before any
//! history is loaded.
//!
//! # Examples
//!
//! ```
//! use reweave::core::types::{BranchName, Oid, RefName};
//!
//! let branch = BranchName::new("main").unwrap();
//! let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! let refname = RefName::for_branch(&branch);
//! assert_eq!(refname.as_str(), "refs/heads/main");
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! # let _ = oid;
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),
}

/// Namespace under which reweave records the pre-rewrite tip of a branch.
pub const ORIGINAL_REF_PREFIX: &str = "refs/reweave/original/";

/// Namespace under which reweave records the tip it installed.
pub const REWRITTEN_REF_PREFIX: &str = "refs/reweave/rewritten/";

/// Characters Git never allows in a refname (see `git check-ref-format`).
const FORBIDDEN_REF_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];

/// Check the refname rules shared by branch names and full ref names.
///
/// Returns a human-readable reason on failure; callers wrap it in the
/// appropriate [`TypeError`] variant.
fn check_refname_rules(name: &str, what: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{what} cannot be empty"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(format!("{what} cannot start or end with '/'"));
    }
    if name.ends_with(".lock") {
        return Err(format!("{what} cannot end with '.lock'"));
    }
    for pattern in ["..", "@{", "//"] {
        if name.contains(pattern) {
            return Err(format!("{what} cannot contain '{pattern}'"));
        }
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_REF_CHARS.contains(c)) {
        return Err(format!("{what} cannot contain '{c}'"));
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err(format!("{what} cannot contain control characters"));
    }
    for component in name.split('/') {
        if component.starts_with('.') {
            return Err("path component cannot start with '.'".to_string());
        }
        if component.ends_with(".lock") {
            return Err("path component cannot end with '.lock'".to_string());
        }
    }
    Ok(())
}

/// A validated Git branch name (the short form, e.g. `main`).
///
/// # Example
///
/// ```
/// use reweave::core::types::BranchName;
///
/// let name = BranchName::new("release/2.x").unwrap();
/// assert_eq!(name.as_str(), "release/2.x");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("-flag").is_err());
/// assert!(BranchName::new("@").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name == "@" {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be '@' (reserved)".into(),
            ));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }
        check_refname_rules(&name, "branch name").map_err(TypeError::InvalidBranchName)?;
        Ok(Self(name))
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A content-addressed object identifier.
///
/// Either 40 hex characters (SHA-1 object format) or 64 (SHA-256).
/// Always stored lowercase so that equality is textual equality.
///
/// # Example
///
/// ```
/// use reweave::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id, normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a 40 or 64 char hex id.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(Self(oid))
    }

    /// Build an id from a SHA-1 digest.
    pub fn from_sha1(digest: [u8; 20]) -> Self {
        Self(hex::encode(digest))
    }

    /// Build an id from a SHA-256 digest.
    pub fn from_sha256(digest: [u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    /// Abbreviated form: the first `len` characters (or the whole id).
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated, fully qualified Git reference name.
///
/// # Example
///
/// ```
/// use reweave::core::types::{BranchName, RefName};
///
/// let branch = BranchName::new("main").unwrap();
/// assert_eq!(RefName::for_branch(&branch).as_str(), "refs/heads/main");
/// assert_eq!(
///     RefName::for_original(&branch).as_str(),
///     "refs/reweave/original/main"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_refname_rules(&name, "ref name").map_err(TypeError::InvalidRefName)?;
        Ok(Self(name))
    }

    /// `refs/heads/<branch>`.
    pub fn for_branch(branch: &BranchName) -> Self {
        Self(format!("refs/heads/{}", branch.as_str()))
    }

    /// Backup ref holding the tip a branch had before its last rewrite.
    pub fn for_original(branch: &BranchName) -> Self {
        Self(format!("{ORIGINAL_REF_PREFIX}{}", branch.as_str()))
    }

    /// Backup ref holding the tip installed by the last rewrite.
    pub fn for_rewritten(branch: &BranchName) -> Self {
        Self(format!("{REWRITTEN_REF_PREFIX}{}", branch.as_str()))
    }

    /// Check if this ref is a branch ref.
    pub fn is_branch_ref(&self) -> bool {
        self.0.starts_with("refs/heads/")
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
