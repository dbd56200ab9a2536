//! core::commit
//!
//! Commit nodes, identity signatures and content addressing.
//!
//! # Object Format
//!
//! A commit is hashed exactly the way Git hashes it: the header
//! `commit <len>\0` followed by the body
//!
//! ```text
//! tree <tree>
//! parent <parent>        (zero or more, in order)
//! author <name> <<email>> <unix-seconds> <+hhmm>
//! committer <name> <<email>> <unix-seconds> <+hhmm>
//!
//! <message>
//! ```
//!
//! Commits read from a repository are decoded from their raw bytes
//! ([`CommitNode::decode`]). Whatever the typed fields cannot express is kept
//! in [`RawParts`] and written back on re-encoding:
//! - headers after `committer` (`encoding`, `mergetag`, ...), verbatim
//! - message bytes that are not valid UTF-8
//! - the exact bytes of each signature line, until its name, email or date
//!   is changed
//!
//! A commit that gets new contents loses its `gpgsig` header, since the
//! signature no longer matches.
//!
//! # Invariants
//!
//! - A [`CommitNode`] is never mutated in place by the rewrite pipeline; every
//!   transformation produces a new value.
//! - `compute_id` is a pure function of the encoded body.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::types::Oid;

/// Errors from parsing commit-related input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    /// A date string matched none of the accepted formats.
    #[error("unrecognized date '{0}' (expected RFC 3339, RFC 2822, 'YYYY-MM-DD HH:MM:SS [+hhmm]' or '@<seconds> <+hhmm>')")]
    InvalidDate(String),

    /// A timezone offset is outside the representable range.
    #[error("invalid timezone offset: {0} minutes")]
    InvalidOffset(i32),

    /// Raw commit bytes that do not follow Git's object format.
    #[error("malformed commit object: {0}")]
    Malformed(String),
}

/// Hash function of the object store's object format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Classic Git object format.
    #[default]
    Sha1,
    /// Git's `extensions.objectFormat = sha256`.
    Sha256,
}

impl HashAlgorithm {
    /// Hash a loose object of the given kind (`"commit"`, `"tree"`, ...).
    pub fn hash_object(self, kind: &str, body: &[u8]) -> Oid {
        let header = format!("{kind} {}\0", body.len());
        match self {
            HashAlgorithm::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(header.as_bytes());
                hasher.update(body);
                Oid::from_sha1(hasher.finalize().into())
            }
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(header.as_bytes());
                hasher.update(body);
                Oid::from_sha256(hasher.finalize().into())
            }
        }
    }
}

/// An identity plus timestamp, as recorded in a commit's author/committer line.
///
/// The timestamp keeps its original UTC offset so that an untouched
/// signature re-encodes byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    /// Display name
    pub name: String,
    /// Email address (without angle brackets)
    pub email: String,
    /// Timestamp with the offset it was recorded in
    pub when: DateTime<FixedOffset>,
    #[serde(skip)]
    raw: Option<RawSignature>,
}

/// A signature line as read, with the values it decoded to.
#[derive(Debug, Clone)]
struct RawSignature {
    name: String,
    email: String,
    when: DateTime<FixedOffset>,
    bytes: Vec<u8>,
}

impl Signature {
    /// Create a signature.
    pub fn new(name: impl Into<String>, email: impl Into<String>, when: DateTime<FixedOffset>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
            raw: None,
        }
    }

    /// Decode the value of an `author` or `committer` header.
    ///
    /// Non-UTF-8 names and emails are decoded lossily; the original bytes are
    /// written back as long as name, email and date stay untouched.
    pub fn decode(bytes: &[u8]) -> Result<Self, CommitError> {
        let malformed = || {
            CommitError::Malformed(format!("bad signature '{}'", String::from_utf8_lossy(bytes)))
        };
        let open = bytes.iter().position(|&b| b == b'<').ok_or_else(malformed)?;
        let close = open + bytes[open..].iter().position(|&b| b == b'>').ok_or_else(malformed)?;
        let name = &bytes[..open];
        let name = name.strip_suffix(b" ").unwrap_or(name);
        let email = &bytes[open + 1..close];
        let when = std::str::from_utf8(&bytes[close + 1..])
            .ok()
            .and_then(|time| parse_git_internal(time.trim()))
            .ok_or_else(malformed)?;

        let mut signature = Self::new(
            String::from_utf8_lossy(name),
            String::from_utf8_lossy(email),
            when,
        );
        signature.raw = Some(RawSignature {
            name: signature.name.clone(),
            email: signature.email.clone(),
            when,
            bytes: bytes.to_vec(),
        });
        Ok(signature)
    }

    /// The bytes written after `author ` / `committer `.
    pub fn encode(&self) -> Vec<u8> {
        match &self.raw {
            Some(raw)
                if raw.name == self.name
                    && raw.email == self.email
                    && raw.when.timestamp() == self.when.timestamp()
                    && raw.when.offset() == self.when.offset() =>
            {
                raw.bytes.clone()
            }
            _ => self.to_string().into_bytes(),
        }
    }

    /// Build a signature from Git's raw representation (seconds + offset minutes).
    pub fn from_raw(
        name: impl Into<String>,
        email: impl Into<String>,
        seconds: i64,
        offset_minutes: i32,
    ) -> Result<Self, CommitError> {
        let offset = FixedOffset::east_opt(offset_minutes * 60)
            .ok_or(CommitError::InvalidOffset(offset_minutes))?;
        let when = offset
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| CommitError::InvalidDate(seconds.to_string()))?;
        Ok(Self::new(name, email, when))
    }

    /// Offset from UTC in minutes.
    pub fn offset_minutes(&self) -> i32 {
        self.when.offset().local_minus_utc() / 60
    }

    /// Git's `<seconds> <+hhmm>` rendering of the timestamp.
    pub fn git_time(&self) -> String {
        let minutes = self.offset_minutes();
        let sign = if minutes < 0 { '-' } else { '+' };
        let minutes = minutes.abs();
        format!(
            "{} {}{:02}{:02}",
            self.when.timestamp(),
            sign,
            minutes / 60,
            minutes % 60
        )
    }
}

// Equality is byte-level: the same instant in a different offset encodes
// differently and therefore hashes differently.
impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.encode() == other.encode()
    }
}

impl Eq for Signature {}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}> {}", self.name, self.email, self.git_time())
    }
}

/// A commit field that a rewrite can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitField {
    AuthorName,
    AuthorEmail,
    AuthorDate,
    CommitterName,
    CommitterEmail,
    CommitterDate,
    Message,
    Parents,
}

impl CommitField {
    /// Stable name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitField::AuthorName => "author_name",
            CommitField::AuthorEmail => "author_email",
            CommitField::AuthorDate => "author_date",
            CommitField::CommitterName => "committer_name",
            CommitField::CommitterEmail => "committer_email",
            CommitField::CommitterDate => "committer_date",
            CommitField::Message => "message",
            CommitField::Parents => "parents",
        }
    }
}

impl std::fmt::Display for CommitField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parts of a commit object the typed fields of [`CommitNode`] do not capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParts {
    /// Headers after `committer`, in order and verbatim, each without its
    /// final newline (continuation lines included)
    pub headers: Vec<Vec<u8>>,
    /// Message bytes that are not valid UTF-8, with the text they decoded to
    message: Option<(String, Vec<u8>)>,
}

impl RawParts {
    /// Value of the first header named `key`.
    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find_map(|line| line.strip_prefix(key.as_bytes())?.strip_prefix(b" "))
    }

    /// The `encoding` header, if the commit declares one other than UTF-8.
    pub fn legacy_encoding(&self) -> Option<String> {
        let encoding = String::from_utf8_lossy(self.header("encoding")?).trim().to_string();
        let utf8 = encoding.eq_ignore_ascii_case("utf-8") || encoding.eq_ignore_ascii_case("utf8");
        (!utf8).then_some(encoding)
    }

    /// Drop `gpgsig` / `gpgsig-sha256`. Returns whether anything was removed.
    pub fn strip_signatures(&mut self) -> bool {
        let before = self.headers.len();
        self.headers.retain(|line| {
            !["gpgsig", "gpgsig-sha256"].iter().any(|key| {
                line.strip_prefix(key.as_bytes())
                    .is_some_and(|rest| rest.first() == Some(&b' '))
            })
        });
        before != self.headers.len()
    }
}

/// A commit in the history graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitNode {
    /// Content-addressed id of this commit
    pub id: Oid,
    /// Root tree of the snapshot
    pub tree: Oid,
    /// Parent ids; order is significant (first parent first)
    pub parents: Vec<Oid>,
    /// Author identity and date
    pub author: Signature,
    /// Committer identity and date
    pub committer: Signature,
    /// Full message, including any trailing newline
    pub message: String,
    /// Bytes preserved from the object this commit was decoded from
    #[serde(skip)]
    pub raw: RawParts,
}

impl CommitNode {
    /// Serialize the commit body in Git's object format.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(256 + self.message.len());
        body.extend_from_slice(b"tree ");
        body.extend_from_slice(self.tree.as_str().as_bytes());
        body.push(b'\n');
        for parent in &self.parents {
            body.extend_from_slice(b"parent ");
            body.extend_from_slice(parent.as_str().as_bytes());
            body.push(b'\n');
        }
        body.extend_from_slice(b"author ");
        body.extend_from_slice(&self.author.encode());
        body.push(b'\n');
        body.extend_from_slice(b"committer ");
        body.extend_from_slice(&self.committer.encode());
        body.push(b'\n');
        for header in &self.raw.headers {
            body.extend_from_slice(header);
            body.push(b'\n');
        }
        body.push(b'\n');
        body.extend_from_slice(self.message_bytes());
        body
    }

    /// Decode a commit body in Git's object format.
    ///
    /// `id` is taken as given; see [`CommitNode::compute_id`] to check it.
    pub fn decode(id: Oid, body: &[u8]) -> Result<Self, CommitError> {
        let (head, message) = match body.windows(2).position(|w| w == b"\n\n") {
            Some(split) => (&body[..split], &body[split + 2..]),
            None => (body.strip_suffix(b"\n").unwrap_or(body), &[][..]),
        };

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut headers: Vec<Vec<u8>> = Vec::new();

        for line in head.split(|&b| b == b'\n') {
            if line.first() == Some(&b' ') {
                let previous = headers.last_mut().ok_or_else(|| {
                    CommitError::Malformed("continuation line without a header".into())
                })?;
                previous.push(b'\n');
                previous.extend_from_slice(line);
                continue;
            }
            let (key, value) = match line.iter().position(|&b| b == b' ') {
                Some(space) => (&line[..space], &line[space + 1..]),
                None => (line, &[][..]),
            };
            match key {
                b"tree" if tree.is_none() => tree = Some(decode_oid(value)?),
                b"parent" if author.is_none() => parents.push(decode_oid(value)?),
                b"author" if author.is_none() => author = Some(Signature::decode(value)?),
                b"committer" if committer.is_none() => committer = Some(Signature::decode(value)?),
                _ => headers.push(line.to_vec()),
            }
        }

        let missing = |what: &str| CommitError::Malformed(format!("commit {} has no {} header", id, what));
        let tree = tree.ok_or_else(|| missing("tree"))?;
        let author = author.ok_or_else(|| missing("author"))?;
        let committer = committer.ok_or_else(|| missing("committer"))?;

        let (text, raw_message) = match std::str::from_utf8(message) {
            Ok(text) => (text.to_string(), None),
            Err(_) => {
                let text = String::from_utf8_lossy(message).into_owned();
                (text.clone(), Some((text, message.to_vec())))
            }
        };
        Ok(Self {
            id,
            tree,
            parents,
            author,
            committer,
            message: text,
            raw: RawParts {
                headers,
                message: raw_message,
            },
        })
    }

    /// Message bytes as they are encoded.
    pub fn message_bytes(&self) -> &[u8] {
        match &self.raw.message {
            Some((text, bytes)) if *text == self.message => bytes,
            _ => self.message.as_bytes(),
        }
    }

    /// Compute the content-addressed id of this commit's current contents.
    pub fn compute_id(&self, algorithm: HashAlgorithm) -> Oid {
        algorithm.hash_object("commit", &self.encode())
    }

    /// Return a copy whose id matches its contents.
    pub fn rehashed(mut self, algorithm: HashAlgorithm) -> Self {
        self.id = self.compute_id(algorithm);
        self
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim_end()
    }

    /// Fields whose values differ between `self` and `other` (ids ignored).
    pub fn changed_fields(&self, other: &CommitNode) -> Vec<CommitField> {
        let mut fields = Vec::new();
        if self.author.name != other.author.name {
            fields.push(CommitField::AuthorName);
        }
        if self.author.email != other.author.email {
            fields.push(CommitField::AuthorEmail);
        }
        if !same_time(&self.author, &other.author) {
            fields.push(CommitField::AuthorDate);
        }
        if self.committer.name != other.committer.name {
            fields.push(CommitField::CommitterName);
        }
        if self.committer.email != other.committer.email {
            fields.push(CommitField::CommitterEmail);
        }
        if !same_time(&self.committer, &other.committer) {
            fields.push(CommitField::CommitterDate);
        }
        if self.message_bytes() != other.message_bytes() {
            fields.push(CommitField::Message);
        }
        if self.parents != other.parents {
            fields.push(CommitField::Parents);
        }
        fields
    }
}

fn decode_oid(value: &[u8]) -> Result<Oid, CommitError> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|hex| Oid::new(hex).ok())
        .ok_or_else(|| {
            CommitError::Malformed(format!("bad object id '{}'", String::from_utf8_lossy(value)))
        })
}

fn same_time(a: &Signature, b: &Signature) -> bool {
    a.when.timestamp() == b.when.timestamp() && a.offset_minutes() == b.offset_minutes()
}

/// Parse a user-supplied date.
///
/// Accepted forms:
/// - RFC 3339 (`2024-03-01T12:00:00+01:00`)
/// - RFC 2822 (`Fri, 1 Mar 2024 12:00:00 +0100`, Git's `%cD`)
/// - `2024-03-01 12:00:00 +0100`
/// - `2024-03-01 12:00:00` (interpreted as UTC)
/// - Git internal `@1709290800 +0100` (the `@` is optional)
pub fn parse_date(input: &str) -> Result<DateTime<FixedOffset>, CommitError> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
        return Ok(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S %z") {
        return Ok(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc().fixed_offset());
    }
    parse_git_internal(input).ok_or_else(|| CommitError::InvalidDate(input.to_string()))
}

fn parse_git_internal(input: &str) -> Option<DateTime<FixedOffset>> {
    let input = input.strip_prefix('@').unwrap_or(input);
    let (seconds, offset) = input.split_once(' ')?;
    let seconds: i64 = seconds.parse().ok()?;
    let (sign, digits) = match offset.as_bytes().first()? {
        b'+' => (1, &offset[1..]),
        b'-' => (-1, &offset[1..]),
        _ => return None,
    };
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;
    offset.timestamp_opt(seconds, 0).single()
}
