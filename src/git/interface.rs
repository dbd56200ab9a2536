//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module is the **single doorway** to Git in reweave. All repository
//! reads and writes flow through [`Git`], which returns strong types and
//! normalizes failures into [`GitError`] categories.
//!
//! # Object Writes
//!
//! Rewritten commits are encoded by [`CommitNode::encode`] and written to the
//! object database as raw bytes. libgit2 hashes exactly those bytes, so the
//! id it reports is the id the rehasher computed; any difference means the
//! encoding and the object format disagree and is surfaced to the caller.
//!
//! # Error Handling
//!
//! - [`GitError::NotARepo`]: Not inside a Git repository
//! - [`GitError::RefNotFound`]: Requested ref does not exist
//! - [`GitError::CasFailed`]: Compare-and-swap precondition failed
//! - [`GitError::UnsupportedObjectFormat`]: Repository uses a hash libgit2 cannot write
//!
//! # Example
//!
//! ```ignore
//! use reweave::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! let oid = git.resolve_ref("refs/heads/main")?;
//! let commit = git.read_commit(&oid)?.expect("tip exists");
//! println!("{} {}", oid.short(7), commit.summary());
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::commit::{CommitNode, HashAlgorithm};
use crate::core::types::{Oid, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Compare-and-swap precondition failed.
    ///
    /// The ref's current value did not match the expected value, so it was
    /// left untouched.
    #[error("CAS failed for {refname}: expected {expected}, found {}", describe(.actual))]
    CasFailed {
        /// The ref being updated
        refname: String,
        /// The expected old value
        expected: String,
        /// The value found, if the ref exists
        actual: Option<Oid>,
    },

    /// Git operation in progress (rebase, merge, etc.).
    #[error("{operation} in progress")]
    OperationInProgress {
        /// The type of operation in progress
        operation: GitState,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// A revision expression did not name a commit.
    #[error("cannot resolve revision '{spec}'")]
    BadRevision {
        /// The expression
        spec: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName {
        /// Description of the problem
        message: String,
    },

    /// A commit object could not be interpreted.
    #[error("malformed commit {oid}: {message}")]
    MalformedCommit {
        /// The commit
        oid: String,
        /// What was wrong
        message: String,
    },

    /// The repository's object format cannot be written through libgit2.
    #[error("unsupported object format '{format}'")]
    UnsupportedObjectFormat {
        /// Value of extensions.objectformat
        format: String,
    },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

fn describe(oid: &Option<Oid>) -> String {
    oid.as_ref()
        .map(|o| o.to_string())
        .unwrap_or_else(|| "<none>".to_string())
}

impl GitError {
    /// Create a GitError from a git2::Error with context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") || context == "HEAD" {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("{} is locked: {}", context, err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::Internal {
            message: err.message().to_string(),
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidRefName(msg) | TypeError::InvalidBranchName(msg) => {
                GitError::InvalidRefName { message: msg }
            }
        }
    }
}

/// Information about a Git repository.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    /// Per-worktree git directory
    pub git_dir: PathBuf,
    /// Shared git directory (refs, objects)
    pub common_dir: PathBuf,
    /// Working directory, `None` for bare repositories
    pub work_dir: Option<PathBuf>,
}

/// In-progress Git operation that makes rewriting unsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitState {
    /// No operation in progress.
    Clean,
    /// Rebase in progress.
    Rebase,
    /// Merge in progress.
    Merge,
    /// Cherry-pick in progress.
    CherryPick,
    /// Revert in progress.
    Revert,
    /// Bisect in progress.
    Bisect,
    /// Apply mailbox in progress.
    ApplyMailbox,
}

impl GitState {
    /// Check if any operation is in progress.
    ///
    /// # Example
    ///
    /// ```
    /// use reweave::git::GitState;
    ///
    /// assert!(!GitState::Clean.is_in_progress());
    /// assert!(GitState::Rebase.is_in_progress());
    /// ```
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, GitState::Clean)
    }

    /// Human-readable name.
    pub fn description(&self) -> &'static str {
        match self {
            GitState::Clean => "clean",
            GitState::Rebase => "rebase",
            GitState::Merge => "merge",
            GitState::CherryPick => "cherry-pick",
            GitState::Revert => "revert",
            GitState::Bisect => "bisect",
            GitState::ApplyMailbox => "apply-mailbox",
        }
    }
}

impl std::fmt::Display for GitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// The Git interface.
///
/// This is the **single point of interaction** with Git. No other module
/// imports `git2`.
///
/// # CAS Semantics
///
/// Ref mutations go through [`Git::update_ref_cas`], which libgit2 performs
/// atomically under the ref's lock file: the update happens only if the ref
/// still holds the expected value at the moment of writing.
pub struct Git {
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening and Info
    // =========================================================================

    /// Open the repository containing `path`.
    ///
    /// Bare repositories are accepted; reweave only touches objects and refs.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    /// - [`GitError::UnsupportedObjectFormat`] for non-SHA-1 repositories
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        let git = Self { repo };
        git.object_format()?;
        Ok(git)
    }

    /// Repository paths.
    pub fn info(&self) -> RepoInfo {
        RepoInfo {
            git_dir: self.repo.path().to_path_buf(),
            common_dir: self.repo.commondir().to_path_buf(),
            work_dir: self.repo.workdir().map(Path::to_path_buf),
        }
    }

    /// Hash function of the repository's objects.
    ///
    /// libgit2 writes SHA-1 objects only, so a SHA-256 repository is
    /// rejected rather than silently written with the wrong hash.
    pub fn object_format(&self) -> Result<HashAlgorithm, GitError> {
        let config = self.repo.config()?;
        match config.get_string("extensions.objectformat") {
            Ok(format) if format.eq_ignore_ascii_case("sha1") => Ok(HashAlgorithm::Sha1),
            Ok(format) => Err(GitError::UnsupportedObjectFormat { format }),
            Err(_) => Ok(HashAlgorithm::Sha1),
        }
    }

    /// Current in-progress operation, if any.
    pub fn state(&self) -> GitState {
        use git2::RepositoryState as S;
        match self.repo.state() {
            S::Clean => GitState::Clean,
            S::Rebase | S::RebaseInteractive | S::RebaseMerge => GitState::Rebase,
            S::Merge => GitState::Merge,
            S::CherryPick | S::CherryPickSequence => GitState::CherryPick,
            S::Revert | S::RevertSequence => GitState::Revert,
            S::Bisect => GitState::Bisect,
            S::ApplyMailbox | S::ApplyMailboxOrRebase => GitState::ApplyMailbox,
        }
    }

    // =========================================================================
    // Ref Resolution
    // =========================================================================

    /// Resolve a ref to the commit it (eventually) points at.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn resolve_ref(&self, refname: &str) -> Result<Oid, GitError> {
        let reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        let oid = reference
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, refname))?
            .id();

        to_oid(oid)
    }

    /// Resolve a ref, returning None if it doesn't exist.
    pub fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.resolve_ref(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve a revision expression (`HEAD~2`, an abbreviated id, a branch) to a commit.
    pub fn resolve_revision(&self, spec: &str) -> Result<Oid, GitError> {
        let object = self
            .repo
            .revparse_single(spec)
            .map_err(|_| GitError::BadRevision {
                spec: spec.to_string(),
            })?;
        let commit = object.peel_to_commit().map_err(|_| GitError::BadRevision {
            spec: spec.to_string(),
        })?;
        to_oid(commit.id())
    }

    // =========================================================================
    // CAS Ref Operations
    // =========================================================================

    /// Update a ref with compare-and-swap semantics.
    ///
    /// With `expected_old = Some(x)` the ref must currently point at `x`;
    /// with `None` it must not exist. The check and the write happen under
    /// libgit2's ref lock, so a concurrent writer cannot slip in between.
    ///
    /// # Errors
    ///
    /// - [`GitError::CasFailed`] if the current value doesn't match expected
    pub fn update_ref_cas(
        &self,
        refname: &str,
        new_oid: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError> {
        let new = to_git2(new_oid)?;
        let result = match expected_old {
            Some(expected) => {
                self.repo
                    .reference_matching(refname, new, true, to_git2(expected)?, message)
            }
            None => self.repo.reference(refname, new, false, message),
        };

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if matches!(
                    e.code(),
                    git2::ErrorCode::Modified | git2::ErrorCode::Exists | git2::ErrorCode::NotFound
                ) =>
            {
                Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: describe(&expected_old.cloned()),
                    actual: self.try_resolve_ref_target(refname)?,
                })
            }
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    /// Direct target of a ref (symbolic refs resolved), without peeling.
    fn try_resolve_ref_target(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.repo.find_reference(refname) {
            Ok(reference) => {
                let resolved = reference.resolve()?;
                resolved.target().map(to_oid).transpose()
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Read a commit. Returns `None` if no such commit exists.
    ///
    /// The object is decoded from its raw bytes, so re-encoding an untouched
    /// commit reproduces it exactly, whatever its encoding or extra headers.
    pub fn read_commit(&self, oid: &Oid) -> Result<Option<CommitNode>, GitError> {
        let odb = self.repo.odb()?;
        let object = match odb.read(to_git2(oid)?) {
            Ok(object) => object,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, oid.as_str())),
        };
        if object.kind() != git2::ObjectType::Commit {
            return Ok(None);
        }
        CommitNode::decode(oid.clone(), object.data())
            .map(Some)
            .map_err(|e| GitError::MalformedCommit {
                oid: oid.to_string(),
                message: e.to_string(),
            })
    }

    /// Whether `oid` names a tree object in the object database.
    pub fn tree_exists(&self, oid: &Oid) -> Result<bool, GitError> {
        let odb = self.repo.odb()?;
        match odb.read_header(to_git2(oid)?) {
            Ok((_, kind)) => Ok(kind == git2::ObjectType::Tree),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
            Err(e) => Err(GitError::from_git2(e, oid.as_str())),
        }
    }

    /// Write an encoded commit body and return the id the ODB assigned.
    pub fn write_commit_raw(&self, body: &[u8]) -> Result<Oid, GitError> {
        let odb = self.repo.odb()?;
        let oid = odb.write(git2::ObjectType::Commit, body)?;
        to_oid(oid)
    }

    /// Commits recorded as shallow-clone boundaries.
    ///
    /// Their parents are absent from the object database.
    pub fn shallow_roots(&self) -> Result<Vec<Oid>, GitError> {
        if !self.repo.is_shallow() {
            return Ok(Vec::new());
        }
        let path = self.repo.commondir().join("shallow");
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(GitError::AccessError {
                    message: format!("{}: {}", path.display(), e),
                })
            }
        };
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| Oid::new(line).map_err(GitError::from))
            .collect()
    }
}

fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

fn to_oid(oid: git2::Oid) -> Result<Oid, GitError> {
    Oid::new(oid.to_string()).map_err(GitError::from)
}
