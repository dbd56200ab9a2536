//! core::paths
//!
//! Centralized path routing for reweave storage locations.
//!
//! All repo-scoped storage lives under `<common_dir>/reweave/` so that linked
//! worktrees share one config and one lock with the main repository:
//! - `config.toml` - Repository configuration
//! - `lock` - Exclusive lock file held for the duration of a rewrite
//!
//! # Example
//!
//! ```
//! use reweave::core::paths::ReweavePaths;
//! use std::path::PathBuf;
//!
//! let paths = ReweavePaths::new(
//!     PathBuf::from("/repo/.git/worktrees/feature"),
//!     PathBuf::from("/repo/.git"),
//! );
//!
//! assert_eq!(
//!     paths.repo_config_path(),
//!     PathBuf::from("/repo/.git/reweave/config.toml")
//! );
//! ```

use std::path::PathBuf;

use crate::git::RepoInfo;

/// Centralized path routing for reweave storage.
///
/// # Invariants
///
/// - All repo-scoped storage uses `common_dir` (shared across worktrees)
/// - No code outside this module should compute `*.join("reweave")` paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReweavePaths {
    /// Per-worktree git directory. Equals `common_dir` outside worktrees.
    pub git_dir: PathBuf,

    /// Shared git directory (refs, objects, config).
    pub common_dir: PathBuf,
}

impl ReweavePaths {
    /// Create from git_dir and common_dir.
    pub fn new(git_dir: PathBuf, common_dir: PathBuf) -> Self {
        Self {
            git_dir,
            common_dir,
        }
    }

    /// Create from an opened repository's info.
    pub fn from_repo_info(info: &RepoInfo) -> Self {
        Self {
            git_dir: info.git_dir.clone(),
            common_dir: info.common_dir.clone(),
        }
    }

    /// `<common_dir>/reweave/`
    pub fn repo_reweave_dir(&self) -> PathBuf {
        self.common_dir.join("reweave")
    }

    /// `<common_dir>/reweave/config.toml`
    pub fn repo_config_path(&self) -> PathBuf {
        self.repo_reweave_dir().join("config.toml")
    }

    /// `<common_dir>/reweave/lock`
    pub fn repo_lock_path(&self) -> PathBuf {
        self.repo_reweave_dir().join("lock")
    }

    /// Create `<common_dir>/reweave/` if missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.repo_reweave_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal() -> ReweavePaths {
        ReweavePaths::new(PathBuf::from("/repo/.git"), PathBuf::from("/repo/.git"))
    }

    #[test]
    fn repo_scoped_paths() {
        let paths = normal();
        assert_eq!(paths.repo_reweave_dir(), PathBuf::from("/repo/.git/reweave"));
        assert_eq!(paths.repo_lock_path(), PathBuf::from("/repo/.git/reweave/lock"));
    }

    #[test]
    fn worktree_paths_use_common_dir() {
        let paths = ReweavePaths::new(
            PathBuf::from("/repo/.git/worktrees/wt"),
            PathBuf::from("/repo/.git"),
        );
        assert_eq!(paths.repo_lock_path(), normal().repo_lock_path());
        assert_eq!(paths.repo_config_path(), normal().repo_config_path());
    }

    #[test]
    fn ensure_dirs_creates_directory() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ReweavePaths::new(temp.path().to_path_buf(), temp.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        assert!(paths.repo_reweave_dir().is_dir());
    }
}
