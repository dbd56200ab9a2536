//! core::ops::lock
//!
//! Exclusive repository lock held from history load to ref update.
//!
//! The lock lives at `<common_dir>/reweave/lock`, so it is shared by every
//! worktree of a repository. While one reweave process holds it, no other
//! reweave process can load, plan or move a branch in the same repository.
//! Writers outside reweave (plain `git commit`) are not excluded; the
//! compare-and-swap ref update catches those.
//!
//! # Invariants
//!
//! - Acquisition is non-blocking (fails fast if locked)
//! - The lock is released on drop
//! - The holder's pid is written into the lock file for diagnostics

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use fs2::FileExt;
use thiserror::Error;

use crate::core::paths::ReweavePaths;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("repository is locked by another reweave process{}", pid_suffix(.holder))]
    AlreadyLocked {
        /// Pid recorded by the holder, if readable
        holder: Option<u32>,
    },

    /// Failed to create the lock file or its directory.
    #[error("failed to create lock at '{path}': {source}")]
    CreateFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The OS refused the lock for a reason other than contention.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(std::io::Error),
}

/// An exclusive lock on the repository, released on drop.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    file: Option<File>,
}

impl RepoLock {
    /// Acquire the repository lock.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another process holds the lock
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] for other OS failures
    pub fn acquire(paths: &ReweavePaths) -> Result<Self, LockError> {
        let path = paths.repo_lock_path();
        paths.ensure_dirs().map_err(|e| LockError::CreateFailed {
            path: path.clone(),
            source: e,
        })?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LockError::CreateFailed {
                path: path.clone(),
                source: e,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Err(LockError::AlreadyLocked {
                    holder: read_pid(&mut file),
                });
            }
            Err(e) => return Err(LockError::AcquireFailed(e)),
        }

        // Best effort; the OS lock is what matters.
        let _ = file
            .set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| write!(file, "{}", std::process::id()));

        tracing::debug!(path = %path.display(), "acquired repository lock");
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Release the lock before the guard goes out of scope.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
            tracing::debug!(path = %self.path.display(), "released repository lock");
        }
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn pid_suffix(holder: &Option<u32>) -> String {
    holder.map(|pid| format!(" (pid {pid})")).unwrap_or_default()
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}
