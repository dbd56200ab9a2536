//! store::git_store
//!
//! [`ObjectStore`] over a real repository through [`Git`].

use std::collections::HashSet;

use crate::core::commit::{CommitNode, HashAlgorithm};
use crate::core::types::{Oid, RefName};
use crate::git::{Git, GitError};

use super::traits::{CasOutcome, ObjectStore, StoreError};

impl ObjectStore for Git {
    fn hash_algorithm(&self) -> HashAlgorithm {
        // Git::open rejects formats libgit2 cannot write.
        self.object_format().unwrap_or_default()
    }

    fn resolve_ref(&self, name: &RefName) -> Result<Option<Oid>, StoreError> {
        Ok(self.try_resolve_ref(name.as_str())?)
    }

    fn read_commit(&self, id: &Oid) -> Result<Option<CommitNode>, StoreError> {
        Ok(Git::read_commit(self, id)?)
    }

    fn contains_tree(&self, id: &Oid) -> Result<bool, StoreError> {
        Ok(self.tree_exists(id)?)
    }

    fn write_commit(&self, commit: &CommitNode) -> Result<Oid, StoreError> {
        Ok(self.write_commit_raw(&commit.encode())?)
    }

    fn compare_and_swap_ref(
        &self,
        name: &RefName,
        expected: Option<&Oid>,
        new: &Oid,
        message: &str,
    ) -> Result<CasOutcome, StoreError> {
        match self.update_ref_cas(name.as_str(), new, expected, message) {
            Ok(()) => Ok(CasOutcome::Updated),
            Err(GitError::CasFailed { actual, .. }) => Ok(CasOutcome::Mismatch { current: actual }),
            Err(e) => Err(e.into()),
        }
    }

    fn shallow_boundary(&self) -> Result<HashSet<Oid>, StoreError> {
        Ok(self.shallow_roots()?.into_iter().collect())
    }
}
