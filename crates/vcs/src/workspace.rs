//! Scoped temporary workspaces for addressed operations.
//!
//! Operations that are not handed an existing working copy (`exists`, `cat`,
//! `un_cat`, `list_tags`, the seed checkout inside `create_repo`) provision a
//! uniquely named directory here and must leave nothing behind, whether they
//! succeed or fail. Removal rides on [`tempfile::TempDir`]'s drop, so an early
//! `?` return cleans up the same as the happy path.

use std::path::Path;

use tempfile::TempDir;

use crate::error::VcsError;

/// A temporary directory owned by a single operation invocation
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    /// Allocate a fresh workspace, under `root` when given, otherwise under
    /// the system temp directory.
    pub fn new(root: Option<&Path>) -> Result<Self, VcsError> {
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                TempDir::with_prefix_in("vcs-", root)?
            }
            None => TempDir::with_prefix("vcs-")?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
