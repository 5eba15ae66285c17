use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::VcsError;
use crate::types::*;

/// Uniform operation surface over both version-control backends.
///
/// Each operation is a strictly sequential chain of backend commands: every
/// command depends on the state left by the previous one, so nothing within
/// one call runs concurrently. Independent top-level calls may interleave
/// freely because addressed operations provision their own isolated temporary
/// workspaces. Operations taking an existing working-copy path (`update`,
/// `create_branch`, `create_tag`) must be serialized per path by the caller.
#[async_trait]
pub trait VcsDriver: Send + Sync {
    /// Backend name as used by [`crate::factory::driver_for`]
    fn name(&self) -> &'static str;

    /// True if `dir` carries this backend's working-copy metadata marker
    fn is_working_copy(&self, dir: &Path) -> bool;

    /// True if `dir` is a bare / server-side repository store
    fn is_repo_folder(&self, dir: &Path) -> bool;

    /// Best-effort project name guessed from the URL structure
    fn project_name_from_url(&self, url: &str) -> String;

    /// Dependency-manager style URL: `<url>#<ref>` for git,
    /// `svn+<url>#<name>` for svn.
    fn dependency_url(&self, url: &str, target: Option<&Target>) -> String;

    /// Create a bare repository at `dir` (which must not already exist) and
    /// return its durable address. Seed targets listed in the options are
    /// materialized before returning.
    async fn create_repo(
        &self,
        dir: &Path,
        options: CreateRepoOptions,
    ) -> Result<RepoHandle, VcsError>;

    /// Check out the given line into `dir`. A `None` target means trunk.
    async fn checkout(
        &self,
        url: &str,
        target: Option<&Target>,
        dir: &Path,
    ) -> Result<(), VcsError>;

    /// True iff the working copy has no local modifications relative to head,
    /// optionally scoped to the given paths.
    async fn is_working_copy_clean(
        &self,
        dir: &Path,
        paths: &[PathBuf],
    ) -> Result<bool, VcsError>;

    /// Update / pull each working copy in turn, best-effort: a failure on one
    /// directory is recorded in the report and does not prevent the rest.
    /// Uncommitted local changes survive the update.
    async fn update(&self, dirs: &[PathBuf]) -> UpdateReport;

    /// True iff *all* given paths exist at the addressed line. Never fails:
    /// any internal error resolves to `false`.
    async fn exists(&self, url: &str, target: Option<&Target>, paths: &[PathBuf]) -> bool;

    /// Contents of a file at the addressed line. Fails when the path is
    /// absent at that revision.
    async fn cat(
        &self,
        url: &str,
        target: Option<&Target>,
        path: &Path,
    ) -> Result<String, VcsError>;

    /// Opposite of `cat`: create or overwrite a file at the addressed line as
    /// a single committed, pushed change. Returns the new head revision.
    async fn un_cat(
        &self,
        url: &str,
        target: Option<&Target>,
        path: &Path,
        options: UnCatOptions,
    ) -> Result<Revision, VcsError>;

    /// Name, URL and current target of a working copy
    async fn working_copy_info(&self, dir: &Path) -> Result<WorkingCopyInfo, VcsError>;

    /// Head revision of the addressed line on the server
    async fn url_head_revision(
        &self,
        url: &str,
        target: Option<&Target>,
    ) -> Result<Revision, VcsError>;

    /// Revision the working copy currently points at
    async fn working_copy_revision(&self, dir: &Path) -> Result<Revision, VcsError>;

    /// Tag names in the repository, in backend-reported order
    async fn list_tags(&self, url: &str) -> Result<Vec<String>, VcsError>;

    /// Export the working copy's tracked files to `out_dir` with no VCS
    /// metadata; `out_dir` does not become a working copy.
    async fn export_dir(&self, dir: &Path, out_dir: &Path) -> Result<(), VcsError>;

    /// Create a branch at the working copy's current revision and publish it,
    /// optionally switching the working copy to it.
    async fn create_branch(
        &self,
        dir: &Path,
        name: &str,
        options: CreateBranchOptions,
    ) -> Result<(), VcsError>;

    /// Create an annotated tag rooted at the requested source line, optionally
    /// committing local changes and extra files onto it, then merge the
    /// tag-time commit back into another line when requested.
    ///
    /// The merge-back step never aborts tag creation: on any failure there the
    /// target working copy is rolled back to a clean state and the outcome
    /// reports [`MergeOutcome::RolledBack`], with the tag created and pushed
    /// regardless. The caller's working copy is restored to its original line
    /// on return.
    async fn create_tag(
        &self,
        dir: &Path,
        url: &str,
        target: Option<&Target>,
        tag_name: &str,
        options: CreateTagOptions,
    ) -> Result<MergeOutcome, VcsError>;
}
