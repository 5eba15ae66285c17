//! Unified abstraction over git and Subversion command-line tooling.
//!
//! One driver trait covers checkout, update, tagging, branching, file
//! read/write and repository introspection for both backends; callers select
//! a backend by name and never see its addressing model. The drivers shell
//! out to the real tools and parse their textual output only — no repository
//! internals are touched.
//!
//! # Design Goals
//!
//! - **One operation surface**: [`VcsDriver`] is the full contract; backends
//!   differ only in how they resolve a [`Target`] to an address
//! - **Scoped temporary workspaces**: addressed operations that need a
//!   checkout provision their own and always clean up, success or failure
//! - **Explicit degradation**: best-effort paths (`exists`, `update`, the
//!   merge-back inside `create_tag`) report what was degraded instead of
//!   silently swallowing errors
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use vcs::{driver_for, CreateRepoOptions, UnCatOptions};
//!
//! # async fn demo() -> Result<(), vcs::VcsError> {
//! let vcs = driver_for("git")?;
//! let repo = vcs
//!     .create_repo(Path::new("/srv/repos/myproject"), CreateRepoOptions::default())
//!     .await?;
//! vcs.un_cat(
//!     &repo.url,
//!     None,
//!     Path::new("readme.txt"),
//!     UnCatOptions::contents("hello"),
//! )
//! .await?;
//! let text = vcs.cat(&repo.url, None, Path::new("readme.txt")).await?;
//! assert_eq!(text, "hello");
//! # Ok(())
//! # }
//! ```

mod backend;
mod error;
mod exec;
mod factory;
mod traits;
mod types;
mod workspace;

pub use backend::git::{GitConfig, GitDriver};
pub use backend::svn::{SvnConfig, SvnDriver};
pub use error::VcsError;
pub use exec::{ExecOptions, ExecResult};
pub use factory::{detect, driver, driver_for, BackendType};
pub use traits::VcsDriver;
pub use types::{
    CreateBranchOptions, CreateRepoOptions, CreateTagOptions, MergeOptions, MergeOutcome,
    RepoHandle, Revision, TagFile, Target, UnCatOptions, UpdateReport, WorkingCopyInfo,
};
