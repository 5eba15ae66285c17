use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifies which line of development an operation addresses.
///
/// The centralized backend resolves this to a URL suffix
/// (`/trunk`, `/branches/<name>`, `/tags/<name>`); the distributed backend
/// resolves it to a ref name over a single URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum Target {
    Trunk,
    Branch(String),
    Tag(String),
}

impl Target {
    pub fn branch(name: impl Into<String>) -> Self {
        Self::Branch(name.into())
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Self::Tag(name.into())
    }

    /// The named line, or `default` for trunk.
    pub fn name_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self {
            Target::Trunk => default,
            Target::Branch(name) | Target::Tag(name) => name,
        }
    }

    pub fn is_trunk(&self) -> bool {
        matches!(self, Target::Trunk)
    }
}

/// Durable address of a repository produced by `create_repo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHandle {
    /// Address used by all subsequent addressed operations
    pub url: String,
    /// Server-side repository directory
    pub dir: PathBuf,
}

/// Revision identifier: a commit hash for git, a revision number for svn
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision(String);

impl Revision {
    pub fn new(rev: impl Into<String>) -> Self {
        Self(rev.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Information about a working copy reported by `working_copy_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingCopyInfo {
    /// Project name inferred from the URL structure
    pub name: String,
    /// Root repository URL
    pub url: String,
    /// Line of development the working copy currently points at
    pub target: Target,
}

/// A file written as part of `create_tag` / `create_repo` seeding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFile {
    /// Path relative to the repository root
    pub path: PathBuf,
    pub contents: String,
}

impl TagFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Options for `create_repo`
#[derive(Debug, Clone, Default)]
pub struct CreateRepoOptions {
    /// Targets to materialize in the fresh repository (branches / tags)
    pub targets: Vec<Target>,
}

/// Options for `un_cat`
#[derive(Debug, Clone, Default)]
pub struct UnCatOptions {
    pub contents: String,
    /// Commit message; a generic default is used when absent
    pub message: Option<String>,
}

impl UnCatOptions {
    pub fn contents(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            message: None,
        }
    }
}

/// Options for `create_branch`
#[derive(Debug, Clone, Default)]
pub struct CreateBranchOptions {
    /// Switch the working copy to the new branch after creation
    pub switch: bool,
    /// Commit message for backends that record branch creation as a commit
    pub message: Option<String>,
}

/// Merge-back request inside `create_tag`: cherry-pick the tag-time commit
/// onto another line of development after tagging.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Line to merge back into; trunk when absent
    pub target: Option<Target>,
    /// Files excluded from the cherry-pick (paths relative to the working copy)
    pub exclude: Vec<PathBuf>,
}

/// Options for `create_tag`
#[derive(Debug, Clone, Default)]
pub struct CreateTagOptions {
    /// Commit any uncommitted working-copy changes as part of the tag
    pub commit: bool,
    /// Merge local changes back into another line; requires `commit`
    pub merge: Option<MergeOptions>,
    /// Prefix applied to every commit message the operation writes
    pub comment_prefix: String,
    /// Revision to root the tag at; current head when absent
    pub revision: Option<Revision>,
    /// Files written explicitly onto the tag
    pub files: Vec<TagFile>,
}

/// What happened to the optional merge-back step of `create_tag`.
///
/// The tag itself exists and is pushed in every variant; a failed merge is a
/// deliberate degradation, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No merge-back was requested, or no committed revision existed to merge
    NotRequested,
    /// The cherry-pick applied and was pushed
    Merged,
    /// The cherry-pick failed; the target working copy was reset to a clean state
    RolledBack,
}

/// Per-directory outcome of a best-effort `update` across working copies
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub updated: Vec<PathBuf>,
    /// Directories whose update failed, with the failure detail
    pub failed: Vec<(PathBuf, String)>,
}

impl UpdateReport {
    pub fn all_updated(&self) -> bool {
        self.failed.is_empty()
    }
}
