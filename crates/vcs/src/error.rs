use std::path::Path;
use thiserror::Error;

/// Errors that can occur during VCS operations
#[derive(Debug, Error)]
pub enum VcsError {
    /// The backend executable could not be spawned at all.
    #[error("Failed to spawn `{command}`: {source}")]
    Process {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend tool ran but reported failure via its exit code.
    #[error("`{command}` exited with code {code}: {detail}")]
    Command {
        command: String,
        code: i32,
        detail: String,
    },

    /// The tool succeeded but its output did not match the expected format.
    #[error("Unexpected backend output: {0}")]
    Parse(String),

    #[error("Failed to create repository at {path}: {source}")]
    RepoCreation {
        path: String,
        #[source]
        source: Box<VcsError>,
    },

    #[error("Failed to check out {url}: {source}")]
    Checkout {
        url: String,
        #[source]
        source: Box<VcsError>,
    },

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcsError {
    pub fn repo_not_found(path: &Path) -> Self {
        Self::RepositoryNotFound(path.display().to_string())
    }

    /// Wrap an error with repo-creation context
    pub fn repo_creation(path: &Path, source: VcsError) -> Self {
        Self::RepoCreation {
            path: path.display().to_string(),
            source: Box::new(source),
        }
    }

    /// Wrap an error with checkout context
    pub fn checkout(url: &str, source: VcsError) -> Self {
        Self::Checkout {
            url: url.to_string(),
            source: Box::new(source),
        }
    }
}
