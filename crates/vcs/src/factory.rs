use std::path::Path;

use crate::backend::git::{GitConfig, GitDriver};
use crate::backend::svn::{SvnConfig, SvnDriver};
use crate::error::VcsError;
use crate::traits::VcsDriver;

/// Type of VCS backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Git,
    Svn,
}

impl BackendType {
    pub fn name(&self) -> &'static str {
        match self {
            BackendType::Git => "git",
            BackendType::Svn => "svn",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, VcsError> {
        match name {
            "git" => Ok(BackendType::Git),
            "svn" => Ok(BackendType::Svn),
            other => Err(VcsError::UnknownBackend(other.to_string())),
        }
    }
}

/// Create a driver for the given backend with default configuration
pub fn driver(backend: BackendType) -> Box<dyn VcsDriver> {
    match backend {
        BackendType::Git => Box::new(GitDriver::new(GitConfig::default())),
        BackendType::Svn => Box::new(SvnDriver::new(SvnConfig::default())),
    }
}

/// Create a driver selected by backend name (`"git"` / `"svn"`)
pub fn driver_for(name: &str) -> Result<Box<dyn VcsDriver>, VcsError> {
    Ok(driver(BackendType::from_name(name)?))
}

/// Auto-detect the backend of an existing working copy from its
/// metadata marker.
pub fn detect(dir: &Path) -> Result<BackendType, VcsError> {
    if dir.join(".git").exists() {
        Ok(BackendType::Git)
    } else if dir.join(".svn").exists() {
        Ok(BackendType::Svn)
    } else {
        Err(VcsError::repo_not_found(dir))
    }
}
