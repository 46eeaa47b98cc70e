//! Path management for stich configuration and logs.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/stich/             # Config directory
//! ├── config.toml              # Application configuration
//! └── logs/                    # Application logs
//!     └── stich.log.YYYY-MM-DD
//! ```

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Config directory could not be determined.
    ConfigDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find config directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for stich_core::StichError {
    fn from(err: PathError) -> Self {
        stich_core::StichError::config(err.to_string())
    }
}

const APP_DIR: &str = "stich";

/// Resolves stich's on-disk locations.
///
/// An explicit base overrides the platform config directory, which keeps
/// tests away from the real home directory.
#[derive(Debug, Clone, Default)]
pub struct StichPaths {
    base: Option<PathBuf>,
}

impl StichPaths {
    pub fn new(base: Option<PathBuf>) -> Self {
        Self { base }
    }

    /// `~/.config/stich` (or the explicit base).
    pub fn config_dir(&self) -> Result<PathBuf, PathError> {
        match &self.base {
            Some(base) => Ok(base.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or(PathError::ConfigDirNotFound),
        }
    }

    pub fn config_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("config.toml"))
    }

    pub fn logs_dir(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("logs"))
    }
}
