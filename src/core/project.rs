//! Project discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project marker directory
pub const PROJECT_DIR: &str = ".tts";

/// Represents a TTS project
#[derive(Debug)]
pub struct Project {
    /// Root directory of the project (parent of .tts/)
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current =
            std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(PROJECT_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create a new project structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if root.join(PROJECT_DIR).exists() {
            return Err(ProjectError::AlreadyExists(root.clone()));
        }

        Self::write_structure(root)
    }

    /// Force initialization even if .tts/ exists
    ///
    /// Config and permission files are rewritten; the store is left alone.
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::write_structure(root)
    }

    fn write_structure(root: PathBuf) -> Result<Self, ProjectError> {
        let project = Self { root };

        std::fs::create_dir_all(project.tts_dir())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        std::fs::write(project.config_path(), Self::default_config())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        std::fs::write(
            project.permissions_path(),
            crate::core::permission::RolePermissions::default_template(),
        )
        .map_err(|e| ProjectError::IoError(e.to_string()))?;

        Ok(project)
    }

    fn default_config() -> &'static str {
        r#"# TTS Project Configuration

# Actor used for permission checks (default: git user.name, then $USER)
# actor: ""

# Log filter, same syntax as TTS_LOG (default: warn)
# log: info

# Background sync period in seconds
# sync_interval_secs: 30
"#
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .tts configuration directory
    pub fn tts_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.tts_dir().join("config.yaml")
    }

    pub fn permissions_path(&self) -> PathBuf {
        self.tts_dir().join("permissions.yaml")
    }

    /// Path of the authoritative store database
    pub fn store_path(&self) -> PathBuf {
        self.tts_dir().join("store.db")
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not a TTS project (searched from {searched_from:?}). Run 'tts init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("TTS project already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}
