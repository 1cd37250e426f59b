//! Configuration management with layered hierarchy

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::Project;

/// Default period of the background sync task
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

/// Default capacity of the session event broadcast channel
pub const DEFAULT_SESSION_EVENT_CAPACITY: usize = 64;

/// TTS configuration with layered hierarchy
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Actor name used for permission checks
    pub actor: Option<String>,

    /// Log filter directive (e.g. "info", "thingstore=debug")
    pub log: Option<String>,

    /// Period of the background sync task, in seconds
    pub sync_interval_secs: Option<u64>,

    /// Capacity of the session event channel
    pub session_event_capacity: Option<usize>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        let project = Project::discover().ok();
        Self::load_for(project.as_ref())
    }

    /// Load configuration for a known project (or none)
    pub fn load_for(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/tts/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // 3. Project config (.tts/config.yaml)
        if let Some(project) = project {
            if let Some(project_config) = Self::read_file(&project.config_path()) {
                config.merge(project_config);
            }
        }

        // 4. Environment variables
        if let Ok(actor) = std::env::var("TTS_ACTOR") {
            config.actor = Some(actor);
        }
        if let Ok(log) = std::env::var("TTS_LOG") {
            config.log = Some(log);
        }

        config
    }

    fn read_file(path: &std::path::Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                None
            }
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tts")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Config) {
        if other.actor.is_some() {
            self.actor = other.actor;
        }
        if other.log.is_some() {
            self.log = other.log;
        }
        if other.sync_interval_secs.is_some() {
            self.sync_interval_secs = other.sync_interval_secs;
        }
        if other.session_event_capacity.is_some() {
            self.session_event_capacity = other.session_event_capacity;
        }
    }

    /// Get the actor name, falling back to git config or username
    pub fn actor(&self) -> String {
        if let Some(ref actor) = self.actor {
            return actor.clone();
        }

        // Try git config
        if let Ok(output) = std::process::Command::new("git")
            .args(["config", "user.name"])
            .output()
        {
            if output.status.success() {
                let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !name.is_empty() {
                    return name;
                }
            }
        }

        // Fall back to username
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// Log filter directive, defaulting to warnings only
    pub fn log_filter(&self) -> String {
        self.log.clone().unwrap_or_else(|| "warn".to_string())
    }

    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.sync_interval_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS),
        )
    }

    pub fn session_event_capacity(&self) -> usize {
        self.session_event_capacity
            .filter(|cap| *cap > 0)
            .unwrap_or(DEFAULT_SESSION_EVENT_CAPACITY)
    }
}
