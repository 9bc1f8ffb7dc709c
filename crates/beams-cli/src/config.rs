//! Configuration loading: a JSON file plus environment overrides.

use beams_core::WorkspaceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection and checkout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Jira base URL, e.g. `https://jira.example.com`
    #[serde(default)]
    pub base_url: String,

    /// Appended to the base URL as `:port` when set
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Issue key prefix, e.g. `BUG`
    #[serde(default)]
    pub project_key: String,

    /// Extra JQL restricting the orphan listing
    #[serde(default)]
    pub orphans_jql: String,

    /// Local directory mirroring the feature files
    #[serde(default)]
    pub checkout_dir: Option<PathBuf>,

    /// Change-notification coalescing window
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    /// Debounce period of the checkout watcher
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

fn default_batch_window_ms() -> u64 {
    5
}

fn default_watch_debounce_ms() -> u64 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            port: None,
            username: String::new(),
            password: String::new(),
            project_key: String::new(),
            orphans_jql: String::new(),
            checkout_dir: None,
            batch_window_ms: default_batch_window_ms(),
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

impl Config {
    /// `~/.config/xray-beams/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("xray-beams").join("config.json"))
    }

    /// Load the config file (if present) and apply `XRAY_BEAMS_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                let config: Config = serde_json::from_str(&content)?;
                tracing::info!("Loaded configuration from {:?}", path);
                config
            }
            Some(path) => {
                tracing::info!("No config file found at {:?}, using defaults", path);
                Config::default()
            }
            None => Config::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override connection settings from a variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("XRAY_BEAMS_BASE_URL") {
            self.base_url = value;
        }
        if let Some(value) = lookup("XRAY_BEAMS_USERNAME") {
            self.username = value;
        }
        if let Some(value) = lookup("XRAY_BEAMS_PASSWORD") {
            self.password = value;
        }
        if let Some(value) = lookup("XRAY_BEAMS_PROJECT_KEY") {
            self.project_key = value;
        }
    }

    /// Refuse to run with an incomplete connection configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("base_url", &self.base_url),
            ("username", &self.username),
            ("password", &self.password),
            ("project_key", &self.project_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        Ok(())
    }

    /// Base URL with the port applied.
    pub fn jira_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.port {
            Some(port) => format!("{}:{}", base, port),
            None => base.to_string(),
        }
    }

    pub fn workspace_config(&self) -> WorkspaceConfig {
        WorkspaceConfig {
            project_key: self.project_key.clone(),
            batch_window: Duration::from_millis(self.batch_window_ms),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Incomplete configuration: {0} is not set")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_missing_fields() {
        let config: Config = serde_json::from_str(r#"{"base_url":"https://jira"}"#).unwrap();
        assert_eq!(config.batch_window_ms, 5);
        assert_eq!(config.watch_debounce_ms, 200);
        assert!(config.orphans_jql.is_empty());
        assert!(config.checkout_dir.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"base_url":"https://jira/","port":8080,"username":"u","password":"p","project_key":"BUG"}"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.jira_url(), "https://jira:8080");
        assert!(config.validate().is_ok());
        assert_eq!(config.workspace_config().batch_window, Duration::from_millis(5));
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load(Some(&path)), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_overrides_and_validation() {
        let mut config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("base_url"))));

        config.apply_overrides(|name| match name {
            "XRAY_BEAMS_BASE_URL" => Some("https://jira".to_string()),
            "XRAY_BEAMS_USERNAME" => Some("u".to_string()),
            "XRAY_BEAMS_PASSWORD" => Some("p".to_string()),
            _ => None,
        });
        assert!(matches!(config.validate(), Err(ConfigError::Missing("project_key"))));
        assert_eq!(config.jira_url(), "https://jira");
    }
}
