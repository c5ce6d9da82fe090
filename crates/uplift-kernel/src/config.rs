//! Configuration loading from `~/.uplift/config.toml` with defaults.

use std::path::{Path, PathBuf};
use tracing::info;
use uplift_types::config::RuntimeConfig;

/// The UPLIFT home directory, `~/.uplift` (or `./.uplift` when the home
/// directory cannot be resolved).
pub fn uplift_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".uplift")
}

/// Default config file path: `~/.uplift/config.toml`.
pub fn default_config_path() -> PathBuf {
    uplift_home().join("config.toml")
}

/// Load runtime configuration from a TOML file, with defaults.
///
/// A missing file is normal (first boot); a malformed file logs a warning
/// and falls back to defaults rather than refusing to start.
pub fn load_config(path: Option<&Path>) -> RuntimeConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<RuntimeConfig>(&contents) {
                Ok(config) => {
                    info!(path = %config_path.display(), "Loaded configuration");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %config_path.display(),
                        "Failed to parse config, using defaults"
                    );
                }
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to read config file, using defaults"
                );
            }
        }
    } else {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
    }

    RuntimeConfig::default()
}

/// The directory scanned for agent manifests.
pub fn agents_dir(config: &RuntimeConfig) -> PathBuf {
    config
        .agents_dir
        .clone()
        .unwrap_or_else(|| uplift_home().join("agents"))
}

/// The SQLite database path.
pub fn database_path(config: &RuntimeConfig) -> PathBuf {
    config
        .database_path
        .clone()
        .unwrap_or_else(|| uplift_home().join("uplift.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("absent.toml")));
        assert_eq!(cfg.api_listen, "127.0.0.1:4200");
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_listen = [not toml").unwrap();
        let cfg = load_config(Some(&path));
        assert_eq!(cfg.api_listen, "127.0.0.1:4200");
    }

    #[test]
    fn valid_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_listen = \"127.0.0.1:5000\"\nauto_start = false\n").unwrap();
        let cfg = load_config(Some(&path));
        assert_eq!(cfg.api_listen, "127.0.0.1:5000");
        assert!(!cfg.auto_start);
    }

    #[test]
    fn derived_paths_follow_overrides() {
        let mut cfg = RuntimeConfig::default();
        assert!(agents_dir(&cfg).ends_with("agents"));
        cfg.agents_dir = Some(PathBuf::from("/srv/uplift/agents"));
        assert_eq!(agents_dir(&cfg), PathBuf::from("/srv/uplift/agents"));
        cfg.database_path = Some(PathBuf::from("/srv/uplift/state.db"));
        assert_eq!(database_path(&cfg), PathBuf::from("/srv/uplift/state.db"));
    }
}
