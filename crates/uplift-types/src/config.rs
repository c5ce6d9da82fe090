//! Runtime configuration, loaded from `~/.uplift/config.toml`.

use crate::approval::RiskLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Address the API daemon listens on.
    pub api_listen: String,
    /// Default tracing filter when RUST_LOG is unset.
    pub log_level: String,
    /// Directory scanned for `agent.yaml` manifests.
    /// Defaults to `<uplift home>/agents` when unset.
    pub agents_dir: Option<PathBuf>,
    /// SQLite database path. Defaults to `<uplift home>/uplift.db`.
    pub database_path: Option<PathBuf>,
    /// Start all registered agents when the daemon boots.
    pub auto_start: bool,
    /// API key required on management routes. Generated by `uplift init`.
    pub api_key: Option<String>,
    /// Supervision defaults, overridable per manifest.
    pub supervision: SupervisionConfig,
    /// Approval queue tuning.
    pub approvals: ApprovalConfig,
    /// Request rate limiting.
    pub rate_limit: RateLimitConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_listen: "127.0.0.1:4200".to_string(),
            log_level: "info".to_string(),
            agents_dir: None,
            database_path: None,
            auto_start: true,
            api_key: None,
            supervision: SupervisionConfig::default(),
            approvals: ApprovalConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Process supervision defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionConfig {
    /// Restart crashed agents unless their manifest says otherwise.
    pub restart_on_failure: bool,
    /// Default restart budget when a manifest omits one. 0 means unlimited.
    pub max_restart_attempts: u32,
    /// Seconds between health sweeps over supervised processes.
    pub health_check_interval_secs: u64,
    /// Grace period between SIGTERM and SIGKILL on graceful stop.
    pub stop_grace_secs: u64,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            restart_on_failure: true,
            max_restart_attempts: 3,
            health_check_interval_secs: 60,
            stop_grace_secs: 10,
        }
    }
}

/// Approval queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Seconds between sweeps that expire overdue pending requests.
    pub sweep_interval_secs: u64,
    /// Decision timeout per risk level, in seconds. Missing levels fall
    /// back to the built-in defaults.
    pub timeout_low_secs: u64,
    pub timeout_medium_secs: u64,
    pub timeout_high_secs: u64,
    pub timeout_critical_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            timeout_low_secs: RiskLevel::Low.default_timeout_secs(),
            timeout_medium_secs: RiskLevel::Medium.default_timeout_secs(),
            timeout_high_secs: RiskLevel::High.default_timeout_secs(),
            timeout_critical_secs: RiskLevel::Critical.default_timeout_secs(),
        }
    }
}

impl ApprovalConfig {
    /// Configured decision timeout for a risk level.
    pub fn timeout_secs(&self, risk: RiskLevel) -> u64 {
        match risk {
            RiskLevel::Low => self.timeout_low_secs,
            RiskLevel::Medium => self.timeout_medium_secs,
            RiskLevel::High => self.timeout_high_secs,
            RiskLevel::Critical => self.timeout_critical_secs,
        }
    }
}

/// Per-IP request rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable the limiter.
    pub enabled: bool,
    /// Cost units allowed per minute per client IP.
    pub units_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            units_per_minute: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.api_listen, "127.0.0.1:4200");
        assert!(cfg.auto_start);
        assert_eq!(cfg.supervision.max_restart_attempts, 3);
        assert_eq!(cfg.approvals.timeout_secs(RiskLevel::Medium), 1800);
        assert_eq!(cfg.rate_limit.units_per_minute, 500);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: RuntimeConfig = toml::from_str(
            r#"
api_listen = "0.0.0.0:9000"

[approvals]
timeout_medium_secs = 60
"#,
        )
        .unwrap();
        assert_eq!(cfg.api_listen, "0.0.0.0:9000");
        assert_eq!(cfg.approvals.timeout_secs(RiskLevel::Medium), 60);
        assert_eq!(cfg.approvals.sweep_interval_secs, 60);
        assert_eq!(cfg.supervision.stop_grace_secs, 10);
    }
}
