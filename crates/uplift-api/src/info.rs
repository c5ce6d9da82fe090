//! The daemon info file: how the CLI finds a running daemon.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Contents of `~/.uplift/daemon.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonInfo {
    /// Address the daemon is listening on.
    pub listen_addr: String,
    /// Daemon process id, so `uplift stop` can fall back to a signal.
    pub pid: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

fn info_path() -> PathBuf {
    uplift_kernel::config::uplift_home().join("daemon.json")
}

/// SECURITY: Restrict file permissions to owner-only (0600) on Unix.
#[cfg(unix)]
fn restrict_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_file_permissions(_path: &Path) {}

/// Record the running daemon's address and pid.
pub fn write_daemon_info(addr: SocketAddr) -> std::io::Result<()> {
    let path = info_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let info = DaemonInfo {
        listen_addr: addr.to_string(),
        pid: std::process::id(),
        started_at: chrono::Utc::now(),
    };
    let json = serde_json::to_string_pretty(&info).map_err(std::io::Error::other)?;
    std::fs::write(&path, json)?;
    restrict_file_permissions(&path);
    Ok(())
}

/// Read the info file, if a daemon has left one behind.
pub fn read_daemon_info() -> Option<DaemonInfo> {
    let content = std::fs::read_to_string(info_path()).ok()?;
    serde_json::from_str(&content).ok()
}

/// Remove the info file on clean shutdown.
pub fn remove_daemon_info() {
    let _ = std::fs::remove_file(info_path());
}
