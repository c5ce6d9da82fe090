//! init, start, and stop.

use crate::daemon::{daemon_client, find_daemon, force_kill_pid};
use crate::ui;
use rand::RngCore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uplift_api::info::read_daemon_info;
use uplift_kernel::config::{agents_dir, default_config_path, load_config, uplift_home};
use uplift_kernel::kernel::UpliftKernel;
use uplift_types::config::RuntimeConfig;

#[cfg(unix)]
fn restrict_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_file_permissions(_path: &Path) {}

fn generate_api_key() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn cmd_init(quick: bool) {
    let home = uplift_home();
    let config_path = default_config_path();

    if let Err(e) = std::fs::create_dir_all(home.join("agents")) {
        ui::error_with_fix(
            &format!("Could not create {}: {e}", home.display()),
            "Check permissions on your home directory",
        );
        std::process::exit(1);
    }
    ui::success(&format!("Data directory: {}", home.display()));

    if config_path.exists() {
        ui::warn_with_fix(
            &format!("Config already exists: {}", config_path.display()),
            "Edit it directly, or delete it and re-run `uplift init`",
        );
        return;
    }

    let config = RuntimeConfig {
        api_key: Some(generate_api_key()),
        ..RuntimeConfig::default()
    };
    let body = match toml::to_string_pretty(&config) {
        Ok(body) => body,
        Err(e) => {
            ui::error(&format!("Could not render default config: {e}"));
            std::process::exit(1);
        }
    };
    if let Err(e) = std::fs::write(&config_path, body) {
        ui::error_with_fix(&format!("Failed to write config: {e}"), "Check permissions");
        std::process::exit(1);
    }
    restrict_file_permissions(&config_path);
    ui::success(&format!("Created: {}", config_path.display()));

    if !quick {
        ui::blank();
        ui::kv("Agents dir", &home.join("agents").display().to_string());
        ui::kv("Config", &config_path.display().to_string());
        ui::blank();
        ui::hint("Put agent directories (with an agent.yaml) under the agents dir");
        ui::hint("Then run `uplift start`");
    }
}

pub fn cmd_start(config: Option<PathBuf>, daemon: bool) {
    if let Some(base) = find_daemon() {
        ui::error_with_fix(
            &format!("Daemon already running at {base}"),
            "Use `uplift status` to check it, or stop it first",
        );
        std::process::exit(1);
    }

    if daemon {
        spawn_daemon(config);
        return;
    }

    let cfg = load_config(config.as_deref());
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            ui::error(&format!("Could not start async runtime: {e}"));
            std::process::exit(1);
        }
    };

    rt.block_on(async {
        let kernel = match UpliftKernel::boot(cfg).await {
            Ok(k) => k,
            Err(e) => {
                boot_error(&e.to_string());
                std::process::exit(1);
            }
        };

        let dir = agents_dir(&kernel.config);
        match kernel.discover_agents(&dir) {
            Ok(count) if count > 0 => ui::success(&format!("{count} agent(s) registered")),
            Ok(_) => ui::hint(&format!("No agent manifests under {}", dir.display())),
            Err(e) => ui::error(&format!("Agent discovery failed: {e}")),
        }

        kernel.start_background_tasks();
        if kernel.config.auto_start {
            kernel.start_all().await;
        }

        let listener = match tokio::net::TcpListener::bind(&kernel.config.api_listen).await {
            Ok(l) => l,
            Err(e) => {
                ui::error_with_fix(
                    &format!("Could not bind {}: {e}", kernel.config.api_listen),
                    "Is another daemon running? Check `uplift status`",
                );
                std::process::exit(1);
            }
        };

        ui::blank();
        ui::kv("API", &format!("http://{}", kernel.config.api_listen));
        ui::kv("Data dir", &uplift_home().display().to_string());
        ui::blank();
        ui::hint("Press Ctrl+C to stop the daemon");
        ui::blank();

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        // Ctrl+C triggers the same graceful path as POST /api/shutdown.
        let signal_tx = shutdown_tx.clone();
        let signal_kernel = Arc::clone(&kernel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal_kernel.shutdown().await;
                let _ = signal_tx.send(true);
            }
        });

        if let Err(e) =
            uplift_api::run_server(Arc::clone(&kernel), listener, shutdown_tx, shutdown_rx).await
        {
            ui::error(&format!("Daemon error: {e}"));
            std::process::exit(1);
        }

        ui::blank();
        println!("  UPLIFT daemon stopped.");
    });
}

fn boot_error(msg: &str) {
    if msg.contains("database") || msg.contains("locked") || msg.contains("sqlite") {
        ui::error_with_fix(
            "Database error (file may be locked)",
            "Check if another uplift process is running: uplift status",
        );
    } else if msg.contains("config") || msg.contains("toml") {
        ui::error_with_fix(
            "Failed to parse configuration",
            "Check ~/.uplift/config.toml syntax",
        );
    } else {
        ui::error(&format!("Failed to boot kernel: {msg}"));
    }
}

fn spawn_daemon(config: Option<PathBuf>) {
    use std::process::{Command, Stdio};

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            ui::error(&format!("Cannot find executable: {e}"));
            std::process::exit(1);
        }
    };
    let mut cmd = Command::new(exe);
    cmd.arg("start");
    if let Some(ref cfg_path) = config {
        cmd.arg("--config").arg(cfg_path);
    }

    match cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => {
            ui::success(&format!("Daemon spawned with PID {}", child.id()));
            ui::hint("Use `uplift status` to check on it");
        }
        Err(e) => {
            ui::error(&format!("Failed to spawn daemon: {e}"));
            std::process::exit(1);
        }
    }
}

pub fn cmd_stop() {
    match find_daemon() {
        Some(base) => {
            let client = daemon_client();
            match client.post(format!("{base}/api/shutdown")).send() {
                Ok(r) if r.status().is_success() => {
                    for _ in 0..10 {
                        std::thread::sleep(std::time::Duration::from_millis(500));
                        if find_daemon().is_none() {
                            ui::success("Daemon stopped");
                            return;
                        }
                    }
                    if let Some(info) = read_daemon_info() {
                        force_kill_pid(info.pid);
                        let _ = std::fs::remove_file(uplift_home().join("daemon.json"));
                    }
                    ui::success("Daemon stopped (forced)");
                }
                Ok(r) => ui::error(&format!("Shutdown request failed ({})", r.status())),
                Err(e) => ui::error(&format!("Could not reach daemon: {e}")),
            }
        }
        None => ui::warn_with_fix(
            "No running daemon found",
            "Is it running? Check with: uplift status",
        ),
    }
}
