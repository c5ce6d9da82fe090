//! Daemon discovery and the HTTP client the subcommands share.

use uplift_api::info::read_daemon_info;

/// Try to find a running daemon. Returns its base URL if it answers.
pub(crate) fn find_daemon() -> Option<String> {
    let info = read_daemon_info()?;

    // 0.0.0.0 is a listen address, not a connect address.
    let addr = info.listen_addr.replace("0.0.0.0", "127.0.0.1");
    let url = format!("http://{addr}/api/health");

    let client = reqwest::blocking::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(1))
        .timeout(std::time::Duration::from_secs(2))
        .build()
        .ok()?;
    let resp = client.get(&url).send().ok()?;
    if resp.status().is_success() {
        Some(format!("http://{addr}"))
    } else {
        None
    }
}

/// Build the HTTP client for daemon calls, with the API key when one is
/// configured.
pub(crate) fn daemon_client() -> reqwest::blocking::Client {
    let mut builder =
        reqwest::blocking::Client::builder().timeout(std::time::Duration::from_secs(60));

    if let Some(api_key) = configured_api_key() {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(mut hv) = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}")) {
            hv.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, hv);
            builder = builder.default_headers(headers);
        }
    }

    builder
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new())
}

fn configured_api_key() -> Option<String> {
    let content =
        std::fs::read_to_string(uplift_kernel::config::default_config_path()).ok()?;
    let table: toml::Value = toml::from_str(&content).ok()?;
    let api_key = table.get("api_key")?.as_str()?.trim();
    if api_key.is_empty() {
        None
    } else {
        Some(api_key.to_string())
    }
}

/// Send a request and parse the JSON body. Exits with a readable error on
/// connection failure.
pub(crate) fn daemon_json(
    resp: Result<reqwest::blocking::Response, reqwest::Error>,
) -> serde_json::Value {
    match resp {
        Ok(r) => {
            let status = r.status();
            let body = r.json::<serde_json::Value>().unwrap_or_default();
            if !status.is_success() {
                let detail = body["error"].as_str().unwrap_or("unknown error");
                crate::ui::error_with_fix(
                    &format!("Daemon returned {status}: {detail}"),
                    "Check `uplift status` for daemon state",
                );
                std::process::exit(1);
            }
            body
        }
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("Connection refused") || msg.contains("connect") {
                crate::ui::error_with_fix(
                    "Cannot connect to daemon",
                    "Is the daemon running? Start it with: uplift start",
                );
            } else {
                crate::ui::error_with_fix(
                    &format!("Daemon communication error: {msg}"),
                    "Check `uplift status` or restart: uplift start",
                );
            }
            std::process::exit(1);
        }
    }
}

/// Require a running daemon or exit with a fix hint.
pub(crate) fn require_daemon(command: &str) -> String {
    find_daemon().unwrap_or_else(|| {
        crate::ui::error_with_fix(
            &format!("`uplift {command}` requires a running daemon"),
            "Start the daemon: uplift start",
        );
        std::process::exit(1);
    })
}

pub(crate) fn force_kill_pid(pid: u32) {
    #[cfg(unix)]
    {
        let _ = std::process::Command::new("kill")
            .args(["-9", &pid.to_string()])
            .output();
    }
    #[cfg(windows)]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .output();
    }
}
