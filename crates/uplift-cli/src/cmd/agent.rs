//! agent list/start/stop and `uplift run`.

use crate::daemon::{daemon_client, daemon_json, require_daemon};
use crate::table::Table;
use crate::ui;
use std::path::Path;
use uplift_types::agent::AgentManifest;

pub fn cmd_agent_list(json: bool) {
    let base = require_daemon("agent list");
    let client = daemon_client();
    let body = daemon_json(client.get(format!("{base}/api/agents")).send());

    if json {
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
        return;
    }

    let agents = body["agents"].as_array().cloned().unwrap_or_default();
    if agents.is_empty() {
        ui::warn_with_fix("No agents registered", "Register one with: uplift run <dir>");
        return;
    }

    let mut table = Table::new(&["Agent", "Status", "PID", "Restarts", "Priority"])
        .align_right(2)
        .align_right(3)
        .align_right(4);
    for a in &agents {
        let manifest = &a["manifest"];
        table.add_row(&[
            manifest["name"].as_str().unwrap_or("?"),
            &ui::status_glyph(a["status"].as_str().unwrap_or("?")),
            &a["pid"].as_u64().map(|p| p.to_string()).unwrap_or_default(),
            &a["restart_count"].as_u64().unwrap_or(0).to_string(),
            &manifest["priority"].as_u64().unwrap_or(5).to_string(),
        ]);
    }
    table.print();
}

pub fn cmd_agent_start(name: &str) {
    let base = require_daemon("agent start");
    let client = daemon_client();
    let body = daemon_json(
        client
            .post(format!("{base}/api/agents/{name}/start"))
            .send(),
    );
    ui::success(&format!(
        "{name} starting (pid {})",
        body["pid"].as_u64().unwrap_or(0)
    ));
}

pub fn cmd_agent_stop(name: &str, force: bool) {
    let base = require_daemon("agent stop");
    let client = daemon_client();
    daemon_json(
        client
            .post(format!("{base}/api/agents/{name}/stop?force={force}"))
            .send(),
    );
    ui::success(&format!("{name} stopped"));
}

/// Register one agent from a manifest path (or a directory holding an
/// agent.yaml) and start it.
pub fn cmd_run(path: &Path) {
    let manifest_path = if path.is_dir() {
        path.join("agent.yaml")
    } else {
        path.to_path_buf()
    };
    let yaml = match std::fs::read_to_string(&manifest_path) {
        Ok(yaml) => yaml,
        Err(e) => {
            ui::error_with_fix(
                &format!("Cannot read {}: {e}", manifest_path.display()),
                "Point `uplift run` at an agent.yaml or its directory",
            );
            std::process::exit(1);
        }
    };
    // Parse locally first so manifest errors come with line context, not
    // a 400 from the daemon.
    let mut manifest = match AgentManifest::from_yaml(&yaml) {
        Ok(m) => m,
        Err(e) => {
            ui::error(&format!("Invalid manifest: {e}"));
            std::process::exit(1);
        }
    };
    if manifest.entrypoint.working_dir.is_none() {
        manifest.entrypoint.working_dir = manifest_path
            .parent()
            .and_then(|p| p.canonicalize().ok());
    }

    let base = require_daemon("run");
    let client = daemon_client();
    let mut payload = match serde_json::to_value(&manifest) {
        Ok(v) => v,
        Err(e) => {
            ui::error(&format!("Could not encode manifest: {e}"));
            std::process::exit(1);
        }
    };
    payload["start"] = serde_json::Value::Bool(true);

    let body = daemon_json(client.post(format!("{base}/api/agents")).json(&payload).send());
    ui::success(&format!(
        "{} registered and starting (pid {})",
        manifest.name,
        body["pid"].as_u64().unwrap_or(0)
    ));
    ui::hint(&format!(
        "Private scope: uplift://agent/{}",
        manifest.name
    ));
}
