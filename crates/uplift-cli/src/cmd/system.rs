//! status, tasks, audit, halt, and completion.

use crate::cli::Cli;
use crate::daemon::{daemon_client, daemon_json, find_daemon, require_daemon};
use crate::table::Table;
use crate::ui;
use clap::CommandFactory;

pub fn cmd_status(json: bool) {
    match find_daemon() {
        Some(base) => {
            let client = daemon_client();
            let body = daemon_json(client.get(format!("{base}/api/status")).send());

            if json {
                println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
                return;
            }

            ui::section("UPLIFT Daemon");
            ui::blank();
            ui::kv_ok("Status", "running");
            ui::kv("API", &base);
            ui::kv(
                "Agents",
                &format!(
                    "{} registered, {} running",
                    body["agents_total"].as_u64().unwrap_or(0),
                    body["agents_running"].as_u64().unwrap_or(0)
                ),
            );
            ui::kv(
                "Approvals",
                &format!("{} pending", body["pending_approvals"].as_u64().unwrap_or(0)),
            );
            ui::kv(
                "Uptime",
                &format!("{}s", body["uptime_secs"].as_u64().unwrap_or(0)),
            );
            ui::kv("Audit tip", body["audit_tip"].as_str().unwrap_or("?"));
        }
        None => {
            if json {
                println!("{}", serde_json::json!({ "status": "stopped" }));
                return;
            }
            ui::section("UPLIFT Daemon");
            ui::blank();
            ui::kv_warn("Status", "NOT RUNNING");
            ui::blank();
            ui::hint("Start it with: uplift start");
        }
    }
}

pub fn cmd_tasks(agent: Option<&str>, json: bool) {
    let base = require_daemon("tasks");
    let client = daemon_client();
    let mut req = client.get(format!("{base}/api/tasks"));
    if let Some(agent) = agent {
        req = req.query(&[("agent", agent)]);
    }
    let body = daemon_json(req.send());

    if json {
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
        return;
    }

    let tasks = body["tasks"].as_array().cloned().unwrap_or_default();
    if tasks.is_empty() {
        ui::success("No tasks");
        return;
    }

    let mut table = Table::new(&["Task", "From", "To", "Priority", "Status", "Objective"]);
    for t in &tasks {
        let objective = t["objective"].as_str().unwrap_or("?");
        let objective = if objective.chars().count() > 40 {
            format!("{}...", objective.chars().take(37).collect::<String>())
        } else {
            objective.to_string()
        };
        table.add_row(&[
            t["id"].as_str().unwrap_or("?"),
            t["source_agent"].as_str().unwrap_or("?"),
            t["target_agent"].as_str().unwrap_or("?"),
            t["priority"].as_str().unwrap_or("?"),
            &ui::status_glyph(t["status"].as_str().unwrap_or("?")),
            &objective,
        ]);
    }
    table.print();
}

pub fn cmd_audit(limit: usize, verify: bool) {
    let base = require_daemon("audit");
    let client = daemon_client();

    if verify {
        let body = daemon_json(client.get(format!("{base}/api/audit/verify")).send());
        if body["valid"].as_bool().unwrap_or(false) {
            ui::success(&format!(
                "Audit chain valid ({} entries)",
                body["entries"].as_u64().unwrap_or(0)
            ));
        } else {
            ui::error(&format!(
                "Audit chain BROKEN: {}",
                body["reason"].as_str().unwrap_or("?")
            ));
            std::process::exit(1);
        }
        return;
    }

    let body = daemon_json(
        client
            .get(format!("{base}/api/audit/recent"))
            .query(&[("limit", limit.to_string())])
            .send(),
    );
    let entries = body["entries"].as_array().cloned().unwrap_or_default();
    if entries.is_empty() {
        ui::success("Audit log is empty");
        return;
    }

    let mut table = Table::new(&["Seq", "Time", "Agent", "Action", "Outcome"]).align_right(0);
    for e in &entries {
        table.add_row(&[
            &e["seq"].as_u64().unwrap_or(0).to_string(),
            e["timestamp"].as_str().unwrap_or("?"),
            e["agent"].as_str().unwrap_or("?"),
            e["action"].as_str().unwrap_or("?"),
            e["outcome"].as_str().unwrap_or("?"),
        ]);
    }
    table.print();
    ui::blank();
    ui::kv("Tip hash", body["tip_hash"].as_str().unwrap_or("?"));
}

pub fn cmd_halt(force: bool) {
    let base = require_daemon("halt");
    let client = daemon_client();

    if force {
        let body = daemon_json(
            client
                .post(format!("{base}/api/halt"))
                .json(&serde_json::json!({ "reason": "cli halt --force" }))
                .send(),
        );
        ui::success(&format!(
            "Halted: {} agent(s) killed",
            body["agents_killed"].as_u64().unwrap_or(0)
        ));
        return;
    }

    // Graceful: stop running agents one at a time, the daemon stays up.
    let body = daemon_json(client.get(format!("{base}/api/agents")).send());
    let agents = body["agents"].as_array().cloned().unwrap_or_default();
    let mut stopped = 0;
    for a in &agents {
        let status = a["status"].as_str().unwrap_or("");
        if status == "running" || status == "starting" {
            let name = a["manifest"]["name"].as_str().unwrap_or("");
            match client
                .post(format!("{base}/api/agents/{name}/stop"))
                .send()
            {
                Ok(r) if r.status().is_success() => {
                    ui::success(&format!("{name} stopped"));
                    stopped += 1;
                }
                _ => ui::error(&format!("Could not stop {name}")),
            }
        }
    }
    if stopped == 0 {
        ui::success("No agents were running");
    }
    ui::hint("The daemon is still up; use `uplift stop` to shut it down");
}

pub fn cmd_completion(shell: clap_complete::Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "uplift", &mut std::io::stdout());
}
