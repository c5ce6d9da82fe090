//! Approval queue commands.

use crate::daemon::{daemon_client, daemon_json, require_daemon};
use crate::table::Table;
use crate::ui;

fn decider() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "operator".to_string())
}

pub fn cmd_approvals_list(json: bool) {
    let base = require_daemon("approvals list");
    let client = daemon_client();
    let body = daemon_json(client.get(format!("{base}/approvals/pending")).send());

    if json {
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
        return;
    }

    let approvals = body["approvals"].as_array().cloned().unwrap_or_default();
    if approvals.is_empty() {
        ui::success("No pending approvals");
        return;
    }

    let mut table = Table::new(&["ID", "Agent", "Action", "Risk", "Expires"]);
    for a in &approvals {
        table.add_row(&[
            a["id"].as_str().unwrap_or("?"),
            a["agent"].as_str().unwrap_or("?"),
            a["action"].as_str().unwrap_or("?"),
            a["risk_level"].as_str().unwrap_or("?"),
            a["timeout_at"].as_str().unwrap_or("?"),
        ]);
    }
    table.print();
    ui::blank();
    ui::hint("Decide with: uplift approvals approve <id>  /  uplift approvals deny <id>");
}

pub fn cmd_approvals_approve(id: &str, comment: Option<&str>) {
    let base = require_daemon("approvals approve");
    let client = daemon_client();
    let body = daemon_json(
        client
            .post(format!("{base}/approvals/{id}/approve"))
            .json(&serde_json::json!({
                "approver": decider(),
                "comment": comment,
            }))
            .send(),
    );
    ui::success(&format!(
        "{id} approved ({})",
        body["agent"].as_str().unwrap_or("?")
    ));
}

pub fn cmd_approvals_deny(id: &str, reason: Option<&str>) {
    let base = require_daemon("approvals deny");
    let client = daemon_client();
    daemon_json(
        client
            .post(format!("{base}/approvals/{id}/deny"))
            .json(&serde_json::json!({
                "approver": decider(),
                "reason": reason,
            }))
            .send(),
    );
    ui::success(&format!("{id} denied"));
}

pub fn cmd_approvals_request(action: &str, risk: &str, details: Option<&str>) {
    let details: serde_json::Value = match details {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                ui::error(&format!("--details is not valid JSON: {e}"));
                std::process::exit(1);
            }
        },
        None => serde_json::Value::Null,
    };

    let base = require_daemon("approvals request");
    let client = daemon_client();
    let body = daemon_json(
        client
            .post(format!("{base}/api/approvals/request"))
            .json(&serde_json::json!({
                "action": action,
                "risk_level": risk,
                "details": details,
            }))
            .send(),
    );
    ui::success(&format!(
        "Filed {} (expires {})",
        body["request_id"].as_str().unwrap_or("?"),
        body["timeout_at"].as_str().unwrap_or("?")
    ));
}
