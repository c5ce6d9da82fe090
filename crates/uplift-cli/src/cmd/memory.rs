//! Operator access to agent memory.

use crate::daemon::{daemon_client, daemon_json, require_daemon};
use crate::table::Table;
use crate::ui;
use uplift_types::scope::ScopeUri;

/// Parse early so bad URIs fail with a parse error instead of a 400.
fn parse_scope(scope: &str) -> ScopeUri {
    match scope.parse() {
        Ok(uri) => uri,
        Err(e) => {
            ui::error_with_fix(
                &format!("{e}"),
                "Scopes look like uplift://agent/<name>, uplift://user/<name>, uplift://shared/<name>",
            );
            std::process::exit(1);
        }
    }
}

pub fn cmd_memory_get(agent: &str, scope: &str, key: &str) {
    let scope = parse_scope(scope);
    let base = require_daemon("memory get");
    let client = daemon_client();
    let body = daemon_json(
        client
            .get(format!("{base}/api/memory"))
            .query(&[("agent", agent), ("scope", &scope.to_string()), ("key", key)])
            .send(),
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&body["value"]).unwrap_or_default()
    );
}

pub fn cmd_memory_set(agent: &str, scope: &str, key: &str, value: &str) {
    let scope = parse_scope(scope);
    // A value that parses as JSON is stored structured, anything else as a
    // plain string.
    let value: serde_json::Value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    let base = require_daemon("memory set");
    let client = daemon_client();
    let body = daemon_json(
        client
            .post(format!("{base}/api/memory"))
            .json(&serde_json::json!({
                "agent": agent,
                "scope": scope,
                "key": key,
                "value": value,
            }))
            .send(),
    );
    ui::success(&format!(
        "{scope} {key} = v{}",
        body["version"].as_u64().unwrap_or(0)
    ));
}

pub fn cmd_memory_list(agent: &str, scope: &str, json: bool) {
    let scope = parse_scope(scope);
    let base = require_daemon("memory list");
    let client = daemon_client();
    let body = daemon_json(
        client
            .get(format!("{base}/api/memory"))
            .query(&[("agent", agent), ("scope", &scope.to_string())])
            .send(),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
        return;
    }

    let entries = body["entries"].as_array().cloned().unwrap_or_default();
    if entries.is_empty() {
        ui::kv("Scope", &scope.to_string());
        ui::hint("No keys stored");
        return;
    }
    let mut table = Table::new(&["Key", "Value"]);
    for entry in &entries {
        let key = entry[0].as_str().unwrap_or("?");
        let value = entry[1].to_string();
        let value = if value.chars().count() > 60 {
            format!("{}...", value.chars().take(57).collect::<String>())
        } else {
            value
        };
        table.add_row(&[key, &value]);
    }
    table.print();
}

pub fn cmd_memory_delete(agent: &str, scope: &str, key: &str) {
    let scope = parse_scope(scope);
    let base = require_daemon("memory delete");
    let client = daemon_client();
    let body = daemon_json(
        client
            .delete(format!("{base}/api/memory"))
            .json(&serde_json::json!({
                "agent": agent,
                "scope": scope,
                "key": key,
            }))
            .send(),
    );
    if body["deleted"].as_bool().unwrap_or(false) {
        ui::success(&format!("Deleted {key} from {scope}"));
    } else {
        ui::warn_with_fix(
            &format!("{key} was not present in {scope}"),
            "List keys with: uplift memory list",
        );
    }
}
