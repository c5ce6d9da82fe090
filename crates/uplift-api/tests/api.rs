//! End-to-end router tests against an in-memory kernel.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceExt;
use uplift_api::build_router;
use uplift_kernel::kernel::UpliftKernel;
use uplift_types::agent::AgentManifest;
use uplift_types::config::RuntimeConfig;

async fn harness(config: RuntimeConfig) -> (Router, Arc<UpliftKernel>) {
    let kernel = UpliftKernel::boot_with_db(config, uplift_memory::open_in_memory().unwrap())
        .await
        .unwrap();
    let (shutdown_tx, _) = watch::channel(false);
    (build_router(kernel.clone(), shutdown_tx), kernel)
}

fn register(kernel: &UpliftKernel, yaml: &str) {
    kernel
        .register_manifest(AgentManifest::from_yaml(yaml).unwrap())
        .unwrap();
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or_default()
}

#[tokio::test]
async fn health_is_open() {
    let (app, _) = harness(RuntimeConfig::default()).await;
    let response = app
        .oneshot(request("GET", "/api/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn agent_routes_require_session_token() {
    let (app, _) = harness(RuntimeConfig::default()).await;

    let response = app
        .clone()
        .oneshot(request("GET", "/orchestrate/directory", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(request(
            "GET",
            "/orchestrate/directory",
            Some("writer.deadbeef.0000"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn management_routes_require_api_key_when_configured() {
    let config = RuntimeConfig {
        api_key: Some("sekrit-key".to_string()),
        ..RuntimeConfig::default()
    };
    let (app, _) = harness(config).await;

    let response = app
        .clone()
        .oneshot(request("GET", "/api/agents", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(request("GET", "/api/agents", Some("wrong-key!!"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(request("GET", "/api/agents", Some("sekrit-key"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn memory_round_trip_with_scope_enforcement() {
    let (app, kernel) = harness(RuntimeConfig::default()).await;
    register(
        &kernel,
        "name: research-agent\nentrypoint:\n  command: python3\n",
    );
    let token = kernel.sessions.issue("research-agent");

    // Store into the private scope
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/memory/store",
            Some(&token),
            Some(json!({
                "scope": "uplift://agent/research-agent",
                "key": "findings",
                "value": {"topic": "rust"},
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["version"], 1);

    // Read it back
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            "/memory/get?scope=uplift%3A%2F%2Fagent%2Fresearch-agent&key=findings",
            Some(&token),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["value"]["topic"], "rust");

    // A missing key is 404
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            "/memory/get?scope=uplift%3A%2F%2Fagent%2Fresearch-agent&key=absent",
            Some(&token),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // An ungranted scope is 403, identity comes from the token
    let response = app
        .oneshot(request(
            "POST",
            "/memory/store",
            Some(&token),
            Some(json!({
                "scope": "uplift://user/financial",
                "key": "card",
                "value": "1234",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delegation_flow_over_http() {
    let (app, kernel) = harness(RuntimeConfig::default()).await;
    register(
        &kernel,
        "name: invoice-manager\nentrypoint:\n  command: python3\nscopes:\n  - scope: uplift://shared/invoices\n    access: read_write\n",
    );
    register(
        &kernel,
        "name: writer-agent\nentrypoint:\n  command: python3\n",
    );
    let manager = kernel.sessions.issue("invoice-manager");
    let writer = kernel.sessions.issue("writer-agent");

    // The directory lists both agents
    let response = app
        .clone()
        .oneshot(request("GET", "/orchestrate/directory", Some(&manager), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["agents"].as_array().unwrap().len(), 2);

    // Delegate with a shared scope
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/orchestrate/delegate",
            Some(&manager),
            Some(json!({
                "target_agent_id": "writer-agent",
                "objective": "summarize march invoices",
                "input_data": {"month": "march"},
                "shared_scopes": ["uplift://shared/invoices"],
                "priority": "high",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let task_id = body_json(response).await["task_id"]
        .as_str()
        .unwrap()
        .to_string();

    // The writer claims it
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            "/orchestrate/current_task",
            Some(&writer),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ctx = body_json(response).await;
    assert_eq!(ctx["task_id"], task_id.as_str());
    assert_eq!(ctx["source_agent"], "invoice-manager");

    // Delegation grants the writer the shared scope for the task's lifetime
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/memory/store",
            Some(&writer),
            Some(json!({
                "scope": "uplift://shared/invoices",
                "key": "summary",
                "value": "total: 12",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Complete; the grant is revoked
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/orchestrate/complete",
            Some(&writer),
            Some(json!({
                "task_id": task_id,
                "status": "success",
                "output_memory_key": "summary",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request(
            "POST",
            "/memory/store",
            Some(&writer),
            Some(json!({
                "scope": "uplift://shared/invoices",
                "key": "late",
                "value": 1,
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn approval_flow_over_http() {
    let (app, kernel) = harness(RuntimeConfig::default()).await;
    register(
        &kernel,
        "name: invoice-manager\nentrypoint:\n  command: python3\n",
    );
    let token = kernel.sessions.issue("invoice-manager");

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/approvals/request",
            Some(&token),
            Some(json!({
                "action": "pay invoice #42",
                "details": {"amount": 1800},
                "risk_level": "high",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let id = body["request_id"].as_str().unwrap().to_string();
    assert!(id.starts_with("AR-"));
    assert_eq!(body["status"], "pending");

    let response = app
        .clone()
        .oneshot(request("GET", "/approvals/pending", None, None))
        .await
        .unwrap();
    assert_eq!(
        body_json(response).await["approvals"]
            .as_array()
            .unwrap()
            .len(),
        1
    );

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/approvals/{id}/approve"),
            None,
            Some(json!({"approver": "alex", "comment": "checked the ledger"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "approved");

    // Deciding twice is rejected
    let response = app
        .oneshot(request(
            "POST",
            &format!("/approvals/{id}/deny"),
            None,
            Some(json!({"approver": "alex"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_agent_start_is_404() {
    let (app, _) = harness(RuntimeConfig::default()).await;
    let response = app
        .oneshot(request("POST", "/api/agents/ghost/start", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn audit_chain_is_exposed_and_valid() {
    let (app, kernel) = harness(RuntimeConfig::default()).await;
    register(
        &kernel,
        "name: research-agent\nentrypoint:\n  command: python3\n",
    );
    let token = kernel.sessions.issue("research-agent");

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/memory/store",
            Some(&token),
            Some(json!({
                "scope": "uplift://agent/research-agent",
                "key": "k",
                "value": 1,
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(request("GET", "/api/audit/recent", None, None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(!body["entries"].as_array().unwrap().is_empty());

    let response = app
        .oneshot(request("GET", "/api/audit/verify", None, None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["valid"], true);
}
