//! Request handlers for the agent and management surfaces.

use crate::auth::AgentIdentity;
use crate::error::ApiError;
use crate::server::ApiState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uplift_types::approval::RiskLevel;
use uplift_types::error::UpliftError;
use uplift_types::scope::ScopeUri;
use uplift_types::task::{CompletionReport, DelegationRequest, TaskStatus};

type Handled = Result<(StatusCode, Json<Value>), ApiError>;

fn ok(body: Value) -> Handled {
    Ok((StatusCode::OK, Json(body)))
}

// -- Agent surface: memory --

#[derive(Deserialize)]
pub struct StoreBody {
    pub scope: ScopeUri,
    pub key: String,
    pub value: Value,
}

pub async fn memory_store(
    State(state): State<ApiState>,
    Extension(AgentIdentity(agent)): Extension<AgentIdentity>,
    Json(body): Json<StoreBody>,
) -> Handled {
    let version = state
        .kernel
        .memory_set(&agent, &body.scope, &body.key, &body.value)?;
    ok(json!({ "version": version }))
}

#[derive(Deserialize)]
pub struct GetParams {
    pub scope: ScopeUri,
    pub key: String,
}

pub async fn memory_get(
    State(state): State<ApiState>,
    Extension(AgentIdentity(agent)): Extension<AgentIdentity>,
    Query(params): Query<GetParams>,
) -> Handled {
    match state.kernel.memory_get(&agent, &params.scope, &params.key)? {
        Some(value) => ok(json!({ "value": value })),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no value for key '{}'", params.key) })),
        )),
    }
}

#[derive(Deserialize)]
pub struct QueryBody {
    pub query: String,
    #[serde(default)]
    pub scopes: Option<Vec<ScopeUri>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn memory_query(
    State(state): State<ApiState>,
    Extension(AgentIdentity(agent)): Extension<AgentIdentity>,
    Json(body): Json<QueryBody>,
) -> Handled {
    let hits = state
        .kernel
        .memory_query(&agent, &body.query, body.scopes, body.limit)?;
    ok(json!({ "results": hits }))
}

#[derive(Deserialize)]
pub struct DeleteBody {
    pub scope: ScopeUri,
    pub key: String,
}

pub async fn memory_delete(
    State(state): State<ApiState>,
    Extension(AgentIdentity(agent)): Extension<AgentIdentity>,
    Json(body): Json<DeleteBody>,
) -> Handled {
    let deleted = state
        .kernel
        .memory_delete(&agent, &body.scope, &body.key)?;
    ok(json!({ "deleted": deleted }))
}

// -- Agent surface: orchestration --

pub async fn delegate(
    State(state): State<ApiState>,
    Extension(AgentIdentity(agent)): Extension<AgentIdentity>,
    Json(req): Json<DelegationRequest>,
) -> Handled {
    let task_id = state.kernel.orchestrator.delegate(&agent, req).await?;
    ok(json!({ "task_id": task_id }))
}

pub async fn directory(State(state): State<ApiState>) -> Handled {
    let agents = state.kernel.orchestrator.directory()?;
    ok(json!({ "agents": agents }))
}

pub async fn current_task(
    State(state): State<ApiState>,
    Extension(AgentIdentity(agent)): Extension<AgentIdentity>,
) -> Handled {
    match state.kernel.orchestrator.current_task(&agent).await? {
        Some(ctx) => ok(serde_json::to_value(ctx).map_err(UpliftError::from)?),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no task available" })),
        )),
    }
}

pub async fn complete_task(
    State(state): State<ApiState>,
    Extension(AgentIdentity(agent)): Extension<AgentIdentity>,
    Json(report): Json<CompletionReport>,
) -> Handled {
    state.kernel.orchestrator.complete(&agent, report).await?;
    ok(json!({ "status": "ok" }))
}

// -- Agent surface: approvals --

#[derive(Deserialize)]
pub struct ApprovalRequestBody {
    pub action: String,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

pub async fn request_approval(
    State(state): State<ApiState>,
    Extension(AgentIdentity(agent)): Extension<AgentIdentity>,
    Json(body): Json<ApprovalRequestBody>,
) -> Handled {
    let request = state
        .kernel
        .approvals
        .request(
            &agent,
            &body.action,
            body.details,
            body.risk_level,
            body.category,
            body.timeout_secs,
        )
        .await?;
    ok(json!({
        "request_id": request.id,
        "status": request.status,
        "timeout_at": request.timeout_at,
    }))
}

// -- Management surface --

pub async fn health() -> Handled {
    ok(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

pub async fn status(State(state): State<ApiState>) -> Handled {
    let status = state.kernel.status().await?;
    ok(serde_json::to_value(status).map_err(UpliftError::from)?)
}

pub async fn list_agents(State(state): State<ApiState>) -> Handled {
    let entries = state.kernel.agents.list()?;
    ok(json!({ "agents": entries }))
}

pub async fn start_agent(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Handled {
    let pid = state.kernel.processes.start(&name).await?;
    ok(json!({ "status": "starting", "pid": pid }))
}

#[derive(Deserialize, Default)]
pub struct StopParams {
    #[serde(default)]
    pub force: bool,
}

pub async fn stop_agent(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(params): Query<StopParams>,
) -> Handled {
    state.kernel.processes.stop(&name, params.force).await?;
    ok(json!({ "status": "stopped" }))
}

#[derive(Deserialize)]
pub struct RegisterBody {
    #[serde(flatten)]
    pub manifest: uplift_types::agent::AgentManifest,
    #[serde(default)]
    pub start: bool,
}

/// Register an agent from its manifest, optionally starting it.
pub async fn register_agent(
    State(state): State<ApiState>,
    Json(body): Json<RegisterBody>,
) -> Handled {
    let name = body.manifest.name.clone();
    let id = state.kernel.register_manifest(body.manifest)?;
    let pid = if body.start {
        Some(state.kernel.processes.start(&name).await?)
    } else {
        None
    };
    ok(json!({ "name": name, "id": id, "pid": pid }))
}

// Operator access to agent memory. The named agent's grants still apply,
// so the CLI sees exactly what that agent could see.

#[derive(Deserialize)]
pub struct OperatorGetParams {
    pub agent: String,
    pub scope: ScopeUri,
    pub key: Option<String>,
}

pub async fn operator_memory_get(
    State(state): State<ApiState>,
    Query(params): Query<OperatorGetParams>,
) -> Handled {
    match params.key {
        Some(key) => match state.kernel.memory_get(&params.agent, &params.scope, &key)? {
            Some(value) => ok(json!({ "value": value })),
            None => Ok((
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("no value for key '{key}'") })),
            )),
        },
        None => {
            let entries = state.kernel.memory_list(&params.agent, &params.scope)?;
            ok(json!({ "entries": entries }))
        }
    }
}

#[derive(Deserialize)]
pub struct OperatorStoreBody {
    pub agent: String,
    pub scope: ScopeUri,
    pub key: String,
    pub value: Value,
}

pub async fn operator_memory_store(
    State(state): State<ApiState>,
    Json(body): Json<OperatorStoreBody>,
) -> Handled {
    let version = state
        .kernel
        .memory_set(&body.agent, &body.scope, &body.key, &body.value)?;
    ok(json!({ "version": version }))
}

#[derive(Deserialize)]
pub struct OperatorDeleteBody {
    pub agent: String,
    pub scope: ScopeUri,
    pub key: String,
}

pub async fn operator_memory_delete(
    State(state): State<ApiState>,
    Json(body): Json<OperatorDeleteBody>,
) -> Handled {
    let deleted = state
        .kernel
        .memory_delete(&body.agent, &body.scope, &body.key)?;
    ok(json!({ "deleted": deleted }))
}

#[derive(Deserialize)]
pub struct OperatorApprovalBody {
    #[serde(default = "operator_actor")]
    pub agent: String,
    pub action: String,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn operator_actor() -> String {
    "operator".to_string()
}

/// File an approval request on an agent's behalf, e.g. from the CLI.
pub async fn operator_request_approval(
    State(state): State<ApiState>,
    Json(body): Json<OperatorApprovalBody>,
) -> Handled {
    let request = state
        .kernel
        .approvals
        .request(
            &body.agent,
            &body.action,
            body.details,
            body.risk_level,
            body.category,
            body.timeout_secs,
        )
        .await?;
    ok(json!({
        "request_id": request.id,
        "status": request.status,
        "timeout_at": request.timeout_at,
    }))
}

pub async fn pending_approvals(State(state): State<ApiState>) -> Handled {
    let pending = state.kernel.approvals.pending()?;
    ok(json!({ "approvals": pending }))
}

pub async fn get_approval(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Handled {
    let request = state.kernel.approvals.get(&id)?;
    ok(serde_json::to_value(request).map_err(UpliftError::from)?)
}

#[derive(Deserialize)]
pub struct ApproveBody {
    pub approver: String,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn approve(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<ApproveBody>,
) -> Handled {
    let request = state
        .kernel
        .approvals
        .approve(&id, &body.approver, body.comment)
        .await?;
    ok(serde_json::to_value(request).map_err(UpliftError::from)?)
}

#[derive(Deserialize)]
pub struct DenyBody {
    pub approver: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn deny(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<DenyBody>,
) -> Handled {
    let request = state
        .kernel
        .approvals
        .deny(&id, &body.approver, body.reason)
        .await?;
    ok(serde_json::to_value(request).map_err(UpliftError::from)?)
}

#[derive(Deserialize, Default)]
pub struct TasksParams {
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list_tasks(
    State(state): State<ApiState>,
    Query(params): Query<TasksParams>,
) -> Handled {
    let status = match params.status.as_deref() {
        Some(s) => Some(TaskStatus::parse(s).ok_or_else(|| {
            UpliftError::InvalidInput(format!("unknown task status '{s}'"))
        })?),
        None => None,
    };
    let tasks = state.kernel.orchestrator.list_tasks(
        params.agent.as_deref(),
        status,
        params.limit.unwrap_or(50),
    )?;
    ok(json!({ "tasks": tasks }))
}

#[derive(Deserialize, Default)]
pub struct AuditParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn audit_recent(
    State(state): State<ApiState>,
    Query(params): Query<AuditParams>,
) -> Handled {
    let entries = state.kernel.audit.recent(params.limit.unwrap_or(50));
    ok(json!({ "entries": entries, "tip_hash": state.kernel.audit.tip_hash() }))
}

pub async fn audit_verify(State(state): State<ApiState>) -> Handled {
    match state.kernel.audit.verify_integrity() {
        Ok(()) => ok(json!({ "valid": true, "entries": state.kernel.audit.len() })),
        Err(reason) => ok(json!({ "valid": false, "reason": reason })),
    }
}

pub async fn shutdown(State(state): State<ApiState>) -> Handled {
    tracing::info!("Shutdown requested over the API");
    state.kernel.shutdown().await;
    let _ = state.shutdown.send(true);
    ok(json!({ "status": "shutting down" }))
}

#[derive(Deserialize, Default)]
pub struct HaltBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Kill switch. Force-kills every agent process but leaves the daemon up
/// so the operator can inspect state afterwards.
pub async fn halt(
    State(state): State<ApiState>,
    body: Option<Json<HaltBody>>,
) -> Handled {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "operator halt".to_string());
    let killed = state.kernel.processes.emergency_stop(&reason).await;
    ok(json!({ "status": "halted", "agents_killed": killed }))
}
