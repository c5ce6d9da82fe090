//! Router assembly and daemon server loop.

use crate::rate_limiter::{create_rate_limiter, gcra_rate_limit};
use crate::{auth, routes};
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uplift_kernel::kernel::UpliftKernel;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub kernel: Arc<UpliftKernel>,
    /// Send `true` to stop the server loop.
    pub shutdown: watch::Sender<bool>,
}

/// Assemble the full router: agent surface behind session-token auth,
/// management surface behind the API key, GCRA limiting over both.
pub fn build_router(kernel: Arc<UpliftKernel>, shutdown: watch::Sender<bool>) -> Router {
    let state = ApiState {
        kernel: kernel.clone(),
        shutdown,
    };

    let agent_surface = Router::new()
        .route("/memory/store", post(routes::memory_store))
        .route("/memory/get", get(routes::memory_get))
        .route("/memory/query", post(routes::memory_query))
        .route("/memory/delete", delete(routes::memory_delete))
        .route("/orchestrate/delegate", post(routes::delegate))
        .route("/orchestrate/directory", get(routes::directory))
        .route("/orchestrate/current_task", get(routes::current_task))
        .route("/orchestrate/complete", post(routes::complete_task))
        .route("/approvals/request", post(routes::request_approval))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::agent_auth,
        ));

    let management_surface = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/status", get(routes::status))
        .route(
            "/api/agents",
            get(routes::list_agents).post(routes::register_agent),
        )
        .route(
            "/api/memory",
            get(routes::operator_memory_get)
                .post(routes::operator_memory_store)
                .delete(routes::operator_memory_delete),
        )
        .route(
            "/api/approvals/request",
            post(routes::operator_request_approval),
        )
        .route("/api/agents/{name}/start", post(routes::start_agent))
        .route("/api/agents/{name}/stop", post(routes::stop_agent))
        .route("/api/tasks", get(routes::list_tasks))
        .route("/approvals/pending", get(routes::pending_approvals))
        .route("/approvals/{id}", get(routes::get_approval))
        .route("/approvals/{id}/approve", post(routes::approve))
        .route("/approvals/{id}/deny", post(routes::deny))
        .route("/api/audit/recent", get(routes::audit_recent))
        .route("/api/audit/verify", get(routes::audit_verify))
        .route("/api/shutdown", post(routes::shutdown))
        .route("/api/halt", post(routes::halt))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::management_auth,
        ));

    let mut router = Router::new()
        .merge(agent_surface)
        .merge(management_surface);

    if kernel.config.rate_limit.enabled {
        let limiter = create_rate_limiter(kernel.config.rate_limit.units_per_minute);
        router = router.layer(middleware::from_fn_with_state(limiter, gcra_rate_limit));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the shutdown channel fires. Writes the daemon info file on
/// startup and removes it on exit.
pub async fn run_server(
    kernel: Arc<UpliftKernel>,
    listener: tokio::net::TcpListener,
    shutdown_tx: watch::Sender<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(kernel, shutdown_tx);

    if let Err(e) = crate::info::write_daemon_info(addr) {
        error!(error = %e, "Could not write daemon info file");
    }

    info!("UPLIFT daemon listening on http://{addr}");
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.wait_for(|v| *v).await;
        info!("Daemon received shutdown signal");
    })
    .await;

    crate::info::remove_daemon_info();
    result
}
