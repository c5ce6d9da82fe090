//! HTTP surface of the UPLIFT daemon.
//!
//! Two route groups share one axum router: the agent surface (memory,
//! orchestration, approval requests) authenticated by per-process session
//! tokens, and the management surface (`/api/*`, approval decisions)
//! authenticated by the configured API key.

pub mod auth;
pub mod error;
pub mod info;
pub mod rate_limiter;
pub mod routes;
pub mod server;

pub use server::{build_router, run_server, ApiState};
