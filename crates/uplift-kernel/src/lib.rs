//! The UPLIFT kernel: memory scopes, orchestration, approvals, and process
//! supervision behind one facade.
//!
//! The kernel owns every shared component. The HTTP API and the CLI only
//! ever talk to [`kernel::UpliftKernel`].

pub mod approvals;
pub mod audit;
pub mod config;
pub mod event_bus;
pub mod kernel;
pub mod orchestrator;
pub mod process;
pub mod scopes;
pub mod sessions;
pub mod supervisor;

/// Environment variable carrying the API base URL into agent processes.
pub const ENV_API_URL: &str = "UPLIFT_API_URL";

/// Environment variable carrying the session token into agent processes.
pub const ENV_SESSION_TOKEN: &str = "UPLIFT_SESSION_TOKEN";
