//! Command implementations by domain.

pub mod agent;
pub mod approvals;
pub mod init;
pub mod memory;
pub mod system;
