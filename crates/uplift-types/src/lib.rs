//! Core types for the UPLIFT agent runtime.
//!
//! This crate defines the shared data structures used across the UPLIFT
//! kernel, memory substrate, HTTP API, and CLI. It contains no business
//! logic.

pub mod agent;
pub mod approval;
pub mod config;
pub mod error;
pub mod event;
pub mod scope;
pub mod task;
