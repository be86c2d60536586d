//! Handlers for dashboard operations

pub mod config;
pub mod deploy;
pub mod gcp;
pub mod mcp;
pub mod system;
