//! MCP Launcher Library
//!
//! Core modules for the MCP Launcher dashboard and deploy pipeline.

pub mod app;
pub mod audit;
pub mod config;
pub mod errors;
pub mod events;
pub mod filesys;
pub mod gcp;
pub mod logs;
pub mod mcp;
pub mod pipeline;
pub mod server;
pub mod utils;
