//! MCP (Model Context Protocol) inspection client.

pub mod client;
