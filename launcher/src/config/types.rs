//! Configuration data model shared with the dashboard.
//!
//! Everything here crosses the WebSocket in camelCase and is persisted
//! verbatim to the config file, so wire names follow the dashboard.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a managed MCP server record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Draft,
    Deploying,
    Healthy,
    Unhealthy,
}

/// One managed MCP server project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServer {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Directory containing the server source (e.g. `server.py`).
    pub source_path: String,

    #[serde(default)]
    pub status: ServerStatus,

    /// Full MCP endpoint URL after a successful deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_run_service_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_run_region: Option<String>,
}

/// Global credentials shared by every server record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_key: Option<String>,
}

/// The persisted launcher configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    #[serde(default)]
    pub onboarding_completed: bool,

    #[serde(default)]
    pub credentials: Credentials,

    #[serde(default)]
    pub servers: Vec<McpServer>,
}

impl GlobalConfig {
    pub fn find_server(&self, id: &str) -> Option<&McpServer> {
        self.servers.iter().find(|s| s.id == id)
    }
}

/// The flat pre-dashboard config shape, kept only for migration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyConfig {
    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub anthropic_key: Option<String>,

    #[serde(default)]
    pub project_path: Option<String>,
}

/// Result of validating a single form field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { valid: true, message: None }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self { valid: true, message: Some(message.into()) }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self { valid: false, message: Some(message.into()) }
    }
}

/// UI metadata for one onboarding/settings form field.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: &'static str,
    pub label: &'static str,
    pub explanation: &'static str,
    pub help_tip: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_link: Option<&'static str>,
    pub placeholder: &'static str,
    #[serde(rename = "type")]
    pub field_type: &'static str,
}
