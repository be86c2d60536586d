//! Form field metadata and validation for the onboarding/settings UI.

use std::collections::BTreeMap;

use crate::config::types::{FieldInfo, ValidationResult};
use crate::filesys::dir::Dir;

/// Field metadata keyed by field name, in the shape the dashboard renders.
pub fn field_definitions() -> BTreeMap<&'static str, FieldInfo> {
    BTreeMap::from([
        (
            "anthropicKey",
            FieldInfo {
                name: "anthropicKey",
                label: "Anthropic API Key",
                explanation: "Required for the AI agent that audits your code and generates deployment files.",
                help_tip: "Go to console.anthropic.com \u{2192} Settings \u{2192} API Keys \u{2192} Create Key",
                help_link: Some("https://console.anthropic.com/settings/keys"),
                placeholder: "sk-ant-api03-...",
                field_type: "password",
            },
        ),
        (
            "googleProjectId",
            FieldInfo {
                name: "googleProjectId",
                label: "GCP Project ID",
                explanation: "Your Google Cloud project where the MCP servers will be deployed.",
                help_tip: "Go to console.cloud.google.com \u{2192} Click the project dropdown at the top \u{2192} Copy the ID (not the name)",
                help_link: Some("https://console.cloud.google.com/home/dashboard"),
                placeholder: "my-ai-project-123",
                field_type: "text",
            },
        ),
        (
            "serverName",
            FieldInfo {
                name: "serverName",
                label: "Server Name",
                explanation: "A friendly name for your MCP server.",
                help_tip: "e.g., \"Weather Service\" or \"Stock Tracker\"",
                help_link: None,
                placeholder: "My MCP Server",
                field_type: "text",
            },
        ),
        (
            "sourcePath",
            FieldInfo {
                name: "sourcePath",
                label: "Project Path",
                explanation: "Directory containing your MCP server code (e.g., server.py).",
                help_tip: "Select the folder containing your Python MCP server file.",
                help_link: None,
                placeholder: "/path/to/my-mcp-server",
                field_type: "path",
            },
        ),
    ])
}

/// Validate an Anthropic API key.
pub fn validate_anthropic_key(key: &str) -> ValidationResult {
    if key.trim().is_empty() {
        return ValidationResult::invalid("API key is required");
    }
    if !key.starts_with("sk-ant-") {
        return ValidationResult::invalid("Invalid format. Key should start with \"sk-ant-\"");
    }
    if key.len() < 20 {
        return ValidationResult::invalid("API key appears too short");
    }
    ValidationResult::ok()
}

/// Validate a GCP project id against the documented naming rules.
pub fn validate_project_id(project_id: &str) -> ValidationResult {
    let id = project_id.trim();
    if id.is_empty() {
        return ValidationResult::invalid("Project ID is required");
    }
    if id.len() < 6 {
        return ValidationResult::invalid("Project ID must be at least 6 characters");
    }
    if id.len() > 30 {
        return ValidationResult::invalid("Project ID must be 30 characters or less");
    }
    if !id.starts_with(|c: char| c.is_ascii_lowercase()) {
        return ValidationResult::invalid("Project ID must start with a lowercase letter");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return ValidationResult::invalid(
            "Project ID can only contain lowercase letters, digits, and hyphens",
        );
    }
    if id.ends_with('-') {
        return ValidationResult::invalid("Project ID cannot end with a hyphen");
    }
    ValidationResult::ok()
}

/// Validate a source path: must be an existing directory. A directory with
/// no Python files is accepted with a warning rather than rejected.
pub async fn validate_source_path(path: &str) -> ValidationResult {
    if path.trim().is_empty() {
        return ValidationResult::invalid("Project path is required");
    }

    let dir = Dir::new(path);
    if !dir.exists().await {
        return ValidationResult::invalid("Directory does not exist or is not accessible");
    }

    match dir.list_file_names().await {
        Ok(names) if names.iter().any(|n| n.ends_with(".py")) => ValidationResult::ok(),
        Ok(_) => ValidationResult::ok_with("Warning: No Python files found, but directory is valid."),
        Err(_) => ValidationResult::invalid("Directory does not exist or is not accessible"),
    }
}

/// Dispatch validation by field name. Unknown fields pass.
pub async fn validate_field(field: &str, value: &str) -> ValidationResult {
    match field {
        "anthropicKey" => validate_anthropic_key(value),
        "googleProjectId" => validate_project_id(value),
        "sourcePath" => validate_source_path(value).await,
        "serverName" => {
            if value.trim().is_empty() {
                ValidationResult::invalid("Name is required")
            } else {
                ValidationResult::ok()
            }
        }
        _ => ValidationResult::ok(),
    }
}
