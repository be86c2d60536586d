//! Utility functions

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Version information for the launcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Resolve the user's home directory from the environment
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Derive a Cloud Run service name from a display name.
///
/// Lowercases the name, replaces every character outside `[a-z0-9]`
/// with a hyphen and truncates to 50 characters.
pub fn service_slug(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect();
    slug.chars().take(50).collect()
}

/// Format a timestamp the way the dashboard expects it (ISO-8601 with
/// millisecond precision, UTC).
pub fn iso_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Open a URL in the default browser. Failures are ignored; the URL is
/// always printed to the terminal as a fallback.
pub fn open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    let result = std::process::Command::new("open").arg(url).spawn();

    #[cfg(target_os = "windows")]
    let result = std::process::Command::new("cmd").args(["/C", "start", url]).spawn();

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let result = std::process::Command::new("xdg-open").arg(url).spawn();

    if let Err(e) = result {
        tracing::debug!("Could not open browser: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_slug() {
        assert_eq!(service_slug("My MCP Server"), "my-mcp-server");
        assert_eq!(service_slug("weather_api v2"), "weather-api-v2");
        assert_eq!(service_slug("simple"), "simple");
    }

    #[test]
    fn test_service_slug_truncates() {
        let long = "x".repeat(80);
        assert_eq!(service_slug(&long).len(), 50);
    }

    #[test]
    fn test_version_info() {
        let info = version_info();
        assert!(!info.version.is_empty());
    }
}
