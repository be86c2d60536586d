//! Application configuration options

use std::path::PathBuf;

use crate::audit::DEFAULT_AGENT_COMMAND;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Server configuration
    pub server: ServerOptions,

    /// Open the dashboard in a browser once the server is up
    pub open_browser: bool,

    /// Directory holding the launcher config (default: `~/.mcp-launcher`)
    pub config_dir: Option<PathBuf>,

    /// Google Cloud project id provided on the command line
    pub project_id: Option<String>,

    /// Anthropic API key provided on the command line
    pub anthropic_key: Option<String>,

    /// Command used to launch the audit agent CLI
    pub agent_command: String,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            server: ServerOptions::default(),
            open_browser: true,
            config_dir: None,
            project_id: None,
            anthropic_key: None,
            agent_command: DEFAULT_AGENT_COMMAND.to_string(),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Directory of built dashboard assets, when bundled
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            static_dir: default_static_dir(),
        }
    }
}

/// A `public/` directory next to the binary (or in the working directory)
/// holds the built frontend when the launcher ships with one.
fn default_static_dir() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join("public"));
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("public"));
    }
    candidates.into_iter().find(|p| p.is_dir())
}
