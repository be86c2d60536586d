//! Command line and environment configuration.
//!
//! Values are layered: a flag beats a process environment variable, which
//! beats a `.env` file entry. The `.env` file is searched in the working
//! directory first, then in `~/.mcp-launcher`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::LauncherError;
use crate::utils::{home_dir, iso_now};

pub const ENV_PROJECT_ID: &str = "GOOGLE_PROJECT_ID";
pub const ENV_ANTHROPIC_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_PORT: &str = "PORT";
pub const ENV_CI: &str = "CI";

const DEFAULT_PORT: u16 = 3000;

/// Parsed command line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliFlags {
    pub help: bool,
    pub version: bool,
    pub project: Option<String>,
    pub api_key: Option<String>,
    pub port: Option<String>,
    pub no_browser: bool,
    pub save_config: bool,
    pub ci: bool,
}

/// Parse `--flag value` and `--flag=value` forms, with the short aliases
/// the launcher documents. Unknown arguments are ignored.
pub fn parse_flags(args: &[String]) -> CliFlags {
    let mut flags = CliFlags::default();
    let mut i = 0;

    while i < args.len() {
        let arg = args[i].as_str();
        let (name, inline) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg, None),
        };

        match name {
            "--help" | "-h" => flags.help = true,
            "--version" | "-v" => flags.version = true,
            "--no-browser" => flags.no_browser = true,
            "--save-config" | "-s" => flags.save_config = true,
            "--ci" => flags.ci = true,
            "--project" | "-p" => flags.project = flag_value(inline, args, &mut i),
            "--api-key" | "-k" => flags.api_key = flag_value(inline, args, &mut i),
            "--port" => flags.port = flag_value(inline, args, &mut i),
            _ => {}
        }
        i += 1;
    }

    flags
}

/// The value of a flag at position `i`: inline (`--flag=value`) or the
/// following argument (`--flag value`).
fn flag_value(inline: Option<&str>, args: &[String], i: &mut usize) -> Option<String> {
    if let Some(value) = inline {
        return Some(value.to_string());
    }
    let next = args.get(*i + 1)?;
    if next.starts_with('-') {
        return None;
    }
    *i += 1;
    Some(next.clone())
}

/// The effective launch configuration after layering flags over the
/// environment over the `.env` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub project_id: Option<String>,
    pub anthropic_key: Option<String>,
    pub port: u16,
    pub ci: bool,
    pub open_browser: bool,
}

pub fn resolve<F>(flags: &CliFlags, env_var: F, file_env: &HashMap<String, String>) -> ResolvedConfig
where
    F: Fn(&str) -> Option<String>,
{
    let layered = |flag: &Option<String>, key: &str| -> Option<String> {
        flag.clone()
            .or_else(|| env_var(key))
            .or_else(|| file_env.get(key).cloned())
            .filter(|v| !v.is_empty())
    };

    let port = layered(&flags.port, ENV_PORT)
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let env_ci = env_var(ENV_CI).unwrap_or_default();
    let ci = flags.ci || env_ci == "true";
    let open_browser = !flags.no_browser && !ci && env_ci.is_empty();

    ResolvedConfig {
        project_id: layered(&flags.project, ENV_PROJECT_ID),
        anthropic_key: layered(&flags.api_key, ENV_ANTHROPIC_KEY),
        port,
        ci,
        open_browser,
    }
}

/// Locate an existing `.env` file: working directory first, then the
/// launcher's home directory.
pub fn find_env_file() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(".env"));
    }
    if let Some(home) = home_dir() {
        candidates.push(home.join(".mcp-launcher").join(".env"));
    }
    candidates.into_iter().find(|p| p.is_file())
}

/// Parse a `.env` file into key/value pairs. Comment lines and lines
/// without `=` are skipped.
pub async fn load_env_file(path: &Path) -> HashMap<String, String> {
    let Ok(content) = tokio::fs::read_to_string(path).await else {
        return HashMap::new();
    };
    parse_env(&content)
}

fn parse_env(content: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.contains('#') {
            continue;
        }
        env.insert(key.to_string(), value.trim().to_string());
    }
    env
}

/// Write the launch configuration as a commented `.env` template.
pub async fn save_env_file(
    path: &Path,
    project_id: Option<&str>,
    anthropic_key: Option<&str>,
) -> Result<(), LauncherError> {
    let mut content = String::from("# MCP Launcher Configuration\n");
    content.push_str(&format!("# Generated on {}\n\n", iso_now()));

    if let Some(project_id) = project_id {
        content.push_str("# Required: Your Google Cloud Project ID\n");
        content.push_str(&format!("{}={}\n\n", ENV_PROJECT_ID, project_id));
    }
    if let Some(key) = anthropic_key {
        content.push_str("# Optional: Your Anthropic API Key (for agent features)\n");
        content.push_str(&format!("{}={}\n\n", ENV_ANTHROPIC_KEY, key));
    }
    content.push_str("# Optional: Server port (default: 3000)\n# PORT=3000\n\n");
    content.push_str("# Optional: Set to 'true' to disable browser auto-open\n# CI=false\n");

    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
