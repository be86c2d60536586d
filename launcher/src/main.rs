//! MCP Launcher - Entry Point
//!
//! Local dashboard that audits, containerizes and deploys Python MCP
//! servers to Google Cloud Run.

use std::collections::HashMap;
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use colored::Colorize;
use tracing::{error, info};

use mcp_launcher::app::cli::{self, CliFlags, ResolvedConfig, ENV_PROJECT_ID};
use mcp_launcher::app::options::{AppOptions, ServerOptions};
use mcp_launcher::app::run::run;
use mcp_launcher::logs::{init_logging, LogOptions};
use mcp_launcher::pipeline::prereqs::check_prerequisites;
use mcp_launcher::utils::version_info;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().skip(1).collect();
    let flags = cli::parse_flags(&args);

    let version = version_info();
    if flags.help {
        print_help(&version.version);
        return;
    }
    if flags.version {
        println!("{}", version.version);
        return;
    }

    // Welcome banner
    println!("{}", "MCP Launcher".cyan().bold());
    println!("   Deploy MCP servers to Google Cloud Run\n");

    // The pipeline shells out to both of these; refuse to start without them.
    let prereqs = check_prerequisites().await;
    if !prereqs.gcloud.installed {
        eprintln!(
            "{}",
            "Google Cloud SDK (gcloud) is not installed or not in PATH.".red()
        );
        eprintln!("   Install from: https://cloud.google.com/sdk/docs/install\n");
        process::exit(1);
    }
    if !prereqs.docker.installed {
        eprintln!("{}", "Docker is not installed or not running.".red());
        eprintln!("   Install from: https://docs.docker.com/get-docker/\n");
        process::exit(1);
    }
    println!("{} Prerequisites checked (gcloud, docker)\n", "✓".green());

    // Layer configuration: flags over process env over .env file
    let env_file = cli::find_env_file();
    let file_env = match &env_file {
        Some(path) => cli::load_env_file(path).await,
        None => HashMap::new(),
    };
    let mut config = cli::resolve(&flags, |key| env::var(key).ok(), &file_env);

    if !config.ci {
        prompt_for_missing(&mut config);
        offer_to_save(&flags, env_file.as_deref(), &config).await;
    } else if config.project_id.is_none() {
        eprintln!(
            "{}",
            format!("Missing required configuration: {}", ENV_PROJECT_ID).red()
        );
        eprintln!("   Provide via --project flag or GOOGLE_PROJECT_ID environment variable\n");
        process::exit(1);
    }

    // Display configuration (hide the API key)
    println!("\n{}", "Configuration:".bold());
    println!("   Project ID: {}", config.project_id.as_deref().unwrap_or(""));
    let key_state = match config.anthropic_key.is_some() {
        true => "✓ Set".green(),
        false => "✗ Not set".red(),
    };
    println!("   API Key: {}", key_state);
    println!("   Port: {}", config.port);
    let browser_state = match config.open_browser {
        true => "Auto-open",
        false => "Disabled",
    };
    println!("   Browser: {}\n", browser_state);

    // Initialize logging
    let log_level = env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or_default();
    if let Err(e) = init_logging(LogOptions {
        log_level,
        ..LogOptions::default()
    }) {
        println!("Failed to initialize logging: {e}");
    }

    println!("{}\n", "Starting server...".bold());

    let options = AppOptions {
        server: ServerOptions {
            port: config.port,
            ..Default::default()
        },
        open_browser: config.open_browser,
        project_id: config.project_id.clone(),
        anthropic_key: config.anthropic_key.clone(),
        ..Default::default()
    };

    info!("Running MCP Launcher v{}", version.version);
    let result = run(options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the launcher: {e}");
        process::exit(1);
    }
}

/// Ask one question on stdout and return the trimmed answer.
fn ask(question: &str) -> String {
    print!("{question}: ");
    let _ = io::stdout().flush();

    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim().to_string()
}

/// Interactive prompts for values the flags and environment did not provide.
fn prompt_for_missing(config: &mut ResolvedConfig) {
    if config.project_id.is_none() {
        println!("{}\n", "Configuration needed:".bold());
        let answer = ask("Google Cloud Project ID");
        if answer.is_empty() {
            eprintln!("\n{}", "Google Cloud Project ID is required".red());
            process::exit(1);
        }
        config.project_id = Some(answer);
    }

    if config.anthropic_key.is_none() {
        let answer = ask("Anthropic API Key (optional, press Enter to skip)");
        if !answer.is_empty() {
            config.anthropic_key = Some(answer);
        }
    }
}

/// Offer to write the resolved values to `./.env` for future runs.
async fn offer_to_save(flags: &CliFlags, env_file: Option<&Path>, config: &ResolvedConfig) {
    let has_values = config.project_id.is_some() || config.anthropic_key.is_some();
    if !flags.save_config && !(env_file.is_none() && has_values) {
        return;
    }

    println!();
    let answer = ask("Save this configuration to .env file? (y/N)").to_lowercase();
    if answer != "y" && answer != "yes" {
        return;
    }

    let path = match env::current_dir() {
        Ok(cwd) => cwd.join(".env"),
        Err(_) => PathBuf::from(".env"),
    };
    let saved = cli::save_env_file(
        &path,
        config.project_id.as_deref(),
        config.anthropic_key.as_deref(),
    )
    .await;
    match saved {
        Ok(()) => println!("Configuration saved to: {}\n", path.display()),
        Err(e) => eprintln!("{}", format!("Failed to save configuration: {e}").red()),
    }
}

fn print_help(version: &str) {
    println!(
        r#"
{title} v{version}

Deploy MCP (Model Context Protocol) servers to Google Cloud Run

USAGE:
    mcp-launcher [OPTIONS]

OPTIONS:
    -p, --project <id>      Google Cloud Project ID
    -k, --api-key <key>     Anthropic API Key (optional, for agent features)
    --port <number>         Server port (default: 3000)
    --no-browser            Don't open browser automatically
    -s, --save-config       Save configuration to .env file
    --ci                    Run in CI mode (no interactive prompts)
    -h, --help              Show this help message
    -v, --version           Show version number

EXAMPLES:
    # Interactive mode (prompts for missing values)
    mcp-launcher

    # With project ID and API key
    mcp-launcher --project my-project --api-key sk-ant-...

    # Save configuration for future runs
    mcp-launcher --project my-project --save-config

    # Run on different port without opening browser
    mcp-launcher --port 8080 --no-browser

ENVIRONMENT VARIABLES:
    You can also set these in a .env file or environment:
    - GOOGLE_PROJECT_ID     Required: Your GCP project ID
    - ANTHROPIC_API_KEY     Optional: For agent/audit features
    - PORT                  Optional: Server port (default: 3000)
    - CI                    Optional: Disable browser auto-open
    - LOG_LEVEL             Optional: trace, debug, info, warn or error
"#,
        title = "MCP Launcher".cyan().bold(),
        version = version
    );
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        let mut sigint = signal(SignalKind::interrupt()).unwrap();

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
