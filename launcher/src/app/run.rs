//! Main application run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::audit::CliAuditAgent;
use crate::config::store::ConfigStore;
use crate::errors::LauncherError;
use crate::pipeline::orchestrator::PipelineCommands;
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// Maximum delay for graceful shutdown before giving up.
const MAX_SHUTDOWN_DELAY: Duration = Duration::from_secs(10);

/// Run the launcher until the shutdown signal fires.
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), LauncherError> {
    info!("Initializing MCP Launcher...");

    let store = match &options.config_dir {
        Some(dir) => ConfigStore::at(dir.clone()),
        None => ConfigStore::default_location()?,
    };
    seed_credentials(&store, &options).await?;

    let agent = Arc::new(CliAuditAgent {
        command: options.agent_command.clone(),
    });
    let state = Arc::new(ServerState::new(store, agent, PipelineCommands::default()));

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut server_rx = shutdown_tx.subscribe();
    let server_handle = serve(&options.server, state, async move {
        let _ = server_rx.recv().await;
    })
    .await?;

    let url = format!("http://localhost:{}", options.server.port);
    info!("Dashboard running at {}", url);
    if options.open_browser {
        crate::utils::open_browser(&url);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(MAX_SHUTDOWN_DELAY, server_handle).await {
        Ok(joined) => {
            joined.map_err(|e| LauncherError::ServerError(e.to_string()))??;
        }
        Err(_) => {
            error!("Shutdown timed out after {:?}, exiting anyway", MAX_SHUTDOWN_DELAY);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Copy command-line credentials into the store, filling only the slots the
/// dashboard has not set yet. Onboarding completes when both end up present.
async fn seed_credentials(store: &ConfigStore, options: &AppOptions) -> Result<(), LauncherError> {
    if options.project_id.is_none() && options.anthropic_key.is_none() {
        return Ok(());
    }

    let mut config = store.load().await;
    let mut changed = false;

    if let Some(project_id) = &options.project_id {
        let empty = config
            .credentials
            .google_project_id
            .as_deref()
            .unwrap_or("")
            .is_empty();
        if empty {
            config.credentials.google_project_id = Some(project_id.clone());
            changed = true;
        }
    }
    if let Some(key) = &options.anthropic_key {
        let empty = config
            .credentials
            .anthropic_key
            .as_deref()
            .unwrap_or("")
            .is_empty();
        if empty {
            config.credentials.anthropic_key = Some(key.clone());
            changed = true;
        }
    }

    if !changed {
        return Ok(());
    }

    let has_project = config
        .credentials
        .google_project_id
        .as_deref()
        .is_some_and(|v| !v.is_empty());
    let has_key = config
        .credentials
        .anthropic_key
        .as_deref()
        .is_some_and(|v| !v.is_empty());
    if has_project && has_key {
        config.onboarding_completed = true;
    }

    info!("Seeding credentials from the command line");
    store.save(&config).await
}
