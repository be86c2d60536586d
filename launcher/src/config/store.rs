//! Persistent config store at `~/.mcp-launcher/config.json`.
//!
//! Every mutation is read-modify-write on the whole file; writes go through
//! a temp-file rename so a crash never leaves a half-written config behind.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::types::{GlobalConfig, LegacyConfig, McpServer, ServerStatus};
use crate::errors::LauncherError;
use crate::filesys::file::File;
use crate::utils::{generate_uuid, home_dir};

/// Directory under the user's home that holds launcher state.
pub const CONFIG_DIR_NAME: &str = ".mcp-launcher";

/// Config file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Handle to the launcher's config file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    file: File,
}

impl ConfigStore {
    /// Store rooted at the default location under the user's home directory.
    pub fn default_location() -> Result<Self, LauncherError> {
        let home = home_dir().ok_or_else(|| {
            LauncherError::ConfigError("Could not determine home directory".to_string())
        })?;
        Ok(Self::at(home.join(CONFIG_DIR_NAME)))
    }

    /// Store rooted at an explicit directory (used by tests and `--config-dir`).
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            file: File::new(dir.into().join(CONFIG_FILE_NAME)),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Load the config, creating a default when the file is missing and
    /// migrating the legacy flat format when found.
    ///
    /// An unreadable or unparsable file degrades to the default config
    /// rather than failing the caller; the dashboard can always render.
    pub async fn load(&self) -> GlobalConfig {
        let raw = match self.file.exists().await {
            false => return GlobalConfig::default(),
            true => match self.file.read_string().await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Failed to read config, using default: {}", e);
                    return GlobalConfig::default();
                }
            },
        };

        let parsed: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to parse config, using default: {}", e);
                return GlobalConfig::default();
            }
        };

        // Legacy flat files carry neither a servers array nor credentials.
        if parsed.get("servers").is_none() && parsed.get("credentials").is_none() {
            info!("Migrating legacy config");
            let legacy: LegacyConfig = serde_json::from_value(parsed).unwrap_or_default();
            let migrated = migrate_legacy(legacy);
            if let Err(e) = self.save(&migrated).await {
                warn!("Failed to persist migrated config: {}", e);
            }
            return migrated;
        }

        match serde_json::from_value(parsed) {
            Ok(config) => config,
            Err(e) => {
                warn!("Config shape invalid, using default: {}", e);
                GlobalConfig::default()
            }
        }
    }

    /// Persist the whole config atomically.
    pub async fn save(&self, config: &GlobalConfig) -> Result<(), LauncherError> {
        self.file.write_json_atomic(config).await?;
        // The file carries an API key; keep it owner-only.
        self.file.set_permissions_600().await?;
        Ok(())
    }

    /// Insert or replace a server record by id, returning the saved config.
    pub async fn upsert_server(&self, server: McpServer) -> Result<GlobalConfig, LauncherError> {
        let mut config = self.load().await;
        match config.servers.iter_mut().find(|s| s.id == server.id) {
            Some(existing) => *existing = server,
            None => config.servers.push(server),
        }
        self.save(&config).await?;
        Ok(config)
    }

    /// Remove a server record by id, returning the saved config.
    pub async fn remove_server(&self, id: &str) -> Result<GlobalConfig, LauncherError> {
        let mut config = self.load().await;
        config.servers.retain(|s| s.id != id);
        self.save(&config).await?;
        Ok(config)
    }
}

/// Convert the flat legacy format into the current shape.
///
/// A legacy project path becomes one imported draft server; onboarding is
/// only considered complete when a server was imported and both
/// credentials were present.
fn migrate_legacy(old: LegacyConfig) -> GlobalConfig {
    let mut config = GlobalConfig::default();
    let had_both_credentials = old.project_id.is_some() && old.anthropic_key.is_some();
    config.credentials.google_project_id = old.project_id;
    config.credentials.anthropic_key = old.anthropic_key;

    if let Some(path) = old.project_path {
        config.servers.push(McpServer {
            id: generate_uuid(),
            name: "My First Server".to_string(),
            description: "Imported from legacy configuration".to_string(),
            source_path: path,
            status: ServerStatus::Draft,
            deployed_url: None,
            last_deployed_at: None,
            cloud_run_service_name: None,
            cloud_run_region: None,
        });
        config.onboarding_completed = had_both_credentials;
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_server(id: &str, name: &str) -> McpServer {
        McpServer {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            source_path: "/tmp/srv".to_string(),
            status: ServerStatus::Draft,
            deployed_url: None,
            last_deployed_at: None,
            cloud_run_service_name: None,
            cloud_run_region: None,
        }
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path());

        let config = store.load().await;
        assert!(!config.onboarding_completed);
        assert!(config.servers.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path());

        let mut config = GlobalConfig::default();
        config.credentials.google_project_id = Some("my-project-123".to_string());
        config.onboarding_completed = true;
        store.save(&config).await.unwrap();

        let loaded = store.load().await;
        assert!(loaded.onboarding_completed);
        assert_eq!(
            loaded.credentials.google_project_id.as_deref(),
            Some("my-project-123")
        );
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path());

        store.upsert_server(draft_server("a", "First")).await.unwrap();
        let config = store.upsert_server(draft_server("a", "Renamed")).await.unwrap();

        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].name, "Renamed");
    }

    #[tokio::test]
    async fn test_remove_server() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path());

        store.upsert_server(draft_server("a", "One")).await.unwrap();
        store.upsert_server(draft_server("b", "Two")).await.unwrap();
        let config = store.remove_server("a").await.unwrap();

        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].id, "b");
    }

    #[tokio::test]
    async fn test_legacy_migration_imports_server() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path());

        let legacy = serde_json::json!({
            "projectId": "old-project",
            "anthropicKey": "sk-ant-legacy",
            "projectPath": "/home/user/old-server"
        });
        tokio::fs::write(store.path(), legacy.to_string()).await.unwrap();

        let config = store.load().await;
        assert!(config.onboarding_completed);
        assert_eq!(config.credentials.google_project_id.as_deref(), Some("old-project"));
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].source_path, "/home/user/old-server");
        assert_eq!(config.servers[0].status, ServerStatus::Draft);

        // Migration persists; a second load parses the new shape directly.
        let reloaded = store.load().await;
        assert_eq!(reloaded.servers.len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_migration_without_path_keeps_onboarding_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path());

        let legacy = serde_json::json!({ "projectId": "old-project" });
        tokio::fs::write(store.path(), legacy.to_string()).await.unwrap();

        let config = store.load().await;
        assert!(!config.onboarding_completed);
        assert!(config.servers.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_degrades_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path());
        tokio::fs::write(store.path(), "{not json").await.unwrap();

        let config = store.load().await;
        assert!(config.servers.is_empty());
    }
}
