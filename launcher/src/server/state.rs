//! State shared by every dashboard connection.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::audit::AuditAgent;
use crate::config::store::ConfigStore;
use crate::gcp::client::GcpHandle;
use crate::pipeline::orchestrator::PipelineCommands;

/// Server state shared across connections.
pub struct ServerState {
    /// Persistent launcher configuration.
    pub store: ConfigStore,

    /// Cached Google Cloud API connection.
    pub gcp: GcpHandle,

    /// The agent used for the audit stage.
    pub agent: Arc<dyn AuditAgent>,

    /// Pipeline stage commands (stubbed out in tests).
    pub commands: PipelineCommands,

    /// Server record ids with a deployment currently running.
    deploys_in_flight: Mutex<HashSet<String>>,
}

impl ServerState {
    pub fn new(store: ConfigStore, agent: Arc<dyn AuditAgent>, commands: PipelineCommands) -> Self {
        Self {
            store,
            gcp: GcpHandle::new(),
            agent,
            commands,
            deploys_in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Claim the deploy slot for a server record.
    ///
    /// Returns `None` when a deployment is already running for that record;
    /// otherwise the slot is held until the returned guard drops.
    pub fn begin_deploy(self: &Arc<Self>, server_id: &str) -> Option<DeployGuard> {
        let mut in_flight = self
            .deploys_in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(server_id.to_string()) {
            return None;
        }
        Some(DeployGuard {
            state: Arc::clone(self),
            server_id: server_id.to_string(),
        })
    }

    fn finish_deploy(&self, server_id: &str) {
        let mut in_flight = self
            .deploys_in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(server_id);
    }
}

/// Releases the deploy slot when the deployment task ends, however it ends.
pub struct DeployGuard {
    state: Arc<ServerState>,
    server_id: String,
}

impl Drop for DeployGuard {
    fn drop(&mut self) {
        self.state.finish_deploy(&self.server_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::CliAuditAgent;

    fn state() -> Arc<ServerState> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(ServerState::new(
            ConfigStore::at(dir.path()),
            Arc::new(CliAuditAgent::default()),
            PipelineCommands::default(),
        ))
    }

    #[test]
    fn test_second_deploy_for_same_server_is_rejected() {
        let state = state();

        let guard = state.begin_deploy("srv-1");
        assert!(guard.is_some());
        assert!(state.begin_deploy("srv-1").is_none());

        // A different record is unaffected.
        assert!(state.begin_deploy("srv-2").is_some());
    }

    #[test]
    fn test_slot_frees_when_guard_drops() {
        let state = state();

        let guard = state.begin_deploy("srv-1");
        drop(guard);
        assert!(state.begin_deploy("srv-1").is_some());
    }
}
