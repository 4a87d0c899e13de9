// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker for detecting stale nodes.
//!
//! Nodes that have not heartbeated within the staleness threshold are
//! moved from `online` to `offline`. Offline status is informational:
//! the planner still serves plans to offline nodes, since edge links are
//! expected to drop for long periods.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::persistence::NodeStore;

/// Configuration for the status sweeper.
#[derive(Debug, Clone)]
pub struct StatusSweeperConfig {
    /// How often to sweep.
    pub sweep_interval: Duration,
    /// Maximum time since last heartbeat before marking a node offline.
    pub stale_after: Duration,
}

impl Default for StatusSweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(90),
        }
    }
}

/// Background worker that marks stale nodes offline.
pub struct StatusSweeper {
    nodes: Arc<dyn NodeStore>,
    config: StatusSweeperConfig,
    shutdown: Arc<Notify>,
    // One-shot gate so an overlapping tick never runs two sweeps; no lock
    // is held across the database call.
    sweeping: AtomicBool,
}

impl StatusSweeper {
    /// Create a new status sweeper.
    pub fn new(nodes: Arc<dyn NodeStore>, config: StatusSweeperConfig) -> Self {
        Self {
            nodes,
            config,
            shutdown: Arc::new(Notify::new()),
            sweeping: AtomicBool::new(false),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the sweep loop until shutdown is signalled.
    pub async fn run(&self) {
        info!(
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            stale_after_secs = self.config.stale_after.as_secs(),
            "Status sweeper started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Status sweeper received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.sweep_interval) => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Failed to sweep stale nodes");
                    }
                }
            }
        }

        info!("Status sweeper stopped");
    }

    /// Run a single sweep. Skipped when another sweep is still in flight.
    pub async fn sweep(&self) -> crate::error::Result<u64> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Previous sweep still running, skipping");
            return Ok(0);
        }

        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.stale_after)
                .unwrap_or_else(|_| chrono::Duration::seconds(90));

        let result = self.nodes.mark_stale_offline(cutoff).await;
        self.sweeping.store(false, Ordering::SeqCst);

        let moved = result?;
        if moved > 0 {
            info!(moved, "Marked stale nodes offline");
        } else {
            debug!("No stale nodes found");
        }

        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryPersistence, NodeRecord, NodeStatus};
    use uuid::Uuid;

    #[test]
    fn test_config_default() {
        let config = StatusSweeperConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.stale_after, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_sweep_marks_stale_nodes_offline() {
        let persistence = Arc::new(MemoryPersistence::new());
        let now = Utc::now();

        let stale_id = Uuid::new_v4();
        let fresh_id = Uuid::new_v4();
        for (id, heartbeat) in [
            (stale_id, now - chrono::Duration::seconds(300)),
            (fresh_id, now),
        ] {
            NodeStore::insert(
                persistence.as_ref(),
                &NodeRecord {
                    id,
                    name: "n".to_string(),
                    region: String::new(),
                    status: NodeStatus::Online,
                    auth_token_hash: "hash".to_string(),
                    current_schema_version: 0,
                    last_heartbeat_at: Some(heartbeat),
                    last_sync_at: None,
                    created_at: now - chrono::Duration::seconds(600),
                    updated_at: now,
                },
            )
            .await
            .unwrap();
        }

        let sweeper = StatusSweeper::new(persistence.clone(), StatusSweeperConfig::default());
        let moved = sweeper.sweep().await.unwrap();
        assert_eq!(moved, 1);

        let stale = NodeStore::get(persistence.as_ref(), stale_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stale.status, NodeStatus::Offline);

        let fresh = NodeStore::get(persistence.as_ref(), fresh_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.status, NodeStatus::Online);
    }

    #[tokio::test]
    async fn test_sweep_leaves_syncing_nodes_alone() {
        let persistence = Arc::new(MemoryPersistence::new());
        let now = Utc::now();
        let id = Uuid::new_v4();
        NodeStore::insert(
            persistence.as_ref(),
            &NodeRecord {
                id,
                name: "n".to_string(),
                region: String::new(),
                status: NodeStatus::Syncing,
                auth_token_hash: "hash".to_string(),
                current_schema_version: 0,
                last_heartbeat_at: Some(now - chrono::Duration::seconds(300)),
                last_sync_at: None,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .unwrap();

        let sweeper = StatusSweeper::new(persistence.clone(), StatusSweeperConfig::default());
        assert_eq!(sweeper.sweep().await.unwrap(), 0);

        let node = NodeStore::get(persistence.as_ref(), id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(node.status, NodeStatus::Syncing);
    }
}
