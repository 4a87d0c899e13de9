// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sync Transaction Manager
//!
//! Owns the lifecycle of sync records:
//!
//! ```text
//! nil ──begin──► in_progress ──ack──► success | failed
//! ```
//!
//! Terminal states are permanent. A node polling again while a fresh
//! round is open gets the same sync id back (safe retry); an open round
//! older than the stale threshold is failed as abandoned and a new one
//! issued.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use edgebase_protocol::SyncOutcome;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::bus::{EventBus, SUBJECT_SYNC_COMPLETED};
use crate::error::{Error, Result};
use crate::persistence::{
    DeploymentStore, FunctionStore, NodeStatus, NodeStore, SyncRecordRow, SyncStatus, SyncStore,
    SyncType,
};

/// Shape of an issued plan, recorded on the sync record for auditing.
#[derive(Debug, Clone, Copy)]
pub struct PlanSummary {
    /// Full or incremental round.
    pub sync_type: SyncType,
    /// Number of ADD_FUNCTION actions.
    pub functions_added: i32,
    /// Number of REMOVE_FUNCTION actions.
    pub functions_removed: i32,
    /// Number of APPLY_SCHEMA actions.
    pub schemas_applied: i32,
}

/// Sync transaction manager service.
pub struct SyncTransactionManager {
    syncs: Arc<dyn SyncStore>,
    nodes: Arc<dyn NodeStore>,
    deployments: Arc<dyn DeploymentStore>,
    functions: Arc<dyn FunctionStore>,
    bus: Arc<dyn EventBus>,
    stale_after: Duration,
}

impl SyncTransactionManager {
    /// Create a new sync transaction manager. `stale_after` bounds how
    /// long an unacknowledged round stays open.
    pub fn new(
        syncs: Arc<dyn SyncStore>,
        nodes: Arc<dyn NodeStore>,
        deployments: Arc<dyn DeploymentStore>,
        functions: Arc<dyn FunctionStore>,
        bus: Arc<dyn EventBus>,
        stale_after: Duration,
    ) -> Self {
        Self {
            syncs,
            nodes,
            deployments,
            functions,
            bus,
            stale_after,
        }
    }

    /// Open a sync round for a node and return its sync id.
    ///
    /// Reuses the node's open `in_progress` record when it is younger
    /// than the stale threshold, so repeated polls retry the same round.
    /// An older open record is failed as abandoned first.
    #[instrument(skip(self, summary))]
    pub async fn begin(&self, node_id: Uuid, summary: PlanSummary) -> Result<Uuid> {
        let now = Utc::now();

        if let Some(open) = self.syncs.open_for_node(node_id).await? {
            let age = (now - open.started_at).to_std().unwrap_or_default();
            if age <= self.stale_after {
                self.nodes.set_status(node_id, NodeStatus::Syncing).await?;
                return Ok(open.id);
            }

            warn!(
                sync_id = %open.id,
                node_id = %node_id,
                age_secs = age.as_secs(),
                "Abandoning stale sync round"
            );
            self.syncs
                .complete(
                    open.id,
                    SyncStatus::Failed,
                    Some("abandoned: superseded by a newer poll"),
                    now,
                )
                .await?;
        }

        let record = SyncRecordRow {
            id: Uuid::new_v4(),
            node_id,
            sync_type: summary.sync_type,
            status: SyncStatus::InProgress,
            started_at: now,
            completed_at: None,
            error_message: None,
            functions_added: summary.functions_added,
            functions_removed: summary.functions_removed,
            schemas_applied: summary.schemas_applied,
        };

        self.syncs.insert(&record).await?;
        self.nodes.set_status(node_id, NodeStatus::Syncing).await?;

        info!(
            sync_id = %record.id,
            node_id = %node_id,
            sync_type = %record.sync_type,
            "Opened sync round"
        );

        Ok(record.id)
    }

    /// Finalize a sync round.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when the sync id is unknown, belongs to
    /// a different node, or is already terminal. Clients must not retry
    /// such acks.
    #[instrument(skip(self, outcome), fields(success = outcome.success))]
    pub async fn ack(&self, node_id: Uuid, sync_id: Uuid, outcome: &SyncOutcome) -> Result<()> {
        if self.nodes.get(node_id).await?.is_none() {
            return Err(Error::not_found("node", node_id));
        }

        let record = self
            .syncs
            .get(sync_id)
            .await?
            .ok_or_else(|| Error::Protocol(format!("Unknown sync id '{}'", sync_id)))?;

        if record.node_id != node_id {
            return Err(Error::Protocol(format!(
                "Sync '{}' does not belong to node '{}'",
                sync_id, node_id
            )));
        }
        if record.status.is_terminal() {
            return Err(Error::Protocol(format!(
                "Sync '{}' is already {}",
                sync_id, record.status
            )));
        }

        let now = Utc::now();
        let status = if outcome.success {
            SyncStatus::Success
        } else {
            SyncStatus::Failed
        };

        // The SQL-level guard makes a lost race surface as a protocol
        // error rather than a double transition.
        let transitioned = self
            .syncs
            .complete(sync_id, status, outcome.error.as_deref(), now)
            .await?;
        if !transitioned {
            return Err(Error::Protocol(format!(
                "Sync '{}' was finalized concurrently",
                sync_id
            )));
        }

        if outcome.success {
            let applied_ids = self.resolve_applied(&outcome.applied_functions).await?;
            self.deployments
                .mark_active(node_id, applied_ids.as_deref())
                .await?;
            self.nodes
                .record_sync_success(node_id, outcome.applied_schema_version, now)
                .await?;
        } else {
            // Projection is left untouched; the next poll recomputes.
            self.nodes.set_status(node_id, NodeStatus::Online).await?;
        }

        info!(
            sync_id = %sync_id,
            node_id = %node_id,
            status = %status,
            "Finalized sync round"
        );

        self.bus
            .publish(
                SUBJECT_SYNC_COMPLETED,
                serde_json::json!({
                    "sync_id": sync_id,
                    "node_id": node_id,
                    "success": outcome.success,
                }),
            )
            .await;

        Ok(())
    }

    /// Resolve acked function states to deployment function ids. `None`
    /// means the ack omitted the applied set and the manager trusts the
    /// plan it issued (every pending row is promoted).
    async fn resolve_applied(
        &self,
        applied: &Option<Vec<edgebase_protocol::FunctionState>>,
    ) -> Result<Option<Vec<Uuid>>> {
        let Some(states) = applied else {
            return Ok(None);
        };

        let mut ids = Vec::with_capacity(states.len());
        for state in states {
            match self
                .functions
                .get_by_name_version(&state.name, &state.version)
                .await?
            {
                Some(function) if function.hash == state.hash => ids.push(function.id),
                Some(function) => {
                    warn!(
                        name = %state.name,
                        version = %state.version,
                        expected_hash = %function.hash,
                        reported_hash = %state.hash,
                        "Acked function hash does not match catalog; not promoting"
                    );
                }
                None => {
                    warn!(
                        name = %state.name,
                        version = %state.version,
                        "Acked function unknown to catalog; not promoting"
                    );
                }
            }
        }

        Ok(Some(ids))
    }
}
