// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployment Projection
//!
//! The desired assignment of functions to nodes. Operators mutate it via
//! admin endpoints; the planner reads it. No business logic beyond
//! referential checks lives here.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::persistence::{DeploymentRecord, DeploymentStore, FunctionStore, NodeStore};

/// Deployment projection service.
pub struct DeploymentProjection {
    deployments: Arc<dyn DeploymentStore>,
    nodes: Arc<dyn NodeStore>,
    functions: Arc<dyn FunctionStore>,
}

impl DeploymentProjection {
    /// Create a new deployment projection service.
    pub fn new(
        deployments: Arc<dyn DeploymentStore>,
        nodes: Arc<dyn NodeStore>,
        functions: Arc<dyn FunctionStore>,
    ) -> Self {
        Self {
            deployments,
            nodes,
            functions,
        }
    }

    /// Queue a function on a node. Idempotent: re-queuing resets the row
    /// to `pending`.
    #[instrument(skip(self))]
    pub async fn queue(&self, node_id: Uuid, function_id: Uuid) -> Result<DeploymentRecord> {
        if self.nodes.get(node_id).await?.is_none() {
            return Err(Error::not_found("node", node_id));
        }
        if self.functions.get(function_id).await?.is_none() {
            return Err(Error::not_found("function", function_id));
        }

        let record = self.deployments.upsert_pending(node_id, function_id).await?;

        info!(node_id = %node_id, function_id = %function_id, "Queued deployment");

        Ok(record)
    }

    /// Replace the full desired set for a node in one transaction.
    #[instrument(skip(self, function_ids), fields(count = function_ids.len()))]
    pub async fn replace(&self, node_id: Uuid, function_ids: &[Uuid]) -> Result<usize> {
        if self.nodes.get(node_id).await?.is_none() {
            return Err(Error::not_found("node", node_id));
        }
        for function_id in function_ids {
            if self.functions.get(*function_id).await?.is_none() {
                return Err(Error::not_found("function", *function_id));
            }
        }

        let count = self.deployments.replace_for_node(node_id, function_ids).await?;

        info!(node_id = %node_id, count, "Replaced deployment set");

        Ok(count)
    }

    /// All deployment rows for a node.
    pub async fn list_for_node(&self, node_id: Uuid) -> Result<Vec<DeploymentRecord>> {
        self.deployments.list_for_node(node_id).await
    }
}
