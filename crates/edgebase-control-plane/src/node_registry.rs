// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Node Registry
//!
//! Authoritative node identity, bearer-token authentication and heartbeat
//! liveness. The clear bearer token is generated once at registration and
//! never persisted or logged; only its SHA-256 digest is stored.

use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::bus::{EventBus, SUBJECT_NODE_REGISTERED};
use crate::error::{Error, Result};
use crate::persistence::{NodeRecord, NodeStatus, NodeStore};

/// Node registry service.
pub struct NodeRegistry {
    nodes: Arc<dyn NodeStore>,
    bus: Arc<dyn EventBus>,
}

impl NodeRegistry {
    /// Create a new node registry.
    pub fn new(nodes: Arc<dyn NodeStore>, bus: Arc<dyn EventBus>) -> Self {
        Self { nodes, bus }
    }

    /// Register a node and return it together with the clear bearer
    /// token. This is the only place the clear token ever exists.
    #[instrument(skip(self))]
    pub async fn register(&self, name: String, region: String) -> Result<(NodeRecord, String)> {
        if name.is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }

        let token = generate_token();
        let now = Utc::now();
        let node = NodeRecord {
            id: Uuid::new_v4(),
            name,
            region,
            status: NodeStatus::Online,
            auth_token_hash: hash_token(&token),
            current_schema_version: 0,
            last_heartbeat_at: None,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };

        self.nodes.insert(&node).await?;

        info!(node_id = %node.id, name = %node.name, region = %node.region, "Registered node");

        self.bus
            .publish(
                SUBJECT_NODE_REGISTERED,
                serde_json::json!({
                    "node_id": node.id,
                    "name": node.name,
                    "region": node.region,
                }),
            )
            .await;

        Ok((node, token))
    }

    /// Record a heartbeat. Promotes the node to `online` unless a sync
    /// round is in flight; the timestamp always advances. Idempotent.
    pub async fn heartbeat(&self, id: Uuid) -> Result<()> {
        if !self.nodes.touch_heartbeat(id, Utc::now()).await? {
            return Err(Error::not_found("node", id));
        }
        Ok(())
    }

    /// Verify a presented bearer token against the stored digest in
    /// constant time.
    pub async fn authenticate(&self, id: Uuid, presented_token: &str) -> Result<bool> {
        let node = self
            .nodes
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("node", id))?;

        let presented_hash = hash_token(presented_token);
        Ok(presented_hash
            .as_bytes()
            .ct_eq(node.auth_token_hash.as_bytes())
            .into())
    }

    /// Fetch a node by id.
    pub async fn get(&self, id: Uuid) -> Result<NodeRecord> {
        self.nodes
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("node", id))
    }

    /// List all nodes, newest first.
    pub async fn list(&self) -> Result<Vec<NodeRecord>> {
        self.nodes.list().await
    }
}

/// 128-bit random bearer token, hex-encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hex digest of a token.
fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
