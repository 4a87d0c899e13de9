// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for control plane integration tests.
//!
//! Builds the full service stack over the in-memory persistence and blob
//! backends, so the sync core can be exercised end-to-end without
//! PostgreSQL or an object store.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use edgebase_control_plane::bus::NoopEventBus;
use edgebase_control_plane::catalog::NewFunction;
use edgebase_control_plane::http::AppState;
use edgebase_control_plane::persistence::{FunctionRecord, MemoryPersistence, NodeRecord};
use edgebase_control_plane::storage::MemoryBlobStore;
use edgebase_protocol::{FunctionState, NodeState};

/// Test context wiring the full service stack over in-memory backends.
pub struct TestContext {
    pub state: Arc<AppState>,
    pub persistence: Arc<MemoryPersistence>,
    pub blobs: Arc<MemoryBlobStore>,
}

impl TestContext {
    /// Build a fresh context with default thresholds.
    pub fn new() -> Self {
        Self::with_sync_stale_after(Duration::from_secs(600))
    }

    /// Build a context with a custom sync staleness threshold.
    pub fn with_sync_stale_after(sync_stale_after: Duration) -> Self {
        let persistence = Arc::new(MemoryPersistence::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let state = AppState::from_backend(
            persistence.clone(),
            blobs.clone(),
            Arc::new(NoopEventBus),
            Duration::from_secs(900),
            sync_stale_after,
        );

        Self {
            state,
            persistence,
            blobs,
        }
    }

    /// Register a node, returning it and its clear token.
    pub async fn register_node(&self, name: &str, region: &str) -> (NodeRecord, String) {
        self.state
            .nodes
            .register(name.to_string(), region.to_string())
            .await
            .expect("node registration failed")
    }

    /// Register a function artifact with bytes.
    pub async fn register_function(
        &self,
        name: &str,
        version: &str,
        bytes: &[u8],
    ) -> FunctionRecord {
        self.state
            .catalog
            .register(
                NewFunction {
                    name: name.to_string(),
                    version: Some(version.to_string()),
                    ..Default::default()
                },
                bytes.to_vec(),
            )
            .await
            .expect("function registration failed")
    }

    /// Queue a function on a node.
    pub async fn deploy(&self, node_id: Uuid, function_id: Uuid) {
        self.state
            .projection
            .queue(node_id, function_id)
            .await
            .expect("deployment queue failed");
    }

    /// Register a schema migration.
    pub async fn register_schema(&self, version: i32) {
        self.state
            .schemas
            .register(
                version,
                format!("CREATE TABLE t{} (id INT)", version),
                String::new(),
                format!("migration {}", version),
            )
            .await
            .expect("schema registration failed");
    }
}

/// Reported state for a node holding the given functions.
pub fn reported(schema_version: i32, functions: &[&FunctionRecord]) -> NodeState {
    NodeState {
        schema_version,
        functions: functions
            .iter()
            .map(|f| FunctionState {
                name: f.name.clone(),
                version: f.version.clone(),
                hash: f.hash.clone(),
            })
            .collect(),
    }
}

/// Reported state with explicit function tuples.
pub fn reported_raw(schema_version: i32, functions: &[(&str, &str, &str)]) -> NodeState {
    NodeState {
        schema_version,
        functions: functions
            .iter()
            .map(|(name, version, hash)| FunctionState {
                name: name.to_string(),
                version: version.to_string(),
                hash: hash.to_string(),
            })
            .collect(),
    }
}
