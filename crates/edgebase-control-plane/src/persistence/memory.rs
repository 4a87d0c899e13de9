// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory persistence backend.
//!
//! Mirrors the PostgreSQL backend's semantics (uniqueness, status guards,
//! monotone schema cursor) over plain maps. Used by tests and local
//! experiments; never by the production binary.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::{
    DeploymentRecord, DeploymentStatus, DeploymentStore, FunctionRecord, FunctionStore,
    NodeRecord, NodeStatus, NodeStore, SchemaMigrationRecord, SchemaStore, SyncRecordRow,
    SyncStatus, SyncStore,
};

#[derive(Default)]
struct Inner {
    nodes: HashMap<Uuid, NodeRecord>,
    functions: HashMap<Uuid, FunctionRecord>,
    schemas: Vec<SchemaMigrationRecord>,
    deployments: HashMap<Uuid, DeploymentRecord>,
    syncs: HashMap<Uuid, SyncRecordRow>,
    next_schema_id: i64,
}

/// In-memory persistence. Locks are never held across an await point;
/// every operation completes synchronously under the mutex.
#[derive(Default)]
pub struct MemoryPersistence {
    inner: Mutex<Inner>,
}

impl MemoryPersistence {
    /// Create an empty in-memory persistence layer.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for MemoryPersistence {
    async fn insert(&self, node: &NodeRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<NodeRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.nodes.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<NodeRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut nodes: Vec<_> = inner.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(nodes)
    }

    async fn touch_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.nodes.get_mut(&id) {
            Some(node) => {
                node.last_heartbeat_at = Some(at);
                node.updated_at = at;
                if node.status != NodeStatus::Syncing {
                    node.status = NodeStatus::Online;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_status(&self, id: Uuid, status: NodeStatus) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(node) = inner.nodes.get_mut(&id) {
            node.status = status;
            node.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut moved = 0;
        for node in inner.nodes.values_mut() {
            let last_seen = node.last_heartbeat_at.unwrap_or(node.created_at);
            if node.status == NodeStatus::Online && last_seen < cutoff {
                node.status = NodeStatus::Offline;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn record_sync_success(
        &self,
        id: Uuid,
        schema_version: Option<i32>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(node) = inner.nodes.get_mut(&id) {
            node.last_sync_at = Some(at);
            node.updated_at = at;
            node.status = NodeStatus::Online;
            if let Some(version) = schema_version {
                node.current_schema_version = node.current_schema_version.max(version);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FunctionStore for MemoryPersistence {
    async fn insert(&self, function: &FunctionRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let taken = inner
            .functions
            .values()
            .any(|f| f.name == function.name && f.version == function.version);
        if taken {
            return Err(Error::already_exists(
                "function",
                format!("{}@{}", function.name, function.version),
            ));
        }
        inner.functions.insert(function.id, function.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<FunctionRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.functions.get(&id).cloned())
    }

    async fn get_by_name_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<FunctionRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .functions
            .values()
            .find(|f| f.name == name && f.version == version)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<FunctionRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut functions: Vec<_> = inner.functions.values().cloned().collect();
        functions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(functions)
    }

    async fn set_content(
        &self,
        id: Uuid,
        hash: &str,
        size_bytes: i64,
        blob_path: &str,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(function) = inner.functions.get_mut(&id) {
            function.hash = hash.to_string();
            function.size_bytes = size_bytes;
            function.blob_path = blob_path.to_string();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.functions.remove(&id).is_some())
    }
}

#[async_trait]
impl SchemaStore for MemoryPersistence {
    async fn insert(&self, migration: &SchemaMigrationRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.schemas.iter().any(|m| m.version == migration.version) {
            return Err(Error::already_exists(
                "schema migration",
                migration.version.to_string(),
            ));
        }
        inner.next_schema_id += 1;
        let mut migration = migration.clone();
        migration.id = inner.next_schema_id;
        inner.schemas.push(migration);
        Ok(())
    }

    async fn latest_version(&self) -> Result<i32> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.schemas.iter().map(|m| m.version).max().unwrap_or(0))
    }

    async fn list_since(&self, version: i32) -> Result<Vec<SchemaMigrationRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut migrations: Vec<_> = inner
            .schemas
            .iter()
            .filter(|m| m.version > version)
            .cloned()
            .collect();
        migrations.sort_by_key(|m| m.version);
        Ok(migrations)
    }
}

#[async_trait]
impl DeploymentStore for MemoryPersistence {
    async fn upsert_pending(&self, node_id: Uuid, function_id: Uuid) -> Result<DeploymentRecord> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let existing_id = inner
            .deployments
            .values()
            .find(|d| d.node_id == node_id && d.function_id == function_id)
            .map(|d| d.id);
        let record = match existing_id {
            Some(id) => {
                let row = inner.deployments.get_mut(&id).expect("row exists");
                row.status = DeploymentStatus::Pending;
                row.updated_at = now;
                row.clone()
            }
            None => {
                let row = DeploymentRecord {
                    id: Uuid::new_v4(),
                    node_id,
                    function_id,
                    status: DeploymentStatus::Pending,
                    created_at: now,
                    updated_at: now,
                };
                inner.deployments.insert(row.id, row.clone());
                row
            }
        };
        Ok(record)
    }

    async fn list_for_node(&self, node_id: Uuid) -> Result<Vec<DeploymentRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<_> = inner
            .deployments
            .values()
            .filter(|d| d.node_id == node_id)
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.created_at);
        Ok(rows)
    }

    async fn replace_for_node(&self, node_id: Uuid, function_ids: &[Uuid]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.deployments.retain(|_, d| d.node_id != node_id);
        let now = Utc::now();
        for function_id in function_ids {
            let row = DeploymentRecord {
                id: Uuid::new_v4(),
                node_id,
                function_id: *function_id,
                status: DeploymentStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            inner.deployments.insert(row.id, row);
        }
        Ok(function_ids.len())
    }

    async fn mark_active(&self, node_id: Uuid, function_ids: Option<&[Uuid]>) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut promoted = 0;
        for row in inner.deployments.values_mut() {
            if row.node_id != node_id {
                continue;
            }
            let selected = match function_ids {
                Some(ids) => ids.contains(&row.function_id),
                None => row.status == DeploymentStatus::Pending,
            };
            if selected {
                row.status = DeploymentStatus::Active;
                row.updated_at = now;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn count_for_function(&self, function_id: Uuid) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .deployments
            .values()
            .filter(|d| d.function_id == function_id)
            .count() as i64)
    }
}

#[async_trait]
impl SyncStore for MemoryPersistence {
    async fn insert(&self, record: &SyncRecordRow) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.syncs.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SyncRecordRow>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.syncs.get(&id).cloned())
    }

    async fn open_for_node(&self, node_id: Uuid) -> Result<Option<SyncRecordRow>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .syncs
            .values()
            .filter(|s| s.node_id == node_id && s.status == SyncStatus::InProgress)
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn complete(
        &self,
        id: Uuid,
        status: SyncStatus,
        error_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.syncs.get_mut(&id) {
            Some(record) if record.status == SyncStatus::InProgress => {
                record.status = status;
                record.completed_at = Some(at);
                record.error_message = error_message.map(str::to_string);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
