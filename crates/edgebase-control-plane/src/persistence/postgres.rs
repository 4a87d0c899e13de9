// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL persistence backend.
//!
//! Implements every store trait against a shared [`PgPool`]. All shared
//! mutable state lives in the database; uniqueness constraints arbitrate
//! concurrent inserts and the sync record state machine is guarded at the
//! SQL level (`WHERE status = 'in_progress'`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::{
    DeploymentRecord, DeploymentStore, FunctionRecord, FunctionStore, NodeRecord, NodeStore,
    SchemaMigrationRecord, SchemaStore, SyncRecordRow, SyncStatus, SyncStore,
};

/// PostgreSQL-backed persistence.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new PostgreSQL persistence layer sharing `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a unique-constraint violation onto `AlreadyExists`, leaving every
/// other database error untouched.
fn map_unique_violation(err: sqlx::Error, entity: &'static str, key: String) -> Error {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return Error::AlreadyExists { entity, key };
        }
    }
    Error::Database(err)
}

#[async_trait]
impl NodeStore for PostgresPersistence {
    async fn insert(&self, node: &NodeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO nodes (
                id, name, region, status, auth_token_hash,
                current_schema_version, last_heartbeat_at, last_sync_at,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(node.id)
        .bind(&node.name)
        .bind(&node.region)
        .bind(node.status.to_string())
        .bind(&node.auth_token_hash)
        .bind(node.current_schema_version)
        .bind(node.last_heartbeat_at)
        .bind(node.last_sync_at)
        .bind(node.created_at)
        .bind(node.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<NodeRecord>> {
        let row: Option<NodeRow> = sqlx::query_as(
            r#"
            SELECT id, name, region, status, auth_token_hash,
                   current_schema_version, last_heartbeat_at, last_sync_at,
                   created_at, updated_at
            FROM nodes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list(&self) -> Result<Vec<NodeRecord>> {
        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT id, name, region, status, auth_token_hash,
                   current_schema_version, last_heartbeat_at, last_sync_at,
                   created_at, updated_at
            FROM nodes
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn touch_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET last_heartbeat_at = $2,
                updated_at = $2,
                status = CASE WHEN status = 'syncing' THEN status ELSE 'online' END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_status(&self, id: Uuid, status: super::NodeStatus) -> Result<()> {
        sqlx::query("UPDATE nodes SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET status = 'offline', updated_at = now()
            WHERE status = 'online'
              AND COALESCE(last_heartbeat_at, created_at) < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn record_sync_success(
        &self,
        id: Uuid,
        schema_version: Option<i32>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        // GREATEST keeps the schema cursor monotone even if a stale ack
        // reports an older version.
        sqlx::query(
            r#"
            UPDATE nodes
            SET last_sync_at = $2,
                updated_at = $2,
                status = 'online',
                current_schema_version =
                    GREATEST(current_schema_version, COALESCE($3, current_schema_version))
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(schema_version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl FunctionStore for PostgresPersistence {
    async fn insert(&self, function: &FunctionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO functions (
                id, name, version, hash, size_bytes, blob_path,
                entrypoint, runtime, memory_pages, max_execution_ms, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(function.id)
        .bind(&function.name)
        .bind(&function.version)
        .bind(&function.hash)
        .bind(function.size_bytes)
        .bind(&function.blob_path)
        .bind(&function.entrypoint)
        .bind(&function.runtime)
        .bind(function.memory_pages)
        .bind(function.max_execution_ms)
        .bind(function.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(
                e,
                "function",
                format!("{}@{}", function.name, function.version),
            )
        })?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<FunctionRecord>> {
        let row: Option<FunctionRecord> = sqlx::query_as(
            r#"
            SELECT id, name, version, hash, size_bytes, blob_path,
                   entrypoint, runtime, memory_pages, max_execution_ms, created_at
            FROM functions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_by_name_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<FunctionRecord>> {
        let row: Option<FunctionRecord> = sqlx::query_as(
            r#"
            SELECT id, name, version, hash, size_bytes, blob_path,
                   entrypoint, runtime, memory_pages, max_execution_ms, created_at
            FROM functions
            WHERE name = $1 AND version = $2
            "#,
        )
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list(&self) -> Result<Vec<FunctionRecord>> {
        let rows: Vec<FunctionRecord> = sqlx::query_as(
            r#"
            SELECT id, name, version, hash, size_bytes, blob_path,
                   entrypoint, runtime, memory_pages, max_execution_ms, created_at
            FROM functions
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn set_content(
        &self,
        id: Uuid,
        hash: &str,
        size_bytes: i64,
        blob_path: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE functions
            SET hash = $2, size_bytes = $3, blob_path = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(hash)
        .bind(size_bytes)
        .bind(blob_path)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM functions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SchemaStore for PostgresPersistence {
    async fn insert(&self, migration: &SchemaMigrationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO schema_migrations_registry (
                version, description, up_sql, down_sql, created_at
            ) VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(migration.version)
        .bind(&migration.description)
        .bind(&migration.up_sql)
        .bind(&migration.down_sql)
        .bind(migration.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "schema migration", migration.version.to_string()))?;

        Ok(())
    }

    async fn latest_version(&self) -> Result<i32> {
        let version: Option<i32> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations_registry")
                .fetch_one(&self.pool)
                .await?;

        Ok(version.unwrap_or(0))
    }

    async fn list_since(&self, version: i32) -> Result<Vec<SchemaMigrationRecord>> {
        let rows: Vec<SchemaMigrationRecord> = sqlx::query_as(
            r#"
            SELECT id, version, description, up_sql, down_sql, created_at
            FROM schema_migrations_registry
            WHERE version > $1
            ORDER BY version ASC
            "#,
        )
        .bind(version)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[async_trait]
impl DeploymentStore for PostgresPersistence {
    async fn upsert_pending(&self, node_id: Uuid, function_id: Uuid) -> Result<DeploymentRecord> {
        let row: DeploymentRow = sqlx::query_as(
            r#"
            INSERT INTO node_function_deployments (
                id, node_id, function_id, status, created_at, updated_at
            ) VALUES ($1, $2, $3, 'pending', now(), now())
            ON CONFLICT (node_id, function_id) DO UPDATE SET
                status = 'pending',
                updated_at = now()
            RETURNING id, node_id, function_id, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(node_id)
        .bind(function_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list_for_node(&self, node_id: Uuid) -> Result<Vec<DeploymentRecord>> {
        let rows: Vec<DeploymentRow> = sqlx::query_as(
            r#"
            SELECT id, node_id, function_id, status, created_at, updated_at
            FROM node_function_deployments
            WHERE node_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn replace_for_node(&self, node_id: Uuid, function_ids: &[Uuid]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM node_function_deployments WHERE node_id = $1")
            .bind(node_id)
            .execute(&mut *tx)
            .await?;

        for function_id in function_ids {
            sqlx::query(
                r#"
                INSERT INTO node_function_deployments (
                    id, node_id, function_id, status, created_at, updated_at
                ) VALUES ($1, $2, $3, 'pending', now(), now())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(node_id)
            .bind(function_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(function_ids.len())
    }

    async fn mark_active(&self, node_id: Uuid, function_ids: Option<&[Uuid]>) -> Result<u64> {
        let result = match function_ids {
            Some(ids) => {
                sqlx::query(
                    r#"
                    UPDATE node_function_deployments
                    SET status = 'active', updated_at = now()
                    WHERE node_id = $1 AND function_id = ANY($2)
                    "#,
                )
                .bind(node_id)
                .bind(ids)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE node_function_deployments
                    SET status = 'active', updated_at = now()
                    WHERE node_id = $1 AND status = 'pending'
                    "#,
                )
                .bind(node_id)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected())
    }

    async fn count_for_function(&self, function_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM node_function_deployments WHERE function_id = $1",
        )
        .bind(function_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[async_trait]
impl SyncStore for PostgresPersistence {
    async fn insert(&self, record: &SyncRecordRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_records (
                id, node_id, sync_type, status, started_at, completed_at,
                error_message, functions_added, functions_removed, schemas_applied
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id)
        .bind(record.node_id)
        .bind(record.sync_type.to_string())
        .bind(record.status.to_string())
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(&record.error_message)
        .bind(record.functions_added)
        .bind(record.functions_removed)
        .bind(record.schemas_applied)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SyncRecordRow>> {
        let row: Option<SyncRow> = sqlx::query_as(
            r#"
            SELECT id, node_id, sync_type, status, started_at, completed_at,
                   error_message, functions_added, functions_removed, schemas_applied
            FROM sync_records
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SyncRecordRow::try_from).transpose()
    }

    async fn open_for_node(&self, node_id: Uuid) -> Result<Option<SyncRecordRow>> {
        let row: Option<SyncRow> = sqlx::query_as(
            r#"
            SELECT id, node_id, sync_type, status, started_at, completed_at,
                   error_message, functions_added, functions_removed, schemas_applied
            FROM sync_records
            WHERE node_id = $1 AND status = 'in_progress'
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SyncRecordRow::try_from).transpose()
    }

    async fn complete(
        &self,
        id: Uuid,
        status: SyncStatus,
        error_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        // Terminal states are permanent: only in_progress rows transition.
        let result = sqlx::query(
            r#"
            UPDATE sync_records
            SET status = $2, completed_at = $3, error_message = $4
            WHERE id = $1 AND status = 'in_progress'
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(at)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Internal row type for node queries.
#[derive(sqlx::FromRow)]
struct NodeRow {
    id: Uuid,
    name: String,
    region: String,
    status: String,
    auth_token_hash: String,
    current_schema_version: i32,
    last_heartbeat_at: Option<DateTime<Utc>>,
    last_sync_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NodeRow> for NodeRecord {
    fn from(row: NodeRow) -> Self {
        NodeRecord {
            id: row.id,
            name: row.name,
            region: row.region,
            status: row.status.parse().unwrap_or_default(),
            auth_token_hash: row.auth_token_hash,
            current_schema_version: row.current_schema_version,
            last_heartbeat_at: row.last_heartbeat_at,
            last_sync_at: row.last_sync_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Internal row type for deployment queries.
#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: Uuid,
    node_id: Uuid,
    function_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DeploymentRow> for DeploymentRecord {
    fn from(row: DeploymentRow) -> Self {
        DeploymentRecord {
            id: row.id,
            node_id: row.node_id,
            function_id: row.function_id,
            status: row.status.parse().unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Internal row type for sync record queries.
#[derive(sqlx::FromRow)]
struct SyncRow {
    id: Uuid,
    node_id: Uuid,
    sync_type: String,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    functions_added: i32,
    functions_removed: i32,
    schemas_applied: i32,
}

impl TryFrom<SyncRow> for SyncRecordRow {
    type Error = Error;

    // Sync status drives the transaction state machine; a row that fails
    // to parse must surface rather than default.
    fn try_from(row: SyncRow) -> Result<Self> {
        Ok(SyncRecordRow {
            id: row.id,
            node_id: row.node_id,
            sync_type: row.sync_type.parse().map_err(Error::Internal)?,
            status: row.status.parse().map_err(Error::Internal)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            functions_added: row.functions_added,
            functions_removed: row.functions_removed,
            schemas_applied: row.schemas_applied,
        })
    }
}
