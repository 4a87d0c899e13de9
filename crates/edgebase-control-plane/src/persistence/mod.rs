// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for the control plane.
//!
//! One narrow store trait per entity keeps the relational backend
//! swappable and mockable: [`NodeStore`], [`FunctionStore`],
//! [`SchemaStore`], [`DeploymentStore`] and [`SyncStore`].
//! [`postgres::PostgresPersistence`] implements all five against
//! PostgreSQL; [`memory::MemoryPersistence`] backs tests.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryPersistence;
pub use self::postgres::PostgresPersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;

/// Node liveness and sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeStatus {
    /// Recently heartbeating.
    #[default]
    Online,
    /// No heartbeat within the staleness threshold.
    Offline,
    /// A sync round is in flight.
    Syncing,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Offline => write!(f, "offline"),
            NodeStatus::Syncing => write!(f, "syncing"),
        }
    }
}

impl std::str::FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "online" => Ok(NodeStatus::Online),
            "offline" => Ok(NodeStatus::Offline),
            "syncing" => Ok(NodeStatus::Syncing),
            _ => Err(format!("Unknown node status: {}", s)),
        }
    }
}

/// Desired-state status of one deployment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentStatus {
    /// Queued; not yet confirmed on the node.
    #[default]
    Pending,
    /// Confirmed present on the node.
    Active,
    /// Rejected by an operator; excluded from the target set.
    Failed,
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentStatus::Pending => write!(f, "pending"),
            DeploymentStatus::Active => write!(f, "active"),
            DeploymentStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeploymentStatus::Pending),
            "active" => Ok(DeploymentStatus::Active),
            "failed" => Ok(DeploymentStatus::Failed),
            _ => Err(format!("Unknown deployment status: {}", s)),
        }
    }
}

/// Lifecycle state of a sync record. Terminal states are permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Plan issued, outcome not yet acknowledged.
    InProgress,
    /// Acknowledged as fully applied.
    Success,
    /// Acknowledged as failed, or abandoned by the stale sweep.
    Failed,
}

impl SyncStatus {
    /// Whether this state accepts no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncStatus::InProgress)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::InProgress => write!(f, "in_progress"),
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SyncStatus::InProgress),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            _ => Err(format!("Unknown sync status: {}", s)),
        }
    }
}

/// Whether a sync round started from the zero state or from a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    /// The node reported the zero state.
    Full,
    /// The node reported existing state.
    Incremental,
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncType::Full => write!(f, "full"),
            SyncType::Incremental => write!(f, "incremental"),
        }
    }
}

impl std::str::FromStr for SyncType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncType::Full),
            "incremental" => Ok(SyncType::Incremental),
            _ => Err(format!("Unknown sync type: {}", s)),
        }
    }
}

/// Node record from the persistence layer.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// Node id.
    pub id: Uuid,
    /// Operator-chosen name.
    pub name: String,
    /// Deployment region label.
    pub region: String,
    /// Liveness/sync status.
    pub status: NodeStatus,
    /// SHA-256 hex digest of the bearer token. The clear token is never stored.
    pub auth_token_hash: String,
    /// Last schema migration version the node confirmed applied.
    pub current_schema_version: i32,
    /// Last heartbeat received.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Last successful sync.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// When the node registered.
    pub created_at: DateTime<Utc>,
    /// Last mutation of this row.
    pub updated_at: DateTime<Utc>,
}

/// Function artifact record from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FunctionRecord {
    /// Surrogate id; `(name, version)` is the natural key.
    pub id: Uuid,
    /// Artifact name.
    pub name: String,
    /// Artifact version string.
    pub version: String,
    /// SHA-256 hex of the artifact bytes. Empty until bytes are uploaded.
    pub hash: String,
    /// Artifact size in bytes.
    pub size_bytes: i64,
    /// Object store key of the artifact bytes.
    pub blob_path: String,
    /// Exported entrypoint symbol.
    pub entrypoint: Option<String>,
    /// Runtime tag.
    pub runtime: Option<String>,
    /// Linear memory limit in 64 KiB pages.
    pub memory_pages: Option<i32>,
    /// Execution deadline in milliseconds.
    pub max_execution_ms: Option<i32>,
    /// When the artifact row was created.
    pub created_at: DateTime<Utc>,
}

impl FunctionRecord {
    /// Whether artifact bytes have been uploaded and committed.
    pub fn has_content(&self) -> bool {
        !self.hash.is_empty()
    }
}

/// Node-side schema migration from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SchemaMigrationRecord {
    /// Database primary key.
    pub id: i64,
    /// Migration version, strictly positive and unique.
    pub version: i32,
    /// Operator-facing description.
    pub description: String,
    /// Forward SQL.
    pub up_sql: String,
    /// Backward SQL.
    pub down_sql: String,
    /// When the migration was registered.
    pub created_at: DateTime<Utc>,
}

/// Deployment projection row: one function desired on one node.
#[derive(Debug, Clone)]
pub struct DeploymentRecord {
    /// Row id.
    pub id: Uuid,
    /// Target node.
    pub node_id: Uuid,
    /// Desired function.
    pub function_id: Uuid,
    /// Projection status.
    pub status: DeploymentStatus,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Whether this row belongs to the target set the planner reconciles
    /// toward (queued or confirmed, not operator-failed).
    pub fn is_desired(&self) -> bool {
        matches!(
            self.status,
            DeploymentStatus::Pending | DeploymentStatus::Active
        )
    }
}

/// Audit row for one sync round.
#[derive(Debug, Clone)]
pub struct SyncRecordRow {
    /// Sync id handed to the node.
    pub id: Uuid,
    /// Node this round belongs to.
    pub node_id: Uuid,
    /// Full or incremental.
    pub sync_type: SyncType,
    /// Round status.
    pub status: SyncStatus,
    /// When the plan was issued.
    pub started_at: DateTime<Utc>,
    /// When the round reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure detail for failed rounds.
    pub error_message: Option<String>,
    /// Number of ADD_FUNCTION actions in the issued plan.
    pub functions_added: i32,
    /// Number of REMOVE_FUNCTION actions in the issued plan.
    pub functions_removed: i32,
    /// Number of APPLY_SCHEMA actions in the issued plan.
    pub schemas_applied: i32,
}

impl From<&NodeRecord> for edgebase_protocol::NodeInfo {
    fn from(node: &NodeRecord) -> Self {
        edgebase_protocol::NodeInfo {
            id: node.id,
            name: node.name.clone(),
            region: node.region.clone(),
            status: node.status.to_string(),
            current_schema_version: node.current_schema_version,
            last_heartbeat_at: node.last_heartbeat_at,
            last_sync_at: node.last_sync_at,
            created_at: node.created_at,
        }
    }
}

impl From<&FunctionRecord> for edgebase_protocol::FunctionManifest {
    fn from(function: &FunctionRecord) -> Self {
        edgebase_protocol::FunctionManifest {
            id: function.id,
            name: function.name.clone(),
            version: function.version.clone(),
            hash: function.hash.clone(),
            size_bytes: function.size_bytes,
            entrypoint: function.entrypoint.clone(),
            runtime: function.runtime.clone(),
            memory_pages: function.memory_pages,
            max_execution_ms: function.max_execution_ms,
            created_at: function.created_at,
        }
    }
}

impl From<&SchemaMigrationRecord> for edgebase_protocol::SchemaPayload {
    fn from(migration: &SchemaMigrationRecord) -> Self {
        edgebase_protocol::SchemaPayload {
            version: migration.version,
            up_sql: migration.up_sql.clone(),
            description: migration.description.clone(),
        }
    }
}

impl From<&SchemaMigrationRecord> for edgebase_protocol::SchemaMigrationInfo {
    fn from(migration: &SchemaMigrationRecord) -> Self {
        edgebase_protocol::SchemaMigrationInfo {
            version: migration.version,
            description: migration.description.clone(),
            up_sql: migration.up_sql.clone(),
            down_sql: migration.down_sql.clone(),
            created_at: migration.created_at,
        }
    }
}

/// Node persistence operations.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Insert a new node row.
    async fn insert(&self, node: &NodeRecord) -> Result<()>;

    /// Fetch a node by id.
    async fn get(&self, id: Uuid) -> Result<Option<NodeRecord>>;

    /// List all nodes, newest first.
    async fn list(&self) -> Result<Vec<NodeRecord>>;

    /// Record a heartbeat: advances `last_heartbeat_at` and promotes the
    /// node to `online` unless it is currently `syncing`. Returns false
    /// if the node does not exist.
    async fn touch_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Set the node status unconditionally.
    async fn set_status(&self, id: Uuid, status: NodeStatus) -> Result<()>;

    /// Move every `online` node with a heartbeat older than `cutoff`
    /// (or none at all) to `offline`. Returns the number of nodes moved.
    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Record a successful sync: sets `last_sync_at`, returns the node to
    /// `online` and advances `current_schema_version` monotonically when
    /// `schema_version` is provided.
    async fn record_sync_success(
        &self,
        id: Uuid,
        schema_version: Option<i32>,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Function artifact persistence operations.
#[async_trait]
pub trait FunctionStore: Send + Sync {
    /// Insert a new artifact row. Fails with `AlreadyExists` when the
    /// `(name, version)` pair is taken.
    async fn insert(&self, function: &FunctionRecord) -> Result<()>;

    /// Fetch an artifact by id.
    async fn get(&self, id: Uuid) -> Result<Option<FunctionRecord>>;

    /// Fetch an artifact by its natural key.
    async fn get_by_name_version(&self, name: &str, version: &str)
    -> Result<Option<FunctionRecord>>;

    /// List all artifacts, newest first.
    async fn list(&self) -> Result<Vec<FunctionRecord>>;

    /// Commit uploaded content onto an artifact row.
    async fn set_content(
        &self,
        id: Uuid,
        hash: &str,
        size_bytes: i64,
        blob_path: &str,
    ) -> Result<()>;

    /// Delete an artifact row. Returns false if it did not exist.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Node-side schema migration persistence operations.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Insert a migration. Fails with `AlreadyExists` when the version is taken.
    async fn insert(&self, migration: &SchemaMigrationRecord) -> Result<()>;

    /// Highest registered version, 0 when the registry is empty.
    async fn latest_version(&self) -> Result<i32>;

    /// Migrations with version strictly greater than `version`, ascending.
    async fn list_since(&self, version: i32) -> Result<Vec<SchemaMigrationRecord>>;
}

/// Deployment projection persistence operations.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Queue a function on a node: insert as `pending`, or reset an
    /// existing row to `pending`.
    async fn upsert_pending(&self, node_id: Uuid, function_id: Uuid) -> Result<DeploymentRecord>;

    /// All deployment rows for a node.
    async fn list_for_node(&self, node_id: Uuid) -> Result<Vec<DeploymentRecord>>;

    /// Replace the full desired set for a node in one transaction
    /// (delete-then-insert). Returns the number of rows inserted.
    async fn replace_for_node(&self, node_id: Uuid, function_ids: &[Uuid]) -> Result<usize>;

    /// Mark deployments active. With `function_ids = None` every `pending`
    /// row of the node is promoted; otherwise only the listed functions.
    /// Returns the number of rows promoted.
    async fn mark_active(&self, node_id: Uuid, function_ids: Option<&[Uuid]>) -> Result<u64>;

    /// Number of deployment rows referencing a function, across all nodes.
    async fn count_for_function(&self, function_id: Uuid) -> Result<i64>;
}

/// Sync record persistence operations.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Insert a new sync record.
    async fn insert(&self, record: &SyncRecordRow) -> Result<()>;

    /// Fetch a sync record by id.
    async fn get(&self, id: Uuid) -> Result<Option<SyncRecordRow>>;

    /// The node's open `in_progress` record, if any.
    async fn open_for_node(&self, node_id: Uuid) -> Result<Option<SyncRecordRow>>;

    /// Drive an `in_progress` record to a terminal state. Returns false
    /// when the record was missing or already terminal; terminal states
    /// are never overwritten.
    async fn complete(
        &self,
        id: Uuid,
        status: SyncStatus,
        error_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}
