// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request and response bodies for the `/api/v1` HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::SyncOutcome;

/// Body of `POST /nodes/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterNodeRequest {
    /// Operator-chosen node name.
    pub name: String,
    /// Deployment region label (informational).
    #[serde(default)]
    pub region: String,
}

/// Response of `POST /nodes/register`.
///
/// `token` is the clear bearer token and is returned exactly once; only
/// its hash is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterNodeResponse {
    /// The registered node.
    pub node: NodeInfo,
    /// Clear bearer token for subsequent authentication.
    pub token: String,
}

/// Node as served to operators. Never carries the token or its hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node id.
    pub id: Uuid,
    /// Operator-chosen name.
    pub name: String,
    /// Deployment region label.
    pub region: String,
    /// `online`, `offline` or `syncing`.
    pub status: String,
    /// Last schema migration version the node confirmed applied.
    pub current_schema_version: i32,
    /// Last heartbeat received, if any.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Last successful sync, if any.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// When the node registered.
    pub created_at: DateTime<Utc>,
}

/// Response of `POST /nodes/{id}/heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    /// Always `"ok"`.
    pub status: String,
}

/// Body of `POST /nodes/{id}/sync/ack`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckSyncRequest {
    /// The sync round being acknowledged.
    pub sync_id: Uuid,
    /// Outcome of executing the plan.
    pub result: SyncOutcome,
}

/// Body of `POST /functions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFunctionRequest {
    /// Artifact name.
    pub name: String,
    /// Artifact version string. Defaults to `1.0.0`.
    #[serde(default)]
    pub version: Option<String>,
    /// Exported entrypoint symbol.
    #[serde(default)]
    pub entrypoint: Option<String>,
    /// Runtime tag.
    #[serde(default)]
    pub runtime: Option<String>,
    /// Linear memory limit in 64 KiB pages.
    #[serde(default)]
    pub memory_pages: Option<i32>,
    /// Execution deadline in milliseconds.
    #[serde(default)]
    pub max_execution_ms: Option<i32>,
}

/// Body of `POST /schemas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSchemaRequest {
    /// Migration version, strictly positive and unique.
    pub version: i32,
    /// Forward SQL.
    pub up_sql: String,
    /// Backward SQL.
    #[serde(default)]
    pub down_sql: String,
    /// Operator-facing description.
    #[serde(default)]
    pub description: String,
}

/// A schema migration as listed by `GET /schemas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaMigrationInfo {
    /// Migration version.
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

/// Response of `POST /functions/{fid}/deploy/{nid}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    /// Always `"queued"`.
    pub status: String,
}

/// Body of `PUT /nodes/{id}/deployments`: the full desired set for a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDeploymentsRequest {
    /// Function ids that should be deployed to the node.
    pub function_ids: Vec<Uuid>,
}

/// Response of `PUT /nodes/{id}/deployments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDeploymentsResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Number of deployment rows now queued for the node.
    pub count: usize,
}
