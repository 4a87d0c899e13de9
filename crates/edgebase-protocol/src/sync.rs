// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sync plan wire types.
//!
//! A sync round starts with the agent reporting its [`NodeState`]; the
//! control plane answers with a [`SyncPlan`] whose actions drive the node
//! to the authoritative target state. The round closes with a
//! [`SyncOutcome`] in the ack request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State an edge node reports when polling for a sync plan.
///
/// An absent or empty request body deserializes to the zero state
/// (schema version 0, no functions), which is what a freshly provisioned
/// node reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeState {
    /// Last schema migration version the node has confirmed applied.
    #[serde(default)]
    pub schema_version: i32,
    /// Function artifacts currently present on the node.
    #[serde(default)]
    pub functions: Vec<FunctionState>,
}

/// One function artifact as present on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionState {
    /// Artifact name.
    pub name: String,
    /// Artifact version string.
    pub version: String,
    /// SHA-256 of the artifact bytes, lowercase hex.
    pub hash: String,
}

/// Ordered list of actions bringing a node from its reported state to the
/// target state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPlan {
    /// Transaction handle for this sync round. Echoed back in the ack.
    pub sync_id: Uuid,
    /// Actions in execution order (`order` ascending, 1-based).
    pub actions: Vec<SyncAction>,
}

/// A single step of a sync plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAction {
    /// Discriminated payload; the `type` tag selects the variant.
    #[serde(flatten)]
    pub payload: SyncActionPayload,
    /// Position in the plan, 1-based. Agents MUST execute in ascending order.
    pub order: i32,
    /// Human-readable summary for operator logs.
    pub description: String,
}

impl SyncAction {
    /// The wire discriminator of this action.
    pub fn action_type(&self) -> &'static str {
        self.payload.action_type()
    }
}

/// Tagged union of sync action payloads.
///
/// Serializes with an explicit `type` discriminator and a `payload` object,
/// so agents can dispatch without probing field shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncActionPayload {
    /// Apply one schema migration (forward SQL).
    #[serde(rename = "APPLY_SCHEMA")]
    ApplySchema(SchemaPayload),
    /// Download and install a function artifact.
    #[serde(rename = "ADD_FUNCTION")]
    AddFunction(AddFunctionPayload),
    /// Remove a function artifact no longer in the target set.
    #[serde(rename = "REMOVE_FUNCTION")]
    RemoveFunction(RemoveFunctionPayload),
}

impl SyncActionPayload {
    /// The wire discriminator of this payload.
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::ApplySchema(_) => "APPLY_SCHEMA",
            Self::AddFunction(_) => "ADD_FUNCTION",
            Self::RemoveFunction(_) => "REMOVE_FUNCTION",
        }
    }
}

/// Payload of an `APPLY_SCHEMA` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaPayload {
    /// Migration version to record once applied.
    pub version: i32,
    /// Forward SQL to execute on the node's local store.
    pub up_sql: String,
    /// Operator-facing description of the migration.
    pub description: String,
}

/// Payload of an `ADD_FUNCTION` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFunctionPayload {
    /// Full artifact metadata.
    pub function: FunctionManifest,
    /// Time-limited presigned download URL for the artifact bytes.
    pub url: String,
}

/// Payload of a `REMOVE_FUNCTION` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveFunctionPayload {
    /// Name of the function to remove.
    pub name: String,
}

/// Function artifact metadata as served to agents and operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionManifest {
    /// Surrogate id.
    pub id: Uuid,
    /// Artifact name; `(name, version)` is unique.
    pub name: String,
    /// Artifact version string.
    pub version: String,
    /// SHA-256 of the artifact bytes, lowercase hex. Empty until uploaded.
    pub hash: String,
    /// Size of the artifact in bytes.
    pub size_bytes: i64,
    /// Exported entrypoint symbol, if declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    /// Runtime tag (e.g. `wasmtime`), if declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Linear memory limit in 64 KiB pages, if declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_pages: Option<i32>,
    /// Execution deadline in milliseconds, if declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_execution_ms: Option<i32>,
    /// When the artifact row was created.
    pub created_at: DateTime<Utc>,
}

/// Result of executing a sync plan, reported in the ack.
///
/// `applied_schema_version` and `applied_functions` close the loop
/// precisely; when omitted the control plane trusts the plan it issued.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Whether every action of the plan was applied.
    pub success: bool,
    /// Failure detail when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Schema version the node reached during this round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_schema_version: Option<i32>,
    /// Functions present on the node after this round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_functions: Option<Vec<FunctionState>>,
}
