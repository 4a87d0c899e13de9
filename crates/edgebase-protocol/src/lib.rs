// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! EdgeBase Protocol - Wire Types
//!
//! Types exchanged between the control plane and edge agents over the
//! `/api/v1` HTTP surface. This crate is pure data: no I/O, no business
//! logic, so agents can depend on it without pulling in the server stack.
//!
//! # Sync round
//!
//! ```text
//! ┌────────────┐  GET  /nodes/{id}/sync   (body: NodeState)   ┌───────────────┐
//! │ Edge Agent │ ───────────────────────────────────────────► │ Control Plane │
//! │            │ ◄─────────────────────────────────────────── │               │
//! │            │        SyncPlan { sync_id, actions[] }       │               │
//! │            │                                              │               │
//! │            │  POST /nodes/{id}/sync/ack (body: AckSync)   │               │
//! │            │ ───────────────────────────────────────────► │               │
//! └────────────┘                                              └───────────────┘
//! ```
//!
//! Actions inside a plan carry a strict `order` field; agents MUST apply
//! them in ascending order.

pub mod api;
pub mod sync;

pub use api::{
    AckSyncRequest, DeployResponse, HeartbeatResponse, NodeInfo, RegisterFunctionRequest,
    RegisterNodeRequest, RegisterNodeResponse, RegisterSchemaRequest, SchemaMigrationInfo,
    SetDeploymentsRequest, SetDeploymentsResponse,
};
pub use sync::{
    AddFunctionPayload, FunctionManifest, FunctionState, NodeState, RemoveFunctionPayload,
    SchemaPayload, SyncAction, SyncActionPayload, SyncOutcome, SyncPlan,
};
