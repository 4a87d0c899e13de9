// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! EdgeBase Control Plane
//!
//! Central authority of the edge compute fleet: keeps a heterogeneous set
//! of edge nodes converged toward the declared global configuration of
//! WebAssembly function artifacts and node-side schema migrations. Nodes
//! pull; the control plane reconciles. Nothing here assumes an edge is
//! reachable on demand.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                           Edge Agents                              │
//! │              (poll / heartbeat / ack over HTTP, pull-only)         │
//! └────────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                        HTTP Transport (axum)                       │
//! │                  /api/v1 - format only, no decisions               │
//! └────────────────────────────────────────────────────────────────────┘
//!        │            │             │              │             │
//!        ▼            ▼             ▼              ▼             ▼
//! ┌──────────┐ ┌───────────┐ ┌───────────┐ ┌────────────┐ ┌───────────┐
//! │  Node    │ │ Artifact  │ │  Schema   │ │ Deployment │ │   Sync    │
//! │ Registry │ │  Catalog  │ │ Registry  │ │ Projection │ │ Planner + │
//! │          │ │           │ │           │ │            │ │ Txn Mgr   │
//! └──────────┘ └───────────┘ └───────────┘ └────────────┘ └───────────┘
//!        │            │             │              │             │
//!        ▼            ▼             ▼              ▼             ▼
//! ┌────────────────────────────────────────┐ ┌───────────────────────┐
//! │               PostgreSQL               │ │  S3-compatible store  │
//! │  (all shared mutable state lives here) │ │  (artifact bytes +    │
//! │                                        │ │   presigned GETs)     │
//! └────────────────────────────────────────┘ └───────────────────────┘
//! ```
//!
//! # Sync round
//!
//! | Step | Operation |
//! |------|-----------|
//! | 1 | Node polls `GET /nodes/{id}/sync` with its reported state |
//! | 2 | Planner diffs reported vs target, opens an `in_progress` record |
//! | 3 | Node executes actions in ascending `order` |
//! | 4 | Node acks `POST /nodes/{id}/sync/ack` with the outcome |
//! | 5 | Transaction manager finalizes the record and the projection |
//!
//! The plan is deterministic given its inputs; the sync id is a
//! transaction handle, not part of the diff. A second poll while a fresh
//! round is open returns the same sync id, so agents can retry safely.

pub mod bus;
pub mod catalog;
pub mod config;
pub mod deployments;
pub mod error;
pub mod http;
pub mod migrations;
pub mod node_registry;
pub mod persistence;
pub mod planner;
pub mod schema_registry;
pub mod status_sweeper;
pub mod storage;
pub mod sync_manager;
