// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for the control plane.
//!
//! These manage the control plane's own PostgreSQL schema. They are
//! unrelated to the node-side [`SchemaRegistry`](crate::schema_registry)
//! migrations, which are data distributed to edge nodes.
//!
//! # Example
//!
//! ```ignore
//! use sqlx::PgPool;
//! use edgebase_control_plane::migrations;
//!
//! let pool = PgPool::connect(&database_url).await?;
//! migrations::run(&pool).await?;
//! ```

use sqlx::migrate::MigrateError;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Run all control plane migrations.
///
/// Safe to call multiple times; already-applied migrations are skipped.
pub async fn run(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
