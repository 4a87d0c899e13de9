// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schema Registry
//!
//! Append-only ordered sequence of node-side schema migrations. Versions
//! are strictly positive, unique, and gap-tolerant; registered migrations
//! are immutable.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::persistence::{SchemaMigrationRecord, SchemaStore};

/// Schema registry service.
pub struct SchemaRegistry {
    store: Arc<dyn SchemaStore>,
}

impl SchemaRegistry {
    /// Create a new schema registry.
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self { store }
    }

    /// Register a migration. The version must be strictly positive and
    /// not yet taken.
    #[instrument(skip(self, up_sql, down_sql))]
    pub async fn register(
        &self,
        version: i32,
        up_sql: String,
        down_sql: String,
        description: String,
    ) -> Result<SchemaMigrationRecord> {
        if version <= 0 {
            return Err(Error::validation("version", "must be strictly positive"));
        }
        if up_sql.is_empty() {
            return Err(Error::validation("up_sql", "must not be empty"));
        }

        let migration = SchemaMigrationRecord {
            id: 0,
            version,
            description,
            up_sql,
            down_sql,
            created_at: Utc::now(),
        };

        self.store.insert(&migration).await?;

        info!(version, "Registered schema migration");

        Ok(migration)
    }

    /// Highest registered version, 0 when the registry is empty.
    pub async fn latest_version(&self) -> Result<i32> {
        self.store.latest_version().await
    }

    /// Migrations with version strictly greater than `version`, ascending.
    pub async fn list_since(&self, version: i32) -> Result<Vec<SchemaMigrationRecord>> {
        self.store.list_since(version).await
    }

    /// All registered migrations, ascending.
    pub async fn list(&self) -> Result<Vec<SchemaMigrationRecord>> {
        self.store.list_since(0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(Arc::new(MemoryPersistence::new()))
    }

    #[tokio::test]
    async fn test_register_and_list_since() {
        let registry = registry();
        registry
            .register(1, "CREATE TABLE a (id INT)".into(), String::new(), "a".into())
            .await
            .unwrap();
        registry
            .register(3, "CREATE TABLE b (id INT)".into(), String::new(), "b".into())
            .await
            .unwrap();

        assert_eq!(registry.latest_version().await.unwrap(), 3);

        // Gap-tolerant: versions 1 and 3 with no 2.
        let since_zero = registry.list_since(0).await.unwrap();
        assert_eq!(
            since_zero.iter().map(|m| m.version).collect::<Vec<_>>(),
            vec![1, 3]
        );

        let since_one = registry.list_since(1).await.unwrap();
        assert_eq!(
            since_one.iter().map(|m| m.version).collect::<Vec<_>>(),
            vec![3]
        );
    }

    #[tokio::test]
    async fn test_version_must_be_positive() {
        let registry = registry();
        for version in [0, -1] {
            let err = registry
                .register(version, "SELECT 1".into(), String::new(), String::new())
                .await
                .unwrap_err();
            assert_eq!(err.error_code(), "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_duplicate_version_rejected() {
        let registry = registry();
        registry
            .register(1, "SELECT 1".into(), String::new(), String::new())
            .await
            .unwrap();
        let err = registry
            .register(1, "SELECT 2".into(), String::new(), String::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_empty_registry_latest_is_zero() {
        assert_eq!(registry().latest_version().await.unwrap(), 0);
    }
}
