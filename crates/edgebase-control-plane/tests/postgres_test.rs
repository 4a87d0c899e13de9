// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL backend tests.
//!
//! These run only when `TEST_DATABASE_URL` points at a disposable
//! database; they are skipped otherwise. Entities use random ids and
//! names so concurrent tests do not collide.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use edgebase_control_plane::migrations;
use edgebase_control_plane::persistence::{
    DeploymentStore, FunctionRecord, FunctionStore, NodeRecord, NodeStatus, NodeStore,
    PostgresPersistence, SchemaStore, SyncRecordRow, SyncStatus, SyncStore, SyncType,
};

/// Helper macro to skip tests if the database URL is not set.
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}

async fn connect() -> PostgresPersistence {
    let database_url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL not set");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    migrations::run(&pool).await.expect("Failed to run migrations");
    PostgresPersistence::new(pool)
}

fn test_node() -> NodeRecord {
    let now = Utc::now();
    NodeRecord {
        id: Uuid::new_v4(),
        name: format!("node-{}", Uuid::new_v4()),
        region: "test".to_string(),
        status: NodeStatus::Online,
        auth_token_hash: "hash".to_string(),
        current_schema_version: 0,
        last_heartbeat_at: None,
        last_sync_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn test_function(name: &str) -> FunctionRecord {
    FunctionRecord {
        id: Uuid::new_v4(),
        name: name.to_string(),
        version: "1.0.0".to_string(),
        hash: String::new(),
        size_bytes: 0,
        blob_path: String::new(),
        entrypoint: None,
        runtime: None,
        memory_pages: None,
        max_execution_ms: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_node_round_trip() {
    skip_if_no_db!();
    let store = connect().await;

    let node = test_node();
    NodeStore::insert(&store, &node).await.unwrap();

    let stored = NodeStore::get(&store, node.id).await.unwrap().unwrap();
    assert_eq!(stored.name, node.name);
    assert_eq!(stored.status, NodeStatus::Online);
    assert_eq!(stored.current_schema_version, 0);

    assert!(store.touch_heartbeat(node.id, Utc::now()).await.unwrap());
    let stored = NodeStore::get(&store, node.id).await.unwrap().unwrap();
    assert!(stored.last_heartbeat_at.is_some());
}

#[tokio::test]
async fn test_duplicate_function_maps_to_already_exists() {
    skip_if_no_db!();
    let store = connect().await;

    let name = format!("fn-{}", Uuid::new_v4());
    FunctionStore::insert(&store, &test_function(&name))
        .await
        .unwrap();

    let err = FunctionStore::insert(&store, &test_function(&name))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "ALREADY_EXISTS");
}

#[tokio::test]
async fn test_schema_cursor_is_monotone_in_sql() {
    skip_if_no_db!();
    let store = connect().await;

    let node = test_node();
    NodeStore::insert(&store, &node).await.unwrap();

    store
        .record_sync_success(node.id, Some(7), Utc::now())
        .await
        .unwrap();
    store
        .record_sync_success(node.id, Some(3), Utc::now())
        .await
        .unwrap();
    store
        .record_sync_success(node.id, None, Utc::now())
        .await
        .unwrap();

    let stored = NodeStore::get(&store, node.id).await.unwrap().unwrap();
    assert_eq!(stored.current_schema_version, 7);
    assert!(stored.last_sync_at.is_some());
}

#[tokio::test]
async fn test_sync_record_terminal_guard_in_sql() {
    skip_if_no_db!();
    let store = connect().await;

    let node = test_node();
    NodeStore::insert(&store, &node).await.unwrap();

    let record = SyncRecordRow {
        id: Uuid::new_v4(),
        node_id: node.id,
        sync_type: SyncType::Full,
        status: SyncStatus::InProgress,
        started_at: Utc::now(),
        completed_at: None,
        error_message: None,
        functions_added: 1,
        functions_removed: 0,
        schemas_applied: 0,
    };
    SyncStore::insert(&store, &record).await.unwrap();

    let open = store.open_for_node(node.id).await.unwrap().unwrap();
    assert_eq!(open.id, record.id);

    assert!(
        store
            .complete(record.id, SyncStatus::Success, None, Utc::now())
            .await
            .unwrap()
    );
    assert!(
        !store
            .complete(record.id, SyncStatus::Failed, Some("late"), Utc::now())
            .await
            .unwrap()
    );

    let stored = SyncStore::get(&store, record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncStatus::Success);
    assert!(stored.completed_at.is_some());
    assert!(store.open_for_node(node.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_deployment_replace_and_promote() {
    skip_if_no_db!();
    let store = connect().await;

    let node = test_node();
    NodeStore::insert(&store, &node).await.unwrap();
    let a = test_function(&format!("fn-{}", Uuid::new_v4()));
    let b = test_function(&format!("fn-{}", Uuid::new_v4()));
    FunctionStore::insert(&store, &a).await.unwrap();
    FunctionStore::insert(&store, &b).await.unwrap();

    store.upsert_pending(node.id, a.id).await.unwrap();
    assert_eq!(store.count_for_function(a.id).await.unwrap(), 1);

    let count = store.replace_for_node(node.id, &[a.id, b.id]).await.unwrap();
    assert_eq!(count, 2);

    let promoted = store.mark_active(node.id, None).await.unwrap();
    assert_eq!(promoted, 2);

    let rows = store.list_for_node(node.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.is_desired()));
}

#[tokio::test]
async fn test_schema_registry_ordering() {
    skip_if_no_db!();
    let store = connect().await;

    // Versions are global; pick a random window to stay isolated.
    let base = (Uuid::new_v4().as_u128() % 1_000_000) as i32 * 1000 + 1_000_000;
    for offset in [2, 0, 1] {
        let migration = edgebase_control_plane::persistence::SchemaMigrationRecord {
            id: 0,
            version: base + offset,
            description: String::new(),
            up_sql: "SELECT 1".to_string(),
            down_sql: String::new(),
            created_at: Utc::now(),
        };
        SchemaStore::insert(&store, &migration).await.unwrap();
    }

    let since = store.list_since(base - 1).await.unwrap();
    let versions: Vec<i32> = since
        .iter()
        .map(|m| m.version)
        .filter(|v| (base..base + 3).contains(v))
        .collect();
    assert_eq!(versions, vec![base, base + 1, base + 2]);
}
