// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end sync round scenarios over the in-memory backends.

mod common;

use common::*;
use edgebase_control_plane::persistence::{
    DeploymentStatus, DeploymentStore, NodeStatus, NodeStore, SyncStatus, SyncStore,
};
use edgebase_protocol::{FunctionState, NodeState, SyncActionPayload, SyncOutcome, SyncPlan};

fn action_types(plan: &SyncPlan) -> Vec<&'static str> {
    plan.actions.iter().map(|a| a.action_type()).collect()
}

#[tokio::test]
async fn test_fresh_node_empty_fleet_gets_empty_plan() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;

    let plan = ctx
        .state
        .planner
        .plan(node.id, &NodeState::default())
        .await
        .unwrap();

    assert!(plan.actions.is_empty());
}

#[tokio::test]
async fn test_schema_catch_up_orders_migrations() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;
    ctx.register_schema(1).await;
    ctx.register_schema(2).await;

    let plan = ctx
        .state
        .planner
        .plan(node.id, &NodeState::default())
        .await
        .unwrap();

    assert_eq!(action_types(&plan), vec!["APPLY_SCHEMA", "APPLY_SCHEMA"]);
    assert_eq!(plan.actions[0].order, 1);
    assert_eq!(plan.actions[1].order, 2);

    for (action, expected_version) in plan.actions.iter().zip([1, 2]) {
        match &action.payload {
            SyncActionPayload::ApplySchema(payload) => {
                assert_eq!(payload.version, expected_version);
                assert!(!payload.up_sql.is_empty());
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_add_function_carries_signed_url_and_hash() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;
    let function = ctx.register_function("hello", "1.0.0", b"\0asm hello").await;
    ctx.deploy(node.id, function.id).await;

    let plan = ctx
        .state
        .planner
        .plan(node.id, &NodeState::default())
        .await
        .unwrap();

    assert_eq!(action_types(&plan), vec!["ADD_FUNCTION"]);
    match &plan.actions[0].payload {
        SyncActionPayload::AddFunction(payload) => {
            assert_eq!(payload.function.hash, function.hash);
            assert_eq!(payload.function.name, "hello");
            // Default TTL of 15 minutes.
            assert!(payload.url.contains("expires=900"));
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_hash_drift_triggers_re_add() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;
    let function = ctx.register_function("hello", "1.0.0", b"\0asm hello").await;
    ctx.deploy(node.id, function.id).await;

    // Node claims the right name and version but a different hash.
    let plan = ctx
        .state
        .planner
        .plan(node.id, &reported_raw(0, &[("hello", "1.0.0", "deadbeef")]))
        .await
        .unwrap();

    assert_eq!(action_types(&plan), vec!["ADD_FUNCTION"]);
}

#[tokio::test]
async fn test_unassigned_function_is_removed() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;

    let plan = ctx
        .state
        .planner
        .plan(node.id, &reported_raw(0, &[("obsolete", "0.1", "hx")]))
        .await
        .unwrap();

    assert_eq!(action_types(&plan), vec!["REMOVE_FUNCTION"]);
    match &plan.actions[0].payload {
        SyncActionPayload::RemoveFunction(payload) => assert_eq!(payload.name, "obsolete"),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_plan_orders_schema_then_add_then_remove() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;
    ctx.register_schema(1).await;
    let beta = ctx.register_function("beta", "1.0.0", b"beta").await;
    let alpha = ctx.register_function("alpha", "1.0.0", b"alpha").await;
    ctx.deploy(node.id, alpha.id).await;
    ctx.deploy(node.id, beta.id).await;

    let plan = ctx
        .state
        .planner
        .plan(node.id, &reported_raw(0, &[("obsolete", "0.1", "hx")]))
        .await
        .unwrap();

    assert_eq!(
        action_types(&plan),
        vec![
            "APPLY_SCHEMA",
            "ADD_FUNCTION",
            "ADD_FUNCTION",
            "REMOVE_FUNCTION"
        ]
    );
    // Total order is the contract: 1..N in emission order, adds sorted by name.
    assert_eq!(
        plan.actions.iter().map(|a| a.order).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    match &plan.actions[1].payload {
        SyncActionPayload::AddFunction(payload) => assert_eq!(payload.function.name, "alpha"),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_plan_is_deterministic() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;
    ctx.register_schema(1).await;
    let function = ctx.register_function("hello", "1.0.0", b"bytes").await;
    ctx.deploy(node.id, function.id).await;

    let state = reported_raw(0, &[("stray", "0.1", "hx")]);
    let first = ctx.state.planner.plan(node.id, &state).await.unwrap();
    let second = ctx.state.planner.plan(node.id, &state).await.unwrap();

    let shape = |plan: &SyncPlan| {
        plan.actions
            .iter()
            .map(|a| (a.action_type(), a.order, a.description.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&first), shape(&second));
}

#[tokio::test]
async fn test_executed_plan_converges_to_empty_plan() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;
    ctx.register_schema(1).await;
    ctx.register_schema(2).await;
    let function = ctx.register_function("hello", "1.0.0", b"\0asm hello").await;
    ctx.deploy(node.id, function.id).await;

    let plan = ctx
        .state
        .planner
        .plan(node.id, &NodeState::default())
        .await
        .unwrap();
    assert_eq!(plan.actions.len(), 3);

    // "Execute" the plan and ack with the resulting state.
    let applied = SyncOutcome {
        success: true,
        error: None,
        applied_schema_version: Some(2),
        applied_functions: Some(vec![FunctionState {
            name: function.name.clone(),
            version: function.version.clone(),
            hash: function.hash.clone(),
        }]),
    };
    ctx.state
        .transactions
        .ack(node.id, plan.sync_id, &applied)
        .await
        .unwrap();

    // Deployment was promoted to active and the node is back online.
    let rows = ctx.persistence.list_for_node(node.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DeploymentStatus::Active);

    let stored = NodeStore::get(ctx.persistence.as_ref(), node.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.current_schema_version, 2);
    assert_eq!(stored.status, NodeStatus::Online);

    // The node now reports exactly the target state: nothing left to do.
    let next = ctx
        .state
        .planner
        .plan(node.id, &reported(2, &[&function]))
        .await
        .unwrap();
    assert!(next.actions.is_empty());
}

#[tokio::test]
async fn test_failed_ack_leaves_projection_and_replans() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;
    let function = ctx.register_function("hello", "1.0.0", b"\0asm hello").await;
    ctx.deploy(node.id, function.id).await;

    let plan = ctx
        .state
        .planner
        .plan(node.id, &NodeState::default())
        .await
        .unwrap();
    assert_eq!(plan.actions.len(), 1);

    ctx.state
        .transactions
        .ack(
            node.id,
            plan.sync_id,
            &SyncOutcome {
                success: false,
                error: Some("wasm load failed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let record = SyncStore::get(ctx.persistence.as_ref(), plan.sync_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, SyncStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("wasm load failed"));

    let stored = NodeStore::get(ctx.persistence.as_ref(), node.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, NodeStatus::Online);

    // Projection untouched: the deployment is still pending.
    let rows = ctx.persistence.list_for_node(node.id).await.unwrap();
    assert_eq!(rows[0].status, DeploymentStatus::Pending);

    // The next poll returns an equivalent plan under a new sync id.
    let next = ctx
        .state
        .planner
        .plan(node.id, &NodeState::default())
        .await
        .unwrap();
    assert_ne!(next.sync_id, plan.sync_id);
    assert_eq!(action_types(&next), action_types(&plan));
}

#[tokio::test]
async fn test_repeated_poll_reuses_open_round() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;
    let function = ctx.register_function("hello", "1.0.0", b"bytes").await;
    ctx.deploy(node.id, function.id).await;

    let first = ctx
        .state
        .planner
        .plan(node.id, &NodeState::default())
        .await
        .unwrap();
    let second = ctx
        .state
        .planner
        .plan(node.id, &NodeState::default())
        .await
        .unwrap();

    // Safe retry: the open round is handed back, and its ack still works.
    assert_eq!(first.sync_id, second.sync_id);
    ctx.state
        .transactions
        .ack(
            node.id,
            second.sync_id,
            &SyncOutcome {
                success: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_newer_upload_wins_over_version_string() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;

    let older = ctx.register_function("hello", "2.0.0", b"older").await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    ctx.register_function("hello", "1.9.9", b"newer").await;

    // The assignment references the older row, but the target resolves
    // to the latest upload of the name. Creation time, not the version
    // string, decides "latest".
    ctx.deploy(node.id, older.id).await;
    let plan = ctx
        .state
        .planner
        .plan(node.id, &NodeState::default())
        .await
        .unwrap();

    assert_eq!(plan.actions.len(), 1);
    match &plan.actions[0].payload {
        SyncActionPayload::AddFunction(payload) => {
            assert_eq!(payload.function.version, "1.9.9");
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_node_reporting_current_latest_needs_nothing() {
    let ctx = TestContext::new();
    let (node, _) = ctx.register_node("n1", "us-east").await;
    let function = ctx.register_function("hello", "1.0.0", b"bytes").await;
    ctx.deploy(node.id, function.id).await;

    let plan = ctx
        .state
        .planner
        .plan(node.id, &reported(0, &[&function]))
        .await
        .unwrap();

    assert!(plan.actions.is_empty());
}
