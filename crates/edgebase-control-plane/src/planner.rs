// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sync Planner
//!
//! The diff engine at the center of the control plane. Given a node's
//! reported state it computes the totally-ordered action list that drives
//! the node to the authoritative target state:
//!
//! 1. schema migrations the node is missing, ascending by version
//! 2. function adds/updates, ascending by name
//! 3. function removals, ascending by name
//!
//! The diff itself is pure and deterministic; plan assembly adds presigned
//! download URLs and opens the sync round via the transaction manager.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use edgebase_protocol::{
    AddFunctionPayload, NodeState, RemoveFunctionPayload, SyncAction, SyncActionPayload, SyncPlan,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::catalog::ArtifactCatalog;
use crate::error::{Error, Result};
use crate::persistence::{
    DeploymentStore, FunctionRecord, FunctionStore, NodeStore, SchemaMigrationRecord, SyncType,
};
use crate::schema_registry::SchemaRegistry;
use crate::sync_manager::{PlanSummary, SyncTransactionManager};

/// Outcome of the pure diff: what has to change on the node.
#[derive(Debug, Default)]
struct PlanDiff {
    /// Migrations to apply, ascending by version.
    schemas: Vec<SchemaMigrationRecord>,
    /// Functions to add or update, ascending by name.
    adds: Vec<FunctionRecord>,
    /// Function names to remove, ascending.
    removes: Vec<String>,
}

impl PlanDiff {
    fn is_empty(&self) -> bool {
        self.schemas.is_empty() && self.adds.is_empty() && self.removes.is_empty()
    }
}

/// Diff the reported state against the target state.
///
/// A function matches only when `(name, version, hash)` all agree; a
/// name+version match with a differing hash is treated as corruption and
/// re-added. Deterministic: identical inputs yield identical diffs.
fn diff_state(
    migrations: Vec<SchemaMigrationRecord>,
    target: &HashMap<String, FunctionRecord>,
    reported: &NodeState,
) -> PlanDiff {
    let reported_by_name: HashMap<&str, &edgebase_protocol::FunctionState> = reported
        .functions
        .iter()
        .map(|f| (f.name.as_str(), f))
        .collect();

    let mut adds: Vec<FunctionRecord> = target
        .values()
        .filter(|target_fn| match reported_by_name.get(target_fn.name.as_str()) {
            Some(current) => {
                current.version != target_fn.version || current.hash != target_fn.hash
            }
            None => true,
        })
        .cloned()
        .collect();
    adds.sort_by(|a, b| a.name.cmp(&b.name));

    let mut removes: Vec<String> = reported
        .functions
        .iter()
        .filter(|current| !target.contains_key(&current.name))
        .map(|current| current.name.clone())
        .collect();
    removes.sort();

    PlanDiff {
        schemas: migrations,
        adds,
        removes,
    }
}

/// Sync planner service.
pub struct SyncPlanner {
    nodes: Arc<dyn NodeStore>,
    functions: Arc<dyn FunctionStore>,
    deployments: Arc<dyn DeploymentStore>,
    schemas: Arc<SchemaRegistry>,
    catalog: Arc<ArtifactCatalog>,
    transactions: Arc<SyncTransactionManager>,
}

impl SyncPlanner {
    /// Create a new sync planner.
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        functions: Arc<dyn FunctionStore>,
        deployments: Arc<dyn DeploymentStore>,
        schemas: Arc<SchemaRegistry>,
        catalog: Arc<ArtifactCatalog>,
        transactions: Arc<SyncTransactionManager>,
    ) -> Self {
        Self {
            nodes,
            functions,
            deployments,
            schemas,
            catalog,
            transactions,
        }
    }

    /// Compute a sync plan for a node.
    ///
    /// Everything, including presigned URLs, is assembled before the sync
    /// round is opened: an object-store failure aborts without leaving a
    /// dangling record.
    #[instrument(skip(self, reported), fields(node_id = %node_id, schema_version = reported.schema_version))]
    pub async fn plan(&self, node_id: Uuid, reported: &NodeState) -> Result<SyncPlan> {
        if self.nodes.get(node_id).await?.is_none() {
            return Err(Error::not_found("node", node_id));
        }

        // Target schema: everything past the node's confirmed version.
        let migrations = self.schemas.list_since(reported.schema_version).await?;

        // Target functions: the node's desired deployments resolved to
        // the latest uploaded artifact of each assigned name. An
        // assignment of an older version still converges to the newest
        // upload. No deployments means an empty target set; a fresh node
        // legitimately needs nothing.
        let mut desired_names: HashSet<String> = HashSet::new();
        for deployment in self.deployments.list_for_node(node_id).await? {
            if !deployment.is_desired() {
                continue;
            }
            if let Some(function) = self.functions.get(deployment.function_id).await? {
                desired_names.insert(function.name);
            }
        }

        let target: HashMap<String, FunctionRecord> = self
            .catalog
            .latest_per_name()
            .await?
            .into_iter()
            .filter(|(name, _)| desired_names.contains(name))
            .collect();

        let diff = diff_state(migrations, &target, reported);

        debug!(
            schemas = diff.schemas.len(),
            adds = diff.adds.len(),
            removes = diff.removes.len(),
            empty = diff.is_empty(),
            "Computed sync diff"
        );

        let summary = PlanSummary {
            sync_type: if reported.schema_version == 0 && reported.functions.is_empty() {
                SyncType::Full
            } else {
                SyncType::Incremental
            },
            functions_added: diff.adds.len() as i32,
            functions_removed: diff.removes.len() as i32,
            schemas_applied: diff.schemas.len() as i32,
        };

        let mut actions = Vec::with_capacity(diff.schemas.len() + diff.adds.len() + diff.removes.len());
        let mut order = 1;

        for migration in &diff.schemas {
            actions.push(SyncAction {
                payload: SyncActionPayload::ApplySchema(migration.into()),
                order,
                description: format!("Apply schema version {}", migration.version),
            });
            order += 1;
        }

        for function in &diff.adds {
            let url = self.catalog.download_url(function.id, None).await?;
            actions.push(SyncAction {
                payload: SyncActionPayload::AddFunction(AddFunctionPayload {
                    function: function.into(),
                    url,
                }),
                order,
                description: format!("Add function {} version {}", function.name, function.version),
            });
            order += 1;
        }

        for name in &diff.removes {
            actions.push(SyncAction {
                payload: SyncActionPayload::RemoveFunction(RemoveFunctionPayload {
                    name: name.clone(),
                }),
                order,
                description: format!("Remove function {}", name),
            });
            order += 1;
        }

        let sync_id = self.transactions.begin(node_id, summary).await?;

        Ok(SyncPlan { sync_id, actions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use edgebase_protocol::FunctionState;

    fn migration(version: i32) -> SchemaMigrationRecord {
        SchemaMigrationRecord {
            id: version as i64,
            version,
            description: format!("migration {}", version),
            up_sql: format!("CREATE TABLE t{} (id INT)", version),
            down_sql: String::new(),
            created_at: Utc::now(),
        }
    }

    fn function(name: &str, version: &str, hash: &str) -> FunctionRecord {
        FunctionRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            version: version.to_string(),
            hash: hash.to_string(),
            size_bytes: 8,
            blob_path: format!("{}/{}/function.wasm", name, version),
            entrypoint: None,
            runtime: None,
            memory_pages: None,
            max_execution_ms: None,
            created_at: Utc::now(),
        }
    }

    fn target_of(functions: &[FunctionRecord]) -> HashMap<String, FunctionRecord> {
        functions
            .iter()
            .map(|f| (f.name.clone(), f.clone()))
            .collect()
    }

    fn reported(functions: &[(&str, &str, &str)]) -> NodeState {
        NodeState {
            schema_version: 0,
            functions: functions
                .iter()
                .map(|(name, version, hash)| FunctionState {
                    name: name.to_string(),
                    version: version.to_string(),
                    hash: hash.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_empty_target_empty_reported_is_empty_diff() {
        let diff = diff_state(Vec::new(), &HashMap::new(), &NodeState::default());
        assert!(diff.is_empty());
    }

    #[test]
    fn test_matching_state_is_empty_diff() {
        let target = target_of(&[function("hello", "1.0.0", "h1")]);
        let diff = diff_state(Vec::new(), &target, &reported(&[("hello", "1.0.0", "h1")]));
        assert!(diff.is_empty());
    }

    #[test]
    fn test_missing_function_is_added() {
        let target = target_of(&[function("hello", "1.0.0", "h1")]);
        let diff = diff_state(Vec::new(), &target, &NodeState::default());
        assert_eq!(diff.adds.len(), 1);
        assert_eq!(diff.adds[0].name, "hello");
        assert!(diff.removes.is_empty());
    }

    #[test]
    fn test_hash_drift_triggers_re_add() {
        let target = target_of(&[function("hello", "1.0.0", "h1")]);
        let diff = diff_state(Vec::new(), &target, &reported(&[("hello", "1.0.0", "h0")]));
        assert_eq!(diff.adds.len(), 1);
        assert_eq!(diff.adds[0].name, "hello");
    }

    #[test]
    fn test_version_change_triggers_re_add() {
        let target = target_of(&[function("hello", "2.0.0", "h2")]);
        let diff = diff_state(Vec::new(), &target, &reported(&[("hello", "1.0.0", "h1")]));
        assert_eq!(diff.adds.len(), 1);
        assert_eq!(diff.adds[0].version, "2.0.0");
        // An update is not a removal.
        assert!(diff.removes.is_empty());
    }

    #[test]
    fn test_unassigned_function_is_removed() {
        let diff = diff_state(
            Vec::new(),
            &HashMap::new(),
            &reported(&[("obsolete", "0.1", "hx")]),
        );
        assert!(diff.adds.is_empty());
        assert_eq!(diff.removes, vec!["obsolete".to_string()]);
    }

    #[test]
    fn test_adds_and_removes_sorted_by_name() {
        let target = target_of(&[
            function("zeta", "1.0.0", "hz"),
            function("alpha", "1.0.0", "ha"),
        ]);
        let diff = diff_state(
            Vec::new(),
            &target,
            &reported(&[("nu", "1.0", "h1"), ("mu", "1.0", "h2")]),
        );

        let add_names: Vec<_> = diff.adds.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(add_names, vec!["alpha", "zeta"]);
        assert_eq!(diff.removes, vec!["mu".to_string(), "nu".to_string()]);
    }

    #[test]
    fn test_diff_is_deterministic() {
        let target = target_of(&[
            function("b", "1.0.0", "hb"),
            function("a", "1.0.0", "ha"),
            function("c", "1.0.0", "hc"),
        ]);
        let state = reported(&[("d", "1.0", "hd"), ("a", "0.9", "old")]);

        let first = diff_state(vec![migration(1), migration(2)], &target, &state);
        let second = diff_state(vec![migration(1), migration(2)], &target, &state);

        let names = |diff: &PlanDiff| {
            (
                diff.schemas.iter().map(|m| m.version).collect::<Vec<_>>(),
                diff.adds.iter().map(|f| f.name.clone()).collect::<Vec<_>>(),
                diff.removes.clone(),
            )
        };
        assert_eq!(names(&first), names(&second));
    }
}
