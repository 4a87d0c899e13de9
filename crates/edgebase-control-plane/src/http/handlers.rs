// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Route handlers. Format only; all decisions live in the core services.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use uuid::Uuid;

use edgebase_protocol::{
    AckSyncRequest, DeployResponse, FunctionManifest, HeartbeatResponse, NodeInfo, NodeState,
    RegisterFunctionRequest, RegisterNodeRequest, RegisterNodeResponse, RegisterSchemaRequest,
    SchemaMigrationInfo, SetDeploymentsRequest, SetDeploymentsResponse, SyncPlan,
};

use crate::catalog::NewFunction;
use crate::storage::WASM_CONTENT_TYPE;

use super::{ApiError, AppState};

type ApiResult<T> = Result<T, ApiError>;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

// ============================================================================
// Nodes
// ============================================================================

pub async fn register_node(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterNodeRequest>,
) -> ApiResult<(StatusCode, Json<RegisterNodeResponse>)> {
    let (node, token) = state.nodes.register(request.name, request.region).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterNodeResponse {
            node: (&node).into(),
            token,
        }),
    ))
}

pub async fn list_nodes(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<NodeInfo>>> {
    let nodes = state.nodes.list().await?;
    Ok(Json(nodes.iter().map(NodeInfo::from).collect()))
}

pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<NodeInfo>> {
    let node = state.nodes.get(id).await?;
    Ok(Json((&node).into()))
}

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<HeartbeatResponse>> {
    state.nodes.heartbeat(id).await?;
    Ok(Json(HeartbeatResponse {
        status: "ok".to_string(),
    }))
}

// ============================================================================
// Sync
// ============================================================================

pub async fn get_sync_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    reported: Option<Json<NodeState>>,
) -> ApiResult<Json<SyncPlan>> {
    // A node that sends no body is treated as reporting the zero state.
    let reported = reported.map(|Json(state)| state).unwrap_or_default();
    let plan = state.planner.plan(id, &reported).await?;
    Ok(Json(plan))
}

pub async fn ack_sync(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AckSyncRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .transactions
        .ack(id, request.sync_id, &request.result)
        .await?;
    Ok(Json(serde_json::json!({"status": "acked"})))
}

pub async fn set_deployments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetDeploymentsRequest>,
) -> ApiResult<Json<SetDeploymentsResponse>> {
    let count = state.projection.replace(id, &request.function_ids).await?;
    Ok(Json(SetDeploymentsResponse {
        status: "ok".to_string(),
        count,
    }))
}

// ============================================================================
// Functions
// ============================================================================

pub async fn create_function(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterFunctionRequest>,
) -> ApiResult<(StatusCode, Json<FunctionManifest>)> {
    let function = state
        .catalog
        .create(NewFunction {
            name: request.name,
            version: request.version,
            entrypoint: request.entrypoint,
            runtime: request.runtime,
            memory_pages: request.memory_pages,
            max_execution_ms: request.max_execution_ms,
        })
        .await?;

    Ok((StatusCode::CREATED, Json((&function).into())))
}

pub async fn list_functions(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<FunctionManifest>>> {
    let functions = state.catalog.list().await?;
    Ok(Json(functions.iter().map(FunctionManifest::from).collect()))
}

pub async fn get_function(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FunctionManifest>> {
    let function = state.catalog.get(id).await?;
    Ok(Json((&function).into()))
}

pub async fn upload_function(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<FunctionManifest>> {
    let function = state.catalog.upload(id, body.to_vec()).await?;
    Ok(Json((&function).into()))
}

pub async fn download_function(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let url = state.catalog.download_url(id, None).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

pub async fn download_artifact(
    State(state): State<Arc<AppState>>,
    Path((name, version)): Path<(String, String)>,
) -> ApiResult<Response> {
    let bytes = state.catalog.fetch_bytes(&name, &version).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, WASM_CONTENT_TYPE)],
        bytes,
    )
        .into_response())
}

pub async fn delete_function(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.catalog.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deploy_function(
    State(state): State<Arc<AppState>>,
    Path((fid, nid)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<DeployResponse>> {
    state.projection.queue(nid, fid).await?;
    Ok(Json(DeployResponse {
        status: "queued".to_string(),
    }))
}

// ============================================================================
// Schemas
// ============================================================================

pub async fn register_schema(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterSchemaRequest>,
) -> ApiResult<(StatusCode, Json<SchemaMigrationInfo>)> {
    let migration = state
        .schemas
        .register(
            request.version,
            request.up_sql,
            request.down_sql,
            request.description,
        )
        .await?;

    Ok((StatusCode::CREATED, Json((&migration).into())))
}

pub async fn list_schemas(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<SchemaMigrationInfo>>> {
    let migrations = state.schemas.list().await?;
    Ok(Json(migrations.iter().map(SchemaMigrationInfo::from).collect()))
}
