// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP transport adapter.
//!
//! Thin by design: decodes requests, calls core operations, encodes
//! responses. Every route maps 1:1 to a core operation and the error-kind
//! to status-code mapping lives in exactly one place ([`ApiError`]).

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post, put};
use tower::{BoxError, ServiceBuilder};
use tracing::error;

use crate::catalog::ArtifactCatalog;
use crate::deployments::DeploymentProjection;
use crate::error::Error;
use crate::node_registry::NodeRegistry;
use crate::planner::SyncPlanner;
use crate::schema_registry::SchemaRegistry;
use crate::sync_manager::SyncTransactionManager;

/// Maximum artifact upload size in bytes (64 MiB).
const MAX_ARTIFACT_SIZE: usize = 64 * 1024 * 1024;

/// Per-request deadline. Outstanding I/O is dropped at the next
/// suspension point when it trips.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for all HTTP handlers.
pub struct AppState {
    /// Node registry service.
    pub nodes: NodeRegistry,
    /// Artifact catalog service.
    pub catalog: Arc<ArtifactCatalog>,
    /// Schema registry service.
    pub schemas: Arc<SchemaRegistry>,
    /// Deployment projection service.
    pub projection: DeploymentProjection,
    /// Sync planner service.
    pub planner: SyncPlanner,
    /// Sync transaction manager service.
    pub transactions: Arc<SyncTransactionManager>,
}

impl AppState {
    /// Wire the full service stack over one persistence backend.
    pub fn from_backend<P>(
        backend: Arc<P>,
        blobs: Arc<dyn crate::storage::BlobStore>,
        bus: Arc<dyn crate::bus::EventBus>,
        signed_url_ttl: std::time::Duration,
        sync_stale_after: std::time::Duration,
    ) -> Arc<Self>
    where
        P: crate::persistence::NodeStore
            + crate::persistence::FunctionStore
            + crate::persistence::SchemaStore
            + crate::persistence::DeploymentStore
            + crate::persistence::SyncStore
            + 'static,
    {
        let catalog = Arc::new(ArtifactCatalog::new(
            backend.clone(),
            backend.clone(),
            blobs,
            bus.clone(),
            signed_url_ttl,
        ));
        let schemas = Arc::new(SchemaRegistry::new(backend.clone()));
        let transactions = Arc::new(SyncTransactionManager::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend.clone(),
            bus.clone(),
            sync_stale_after,
        ));
        let planner = SyncPlanner::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            schemas.clone(),
            catalog.clone(),
            transactions.clone(),
        );

        Arc::new(AppState {
            nodes: NodeRegistry::new(backend.clone(), bus),
            catalog,
            schemas,
            projection: DeploymentProjection::new(
                backend.clone(),
                backend.clone(),
                backend.clone(),
            ),
            planner,
            transactions,
        })
    }
}

/// Build the `/api/v1` router.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/nodes/register", post(handlers::register_node))
        .route("/nodes", get(handlers::list_nodes))
        .route("/nodes/{id}", get(handlers::get_node))
        .route("/nodes/{id}/heartbeat", post(handlers::heartbeat))
        .route("/nodes/{id}/sync", get(handlers::get_sync_plan))
        .route("/nodes/{id}/sync/ack", post(handlers::ack_sync))
        .route("/nodes/{id}/deployments", put(handlers::set_deployments))
        .route("/functions", post(handlers::create_function))
        .route("/functions", get(handlers::list_functions))
        .route("/functions/{id}", get(handlers::get_function))
        .route("/functions/{id}", delete(handlers::delete_function))
        .route(
            "/functions/{id}/upload",
            post(handlers::upload_function).layer(DefaultBodyLimit::max(MAX_ARTIFACT_SIZE)),
        )
        .route("/functions/{id}/download", get(handlers::download_function))
        .route(
            "/functions/{fid}/deploy/{nid}",
            post(handlers::deploy_function),
        )
        .route(
            "/artifacts/{name}/{version}",
            get(handlers::download_artifact),
        )
        .route("/schemas", post(handlers::register_schema))
        .route("/schemas", get(handlers::list_schemas));

    Router::new()
        .route("/healthz", get(handlers::health))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(REQUEST_TIMEOUT),
        )
        .with_state(state)
}

async fn handle_middleware_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(serde_json::json!({"error": "request deadline exceeded"})),
        )
            .into_response()
    } else {
        error!(error = %err, "Middleware failure");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "internal error"})),
        )
            .into_response()
    }
}

/// Wrapper mapping core errors onto HTTP responses.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation { .. } | Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::AlreadyExists { .. } | Error::InUse { .. } | Error::Protocol(_) => {
                StatusCode::CONFLICT
            }
            Error::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Database(_) | Error::Json(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Server-side faults are logged with full context but never
        // leaked to the client.
        let message = if status.is_server_error() {
            error!(code = self.0.error_code(), error = %self.0, "Request failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "temporarily unavailable".to_string(),
                _ => "internal error".to_string(),
            }
        } else {
            self.0.to_string()
        };

        (
            status,
            Json(serde_json::json!({
                "error": message,
                "code": self.0.error_code(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                Error::validation("name", "must not be empty"),
                StatusCode::BAD_REQUEST,
            ),
            (Error::not_found("node", "x"), StatusCode::NOT_FOUND),
            (
                Error::already_exists("function", "hello@1.0.0"),
                StatusCode::CONFLICT,
            ),
            (
                Error::InUse {
                    entity: "function",
                    id: "x".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                Error::Protocol("bad ack".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                Error::Storage("s3 down".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::Internal("invariant".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_server_errors_do_not_leak_details() {
        let response = ApiError(Error::Internal("secret database detail".to_string()));
        let response = response.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // Body is generic; detail only reaches the log.
    }
}
