// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Artifact Catalog
//!
//! Registers immutable function artifacts, stores their bytes in the
//! object store and issues presigned download URLs. Content integrity is
//! anchored on the SHA-256 of the uploaded bytes: once a `(name, version)`
//! pair carries a non-empty hash, neither the hash nor the bytes it
//! references may change.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::bus::{EventBus, SUBJECT_FUNCTION_REGISTERED};
use crate::error::{Error, Result};
use crate::persistence::{DeploymentStore, FunctionRecord, FunctionStore};
use crate::storage::{BlobStore, WASM_CONTENT_TYPE};

/// Metadata for a new artifact row.
#[derive(Debug, Clone, Default)]
pub struct NewFunction {
    /// Artifact name.
    pub name: String,
    /// Artifact version string; defaults to `1.0.0`.
    pub version: Option<String>,
    /// Exported entrypoint symbol.
    pub entrypoint: Option<String>,
    /// Runtime tag.
    pub runtime: Option<String>,
    /// Linear memory limit in 64 KiB pages.
    pub memory_pages: Option<i32>,
    /// Execution deadline in milliseconds.
    pub max_execution_ms: Option<i32>,
}

/// Artifact catalog service.
pub struct ArtifactCatalog {
    functions: Arc<dyn FunctionStore>,
    deployments: Arc<dyn DeploymentStore>,
    blobs: Arc<dyn BlobStore>,
    bus: Arc<dyn EventBus>,
    url_ttl: Duration,
}

impl ArtifactCatalog {
    /// Create a new artifact catalog.
    pub fn new(
        functions: Arc<dyn FunctionStore>,
        deployments: Arc<dyn DeploymentStore>,
        blobs: Arc<dyn BlobStore>,
        bus: Arc<dyn EventBus>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            functions,
            deployments,
            blobs,
            bus,
            url_ttl,
        }
    }

    /// Create an artifact row without content. Bytes arrive via
    /// [`upload`](Self::upload).
    #[instrument(skip(self), fields(name = %new.name))]
    pub async fn create(&self, new: NewFunction) -> Result<FunctionRecord> {
        if new.name.is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        let version = match new.version {
            Some(v) if v.is_empty() => {
                return Err(Error::validation("version", "must not be empty"));
            }
            Some(v) => v,
            None => "1.0.0".to_string(),
        };

        let function = FunctionRecord {
            id: Uuid::new_v4(),
            name: new.name,
            version,
            hash: String::new(),
            size_bytes: 0,
            blob_path: String::new(),
            entrypoint: new.entrypoint,
            runtime: new.runtime,
            memory_pages: new.memory_pages,
            max_execution_ms: new.max_execution_ms,
            created_at: Utc::now(),
        };

        self.functions.insert(&function).await?;

        info!(
            function_id = %function.id,
            name = %function.name,
            version = %function.version,
            "Registered function"
        );

        self.bus
            .publish(
                SUBJECT_FUNCTION_REGISTERED,
                serde_json::json!({
                    "function_id": function.id,
                    "name": function.name,
                    "version": function.version,
                }),
            )
            .await;

        Ok(function)
    }

    /// Upload artifact bytes: hash, write the blob, then commit the
    /// metadata.
    ///
    /// The blob lands at the deterministic key
    /// `{name}/{version}/function.wasm` before the row is updated, so a
    /// retry after a failed metadata commit overwrites the blob with
    /// identical bytes and succeeds. A second upload after the hash is
    /// committed is rejected: artifacts are immutable.
    #[instrument(skip(self, bytes), fields(function_id = %id, size = bytes.len()))]
    pub async fn upload(&self, id: Uuid, bytes: Vec<u8>) -> Result<FunctionRecord> {
        if bytes.is_empty() {
            return Err(Error::validation("body", "artifact bytes must not be empty"));
        }

        let function = self
            .functions
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("function", id))?;

        if function.has_content() {
            return Err(Error::already_exists(
                "function content",
                format!("{}@{}", function.name, function.version),
            ));
        }

        let hash = hex::encode(Sha256::digest(&bytes));
        let size_bytes = bytes.len() as i64;
        let blob_path = blob_key(&function.name, &function.version);

        self.blobs
            .put(&blob_path, bytes, WASM_CONTENT_TYPE)
            .await?;

        self.functions
            .set_content(id, &hash, size_bytes, &blob_path)
            .await?;

        info!(
            function_id = %id,
            hash = %hash,
            size_bytes,
            blob_path = %blob_path,
            "Uploaded function artifact"
        );

        self.functions
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("function", id))
    }

    /// Register an artifact and its bytes in one call.
    pub async fn register(&self, new: NewFunction, bytes: Vec<u8>) -> Result<FunctionRecord> {
        let function = self.create(new).await?;
        self.upload(function.id, bytes).await
    }

    /// Fetch an artifact by id.
    pub async fn get(&self, id: Uuid) -> Result<FunctionRecord> {
        self.functions
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("function", id))
    }

    /// List all artifacts, newest first.
    pub async fn list(&self) -> Result<Vec<FunctionRecord>> {
        self.functions.list().await
    }

    /// Issue a presigned download URL for an artifact. `ttl` defaults to
    /// the configured signed-URL lifetime.
    pub async fn download_url(&self, id: Uuid, ttl: Option<Duration>) -> Result<String> {
        let function = self.get(id).await?;
        if !function.has_content() {
            return Err(Error::not_found("function content", id));
        }
        self.blobs
            .presigned_get_url(&function.blob_path, ttl.unwrap_or(self.url_ttl))
            .await
    }

    /// Read artifact bytes directly, for clients that cannot follow
    /// presigned URLs.
    pub async fn fetch_bytes(&self, name: &str, version: &str) -> Result<Vec<u8>> {
        let function = self
            .functions
            .get_by_name_version(name, version)
            .await?
            .ok_or_else(|| Error::not_found("function", format!("{}@{}", name, version)))?;
        if !function.has_content() {
            return Err(Error::not_found(
                "function content",
                format!("{}@{}", name, version),
            ));
        }
        self.blobs.fetch(&function.blob_path).await
    }

    /// Delete an artifact. Refused while any deployment row references it.
    #[instrument(skip(self), fields(function_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let function = self.get(id).await?;

        let references = self.deployments.count_for_function(id).await?;
        if references > 0 {
            return Err(Error::InUse {
                entity: "function",
                id: id.to_string(),
            });
        }

        if !self.functions.delete(id).await? {
            return Err(Error::not_found("function", id));
        }

        // Best-effort: an orphaned blob is garbage-collectable.
        if function.has_content() {
            if let Err(e) = self.blobs.delete(&function.blob_path).await {
                warn!(function_id = %id, error = %e, "Failed to delete artifact blob");
            }
        }

        info!(function_id = %id, name = %function.name, "Deleted function");

        Ok(())
    }

    /// The latest uploaded artifact per name.
    ///
    /// "Latest" is decided by creation time, most recent wins; the version
    /// string only breaks exact timestamp ties. Artifacts without uploaded
    /// bytes are excluded since there is nothing to distribute.
    pub async fn latest_per_name(&self) -> Result<HashMap<String, FunctionRecord>> {
        let mut latest: HashMap<String, FunctionRecord> = HashMap::new();

        for function in self.functions.list().await? {
            if !function.has_content() {
                continue;
            }
            match latest.get(&function.name) {
                Some(existing) if !is_newer(&function, existing) => {}
                _ => {
                    latest.insert(function.name.clone(), function);
                }
            }
        }

        Ok(latest)
    }
}

/// Deterministic object store key for an artifact.
pub fn blob_key(name: &str, version: &str) -> String {
    format!("{}/{}/function.wasm", name, version)
}

fn is_newer(candidate: &FunctionRecord, existing: &FunctionRecord) -> bool {
    match candidate.created_at.cmp(&existing.created_at) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate.version > existing.version,
    }
}
