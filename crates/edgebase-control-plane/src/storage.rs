// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object storage for function artifacts.
//!
//! Artifacts live in an S3-compatible bucket (MinIO in development) at
//! `{name}/{version}/function.wasm`. The control plane never serves the
//! bytes on the hot path; agents download via presigned GET URLs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};

/// Content type of every stored artifact.
pub const WASM_CONTENT_TYPE: &str = "application/wasm";

/// Blob repository interface: write, signed GET, read, delete.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write an object. Overwriting the same key with identical bytes is
    /// legal and idempotent.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Read an object's bytes.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;

    /// Issue a time-limited presigned GET URL. Never exposes credentials.
    async fn presigned_get_url(&self, key: &str, ttl: Duration) -> Result<String>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// S3-compatible blob store.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Connect to the configured endpoint and ensure the bucket exists.
    pub async fn connect(config: &Config) -> Result<Self> {
        let credentials = Credentials::new(
            config.s3_access_key.clone(),
            config.s3_secret_key.clone(),
            None,
            None,
            "edgebase-static",
        );

        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.s3_region.clone()))
            .load()
            .await;

        // MinIO needs path-style addressing and an explicit endpoint.
        let s3_config = aws_sdk_s3::config::Builder::from(&base)
            .endpoint_url(&config.s3_endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(s3_config);
        let store = Self {
            client,
            bucket: config.s3_bucket.clone(),
        };

        store.ensure_bucket().await?;

        info!(
            endpoint = %config.s3_endpoint,
            bucket = %config.s3_bucket,
            "Connected to object store"
        );

        Ok(store)
    }

    async fn ensure_bucket(&self) -> Result<()> {
        let exists = self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok();

        if !exists {
            self.client
                .create_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .map_err(|e| Error::Storage(format!("Failed to create bucket: {}", e)))?;
            info!(bucket = %self.bucket, "Created artifact bucket");
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        debug!(bucket = %self.bucket, key = %key, size = bytes.len(), "Writing artifact blob");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(bytes.into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Failed to write '{}': {}", key, e)))?;

        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Failed to read '{}': {}", key, e)))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| Error::Storage(format!("Failed to collect '{}': {}", key, e)))?;

        Ok(body.to_vec())
    }

    async fn presigned_get_url(&self, key: &str, ttl: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| Error::Storage(format!("Invalid presign TTL: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| Error::Storage(format!("Failed to presign '{}': {}", key, e)))?;

        Ok(request.uri().to_string())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete '{}': {}", key, e)))?;
        Ok(())
    }
}

/// In-memory blob store for tests. Presigned URLs are synthetic but carry
/// the key and TTL so tests can assert on them.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create an empty in-memory blob store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("No such object: {}", key)))
    }

    async fn presigned_get_url(&self, key: &str, ttl: Duration) -> Result<String> {
        if !self.objects.lock().unwrap().contains_key(key) {
            return Err(Error::Storage(format!("No such object: {}", key)));
        }
        Ok(format!(
            "http://blobs.test/{}?expires={}",
            key,
            ttl.as_secs()
        ))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
