// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Optional out-of-band event notifications.
//!
//! The bus is a capability: when `NATS_URL` is unset the no-op
//! implementation is wired in and the sync path behaves identically.
//! Publishing never fails the caller; delivery is best-effort.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Subject for completed sync rounds.
pub const SUBJECT_SYNC_COMPLETED: &str = "edgebase.sync.completed";
/// Subject for newly registered function artifacts.
pub const SUBJECT_FUNCTION_REGISTERED: &str = "edgebase.function.registered";
/// Subject for newly registered nodes.
pub const SUBJECT_NODE_REGISTERED: &str = "edgebase.node.registered";

/// Out-of-band notifier. Implementations must be safe to call from any
/// request handler and must never block correctness of the sync path.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event. Failures are logged by the implementation and
    /// swallowed.
    async fn publish(&self, subject: &str, payload: serde_json::Value);
}

/// Bus used when no broker is configured.
#[derive(Default)]
pub struct NoopEventBus;

#[async_trait]
impl EventBus for NoopEventBus {
    async fn publish(&self, subject: &str, _payload: serde_json::Value) {
        debug!(subject = %subject, "Event bus disabled, dropping event");
    }
}

/// NATS-backed event bus.
pub struct NatsEventBus {
    client: async_nats::Client,
}

impl NatsEventBus {
    /// Connect to the NATS server at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| Error::Internal(format!("Failed to connect to NATS: {}", e)))?;

        info!(url = %url, "Connected to NATS");

        Ok(Self { client })
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn publish(&self, subject: &str, payload: serde_json::Value) {
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(subject = %subject, error = %e, "Failed to serialize event");
                return;
            }
        };

        if let Err(e) = self.client.publish(subject.to_string(), bytes.into()).await {
            warn!(subject = %subject, error = %e, "Failed to publish event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_bus_swallows_events() {
        let bus = NoopEventBus;
        // Must not panic or block.
        bus.publish(SUBJECT_SYNC_COMPLETED, serde_json::json!({"ok": true}))
            .await;
    }
}
