// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the control plane.
//!
//! The core surfaces error kinds; the transport adapter maps them to HTTP
//! status codes in exactly one place (see `http`).

use thiserror::Error;

/// Result type using the control plane [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Control plane errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Entity lookup failed.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Entity kind, e.g. `node` or `function`.
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// Uniqueness violation.
    #[error("{entity} '{key}' already exists")]
    AlreadyExists {
        /// Entity kind.
        entity: &'static str,
        /// The natural key that collided.
        key: String,
    },

    /// Referential-integrity refusal.
    #[error("{entity} '{id}' is still referenced and cannot be deleted")]
    InUse {
        /// Entity kind.
        entity: &'static str,
        /// The identifier still referenced.
        id: String,
    },

    /// Ack for an unknown, terminal or mismatched sync round.
    #[error("Sync protocol violation: {0}")]
    Protocol(String),

    /// Malformed input.
    #[error("Validation error for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// Backing store failure likely to succeed on retry.
    #[error("Object storage error: {0}")]
    Storage(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invariant breach detected at runtime.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for this error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::InUse { .. } => "IN_USE",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Shorthand for a [`Error::NotFound`].
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`Error::AlreadyExists`].
    pub fn already_exists(entity: &'static str, key: impl std::fmt::Display) -> Self {
        Self::AlreadyExists {
            entity,
            key: key.to_string(),
        }
    }

    /// Shorthand for a [`Error::Validation`].
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}
