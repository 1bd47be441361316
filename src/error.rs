//! Unified error handling for the access-control core.
//!
//! [`AccessError`] is the taxonomy every public operation reports through.
//! Each variant maps to a metric label and an HTTP status at the transport
//! boundary. Snapshot persistence failures use [`CatalogError`] and are never
//! surfaced to callers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::roles::{RoleId, RoleStoreError};

// ============================================================================
// Access Errors (authorization pipeline)
// ============================================================================

/// Errors produced while building abilities, evaluating requirements or
/// declaring route bindings.
#[derive(Debug, Error)]
pub enum AccessError {
    /// No principal on the request, or its role does not resolve.
    #[error("authentication required")]
    Unauthenticated,

    /// The ability was evaluated and the requirement was not met.
    #[error("access to {resource} is forbidden")]
    Forbidden { resource: String },

    /// A role's access list is present but cannot be parsed.
    #[error("role {role_id} has a corrupt access list: {reason}")]
    DataIntegrity { role_id: RoleId, reason: String },

    /// The role store lookup itself failed.
    #[error("role store unavailable: {0}")]
    RoleStore(#[from] RoleStoreError),

    /// A route binding is misconfigured (unknown action kind, empty requirement).
    #[error("invalid route binding for {subject}: {reason}")]
    InvalidBinding { subject: String, reason: String },

    /// A permission was registered after the catalog was sealed.
    #[error("catalog is sealed; cannot register {action} on {subject}")]
    CatalogSealed { subject: String, action: String },
}

impl AccessError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden { .. } => "forbidden",
            Self::DataIntegrity { .. } => "data_integrity",
            Self::RoleStore(_) => "role_store",
            Self::InvalidBinding { .. } => "invalid_binding",
            Self::CatalogSealed { .. } => "catalog_sealed",
        }
    }

    /// HTTP status used when the error reaches the transport boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::RoleStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DataIntegrity { .. } | Self::InvalidBinding { .. } | Self::CatalogSealed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the client.
    ///
    /// Integrity and store failures are reported generically; their details
    /// stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::DataIntegrity { .. } => "role access list is unreadable".to_string(),
            Self::RoleStore(_) => "role lookup failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.error_code(),
            "message": self.public_message(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Result type for authorization operations.
pub type AccessResult<T> = Result<T, AccessError>;

// ============================================================================
// Catalog Errors (snapshot persistence)
// ============================================================================

/// Catalog snapshot persistence errors.
///
/// Only ever logged; the in-memory catalog stays authoritative.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}
