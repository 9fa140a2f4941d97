// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for dakiya-server.
//!
//! Provides a unified error type with stable error codes and an HTTP
//! response mapping for the API surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type using ServerError
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server errors that can occur during request processing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// A sale referenced by id does not exist.
    #[error("sale '{sale_id}' not found")]
    SaleNotFound {
        /// The sale id that was not found.
        sale_id: i64,
    },

    /// A sale line item references produce that is unknown or no longer
    /// offered. Replayed offline batches halt here rather than dropping
    /// the action.
    #[error("item '{name}' is unknown or no longer available")]
    ItemUnavailable {
        /// The offending produce name.
        name: String,
    },

    /// Input validation failed.
    #[error("validation error for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: &'static str,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON encoding/decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServerError {
    /// Stable error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SaleNotFound { .. } => "SALE_NOT_FOUND",
            Self::ItemUnavailable { .. } => "ITEM_UNAVAILABLE",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// HTTP status this error maps to on the API surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SaleNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ItemUnavailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ServerError::SaleNotFound { sale_id: 7 }.error_code(),
            "SALE_NOT_FOUND"
        );
        assert_eq!(
            ServerError::ItemUnavailable {
                name: "Okra".to_string()
            }
            .error_code(),
            "ITEM_UNAVAILABLE"
        );
        assert_eq!(
            ServerError::Validation {
                field: "ownerId",
                message: "must not be empty".to_string()
            }
            .error_code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServerError::SaleNotFound { sale_id: 1 }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::ItemUnavailable {
                name: "x".to_string()
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServerError::Validation {
                field: "lat",
                message: "out of range".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_display_names_the_subject() {
        let err = ServerError::SaleNotFound { sale_id: 42 };
        assert_eq!(err.to_string(), "sale '42' not found");

        let err = ServerError::ItemUnavailable {
            name: "Spinach".to_string(),
        };
        assert!(err.to_string().contains("Spinach"));
    }
}
