// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK-specific error types.

use thiserror::Error;

/// Errors that can occur in the SDK.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Durable queue storage failed
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport failed (connectivity, timeout)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server rejected the operation
    #[error("server error: {code} - {message}")]
    Server {
        /// Error code from the server
        code: String,
        /// Error message from the server
        message: String,
    },

    /// Realtime channel failed
    #[error("realtime error: {0}")]
    Realtime(String),

    /// Configuration error (bad URL, invalid option)
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Realtime(err.to_string())
    }
}

/// Type alias for SDK results.
pub type Result<T> = std::result::Result<T, ClientError>;
