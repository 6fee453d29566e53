// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK-specific error types.

use thallium_protocol::EnvelopeError;
use thiserror::Error;

/// Errors that can occur in the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (missing or invalid environment variable)
    #[error("configuration error: {0}")]
    Config(String),

    /// The request never produced a server response
    #[error("transport error: {0}")]
    Transport(String),

    /// Server returned an error response
    #[error("server error: {code} - {message}")]
    Server {
        /// Error code from the server
        code: String,
        /// Error message from the server
        message: String,
    },

    /// Envelope size, hash or count did not match its payload
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected response from server
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl SdkError {
    /// Whether repeating the same request may succeed.
    ///
    /// Only transport failures qualify. A corrupted or rejected payload
    /// fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SdkError::Transport(_))
    }
}

impl From<EnvelopeError> for SdkError {
    fn from(err: EnvelopeError) -> Self {
        if err.is_integrity_failure() {
            SdkError::Integrity(err.to_string())
        } else {
            SdkError::Serialization(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

/// Type alias for SDK results.
pub type Result<T> = std::result::Result<T, SdkError>;
