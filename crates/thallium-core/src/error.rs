// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for thallium-core.
//!
//! Provides a unified error type that maps to RPC error responses.

use std::fmt;

use thallium_protocol::{EnvelopeError, RpcError};

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while submitting, polling or dispatching messages.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Envelope size, hash or count did not match its payload.
    Integrity {
        /// What did not match.
        reason: String,
    },

    /// A submitted entry is missing a required field or carries an
    /// unsupported value.
    MalformedMessage {
        /// The offending field.
        field: String,
        /// Error details.
        reason: String,
    },

    /// A claimed message is not a well-formed inbound command.
    Protocol {
        /// GUID of the offending message, as stored.
        message_guid: String,
        /// Error details.
        reason: String,
    },

    /// Creating the correlating job failed or returned an unusable guid.
    JobCreation {
        /// GUID of the message the job was for.
        message_guid: String,
        /// Error details.
        reason: String,
    },

    /// No session was supplied and no job is current to resolve one from.
    NoSession,

    /// Input validation failed.
    Validation {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// A command handler or one of its collaborators failed.
    Handler {
        /// The command being handled.
        command: String,
        /// Error details.
        reason: String,
    },

    /// Store read or write failed.
    Persistence {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Convert this error to an RpcError for protocol responses.
    pub fn to_rpc_error(&self) -> RpcError {
        RpcError {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Integrity { .. } => "INTEGRITY_ERROR",
            Self::MalformedMessage { .. } => "MALFORMED_MESSAGE",
            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::JobCreation { .. } => "JOB_CREATION_ERROR",
            Self::NoSession => "NO_SESSION",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Handler { .. } => "HANDLER_ERROR",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
        }
    }

    /// True when the caller sent something wrong, as opposed to a failure
    /// on the server side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Integrity { .. }
                | Self::MalformedMessage { .. }
                | Self::NoSession
                | Self::Validation { .. }
        )
    }

    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn handler(command: &str, reason: impl fmt::Display) -> Self {
        Self::Handler {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integrity { reason } => {
                write!(f, "Envelope integrity check failed: {}", reason)
            }
            Self::MalformedMessage { field, reason } => {
                write!(f, "Malformed message, field '{}': {}", field, reason)
            }
            Self::Protocol {
                message_guid,
                reason,
            } => {
                write!(f, "Protocol error on message '{}': {}", message_guid, reason)
            }
            Self::JobCreation {
                message_guid,
                reason,
            } => {
                write!(
                    f,
                    "Failed to create job for message '{}': {}",
                    message_guid, reason
                )
            }
            Self::NoSession => {
                write!(f, "No session given and no current job to resolve one")
            }
            Self::Validation { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::Handler { command, reason } => {
                write!(f, "Handler for '{}' failed: {}", command, reason)
            }
            Self::Persistence { operation, details } => {
                write!(f, "Persistence error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Persistence {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Persistence {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<EnvelopeError> for CoreError {
    fn from(err: EnvelopeError) -> Self {
        if err.is_integrity_failure() {
            return CoreError::Integrity {
                reason: err.to_string(),
            };
        }

        let field = match err {
            EnvelopeError::MissingCommand { .. } => "command",
            _ => "envelope",
        };
        CoreError::MalformedMessage {
            field: field.to_string(),
            reason: err.to_string(),
        }
    }
}
