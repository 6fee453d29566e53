// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Self-verifying envelope around a JSON array of entries.
//!
//! The payload travels as a JSON *string* inside the envelope so that the
//! receiver hashes exactly the bytes the sender hashed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Errors that can occur while sealing or opening an envelope
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("size mismatch: envelope declares {declared} bytes, payload has {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("hash mismatch: envelope declares {declared}, payload hashes to {actual}")]
    HashMismatch { declared: String, actual: String },

    #[error("count mismatch: envelope declares {declared} entries, payload has {actual}")]
    CountMismatch { declared: usize, actual: usize },

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("entry {index} has no command")]
    MissingCommand { index: usize },
}

impl EnvelopeError {
    /// True for size/hash/count violations, i.e. the payload was corrupted
    /// in transit. These are never retried.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            EnvelopeError::SizeMismatch { .. }
                | EnvelopeError::HashMismatch { .. }
                | EnvelopeError::CountMismatch { .. }
        )
    }
}

/// Wire envelope: `{count, size, hash, json}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Number of entries in `json`.
    pub count: usize,
    /// Byte length of `json`.
    pub size: usize,
    /// Lowercase hex sha1 of `json`.
    pub hash: String,
    /// JSON-encoded array of entries.
    pub json: String,
}

impl Envelope {
    /// Serialize `entries` and seal them into a new envelope.
    pub fn seal<T: Serialize>(entries: &[T]) -> Result<Self, EnvelopeError> {
        let json = serde_json::to_string(entries)?;
        Ok(Self::from_payload(entries.len(), json))
    }

    /// Seal an already encoded JSON array.
    pub fn from_payload(count: usize, json: String) -> Self {
        Self {
            count,
            size: json.len(),
            hash: sha1_hex(&json),
            json,
        }
    }

    /// An envelope carrying no entries.
    pub fn empty() -> Self {
        Self::from_payload(0, "[]".to_string())
    }

    /// Parse the outer envelope object. Does not verify the payload.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Encode the outer envelope object for transmission.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check `size` and `hash` against the payload.
    pub fn verify(&self) -> Result<(), EnvelopeError> {
        if self.json.len() != self.size {
            return Err(EnvelopeError::SizeMismatch {
                declared: self.size,
                actual: self.json.len(),
            });
        }

        let actual = sha1_hex(&self.json);
        if !actual.eq_ignore_ascii_case(&self.hash) {
            return Err(EnvelopeError::HashMismatch {
                declared: self.hash.clone(),
                actual,
            });
        }

        Ok(())
    }

    /// Verify the envelope and decode the payload into raw JSON values.
    pub fn open_values(&self) -> Result<Vec<Value>, EnvelopeError> {
        self.verify()?;

        let values: Vec<Value> = serde_json::from_str(&self.json)?;
        if values.len() != self.count {
            return Err(EnvelopeError::CountMismatch {
                declared: self.count,
                actual: values.len(),
            });
        }

        Ok(values)
    }

    /// Verify the envelope and decode the payload into typed entries.
    pub fn open<T: DeserializeOwned>(&self) -> Result<Vec<T>, EnvelopeError> {
        self.open_values()?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(EnvelopeError::from))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Lowercase hex sha1 digest of a string's UTF-8 bytes.
pub fn sha1_hex(data: &str) -> String {
    hex::encode(Sha1::digest(data.as_bytes()))
}
