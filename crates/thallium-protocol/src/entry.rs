// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Entry shapes carried inside envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::EnvelopeError;

/// Client -> server command entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEntry {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
}

impl InboundEntry {
    pub fn new(command: impl Into<String>, message: Option<Value>) -> Self {
        Self {
            command: command.into(),
            message,
        }
    }
}

/// Server -> client reply/progress entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEntry {
    pub id: i64,
    pub guid: String,
    pub command: String,
    pub body: Value,
    pub value: Option<String>,
}

/// Decode raw envelope values into inbound entries.
///
/// Every entry must carry a non-empty string `command`; otherwise the whole
/// batch is rejected with [`EnvelopeError::MissingCommand`].
pub fn decode_inbound(values: Vec<Value>) -> Result<Vec<InboundEntry>, EnvelopeError> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let Value::Object(mut object) = value else {
                return Err(EnvelopeError::MissingCommand { index });
            };

            let command = match object.remove("command") {
                Some(Value::String(command)) if !command.trim().is_empty() => command,
                _ => return Err(EnvelopeError::MissingCommand { index }),
            };

            Ok(InboundEntry {
                command,
                message: object.remove("message"),
            })
        })
        .collect()
}

/// Strip nested structures from a message body.
///
/// Object and array bodies keep only their scalar members (strings, numbers,
/// booleans, null). Scalar bodies are returned unchanged.
pub fn filter_body(body: Value) -> Value {
    match body {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| is_scalar(v))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().filter(is_scalar).collect()),
        other => other,
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}
