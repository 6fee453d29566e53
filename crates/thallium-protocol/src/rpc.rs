// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! RPC surface constants and the error body shared by server and client.

use serde::{Deserialize, Serialize};

/// RPC `type` field value for every messaging request.
pub const RPC_TYPE: &str = "rpc";

/// RPC action that submits a client envelope.
pub const ACTION_SUBMIT_MESSAGES: &str = "submit-messages";

/// RPC action that retrieves (and consumes) the session's replies.
pub const ACTION_RETRIEVE_MESSAGES: &str = "retrieve-messages";

/// Header carrying the session identifier on RPC requests.
pub const SESSION_HEADER: &str = "x-session-id";

/// Plain-text body returned by a successful `submit-messages` call.
pub const SUBMIT_OK: &str = "ok";

/// Error body returned by the RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Machine-readable error code, e.g. `INTEGRITY_ERROR`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}
