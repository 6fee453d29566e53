// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transports carrying envelopes to thallium-core.
//!
//! - `http`: form-encoded POST to the RPC endpoint (default)
//! - `embedded`: direct calls into an in-process `RpcService`

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "embedded")]
pub mod embedded;

use async_trait::async_trait;

use crate::error::Result;

/// The two RPC actions the client needs.
///
/// Implementations send the session id with every call and map failures
/// onto [`SdkError`](crate::SdkError): [`Transport`](crate::SdkError::Transport)
/// when no response arrived, [`Server`](crate::SdkError::Server) for an
/// error body.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post an encoded envelope with `submit-messages`.
    async fn submit(&self, envelope: &str) -> Result<()>;

    /// Fetch (and consume) the session's replies with `retrieve-messages`.
    async fn retrieve(&self) -> Result<String>;

    /// Session every call is made for.
    fn session_id(&self) -> &str;
}
