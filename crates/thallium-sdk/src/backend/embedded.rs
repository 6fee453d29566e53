// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded transport for in-process deployments.
//!
//! Calls the thallium-core RPC service directly, skipping HTTP. Each call
//! still opens its own request context, so behaviour matches the server.

use async_trait::async_trait;
use thallium_core::{CoreError, RpcAction, RpcService};
use tracing::instrument;

use super::Transport;
use crate::error::{Result, SdkError};

pub struct EmbeddedTransport {
    service: RpcService,
    session_id: String,
}

impl EmbeddedTransport {
    pub fn new(service: RpcService, session_id: impl Into<String>) -> Self {
        Self {
            service,
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl Transport for EmbeddedTransport {
    #[instrument(skip(self, envelope), fields(session_id = %self.session_id))]
    async fn submit(&self, envelope: &str) -> Result<()> {
        self.service
            .execute(
                Some(self.session_id.clone()),
                RpcAction::SubmitMessages(envelope.to_string()),
            )
            .await
            .map(|_| ())
            .map_err(server_error)
    }

    #[instrument(skip(self), fields(session_id = %self.session_id))]
    async fn retrieve(&self) -> Result<String> {
        self.service
            .execute(Some(self.session_id.clone()), RpcAction::RetrieveMessages)
            .await
            .map_err(server_error)
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }
}

fn server_error(err: CoreError) -> SdkError {
    SdkError::Server {
        code: err.error_code().to_string(),
        message: err.to_string(),
    }
}
