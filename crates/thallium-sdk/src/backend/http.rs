// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP transport using reqwest.

use std::time::Duration;

use async_trait::async_trait;
use thallium_protocol::RpcError;
use thallium_protocol::rpc::{
    ACTION_RETRIEVE_MESSAGES, ACTION_SUBMIT_MESSAGES, RPC_TYPE, SESSION_HEADER, SUBMIT_OK,
};
use tracing::{debug, instrument};

use super::Transport;
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};

/// Talks to the `/rpc` endpoint of a thallium-core server.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    session_id: String,
}

impl HttpTransport {
    pub fn new(
        url: impl Into<String>,
        session_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            session_id: session_id.into(),
        })
    }

    pub fn from_config(config: &SdkConfig) -> Result<Self> {
        Self::new(
            config.server_url.clone(),
            config.session_id.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    async fn call(&self, form: &[(&str, &str)]) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .header(SESSION_HEADER, &self.session_id)
            .form(form)
            .send()
            .await
            .map_err(|e| SdkError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SdkError::Transport(e.to_string()))?;

        if status.is_success() {
            return Ok(body);
        }

        debug!(status = status.as_u16(), "RPC call rejected");
        Err(match serde_json::from_str::<RpcError>(&body) {
            Ok(error) => SdkError::Server {
                code: error.code,
                message: error.message,
            },
            Err(_) => SdkError::Server {
                code: format!("HTTP_{}", status.as_u16()),
                message: body,
            },
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, envelope), fields(session_id = %self.session_id))]
    async fn submit(&self, envelope: &str) -> Result<()> {
        let body = self
            .call(&[
                ("type", RPC_TYPE),
                ("action", ACTION_SUBMIT_MESSAGES),
                ("messages", envelope),
            ])
            .await?;

        if body.trim() != SUBMIT_OK {
            return Err(SdkError::UnexpectedResponse(format!(
                "expected '{}' from submit, got '{}'",
                SUBMIT_OK, body
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %self.session_id))]
    async fn retrieve(&self) -> Result<String> {
        self.call(&[("type", RPC_TYPE), ("action", ACTION_RETRIEVE_MESSAGES)])
            .await
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }
}
