// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The messaging RPC actions, independent of the HTTP transport.
//!
//! Every call opens a fresh [`RequestContext`], drains pending inbound
//! messages, runs the action and then drains once more so that messages
//! submitted by the action are handled before the response goes out.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::collaborators::Collaborators;
use crate::config::ExpiryTimeouts;
use crate::context::RequestContext;
use crate::error::{CoreError, Result};
use crate::persistence::Persistence;

/// A messaging action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcAction {
    /// Persist a client envelope.
    SubmitMessages(String),
    /// Drain the session's outbound messages.
    RetrieveMessages,
}

impl RpcAction {
    pub fn name(&self) -> &'static str {
        match self {
            RpcAction::SubmitMessages(_) => thallium_protocol::rpc::ACTION_SUBMIT_MESSAGES,
            RpcAction::RetrieveMessages => thallium_protocol::rpc::ACTION_RETRIEVE_MESSAGES,
        }
    }
}

/// Executes RPC actions against a persistence backend.
#[derive(Clone)]
pub struct RpcService {
    persistence: Arc<dyn Persistence>,
    collaborators: Collaborators,
    timeouts: ExpiryTimeouts,
}

impl RpcService {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        collaborators: Collaborators,
        timeouts: ExpiryTimeouts,
    ) -> Self {
        Self {
            persistence,
            collaborators,
            timeouts,
        }
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Run `action` for a session and return the response body.
    ///
    /// `submit-messages` answers [`SUBMIT_OK`](thallium_protocol::rpc::SUBMIT_OK),
    /// `retrieve-messages` the encoded poll envelope.
    #[instrument(skip(self, action), fields(action = action.name()))]
    pub async fn execute(&self, session_id: Option<String>, action: RpcAction) -> Result<String> {
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .ok_or(CoreError::NoSession)?;

        let context = RequestContext::open(
            self.persistence.clone(),
            Some(session_id),
            self.collaborators.clone(),
            self.timeouts,
        )
        .await?;

        // Dispatch failures belong to other sessions' messages as much as to
        // this one; the caller's action still runs.
        if let Err(e) = context.perform_actions().await {
            warn!(error = %e, "Dispatch cycle failed");
        }

        let response = match action {
            RpcAction::SubmitMessages(raw) => {
                context.bus().submit(&raw).await?;
                thallium_protocol::rpc::SUBMIT_OK.to_string()
            }
            RpcAction::RetrieveMessages => context.bus().poll().await?,
        };

        if let Err(e) = context.perform_actions().await {
            warn!(error = %e, "Follow-up dispatch cycle failed");
        }

        Ok(response)
    }
}
