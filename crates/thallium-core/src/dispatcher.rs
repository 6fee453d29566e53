// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Drains pending inbound messages and runs their handlers.
//!
//! Per message:
//!
//! ```text
//! Pending ──claim──▶ Claimed ──create job──▶ JobCreated ──handler──▶ Completed
//!    │                  │                        │                    Failed
//!    └─ lost race:      └─ bad row:              └─ job creation
//!       skipped            Protocol error           error
//! ```
//!
//! Claiming is a conditional update, so two dispatchers reading the same
//! pending set never both handle a message. Once claimed, a message is
//! deleted after the attempt whatever the outcome; there is no retry.

use std::sync::Arc;

use thallium_protocol::{CommandKind, is_valid_guid};
use tracing::{debug, error, info, instrument, warn};

use crate::collaborators::Collaborators;
use crate::error::{CoreError, Result};
use crate::handlers::{self, Command};
use crate::message_bus::MessageBus;
use crate::persistence::{MessageRecord, MessageScope};

/// Outcome of one dispatch cycle.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Messages whose handler completed.
    pub processed: usize,
    /// Messages that were claimed but failed.
    pub failed: Vec<FailedMessage>,
    /// Messages claimed by another dispatcher first.
    pub skipped: usize,
}

impl DispatchReport {
    /// Number of messages this cycle claimed.
    pub fn attempted(&self) -> usize {
        self.processed + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0 && self.skipped == 0
    }
}

/// A claimed message whose processing failed.
#[derive(Debug, Clone)]
pub struct FailedMessage {
    pub guid: String,
    pub command: String,
    pub error: CoreError,
}

/// Runs handlers for inbound messages.
pub struct Dispatcher {
    bus: Arc<MessageBus>,
    collaborators: Collaborators,
}

impl Dispatcher {
    pub fn new(bus: Arc<MessageBus>, collaborators: Collaborators) -> Self {
        Self { bus, collaborators }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Claim and handle every message that is pending when the cycle starts.
    ///
    /// Handler and protocol failures are recorded in the report. A store
    /// failure while claiming aborts the cycle: a message that cannot be
    /// marked as processing must not be handled.
    #[instrument(skip(self))]
    pub async fn perform_actions(&self) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();

        for message in self.bus.get_request_messages().await? {
            if !self.bus.claim_message(message.id).await? {
                warn!(message_guid = %message.guid, "Message claimed by another dispatcher");
                report.skipped += 1;
                continue;
            }

            let outcome = self.process_claimed(&message).await;

            // Left claimed on failure; the expiry sweep removes it.
            if let Err(e) = self.bus.delete_message(message.id).await {
                warn!(message_guid = %message.guid, error = %e, "Failed to delete handled message");
            }

            match outcome {
                Ok(()) => {
                    debug!(message_guid = %message.guid, command = %message.command, "Message handled");
                    report.processed += 1;
                }
                Err(e) => {
                    error!(
                        message_guid = %message.guid,
                        command = %message.command,
                        error = %e,
                        "Message handling failed"
                    );
                    report.failed.push(FailedMessage {
                        guid: message.guid.clone(),
                        command: message.command.clone(),
                        error: e,
                    });
                }
            }
        }

        if !report.is_empty() {
            info!(
                processed = report.processed,
                failed = report.failed.len(),
                skipped = report.skipped,
                "Dispatch cycle finished"
            );
        }
        Ok(report)
    }

    async fn process_claimed(&self, message: &MessageRecord) -> Result<()> {
        let command = parse_command(message)?;
        let tracker = self.bus.job_tracker();

        let job_guid = tracker
            .create_job(Some(&message.session_id), Some(&message.guid))
            .await
            .map_err(|e| CoreError::JobCreation {
                message_guid: message.guid.clone(),
                reason: e.to_string(),
            })?;
        if !is_valid_guid(&job_guid) {
            return Err(CoreError::JobCreation {
                message_guid: message.guid.clone(),
                reason: format!("store returned invalid job guid '{}'", job_guid),
            });
        }

        tracker.set_current_job(&job_guid);
        let result = async {
            tracker.set_job_in_processing(None).await?;
            handlers::handle(&command, &self.bus, &self.collaborators).await
        }
        .await;

        if let Err(e) = tracker.delete_job(&job_guid).await {
            warn!(job_guid = %job_guid, error = %e, "Failed to delete finished job");
        }
        tracker.clear_current_job();

        result
    }
}

/// Check a claimed row and turn it into a typed command.
fn parse_command(message: &MessageRecord) -> Result<Command> {
    let protocol_error = |reason: String| CoreError::Protocol {
        message_guid: message.guid.clone(),
        reason,
    };

    if message.message_scope() != Some(MessageScope::Inbound) {
        return Err(protocol_error(format!(
            "expected an inbound message, got scope '{}'",
            message.scope
        )));
    }
    if message.command.trim().is_empty() {
        return Err(protocol_error("message has no command".to_string()));
    }
    if message.session_id.trim().is_empty() {
        return Err(protocol_error("message has no session".to_string()));
    }
    if !is_valid_guid(&message.guid) {
        return Err(protocol_error("message guid is not a valid guid".to_string()));
    }

    let kind: CommandKind = message
        .command
        .parse()
        .map_err(|e: thallium_protocol::UnknownCommand| protocol_error(e.to_string()))?;
    let body = message
        .body_value()
        .map_err(|e| protocol_error(format!("unreadable body: {}", e)))?;

    Command::parse(kind, body).map_err(protocol_error)
}
