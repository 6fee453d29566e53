// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integrity-checked ingress and egress of session-scoped messages.
//!
//! `submit` turns a client envelope into inbound rows, `poll` drains the
//! session's outbound rows into a reply envelope, and handlers push replies
//! with `send_message_to_client`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thallium_protocol::{
    CommandKind, Envelope, OutboundEntry, decode_inbound, filter_body, generate_guid,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{CoreError, Result};
use crate::job_tracker::JobTracker;
use crate::persistence::{MessageRecord, MessageScope, MessageStore, NewMessage, expiry_cutoff};

/// Server half of the messaging protocol for one request context.
pub struct MessageBus {
    store: Arc<dyn MessageStore>,
    jobs: Arc<JobTracker>,
    session_id: Option<String>,
    suppress_outbound: AtomicBool,
}

impl MessageBus {
    /// Create a bus without running the expiry sweep.
    ///
    /// `session_id` is the session of the current request, if there is one.
    pub fn new(
        store: Arc<dyn MessageStore>,
        jobs: Arc<JobTracker>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            store,
            jobs,
            session_id,
            suppress_outbound: AtomicBool::new(false),
        }
    }

    /// Create a bus and remove messages older than `timeout`.
    ///
    /// Fails if the sweep fails.
    pub async fn open(
        store: Arc<dyn MessageStore>,
        jobs: Arc<JobTracker>,
        session_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let bus = Self::new(store, jobs, session_id);
        bus.remove_expired_messages(timeout).await?;
        Ok(bus)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn job_tracker(&self) -> &Arc<JobTracker> {
        &self.jobs
    }

    /// Verify a client envelope and persist its entries as inbound messages.
    ///
    /// The whole envelope is rejected if any entry is malformed; nothing is
    /// stored in that case. The entries are stored in one transaction, so a
    /// store failure leaves nothing behind either. An empty envelope is a
    /// successful no-op.
    /// Returns the number of messages stored.
    #[instrument(skip(self, raw), fields(session_id = ?self.session_id))]
    pub async fn submit(&self, raw: &str) -> Result<usize> {
        let session_id = self.request_session()?;

        let envelope = Envelope::parse(raw)?;
        let entries = decode_inbound(envelope.open_values()?)?;

        for entry in &entries {
            entry
                .command
                .parse::<CommandKind>()
                .map_err(|e| CoreError::MalformedMessage {
                    field: "command".to_string(),
                    reason: e.to_string(),
                })?;
        }

        let now = Utc::now();
        let messages = entries
            .iter()
            .map(|entry| -> Result<NewMessage> {
                let body = filter_body(entry.message.clone().unwrap_or(Value::Null));
                Ok(NewMessage {
                    guid: generate_guid(),
                    session_id: session_id.to_string(),
                    scope: MessageScope::Inbound,
                    command: entry.command.clone(),
                    body: serde_json::to_string(&body)?,
                    value: None,
                    submit_time: now,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if messages.is_empty() {
            return Ok(0);
        }

        let records = self.store.insert_messages(&messages).await?;
        for record in &records {
            debug!(message_guid = %record.guid, command = %record.command, "Inbound message stored");
        }

        Ok(records.len())
    }

    /// Drain the session's outbound messages into an encoded reply envelope.
    ///
    /// Delivery is destructive: a message is only returned if this call was
    /// the one that deleted it.
    #[instrument(skip(self), fields(session_id = ?self.session_id))]
    pub async fn poll(&self) -> Result<String> {
        let session_id = self.request_session()?;

        let records = self
            .store
            .list_session_messages(MessageScope::Outbound, session_id)
            .await?;

        let mut decoded = Vec::with_capacity(records.len());
        for record in records {
            match record.body_value() {
                Ok(body) => decoded.push((record, body)),
                Err(e) => {
                    // Undeliverable; drop it so it cannot block later polls.
                    warn!(message_guid = %record.guid, error = %e, "Discarding undecodable outbound message");
                    self.store.delete_message(record.id).await?;
                }
            }
        }

        let mut entries = Vec::with_capacity(decoded.len());
        for (record, body) in decoded {
            match self.store.delete_message(record.id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(message_guid = %record.guid, "Outbound message already delivered");
                    continue;
                }
                // Rows deleted so far must still reach the client.
                Err(e) if !entries.is_empty() => {
                    warn!(error = %e, "Delete failed, remaining messages left for the next poll");
                    break;
                }
                Err(e) => return Err(e),
            }

            entries.push(OutboundEntry {
                id: record.id,
                guid: record.guid,
                command: record.command,
                body,
                value: record.value,
            });
        }

        debug!(count = entries.len(), "Outbound messages delivered");
        Ok(Envelope::seal(&entries)?.encode()?)
    }

    /// Inbound messages not yet claimed by a dispatcher, oldest first.
    pub async fn get_request_messages(&self) -> Result<Vec<MessageRecord>> {
        self.store
            .list_unclaimed_messages(MessageScope::Inbound)
            .await
    }

    /// Atomically claim an inbound message. `false` if another dispatcher won.
    pub async fn claim_message(&self, id: i64) -> Result<bool> {
        self.store.claim_message(id).await
    }

    pub async fn delete_message(&self, id: i64) -> Result<bool> {
        self.store.delete_message(id).await
    }

    /// Queue an outbound message for a client session.
    ///
    /// Without an explicit `session_id` the message goes to the session of
    /// the current job. Returns `false` if outbound messaging is suppressed.
    #[instrument(skip(self, body))]
    pub async fn send_message_to_client(
        &self,
        command: &str,
        body: Value,
        value: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<bool> {
        if command.trim().is_empty() {
            return Err(CoreError::validation("command", "must not be empty"));
        }
        if body.is_null() || body.as_str().is_some_and(str::is_empty) {
            return Err(CoreError::validation("body", "must not be empty"));
        }

        if self.is_outbound_suppressed() {
            debug!("Outbound messaging suppressed, dropping message");
            return Ok(false);
        }

        let session_id = match session_id {
            Some(session_id) if !session_id.trim().is_empty() => session_id.to_string(),
            Some(_) => return Err(CoreError::validation("session_id", "must not be empty")),
            None => self
                .jobs
                .current_session()
                .await?
                .ok_or(CoreError::NoSession)?,
        };

        let record = self
            .store
            .insert_message(&NewMessage {
                guid: generate_guid(),
                session_id,
                scope: MessageScope::Outbound,
                command: command.to_string(),
                body: serde_json::to_string(&filter_body(body))?,
                value: value.map(str::to_string),
                submit_time: Utc::now(),
            })
            .await?;

        debug!(message_guid = %record.guid, session_id = %record.session_id, "Outbound message stored");
        Ok(true)
    }

    /// Turn `send_message_to_client` into a no-op, or back.
    ///
    /// For embedders that run a dispatcher cycle from inside their own
    /// request handling and must not produce client replies from it. The
    /// RPC service never sets it: handlers cannot re-enter the dispatcher,
    /// and the follow-up cycle after an action has to deliver its replies.
    pub fn set_suppress_outbound(&self, suppress: bool) {
        self.suppress_outbound.store(suppress, Ordering::SeqCst);
    }

    pub fn is_outbound_suppressed(&self) -> bool {
        self.suppress_outbound.load(Ordering::SeqCst)
    }

    /// Delete messages submitted more than `timeout` ago, claimed or not.
    pub async fn remove_expired_messages(&self, timeout: Duration) -> Result<u64> {
        let removed = self
            .store
            .delete_messages_older_than(expiry_cutoff(timeout)?)
            .await?;

        if removed > 0 {
            info!(removed, "Removed expired messages");
        }
        Ok(removed)
    }

    fn request_session(&self) -> Result<&str> {
        self.session_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(CoreError::NoSession)
    }
}
