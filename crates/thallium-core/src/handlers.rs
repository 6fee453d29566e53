// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed commands and their handlers.
//!
//! A claimed inbound row is parsed into a [`Command`] before anything runs,
//! so a handler only ever sees a payload of the shape it needs.

use serde::Deserialize;
use serde_json::Value;
use thallium_protocol::{CommandKind, is_valid_guid};
use tracing::{debug, instrument};

use crate::collaborators::Collaborators;
use crate::error::{CoreError, Result};
use crate::message_bus::MessageBus;

/// Body of a `sign-request`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignRequest {
    pub id: i64,
    pub guid: String,
}

/// A parsed inbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Sign(SignRequest),
    MailImport,
    Scan(Value),
}

impl Command {
    /// Build a command from its kind and stored body.
    pub fn parse(kind: CommandKind, body: Value) -> std::result::Result<Self, String> {
        match kind {
            CommandKind::SignRequest => {
                let request: SignRequest = serde_json::from_value(body)
                    .map_err(|e| format!("invalid sign request: {}", e))?;
                if request.id <= 0 {
                    return Err(format!("invalid document id {}", request.id));
                }
                if !is_valid_guid(&request.guid) {
                    return Err(format!("invalid document guid '{}'", request.guid));
                }
                Ok(Command::Sign(request))
            }
            CommandKind::MailImportRequest => Ok(Command::MailImport),
            CommandKind::ScanRequest => Ok(Command::Scan(body)),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Sign(_) => CommandKind::SignRequest,
            Command::MailImport => CommandKind::MailImportRequest,
            Command::Scan(_) => CommandKind::ScanRequest,
        }
    }
}

/// Run a command. Progress goes to the session of the current job.
pub async fn handle(
    command: &Command,
    bus: &MessageBus,
    collaborators: &Collaborators,
) -> Result<()> {
    match command {
        Command::Sign(request) => handle_sign(request, bus, collaborators).await,
        Command::MailImport => handle_mail_import(bus, collaborators).await,
        Command::Scan(request) => handle_scan(request, collaborators).await,
    }
}

#[instrument(skip(bus, collaborators), fields(document_id = request.id))]
async fn handle_sign(
    request: &SignRequest,
    bus: &MessageBus,
    collaborators: &Collaborators,
) -> Result<()> {
    let command = CommandKind::SignRequest.as_str();
    let reply = CommandKind::SignRequest.reply_command();

    progress(bus, reply, "Preparing", "10%").await?;

    progress(bus, reply, "Loading document", "20%").await?;
    let document = collaborators
        .documents
        .load_document(request.id, &request.guid)
        .await
        .map_err(|e| CoreError::handler(command, e))?;

    collaborators
        .signer
        .sign(&document)
        .await
        .map_err(|e| CoreError::handler(command, e))?;

    progress(bus, reply, "Done", "100%").await?;
    debug!("Document signed");
    Ok(())
}

#[instrument(skip_all)]
async fn handle_mail_import(bus: &MessageBus, collaborators: &Collaborators) -> Result<()> {
    collaborators
        .mail
        .import_mail()
        .await
        .map_err(|e| CoreError::handler(CommandKind::MailImportRequest.as_str(), e))?;

    progress(
        bus,
        CommandKind::MailImportRequest.reply_command(),
        "Done",
        "100%",
    )
    .await
}

#[instrument(skip_all)]
async fn handle_scan(request: &Value, collaborators: &Collaborators) -> Result<()> {
    collaborators
        .scanner
        .scan(request)
        .await
        .map_err(|e| CoreError::handler(CommandKind::ScanRequest.as_str(), e))
}

async fn progress(bus: &MessageBus, reply: &str, body: &str, value: &str) -> Result<()> {
    bus.send_message_to_client(reply, Value::from(body), Some(value), None)
        .await?;
    Ok(())
}
