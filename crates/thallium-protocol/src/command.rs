// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The closed set of commands a client may submit.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Command kinds accepted on the inbound side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Sign a stored document.
    SignRequest,
    /// Import pending mail.
    MailImportRequest,
    /// Scan a document.
    ScanRequest,
}

/// A command string outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported command '{0}'")]
pub struct UnknownCommand(pub String);

impl CommandKind {
    pub const ALL: [CommandKind; 3] = [
        CommandKind::SignRequest,
        CommandKind::MailImportRequest,
        CommandKind::ScanRequest,
    ];

    /// Wire name of the inbound command.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::SignRequest => "sign-request",
            CommandKind::MailImportRequest => "mailimport-request",
            CommandKind::ScanRequest => "scan-request",
        }
    }

    /// Outbound command used for progress and result replies.
    pub fn reply_command(&self) -> &'static str {
        match self {
            CommandKind::SignRequest => "sign-reply",
            CommandKind::MailImportRequest => "mailimport-reply",
            CommandKind::ScanRequest => "scan-reply",
        }
    }
}

impl FromStr for CommandKind {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
