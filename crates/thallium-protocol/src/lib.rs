// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Thallium Protocol - self-verifying message envelopes
//!
//! This crate provides the wire layer shared by the server (`thallium-core`)
//! and the polling client (`thallium-sdk`):
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    thallium-protocol                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Entries: inbound commands / outbound replies (JSON)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelope: count + size + sha1 hash + JSON-as-string        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: HTTP form POST (type=rpc)                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Envelope
//!
//! Both directions wrap a JSON array of entries in the same envelope:
//!
//! ```text
//! { "count": 2, "size": 97, "hash": "<sha1 hex>", "json": "[{...},{...}]" }
//! ```
//!
//! `size` is the byte length of `json`, `hash` its sha1 digest and `count` the
//! number of decoded entries. A violation of any of the three is an integrity
//! failure; the receiver must discard the payload.
//!
//! # Usage
//!
//! ```ignore
//! use thallium_protocol::{Envelope, InboundEntry};
//!
//! let entries = vec![InboundEntry::new("scan-request", None)];
//! let raw = Envelope::seal(&entries)?.encode()?;
//!
//! let received = Envelope::parse(&raw)?;
//! let decoded = thallium_protocol::decode_inbound(received.open_values()?)?;
//! ```

pub mod command;
pub mod entry;
pub mod envelope;
pub mod guid;
pub mod rpc;

pub use command::{CommandKind, UnknownCommand};
pub use entry::{InboundEntry, OutboundEntry, decode_inbound, filter_body};
pub use envelope::{Envelope, EnvelopeError, sha1_hex};
pub use guid::{GUID_LEN, generate_guid, is_valid_guid};
pub use rpc::RpcError;

