// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Thallium SDK - client for thallium messaging
//!
//! Queue commands, flush them to thallium-core in one verified envelope and
//! receive progress and result replies through named subscribers.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use thallium_sdk::{ClientMessageBus, SdkConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SdkConfig::from_env()?;
//!     let bus = Arc::new(ClientMessageBus::from_config(&config)?);
//!
//!     bus.subscribe("progress", "sign-reply", |reply| {
//!         println!("{} {:?}", reply.body, reply.value);
//!         Ok(())
//!     });
//!
//!     bus.add("sign-request", Some(json!({"id": 42, "guid": document_guid})));
//!     bus.send().await?;
//!
//!     let poller = bus.start_polling();
//!     // ...
//!     poller.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `THALLIUM_SESSION_ID` | Yes | - | Session the replies are addressed to |
//! | `THALLIUM_SERVER_URL` | No | `http://127.0.0.1:8080/rpc` | RPC endpoint |
//! | `THALLIUM_POLL_INTERVAL_MS` | No | `1000` | Poll period |
//! | `THALLIUM_MAX_RETRIES` | No | `3` | Send retries on transport errors |
//! | `THALLIUM_RETRY_DELAY_MS` | No | `200` | Base delay between retries |
//! | `THALLIUM_REQUEST_TIMEOUT_MS` | No | `30000` | Per-request timeout |
//!
//! # Transports
//!
//! - `http` (default): form POST to the server's `/rpc` endpoint
//! - `embedded`: in-process calls into `thallium-core`, for applications that
//!   host the server themselves

pub mod backend;
mod bus;
mod config;
mod error;

pub use backend::Transport;
pub use bus::{ClientMessageBus, PollerHandle, ReceivedMessage, SubscriberHandler};
pub use config::SdkConfig;
pub use error::{Result, SdkError};

#[cfg(feature = "http")]
pub use backend::http::HttpTransport;

#[cfg(feature = "embedded")]
pub use backend::embedded::EmbeddedTransport;

// Re-export the wire types clients deal with
pub use thallium_protocol::{CommandKind, InboundEntry, generate_guid};
