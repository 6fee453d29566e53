// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Thallium Core - message bus and job correlation for polling clients
//!
//! This crate lets a stateless HTTP-polling client exchange commands with
//! long-running server-side work without a persistent connection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐   submit-messages    ┌──────────────────────────┐
//! │   thallium-sdk           │ ───────────────────▶ │  MessageBus::submit      │
//! │   ClientMessageBus       │                      │  (inbound rows)          │
//! │                          │   retrieve-messages  │                          │
//! │                          │ ◀─────────────────── │  MessageBus::poll        │
//! └──────────────────────────┘                      │  (outbound rows)         │
//!                                                   └────────────┬─────────────┘
//!                                                                │
//!                                                                ▼
//!                                                   ┌──────────────────────────┐
//!                                                   │  Dispatcher              │
//!                                                   │  claim → job → handler   │
//!                                                   │  JobTracker (current job)│
//!                                                   └────────────┬─────────────┘
//!                                                                │
//!                                                                ▼
//!                                                   ┌──────────────────────────┐
//!                                                   │  SQLite / PostgreSQL     │
//!                                                   │  messages, jobs          │
//!                                                   └──────────────────────────┘
//! ```
//!
//! # Delivery semantics
//!
//! - Inbound messages are claimed with a conditional update, so at most one
//!   dispatcher handles a given message.
//! - A claimed message is deleted after its handler ran, whether it
//!   succeeded or not. There is no retry.
//! - Outbound messages are deleted as they are polled, so a message reaches
//!   the client at most once.
//! - Messages and jobs older than the expiry timeout (300 s by default) are
//!   removed whenever a request context is opened.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `THALLIUM_DATABASE_URL` | Yes | - | PostgreSQL or SQLite connection string |
//! | `THALLIUM_HTTP_PORT` | No | `8080` | RPC server port |
//! | `THALLIUM_MESSAGE_TIMEOUT_SECS` | No | `300` | Message expiry |
//! | `THALLIUM_JOB_TIMEOUT_SECS` | No | `300` | Job expiry |
//! | `THALLIUM_SWEEP_INTERVAL_SECS` | No | `0` | Background sweep period, 0 disables |

/// Server configuration loaded from environment variables.
pub mod config;

/// Error types with RPC error code mapping.
pub mod error;

/// Message and job stores with SQLite and PostgreSQL backends.
pub mod persistence;

/// Embedded database migrations.
pub mod migrations;

/// Jobs and the per-request current job.
pub mod job_tracker;

/// Session-scoped message ingress and egress.
pub mod message_bus;

/// External collaborators used by command handlers.
pub mod collaborators;

/// Typed commands and their handlers.
pub mod handlers;

/// Claims inbound messages and runs their handlers.
pub mod dispatcher;

/// Per-request wiring of stores, tracker, bus and dispatcher.
pub mod context;

/// Background expiry sweeps.
pub mod expiry_worker;

/// RPC actions independent of transport.
pub mod rpc;

/// HTTP RPC server.
#[cfg(feature = "server")]
pub mod server;

/// Embeddable runtime.
#[cfg(feature = "server")]
pub mod runtime;

pub use collaborators::Collaborators;
pub use context::RequestContext;
pub use dispatcher::{DispatchReport, Dispatcher, FailedMessage};
pub use error::{CoreError, Result};
pub use job_tracker::JobTracker;
pub use message_bus::MessageBus;
pub use rpc::{RpcAction, RpcService};
