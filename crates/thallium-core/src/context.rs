// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request-scoped wiring of the messaging components.
//!
//! Every RPC request opens its own context: a fresh [`JobTracker`] with its
//! own current-job pointer, a [`MessageBus`] bound to the request's session
//! and a [`Dispatcher`] over both. Nothing is shared between requests except
//! the persistence backend.

use std::sync::Arc;

use crate::collaborators::Collaborators;
use crate::config::ExpiryTimeouts;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::Result;
use crate::job_tracker::JobTracker;
use crate::message_bus::MessageBus;
use crate::persistence::{JobStore, MessageStore, Persistence};

pub struct RequestContext {
    bus: Arc<MessageBus>,
    dispatcher: Dispatcher,
}

impl RequestContext {
    /// Build the components for one request, running both expiry sweeps.
    ///
    /// Fails if either sweep fails.
    pub async fn open(
        persistence: Arc<dyn Persistence>,
        session_id: Option<String>,
        collaborators: Collaborators,
        timeouts: ExpiryTimeouts,
    ) -> Result<Self> {
        let job_store: Arc<dyn JobStore> = persistence.clone();
        let message_store: Arc<dyn MessageStore> = persistence;

        let jobs = Arc::new(JobTracker::open(job_store, timeouts.job).await?);
        let bus = Arc::new(MessageBus::open(message_store, jobs, session_id, timeouts.message).await?);
        let dispatcher = Dispatcher::new(bus.clone(), collaborators);

        Ok(Self { bus, dispatcher })
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn jobs(&self) -> &Arc<JobTracker> {
        self.bus.job_tracker()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run one dispatch cycle.
    pub async fn perform_actions(&self) -> Result<DispatchReport> {
        self.dispatcher.perform_actions().await
    }
}
