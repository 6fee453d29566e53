// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker repeating the expiry sweeps.
//!
//! Request contexts already sweep when they are opened. On a quiet server
//! that can leave stale rows in place for a long time, so this worker runs
//! both sweeps on a fixed interval until told to stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::config::ExpiryTimeouts;
use crate::error::Result;
use crate::persistence::{JobStore, MessageStore, Persistence, expiry_cutoff};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub messages: u64,
    pub jobs: u64,
}

/// Periodic expiry sweeper.
pub struct ExpiryWorker {
    persistence: Arc<dyn Persistence>,
    timeouts: ExpiryTimeouts,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl ExpiryWorker {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        timeouts: ExpiryTimeouts,
        interval: Duration,
    ) -> Self {
        Self {
            persistence,
            timeouts,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the sweep loop until the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            interval_secs = self.interval.as_secs(),
            message_timeout_secs = self.timeouts.message.as_secs(),
            job_timeout_secs = self.timeouts.job.as_secs(),
            "Expiry worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Expiry worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Expiry sweep failed");
                    }
                }
            }
        }

        info!("Expiry worker stopped");
    }

    /// Remove expired messages and jobs once.
    pub async fn sweep(&self) -> Result<SweepResult> {
        let messages = self
            .persistence
            .delete_messages_older_than(expiry_cutoff(self.timeouts.message)?)
            .await?;
        let jobs = self
            .persistence
            .delete_jobs_older_than(expiry_cutoff(self.timeouts.job)?)
            .await?;

        let result = SweepResult { messages, jobs };
        if messages > 0 || jobs > 0 {
            info!(messages, jobs, "Expired records removed");
        } else {
            debug!("Nothing to expire");
        }
        Ok(result)
    }
}
