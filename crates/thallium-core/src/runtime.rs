// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for thallium-core.
//!
//! [`CoreRuntime`] runs the RPC server (and optionally the expiry worker)
//! inside an existing tokio application instead of as a standalone binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use thallium_core::runtime::CoreRuntime;
//! use thallium_core::persistence::SqlitePersistence;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let persistence = Arc::new(SqlitePersistence::from_path(".data/thallium.db").await?);
//!
//!     let runtime = CoreRuntime::builder()
//!         .persistence(persistence)
//!         .collaborators(my_collaborators())
//!         .bind_addr("127.0.0.1:8080".parse()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // submit and retrieve over http://127.0.0.1:8080/rpc
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::collaborators::Collaborators;
use crate::config::ExpiryTimeouts;
use crate::expiry_worker::ExpiryWorker;
use crate::persistence::Persistence;
use crate::rpc::RpcService;

/// Collects the settings of a [`CoreRuntime`] before it starts.
pub struct CoreRuntimeBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    collaborators: Collaborators,
    bind_addr: SocketAddr,
    timeouts: ExpiryTimeouts,
    sweep_interval: Option<Duration>,
}

impl std::fmt::Debug for CoreRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreRuntimeBuilder")
            .field("persistence", &self.persistence.as_ref().map(|_| "..."))
            .field("bind_addr", &self.bind_addr)
            .field("timeouts", &self.timeouts)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

impl Default for CoreRuntimeBuilder {
    fn default() -> Self {
        Self {
            persistence: None,
            collaborators: Collaborators::unavailable(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            timeouts: ExpiryTimeouts::default(),
            sweep_interval: None,
        }
    }
}

impl CoreRuntimeBuilder {
    /// Builder with the default bind address and timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Message and job store. Required.
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the command handler collaborators.
    ///
    /// Default: [`Collaborators::unavailable`]
    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    /// Set the bind address for the RPC server.
    ///
    /// Default: `0.0.0.0:8080`
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the message and job expiry timeouts.
    pub fn timeouts(mut self, timeouts: ExpiryTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Enable the background expiry worker.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Validate the settings.
    ///
    /// Fails without persistence or with a zero sweep interval.
    pub fn build(self) -> Result<CoreRuntimeConfig> {
        let persistence = self
            .persistence
            .ok_or_else(|| anyhow::anyhow!("persistence is required"))?;

        if self.sweep_interval.is_some_and(|i| i.is_zero()) {
            anyhow::bail!("sweep interval must be greater than zero");
        }

        Ok(CoreRuntimeConfig {
            persistence,
            collaborators: self.collaborators,
            bind_addr: self.bind_addr,
            timeouts: self.timeouts,
            sweep_interval: self.sweep_interval,
        })
    }
}

/// Validated settings, ready to [`start`](Self::start).
pub struct CoreRuntimeConfig {
    persistence: Arc<dyn Persistence>,
    collaborators: Collaborators,
    bind_addr: SocketAddr,
    timeouts: ExpiryTimeouts,
    sweep_interval: Option<Duration>,
}

impl std::fmt::Debug for CoreRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreRuntimeConfig")
            .field("persistence", &"...")
            .field("bind_addr", &self.bind_addr)
            .field("timeouts", &self.timeouts)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

impl CoreRuntimeConfig {
    /// Start the runtime, spawning the RPC server task.
    ///
    /// The listener is bound before this returns, so the reported
    /// [`bind_addr`](CoreRuntime::bind_addr) is usable immediately, also
    /// when port 0 was requested.
    pub async fn start(self) -> Result<CoreRuntime> {
        let service = RpcService::new(
            self.persistence.clone(),
            self.collaborators,
            self.timeouts,
        );
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        let bind_addr = listener.local_addr()?;

        let server_handle = tokio::spawn(crate::server::serve(
            listener,
            service.clone(),
            async move {
                while shutdown_rx.changed().await.is_ok() {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            },
        ));

        let worker = self.sweep_interval.map(|interval| {
            let worker = ExpiryWorker::new(self.persistence.clone(), self.timeouts, interval);
            let shutdown = worker.shutdown_handle();
            let handle = tokio::spawn(async move { worker.run().await });
            (shutdown, handle)
        });

        info!(addr = %bind_addr, expiry_worker = worker.is_some(), "Thallium runtime started");

        Ok(CoreRuntime {
            server_handle,
            shutdown_tx,
            worker,
            service,
            bind_addr,
        })
    }
}

/// A running thallium-core instance that can be embedded in an application.
///
/// Stop it with [`shutdown`](Self::shutdown). Dropping it stops the server but
/// leaves the expiry worker running.
pub struct CoreRuntime {
    server_handle: JoinHandle<Result<()>>,
    shutdown_tx: watch::Sender<bool>,
    worker: Option<(Arc<Notify>, JoinHandle<()>)>,
    service: RpcService,
    bind_addr: SocketAddr,
}

impl CoreRuntime {
    /// Start configuring a runtime.
    pub fn builder() -> CoreRuntimeBuilder {
        CoreRuntimeBuilder::new()
    }

    /// Address the RPC server is listening on.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// The service answering RPC requests, for in-process callers.
    pub fn service(&self) -> &RpcService {
        &self.service
    }

    /// Store shared by the server and the expiry worker.
    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        self.service.persistence()
    }

    /// Signal shutdown and wait for the worker and the server to exit.
    ///
    /// Stops accepting requests, waits for in-flight ones and stops the
    /// expiry worker.
    pub async fn shutdown(self) -> Result<()> {
        info!("Stopping thallium runtime");

        let _ = self.shutdown_tx.send(true);

        if let Some((shutdown, handle)) = self.worker {
            shutdown.notify_one();
            if let Err(e) = handle.await {
                error!("Expiry worker task panicked: {}", e);
            }
        }

        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("Thallium runtime stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "RPC server exited with error");
                Err(e)
            }
            Err(e) => {
                error!(error = %e, "RPC server task panicked");
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }

    /// True while the HTTP server task is alive.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished()
    }
}
