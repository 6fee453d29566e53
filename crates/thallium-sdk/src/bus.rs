// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client half of the messaging protocol.
//!
//! [`ClientMessageBus`] queues commands until [`send`](ClientMessageBus::send)
//! flushes them in one envelope, and turns polled replies into subscriber
//! calls keyed by reply command.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use thallium_protocol::{Envelope, InboundEntry, OutboundEntry};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::Transport;
use crate::config::SdkConfig;
use crate::error::Result;

/// A reply or progress message delivered by the server.
pub type ReceivedMessage = OutboundEntry;

/// Subscriber callback. An `Err` stops delivery of that message to the
/// remaining subscribers.
pub type SubscriberHandler =
    Arc<dyn Fn(&ReceivedMessage) -> std::result::Result<(), String> + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    category: String,
    handler: SubscriberHandler,
}

/// Queues outgoing commands and fans polled replies out to subscribers.
pub struct ClientMessageBus {
    transport: Arc<dyn Transport>,
    max_retries: u32,
    retry_delay: Duration,
    poll_interval: Duration,
    outbound: Mutex<VecDeque<InboundEntry>>,
    received: Mutex<VecDeque<ReceivedMessage>>,
    // Name order is notification order
    subscribers: Mutex<BTreeMap<String, Subscriber>>,
}

impl ClientMessageBus {
    pub fn new(transport: Arc<dyn Transport>, config: &SdkConfig) -> Self {
        Self {
            transport,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            poll_interval: config.poll_interval(),
            outbound: Mutex::new(VecDeque::new()),
            received: Mutex::new(VecDeque::new()),
            subscribers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Bus over the HTTP transport described by `config`.
    #[cfg(feature = "http")]
    pub fn from_config(config: &SdkConfig) -> Result<Self> {
        let transport = crate::backend::http::HttpTransport::from_config(config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn session_id(&self) -> &str {
        self.transport.session_id()
    }

    /// Queue a command for the next [`send`](Self::send).
    pub fn add(&self, command: impl Into<String>, message: Option<Value>) {
        lock(&self.outbound).push_back(InboundEntry::new(command, message));
    }

    /// Number of queued commands.
    pub fn pending(&self) -> usize {
        lock(&self.outbound).len()
    }

    /// Flush the queue in one envelope. Returns the number of commands sent.
    ///
    /// Transport failures are retried up to the configured budget. When the
    /// budget runs out the commands go back to the front of the queue, in
    /// their original order, ahead of anything added meanwhile.
    ///
    /// A batch the server rejects, or that cannot be encoded, would fail the
    /// same way again. It is dropped and the error returned, so later
    /// commands are not held back by it.
    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn send(&self) -> Result<usize> {
        let batch: Vec<InboundEntry> = lock(&self.outbound).drain(..).collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let raw = match Envelope::seal(&batch).and_then(|e| e.encode()) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, count = batch.len(), "Cannot encode messages, dropping them");
                return Err(e.into());
            }
        };

        let mut attempt = 0;
        loop {
            match self.transport.submit(&raw).await {
                Ok(()) => {
                    debug!(count = batch.len(), attempt, "Messages sent");
                    return Ok(batch.len());
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, max_retries = self.max_retries, "Send failed, retrying");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) if e.is_retryable() => {
                    error!(error = %e, count = batch.len(), "Send failed, messages re-queued");
                    self.requeue(batch);
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, count = batch.len(), "Messages rejected, dropping them");
                    return Err(e);
                }
            }
        }
    }

    fn requeue(&self, batch: Vec<InboundEntry>) {
        let mut outbound = lock(&self.outbound);
        for entry in batch.into_iter().rev() {
            outbound.push_front(entry);
        }
    }

    /// Retrieve pending replies, notify subscribers and return the replies.
    ///
    /// Replies are consumed on the server, so each one is returned by exactly
    /// one poll.
    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn poll(&self) -> Result<Vec<ReceivedMessage>> {
        let raw = self.transport.retrieve().await?;
        let messages = self.parse_response(&raw)?;
        self.notify_subscribers();
        Ok(messages)
    }

    /// Send the queue, then poll once.
    pub async fn flush(&self) -> Result<Vec<ReceivedMessage>> {
        self.send().await?;
        self.poll().await
    }

    /// Verify a poll envelope and queue its replies for notification.
    ///
    /// A size or hash mismatch rejects the whole payload; nothing is queued.
    pub fn parse_response(&self, raw: &str) -> Result<Vec<ReceivedMessage>> {
        let messages: Vec<ReceivedMessage> = Envelope::parse(raw)?.open()?;
        if !messages.is_empty() {
            debug!(count = messages.len(), "Replies received");
            lock(&self.received).extend(messages.iter().cloned());
        }
        Ok(messages)
    }

    /// Deliver queued replies to subscribers whose category equals the
    /// reply's command. Returns the number of replies drained.
    pub fn notify_subscribers(&self) -> usize {
        let messages: Vec<ReceivedMessage> = lock(&self.received).drain(..).collect();
        if messages.is_empty() {
            return 0;
        }

        // Handlers may (un)subscribe, so they run without the lock held
        let subscribers: Vec<(String, Subscriber)> = lock(&self.subscribers)
            .iter()
            .map(|(name, s)| (name.clone(), s.clone()))
            .collect();

        for message in &messages {
            for (name, subscriber) in &subscribers {
                if subscriber.category != message.command {
                    continue;
                }
                if let Err(reason) = (subscriber.handler)(message) {
                    warn!(
                        subscriber = %name,
                        message_guid = %message.guid,
                        reason = %reason,
                        "Subscriber failed, skipping remaining subscribers for this message"
                    );
                    break;
                }
            }
        }

        messages.len()
    }

    /// Register `handler` for replies whose command is `category`.
    ///
    /// Subscribing again under an existing name replaces that subscriber.
    pub fn subscribe<F>(&self, name: impl Into<String>, category: impl Into<String>, handler: F)
    where
        F: Fn(&ReceivedMessage) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        lock(&self.subscribers).insert(
            name.into(),
            Subscriber {
                category: category.into(),
                handler: Arc::new(handler),
            },
        );
    }

    /// Remove a subscriber. Returns `false` if there was none by that name.
    pub fn unsubscribe(&self, name: &str) -> bool {
        lock(&self.subscribers).remove(name).is_some()
    }

    /// Poll on the configured interval until the returned handle is stopped.
    ///
    /// Poll failures are logged and the loop carries on.
    pub fn start_polling(self: &Arc<Self>) -> PollerHandle {
        let token = CancellationToken::new();
        let bus = Arc::clone(self);
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(bus.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_ms = bus.poll_interval.as_millis() as u64, "Poller started");

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = bus.poll().await {
                            if e.is_retryable() {
                                warn!(error = %e, "Poll failed");
                            } else {
                                error!(error = %e, "Poll failed");
                            }
                        }
                    }
                }
            }

            info!("Poller stopped");
        });

        PollerHandle { token, handle }
    }
}

/// Handle to a running poller.
pub struct PollerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop polling and wait for an in-flight poll to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!("Poller task panicked: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
