// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for thallium-core integration tests.
//!
//! Provides an in-memory store, recording collaborators and envelope helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use thallium_core::collaborators::{
    Collaborators, Document, DocumentRepository, DocumentScanner, DocumentSigner, MailImporter,
};
use thallium_core::config::ExpiryTimeouts;
use thallium_core::context::RequestContext;
use thallium_core::error::CoreError;
use thallium_core::persistence::{
    JobRecord, JobStore, MessageRecord, MessageScope, MessageStore, NewJob, NewMessage,
    Persistence, SqlitePersistence,
};
use thallium_protocol::{Envelope, InboundEntry, OutboundEntry};

/// Skip the test when no PostgreSQL test database is configured.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}

/// Fresh in-memory SQLite store with migrations applied.
pub async fn memory_store() -> Arc<SqlitePersistence> {
    Arc::new(
        SqlitePersistence::from_url("sqlite::memory:")
            .await
            .expect("Failed to create in-memory store"),
    )
}

/// Open a request context for `session` over `persistence`.
pub async fn open_context(
    persistence: Arc<dyn Persistence>,
    session: &str,
    collaborators: Collaborators,
) -> RequestContext {
    RequestContext::open(
        persistence,
        Some(session.to_string()),
        collaborators,
        ExpiryTimeouts::default(),
    )
    .await
    .expect("Failed to open request context")
}

/// Encode client entries the way the SDK does.
pub fn envelope(entries: &[InboundEntry]) -> String {
    Envelope::seal(entries).unwrap().encode().unwrap()
}

/// Decode a poll reply.
pub fn decode_poll(raw: &str) -> Vec<OutboundEntry> {
    Envelope::parse(raw).unwrap().open().unwrap()
}

/// Collaborators that record every call and can be told to fail.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<String>>,
    fail_signing: AtomicBool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_signing(&self) {
        self.fail_signing.store(true, Ordering::SeqCst);
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            documents: self.clone(),
            signer: self.clone(),
            mail: self.clone(),
            scanner: self.clone(),
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DocumentRepository for Recorder {
    async fn load_document(&self, id: i64, guid: &str) -> anyhow::Result<Document> {
        self.record(format!("load:{}", id));
        Ok(Document {
            id,
            guid: guid.to_string(),
            content: b"%PDF-1.7".to_vec(),
        })
    }
}

#[async_trait]
impl DocumentSigner for Recorder {
    async fn sign(&self, document: &Document) -> anyhow::Result<()> {
        if self.fail_signing.load(Ordering::SeqCst) {
            bail!("certificate expired");
        }
        self.record(format!("sign:{}", document.id));
        Ok(())
    }
}

#[async_trait]
impl MailImporter for Recorder {
    async fn import_mail(&self) -> anyhow::Result<()> {
        self.record("mail".to_string());
        Ok(())
    }
}

#[async_trait]
impl DocumentScanner for Recorder {
    async fn scan(&self, request: &Value) -> anyhow::Result<()> {
        self.record(format!("scan:{}", request));
        Ok(())
    }
}

/// Store wrapper whose behaviour can be bent per test.
///
/// `fail_claims` makes every claim a store error; `steal_claims` makes every
/// claim lose the race as if another dispatcher got there first.
pub struct FlakyStore {
    pub inner: Arc<SqlitePersistence>,
    pub fail_claims: AtomicBool,
    pub steal_claims: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqlitePersistence>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_claims: AtomicBool::new(false),
            steal_claims: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn insert_message(&self, message: &NewMessage) -> Result<MessageRecord, CoreError> {
        self.inner.insert_message(message).await
    }

    async fn insert_messages(
        &self,
        messages: &[NewMessage],
    ) -> Result<Vec<MessageRecord>, CoreError> {
        self.inner.insert_messages(messages).await
    }

    async fn get_message(&self, guid: &str) -> Result<Option<MessageRecord>, CoreError> {
        self.inner.get_message(guid).await
    }

    async fn delete_message(&self, id: i64) -> Result<bool, CoreError> {
        self.inner.delete_message(id).await
    }

    async fn list_session_messages(
        &self,
        scope: MessageScope,
        session_id: &str,
    ) -> Result<Vec<MessageRecord>, CoreError> {
        self.inner.list_session_messages(scope, session_id).await
    }

    async fn list_unclaimed_messages(
        &self,
        scope: MessageScope,
    ) -> Result<Vec<MessageRecord>, CoreError> {
        self.inner.list_unclaimed_messages(scope).await
    }

    async fn claim_message(&self, id: i64) -> Result<bool, CoreError> {
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(CoreError::Persistence {
                operation: "claim".to_string(),
                details: "database is locked".to_string(),
            });
        }
        if self.steal_claims.load(Ordering::SeqCst) {
            // The other dispatcher wins
            self.inner.claim_message(id).await?;
            return Ok(false);
        }
        self.inner.claim_message(id).await
    }

    async fn delete_messages_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError> {
        self.inner.delete_messages_older_than(cutoff).await
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn insert_job(&self, job: &NewJob) -> Result<JobRecord, CoreError> {
        self.inner.insert_job(job).await
    }

    async fn get_job(&self, guid: &str) -> Result<Option<JobRecord>, CoreError> {
        self.inner.get_job(guid).await
    }

    async fn delete_job(&self, guid: &str) -> Result<bool, CoreError> {
        self.inner.delete_job(guid).await
    }

    async fn set_job_processing(&self, guid: &str) -> Result<bool, CoreError> {
        self.inner.set_job_processing(guid).await
    }

    async fn delete_jobs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError> {
        self.inner.delete_jobs_older_than(cutoff).await
    }
}

#[async_trait]
impl Persistence for FlakyStore {
    async fn health_check_db(&self) -> Result<bool, CoreError> {
        self.inner.health_check_db().await
    }
}

/// Number of jobs left in the store.
pub async fn job_count(store: &SqlitePersistence) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(store.pool())
        .await
        .unwrap()
}

/// Number of messages of `scope` left in the store.
pub async fn message_count(store: &SqlitePersistence, scope: MessageScope) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE scope = ?")
        .bind(scope.as_str())
        .fetch_one(store.pool())
        .await
        .unwrap()
}
