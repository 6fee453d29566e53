// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for thallium-core.
//!
//! The message and job tables are the only shared mutable state of the
//! messaging subsystem. Both stores are expressed as traits so that the bus
//! and the tracker can be wired against either backend, or against an
//! in-memory fake in tests.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::CoreError;

/// Direction of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageScope {
    /// Client -> server command awaiting dispatch.
    Inbound,
    /// Server -> client reply awaiting a poll.
    Outbound,
}

impl MessageScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageScope::Inbound => "inbound",
            MessageScope::Outbound => "outbound",
        }
    }
}

impl FromStr for MessageScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(MessageScope::Inbound),
            "outbound" => Ok(MessageScope::Outbound),
            other => Err(format!("unknown message scope '{}'", other)),
        }
    }
}

impl fmt::Display for MessageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message record from the persistence layer.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MessageRecord {
    /// Database primary key.
    pub id: i64,
    /// Globally unique identifier, 64 lowercase hex characters.
    pub guid: String,
    /// Session the message belongs to.
    pub session_id: String,
    /// `inbound` or `outbound`.
    pub scope: String,
    /// Command name.
    pub command: String,
    /// JSON-encoded body.
    pub body: String,
    /// Optional short value, e.g. a percentage.
    pub value: Option<String>,
    /// When the message was stored.
    pub submit_time: DateTime<Utc>,
    /// Set once a dispatcher has claimed the message.
    pub processing: bool,
}

impl MessageRecord {
    /// Parsed scope, `None` if the stored value is not a known scope.
    pub fn message_scope(&self) -> Option<MessageScope> {
        self.scope.parse().ok()
    }

    /// Decode the stored body.
    pub fn body_value(&self) -> Result<Value, CoreError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// A message to be inserted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub guid: String,
    pub session_id: String,
    pub scope: MessageScope,
    pub command: String,
    /// JSON-encoded body.
    pub body: String,
    pub value: Option<String>,
    pub submit_time: DateTime<Utc>,
}

/// Job record from the persistence layer.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct JobRecord {
    /// Database primary key.
    pub id: i64,
    /// Globally unique identifier.
    pub guid: String,
    /// Session that receives the job's progress messages.
    pub session_id: Option<String>,
    /// GUID of the inbound message that triggered the job.
    pub request_guid: Option<String>,
    /// When the job was created.
    pub created_time: DateTime<Utc>,
    /// Set when the handler starts.
    pub processing: bool,
}

/// A job to be inserted.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub guid: String,
    pub session_id: Option<String>,
    pub request_guid: Option<String>,
    pub created_time: DateTime<Utc>,
}

/// Message table access.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a message and return it with its assigned id.
    async fn insert_message(&self, message: &NewMessage) -> Result<MessageRecord, CoreError>;

    /// Insert a batch in one transaction: either every message is stored or none.
    async fn insert_messages(
        &self,
        messages: &[NewMessage],
    ) -> Result<Vec<MessageRecord>, CoreError>;

    async fn get_message(&self, guid: &str) -> Result<Option<MessageRecord>, CoreError>;

    /// Delete by id. Returns `false` if the row was already gone.
    async fn delete_message(&self, id: i64) -> Result<bool, CoreError>;

    /// All messages of a scope for one session, oldest first.
    async fn list_session_messages(
        &self,
        scope: MessageScope,
        session_id: &str,
    ) -> Result<Vec<MessageRecord>, CoreError>;

    /// All messages of a scope not yet claimed, oldest first.
    async fn list_unclaimed_messages(
        &self,
        scope: MessageScope,
    ) -> Result<Vec<MessageRecord>, CoreError>;

    /// Set `processing` if and only if it is still unset.
    ///
    /// Returns `true` when this call performed the claim.
    async fn claim_message(&self, id: i64) -> Result<bool, CoreError>;

    /// Delete every message submitted before `cutoff`. Returns the number removed.
    async fn delete_messages_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError>;
}

/// Job table access.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job and return it with its assigned id.
    async fn insert_job(&self, job: &NewJob) -> Result<JobRecord, CoreError>;

    async fn get_job(&self, guid: &str) -> Result<Option<JobRecord>, CoreError>;

    /// Delete by guid. Returns `false` if the job did not exist.
    async fn delete_job(&self, guid: &str) -> Result<bool, CoreError>;

    /// Mark the job as processing. Returns `false` if the job did not exist.
    async fn set_job_processing(&self, guid: &str) -> Result<bool, CoreError>;

    /// Delete every job created before `cutoff`. Returns the number removed.
    async fn delete_jobs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError>;
}

/// A backend providing both stores.
#[async_trait]
pub trait Persistence: MessageStore + JobStore {
    /// Round trip to the database.
    async fn health_check_db(&self) -> Result<bool, CoreError>;
}

/// Timestamp before which rows are considered expired.
pub(crate) fn expiry_cutoff(timeout: std::time::Duration) -> Result<DateTime<Utc>, CoreError> {
    let timeout = chrono::Duration::from_std(timeout)
        .map_err(|_| CoreError::validation("timeout", "expiry timeout out of range"))?;
    Utc::now()
        .checked_sub_signed(timeout)
        .ok_or_else(|| CoreError::validation("timeout", "expiry timeout out of range"))
}

/// Connect to `database_url`, run migrations and return the matching backend.
///
/// URLs starting with `postgres` select PostgreSQL, everything else is
/// handed to SQLite.
pub async fn connect(database_url: &str) -> Result<Arc<dyn Persistence>, CoreError> {
    if database_url.starts_with("postgres") {
        let pool = sqlx::PgPool::connect(database_url).await?;
        crate::migrations::run_postgres(&pool)
            .await
            .map_err(|e| CoreError::Persistence {
                operation: "migrate".to_string(),
                details: e.to_string(),
            })?;
        Ok(Arc::new(PostgresPersistence::new(pool)))
    } else {
        Ok(Arc::new(SqlitePersistence::from_url(database_url).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_round_trip() {
        for scope in [MessageScope::Inbound, MessageScope::Outbound] {
            assert_eq!(scope.as_str().parse::<MessageScope>().unwrap(), scope);
        }
        assert!("sideways".parse::<MessageScope>().is_err());
    }

    #[test]
    fn test_expiry_cutoff_rejects_huge_timeout() {
        let err = expiry_cutoff(std::time::Duration::from_secs(10_000_000_000_000)).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        let cutoff = expiry_cutoff(std::time::Duration::from_secs(60)).unwrap();
        assert!(cutoff < Utc::now());
    }

    #[test]
    fn test_record_helpers() {
        let record = MessageRecord {
            id: 1,
            guid: "g".to_string(),
            session_id: "s".to_string(),
            scope: "outbound".to_string(),
            command: "sign-reply".to_string(),
            body: r#""Preparing""#.to_string(),
            value: Some("10%".to_string()),
            submit_time: Utc::now(),
            processing: false,
        };
        assert_eq!(record.message_scope(), Some(MessageScope::Outbound));
        assert_eq!(record.body_value().unwrap(), Value::from("Preparing"));

        let broken = MessageRecord {
            scope: "elsewhere".to_string(),
            body: "{".to_string(),
            ..record
        };
        assert_eq!(broken.message_scope(), None);
        assert!(broken.body_value().is_err());
    }
}
