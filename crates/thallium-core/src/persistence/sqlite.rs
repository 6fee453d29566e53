// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::debug;

use crate::error::CoreError;

use super::{
    JobRecord, JobStore, MessageRecord, MessageScope, MessageStore, NewJob, NewMessage,
    Persistence,
};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    ///
    /// The caller is responsible for running [`crate::migrations::run_sqlite`].
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// Creates parent directories and the database file if needed, then runs
    /// all migrations.
    ///
    /// ```ignore
    /// let persistence = SqlitePersistence::from_path(".data/thallium.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::Persistence {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::from_url(&url).await
    }

    /// Connect to a `sqlite:` URL and run migrations.
    ///
    /// In-memory databases are private to a connection, so they get a
    /// single connection that is never recycled.
    pub async fn from_url(url: &str) -> Result<Self, CoreError> {
        let mut options = SqlitePoolOptions::new().max_connections(5);
        if url.contains(":memory:") {
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options
            .connect(url)
            .await
            .map_err(|e| CoreError::Persistence {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        crate::migrations::run_sqlite(&pool)
            .await
            .map_err(|e| CoreError::Persistence {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }

    /// Underlying pool, for embedding products that share the database.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const MESSAGE_COLUMNS: &str =
    "id, guid, session_id, scope, command, body, value, submit_time, processing";

async fn insert_one<'e>(
    executor: impl sqlx::SqliteExecutor<'e>,
    message: &NewMessage,
) -> Result<MessageRecord, CoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO messages (guid, session_id, scope, command, body, value, submit_time, processing)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(&message.guid)
    .bind(&message.session_id)
    .bind(message.scope.as_str())
    .bind(&message.command)
    .bind(&message.body)
    .bind(&message.value)
    .bind(message.submit_time)
    .execute(executor)
    .await?;

    Ok(MessageRecord {
        id: result.last_insert_rowid(),
        guid: message.guid.clone(),
        session_id: message.session_id.clone(),
        scope: message.scope.as_str().to_string(),
        command: message.command.clone(),
        body: message.body.clone(),
        value: message.value.clone(),
        submit_time: message.submit_time,
        processing: false,
    })
}

#[async_trait::async_trait]
impl MessageStore for SqlitePersistence {
    async fn insert_message(&self, message: &NewMessage) -> Result<MessageRecord, CoreError> {
        insert_one(&self.pool, message).await
    }

    async fn insert_messages(
        &self,
        messages: &[NewMessage],
    ) -> Result<Vec<MessageRecord>, CoreError> {
        let mut tx = self.pool.begin().await?;
        let mut records = Vec::with_capacity(messages.len());
        for message in messages {
            records.push(insert_one(&mut *tx, message).await?);
        }
        tx.commit().await?;

        Ok(records)
    }

    async fn get_message(&self, guid: &str) -> Result<Option<MessageRecord>, CoreError> {
        let query = format!("SELECT {} FROM messages WHERE guid = ?", MESSAGE_COLUMNS);
        let record = sqlx::query_as::<_, MessageRecord>(&query)
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn delete_message(&self, id: i64) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_session_messages(
        &self,
        scope: MessageScope,
        session_id: &str,
    ) -> Result<Vec<MessageRecord>, CoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM messages
            WHERE scope = ? AND session_id = ?
            ORDER BY submit_time ASC, id ASC
            "#,
            MESSAGE_COLUMNS
        );
        let records = sqlx::query_as::<_, MessageRecord>(&query)
            .bind(scope.as_str())
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn list_unclaimed_messages(
        &self,
        scope: MessageScope,
    ) -> Result<Vec<MessageRecord>, CoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM messages
            WHERE scope = ? AND processing = 0
            ORDER BY submit_time ASC, id ASC
            "#,
            MESSAGE_COLUMNS
        );
        let records = sqlx::query_as::<_, MessageRecord>(&query)
            .bind(scope.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn claim_message(&self, id: i64) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET processing = 1
            WHERE id = ? AND processing = 0
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_messages_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE submit_time < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        debug!(removed = result.rows_affected(), "Deleted expired messages");
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl JobStore for SqlitePersistence {
    async fn insert_job(&self, job: &NewJob) -> Result<JobRecord, CoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (guid, session_id, request_guid, created_time, processing)
            VALUES (?, ?, ?, ?, 0)
            "#,
        )
        .bind(&job.guid)
        .bind(&job.session_id)
        .bind(&job.request_guid)
        .bind(job.created_time)
        .execute(&self.pool)
        .await?;

        Ok(JobRecord {
            id: result.last_insert_rowid(),
            guid: job.guid.clone(),
            session_id: job.session_id.clone(),
            request_guid: job.request_guid.clone(),
            created_time: job.created_time,
            processing: false,
        })
    }

    async fn get_job(&self, guid: &str) -> Result<Option<JobRecord>, CoreError> {
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            SELECT id, guid, session_id, request_guid, created_time, processing
            FROM jobs
            WHERE guid = ?
            "#,
        )
        .bind(guid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_job(&self, guid: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE guid = ?")
            .bind(guid)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_job_processing(&self, guid: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("UPDATE jobs SET processing = 1 WHERE guid = ?")
            .bind(guid)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_jobs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE created_time < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        debug!(removed = result.rows_affected(), "Deleted expired jobs");
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await;
        Ok(result.is_ok())
    }
}
