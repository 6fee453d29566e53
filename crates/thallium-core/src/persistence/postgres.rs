// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL persistence operations for thallium-core.
//!
//! Provides the durable storage access functions for messages and jobs.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::CoreError;

use super::{
    JobRecord, JobStore, MessageRecord, MessageScope, MessageStore, NewJob, NewMessage,
    Persistence,
};

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Message Operations
// ============================================================================

/// Insert a message, returning the stored row.
pub async fn insert_message<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    message: &NewMessage,
) -> Result<MessageRecord, CoreError> {
    let record = sqlx::query_as::<_, MessageRecord>(
        r#"
        INSERT INTO messages (guid, session_id, scope, command, body, value, submit_time, processing)
        VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
        RETURNING id, guid, session_id, scope, command, body, value, submit_time, processing
        "#,
    )
    .bind(&message.guid)
    .bind(&message.session_id)
    .bind(message.scope.as_str())
    .bind(&message.command)
    .bind(&message.body)
    .bind(&message.value)
    .bind(message.submit_time)
    .fetch_one(executor)
    .await?;

    Ok(record)
}

/// Insert a batch of messages in one transaction.
pub async fn insert_messages(
    pool: &PgPool,
    messages: &[NewMessage],
) -> Result<Vec<MessageRecord>, CoreError> {
    let mut tx = pool.begin().await?;
    let mut records = Vec::with_capacity(messages.len());
    for message in messages {
        records.push(insert_message(&mut *tx, message).await?);
    }
    tx.commit().await?;

    Ok(records)
}

/// Get a message by guid.
pub async fn get_message(pool: &PgPool, guid: &str) -> Result<Option<MessageRecord>, CoreError> {
    let record = sqlx::query_as::<_, MessageRecord>(
        r#"
        SELECT id, guid, session_id, scope, command, body, value, submit_time, processing
        FROM messages
        WHERE guid = $1
        "#,
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Delete a message by id.
pub async fn delete_message(pool: &PgPool, id: i64) -> Result<bool, CoreError> {
    let result = sqlx::query("DELETE FROM messages WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// List one session's messages of a scope, oldest first.
pub async fn list_session_messages(
    pool: &PgPool,
    scope: MessageScope,
    session_id: &str,
) -> Result<Vec<MessageRecord>, CoreError> {
    let records = sqlx::query_as::<_, MessageRecord>(
        r#"
        SELECT id, guid, session_id, scope, command, body, value, submit_time, processing
        FROM messages
        WHERE scope = $1 AND session_id = $2
        ORDER BY submit_time ASC, id ASC
        "#,
    )
    .bind(scope.as_str())
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// List unclaimed messages of a scope, oldest first.
pub async fn list_unclaimed_messages(
    pool: &PgPool,
    scope: MessageScope,
) -> Result<Vec<MessageRecord>, CoreError> {
    let records = sqlx::query_as::<_, MessageRecord>(
        r#"
        SELECT id, guid, session_id, scope, command, body, value, submit_time, processing
        FROM messages
        WHERE scope = $1 AND processing = FALSE
        ORDER BY submit_time ASC, id ASC
        "#,
    )
    .bind(scope.as_str())
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Claim a message if nobody else has.
pub async fn claim_message(pool: &PgPool, id: i64) -> Result<bool, CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE messages
        SET processing = TRUE
        WHERE id = $1 AND processing = FALSE
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete messages submitted before `cutoff`.
pub async fn delete_messages_older_than(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, CoreError> {
    let result = sqlx::query("DELETE FROM messages WHERE submit_time < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// ============================================================================
// Job Operations
// ============================================================================

/// Insert a job, returning the stored row.
pub async fn insert_job(pool: &PgPool, job: &NewJob) -> Result<JobRecord, CoreError> {
    let record = sqlx::query_as::<_, JobRecord>(
        r#"
        INSERT INTO jobs (guid, session_id, request_guid, created_time, processing)
        VALUES ($1, $2, $3, $4, FALSE)
        RETURNING id, guid, session_id, request_guid, created_time, processing
        "#,
    )
    .bind(&job.guid)
    .bind(&job.session_id)
    .bind(&job.request_guid)
    .bind(job.created_time)
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Get a job by guid.
pub async fn get_job(pool: &PgPool, guid: &str) -> Result<Option<JobRecord>, CoreError> {
    let record = sqlx::query_as::<_, JobRecord>(
        r#"
        SELECT id, guid, session_id, request_guid, created_time, processing
        FROM jobs
        WHERE guid = $1
        "#,
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Delete a job by guid.
pub async fn delete_job(pool: &PgPool, guid: &str) -> Result<bool, CoreError> {
    let result = sqlx::query("DELETE FROM jobs WHERE guid = $1")
        .bind(guid)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a job as processing.
pub async fn set_job_processing(pool: &PgPool, guid: &str) -> Result<bool, CoreError> {
    let result = sqlx::query("UPDATE jobs SET processing = TRUE WHERE guid = $1")
        .bind(guid)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete jobs created before `cutoff`.
pub async fn delete_jobs_older_than(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, CoreError> {
    let result = sqlx::query("DELETE FROM jobs WHERE created_time < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Check database connectivity.
pub async fn health_check_db(pool: &PgPool) -> Result<bool, CoreError> {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(pool).await;
    Ok(result.is_ok())
}

#[async_trait::async_trait]
impl MessageStore for PostgresPersistence {
    async fn insert_message(&self, message: &NewMessage) -> Result<MessageRecord, CoreError> {
        insert_message(&self.pool, message).await
    }

    async fn insert_messages(
        &self,
        messages: &[NewMessage],
    ) -> Result<Vec<MessageRecord>, CoreError> {
        insert_messages(&self.pool, messages).await
    }

    async fn get_message(&self, guid: &str) -> Result<Option<MessageRecord>, CoreError> {
        get_message(&self.pool, guid).await
    }

    async fn delete_message(&self, id: i64) -> Result<bool, CoreError> {
        delete_message(&self.pool, id).await
    }

    async fn list_session_messages(
        &self,
        scope: MessageScope,
        session_id: &str,
    ) -> Result<Vec<MessageRecord>, CoreError> {
        list_session_messages(&self.pool, scope, session_id).await
    }

    async fn list_unclaimed_messages(
        &self,
        scope: MessageScope,
    ) -> Result<Vec<MessageRecord>, CoreError> {
        list_unclaimed_messages(&self.pool, scope).await
    }

    async fn claim_message(&self, id: i64) -> Result<bool, CoreError> {
        claim_message(&self.pool, id).await
    }

    async fn delete_messages_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError> {
        delete_messages_older_than(&self.pool, cutoff).await
    }
}

#[async_trait::async_trait]
impl JobStore for PostgresPersistence {
    async fn insert_job(&self, job: &NewJob) -> Result<JobRecord, CoreError> {
        insert_job(&self.pool, job).await
    }

    async fn get_job(&self, guid: &str) -> Result<Option<JobRecord>, CoreError> {
        get_job(&self.pool, guid).await
    }

    async fn delete_job(&self, guid: &str) -> Result<bool, CoreError> {
        delete_job(&self.pool, guid).await
    }

    async fn set_job_processing(&self, guid: &str) -> Result<bool, CoreError> {
        set_job_processing(&self.pool, guid).await
    }

    async fn delete_jobs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError> {
        delete_jobs_older_than(&self.pool, cutoff).await
    }
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn health_check_db(&self) -> Result<bool, CoreError> {
        health_check_db(&self.pool).await
    }
}
