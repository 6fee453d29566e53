// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job creation, current-job correlation and job expiry.
//!
//! A job links a handler run to the session that should receive its progress
//! messages. The tracker keeps a single "current job" pointer: the dispatcher
//! handles one message at a time per tracker, so one pointer per worker is
//! enough.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use thallium_protocol::{generate_guid, is_valid_guid};
use tracing::{debug, info, instrument};

use crate::error::{CoreError, Result};
use crate::persistence::{JobRecord, JobStore, NewJob, expiry_cutoff};

/// Tracks jobs for one request context.
pub struct JobTracker {
    store: Arc<dyn JobStore>,
    current_job: Mutex<Option<String>>,
}

impl JobTracker {
    /// Create a tracker without running the expiry sweep.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            current_job: Mutex::new(None),
        }
    }

    /// Create a tracker and remove jobs older than `timeout`.
    ///
    /// Fails if the sweep fails.
    pub async fn open(store: Arc<dyn JobStore>, timeout: Duration) -> Result<Self> {
        let tracker = Self::new(store);
        tracker.remove_expired_jobs(timeout).await?;
        Ok(tracker)
    }

    /// Create a job row and return its guid.
    ///
    /// `session_id`, when given, must be non-empty; `request_guid`, when
    /// given, must be a valid GUID.
    #[instrument(skip(self))]
    pub async fn create_job(
        &self,
        session_id: Option<&str>,
        request_guid: Option<&str>,
    ) -> Result<String> {
        if let Some(session_id) = session_id
            && session_id.trim().is_empty()
        {
            return Err(CoreError::validation("session_id", "must not be empty"));
        }
        if let Some(request_guid) = request_guid
            && !is_valid_guid(request_guid)
        {
            return Err(CoreError::validation(
                "request_guid",
                format!("'{}' is not a valid guid", request_guid),
            ));
        }

        let job = NewJob {
            guid: generate_guid(),
            session_id: session_id.map(str::to_string),
            request_guid: request_guid.map(str::to_string),
            created_time: Utc::now(),
        };
        let record = self.store.insert_job(&job).await?;

        debug!(job_guid = %record.guid, "Job created");
        Ok(record.guid)
    }

    /// Delete a job, clearing the current-job pointer if it pointed at it.
    #[instrument(skip(self))]
    pub async fn delete_job(&self, guid: &str) -> Result<bool> {
        let deleted = self.store.delete_job(guid).await?;

        let mut current = self.lock_current();
        if current.as_deref() == Some(guid) {
            *current = None;
        }

        Ok(deleted)
    }

    pub async fn get_job(&self, guid: &str) -> Result<Option<JobRecord>> {
        self.store.get_job(guid).await
    }

    pub fn set_current_job(&self, guid: &str) {
        *self.lock_current() = Some(guid.to_string());
    }

    pub fn current_job(&self) -> Option<String> {
        self.lock_current().clone()
    }

    pub fn has_current_job(&self) -> bool {
        self.lock_current().is_some()
    }

    pub fn clear_current_job(&self) {
        *self.lock_current() = None;
    }

    /// Mark a job as processing, defaulting to the current job.
    #[instrument(skip(self))]
    pub async fn set_job_in_processing(&self, guid: Option<&str>) -> Result<()> {
        let guid = match guid {
            Some(guid) => guid.to_string(),
            None => self
                .current_job()
                .ok_or_else(|| CoreError::validation("job_guid", "no job given and none current"))?,
        };

        if !self.store.set_job_processing(&guid).await? {
            return Err(CoreError::validation(
                "job_guid",
                format!("job '{}' does not exist", guid),
            ));
        }

        Ok(())
    }

    /// Session of the current job, if a job is current and has one.
    pub async fn current_session(&self) -> Result<Option<String>> {
        let Some(guid) = self.current_job() else {
            return Ok(None);
        };

        Ok(self
            .store
            .get_job(&guid)
            .await?
            .and_then(|job| job.session_id))
    }

    /// Delete jobs created more than `timeout` ago.
    pub async fn remove_expired_jobs(&self, timeout: Duration) -> Result<u64> {
        let removed = self
            .store
            .delete_jobs_older_than(expiry_cutoff(timeout)?)
            .await?;

        if removed > 0 {
            info!(removed, "Removed expired jobs");
        }
        Ok(removed)
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.current_job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqlitePersistence;

    async fn test_store() -> Arc<SqlitePersistence> {
        Arc::new(
            SqlitePersistence::from_url("sqlite::memory:")
                .await
                .expect("Failed to create in-memory store"),
        )
    }

    #[tokio::test]
    async fn test_create_job_returns_valid_guid() {
        let store = test_store().await;
        let tracker = JobTracker::new(store.clone());

        let request_guid = generate_guid();
        let guid = tracker
            .create_job(Some("session-a"), Some(&request_guid))
            .await
            .unwrap();
        assert!(is_valid_guid(&guid));

        let job = store.get_job(&guid).await.unwrap().unwrap();
        assert_eq!(job.session_id.as_deref(), Some("session-a"));
        assert_eq!(job.request_guid.as_deref(), Some(request_guid.as_str()));
        assert!(!job.processing);
    }

    #[tokio::test]
    async fn test_create_job_without_arguments() {
        let tracker = JobTracker::new(test_store().await);
        let guid = tracker.create_job(None, None).await.unwrap();
        assert!(is_valid_guid(&guid));
    }

    #[tokio::test]
    async fn test_create_job_validates_arguments() {
        let tracker = JobTracker::new(test_store().await);

        let err = tracker.create_job(Some(""), None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "session_id"));

        let err = tracker
            .create_job(Some("session-a"), Some("not-a-guid"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "request_guid"));
    }

    #[tokio::test]
    async fn test_current_job_pointer() {
        let tracker = JobTracker::new(test_store().await);
        assert!(!tracker.has_current_job());
        assert!(tracker.current_job().is_none());

        tracker.set_current_job("abc");
        assert!(tracker.has_current_job());
        assert_eq!(tracker.current_job().as_deref(), Some("abc"));

        tracker.clear_current_job();
        assert!(!tracker.has_current_job());
    }

    #[tokio::test]
    async fn test_delete_current_job_clears_pointer() {
        let tracker = JobTracker::new(test_store().await);

        let current = tracker.create_job(Some("s"), None).await.unwrap();
        let other = tracker.create_job(Some("s"), None).await.unwrap();
        tracker.set_current_job(&current);

        assert!(tracker.delete_job(&other).await.unwrap());
        assert_eq!(tracker.current_job(), Some(current.clone()));

        assert!(tracker.delete_job(&current).await.unwrap());
        assert!(tracker.current_job().is_none());
        assert!(tracker.get_job(&current).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_job_in_processing_defaults_to_current() {
        let store = test_store().await;
        let tracker = JobTracker::new(store.clone());

        assert!(tracker.set_job_in_processing(None).await.is_err());

        let guid = tracker.create_job(Some("s"), None).await.unwrap();
        tracker.set_current_job(&guid);
        tracker.set_job_in_processing(None).await.unwrap();
        assert!(store.get_job(&guid).await.unwrap().unwrap().processing);

        let err = tracker
            .set_job_in_processing(Some(&generate_guid()))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_current_session() {
        let tracker = JobTracker::new(test_store().await);
        assert_eq!(tracker.current_session().await.unwrap(), None);

        let guid = tracker.create_job(Some("session-z"), None).await.unwrap();
        tracker.set_current_job(&guid);
        assert_eq!(
            tracker.current_session().await.unwrap().as_deref(),
            Some("session-z")
        );

        let anonymous = tracker.create_job(None, None).await.unwrap();
        tracker.set_current_job(&anonymous);
        assert_eq!(tracker.current_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_sweeps_expired_jobs() {
        let store = test_store().await;
        let old = NewJob {
            guid: generate_guid(),
            session_id: None,
            request_guid: None,
            created_time: Utc::now() - chrono::Duration::seconds(301),
        };
        let young = NewJob {
            guid: generate_guid(),
            created_time: Utc::now() - chrono::Duration::seconds(5),
            ..old.clone()
        };
        store.insert_job(&old).await.unwrap();
        store.insert_job(&young).await.unwrap();

        JobTracker::open(store.clone(), Duration::from_secs(300))
            .await
            .unwrap();

        assert!(store.get_job(&old.guid).await.unwrap().is_none());
        assert!(store.get_job(&young.guid).await.unwrap().is_some());
    }
}
