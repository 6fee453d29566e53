// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for thallium-sdk tests against a real server.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use thallium_core::collaborators::{
    Collaborators, Document, DocumentRepository, DocumentScanner, DocumentSigner, MailImporter,
};
use thallium_core::persistence::SqlitePersistence;

/// Fresh in-memory SQLite store with migrations applied.
pub async fn memory_store() -> Arc<SqlitePersistence> {
    Arc::new(
        SqlitePersistence::from_url("sqlite::memory:")
            .await
            .expect("Failed to create in-memory store"),
    )
}

/// Document subsystem stand-in that records signed documents.
#[derive(Default)]
pub struct Documents {
    signed: Mutex<Vec<i64>>,
}

impl Documents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn signed(&self) -> Vec<i64> {
        self.signed.lock().unwrap().clone()
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            documents: self.clone(),
            signer: self.clone(),
            mail: self.clone(),
            scanner: self.clone(),
        }
    }
}

#[async_trait]
impl DocumentRepository for Documents {
    async fn load_document(&self, id: i64, guid: &str) -> anyhow::Result<Document> {
        Ok(Document {
            id,
            guid: guid.to_string(),
            content: Vec::new(),
        })
    }
}

#[async_trait]
impl DocumentSigner for Documents {
    async fn sign(&self, document: &Document) -> anyhow::Result<()> {
        self.signed.lock().unwrap().push(document.id);
        Ok(())
    }
}

#[async_trait]
impl MailImporter for Documents {
    async fn import_mail(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl DocumentScanner for Documents {
    async fn scan(&self, _request: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Rows left in `table`.
pub async fn row_count(store: &SqlitePersistence, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(store.pool())
        .await
        .unwrap()
}
