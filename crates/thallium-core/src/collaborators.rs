// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! External collaborators invoked by command handlers.
//!
//! The document store, the signer, the mail importer and the scanner live
//! outside the messaging subsystem. Products embedding thallium-core plug
//! their implementations in through [`Collaborators`].

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;

/// A document loaded for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: i64,
    pub guid: String,
    pub content: Vec<u8>,
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Load a document by id. The guid must match the stored document.
    async fn load_document(&self, id: i64, guid: &str) -> Result<Document>;
}

#[async_trait]
pub trait DocumentSigner: Send + Sync {
    async fn sign(&self, document: &Document) -> Result<()>;
}

#[async_trait]
pub trait MailImporter: Send + Sync {
    async fn import_mail(&self) -> Result<()>;
}

#[async_trait]
pub trait DocumentScanner: Send + Sync {
    /// Scan a document. `request` is the filtered body of the scan message.
    async fn scan(&self, request: &Value) -> Result<()>;
}

/// The set of collaborators a dispatcher hands to command handlers.
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentRepository>,
    pub signer: Arc<dyn DocumentSigner>,
    pub mail: Arc<dyn MailImporter>,
    pub scanner: Arc<dyn DocumentScanner>,
}

impl Collaborators {
    /// Collaborators that fail every call.
    ///
    /// Used by the stand-alone server, which has no document subsystem.
    pub fn unavailable() -> Self {
        let unavailable = Arc::new(Unavailable);
        Self {
            documents: unavailable.clone(),
            signer: unavailable.clone(),
            mail: unavailable.clone(),
            scanner: unavailable,
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::unavailable()
    }
}

struct Unavailable;

#[async_trait]
impl DocumentRepository for Unavailable {
    async fn load_document(&self, id: i64, _guid: &str) -> Result<Document> {
        bail!("no document repository configured (document {})", id)
    }
}

#[async_trait]
impl DocumentSigner for Unavailable {
    async fn sign(&self, _document: &Document) -> Result<()> {
        bail!("no document signer configured")
    }
}

#[async_trait]
impl MailImporter for Unavailable {
    async fn import_mail(&self) -> Result<()> {
        bail!("no mail importer configured")
    }
}

#[async_trait]
impl DocumentScanner for Unavailable {
    async fn scan(&self, _request: &Value) -> Result<()> {
        bail!("no document scanner configured")
    }
}
