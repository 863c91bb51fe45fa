//! Knowledge documents and the stores they come from.
//!
//! A namespace is the full document set of one agent. Documents are fetched
//! from an [`OriginStore`] (slow, authoritative) and kept in a
//! [`CacheStore`] (fast, shared between processes).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;

/// A normalised reference document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub filename: String,
    pub content: String,
    pub byte_size: usize,
    pub source_timestamp: DateTime<Utc>,
}

impl Document {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            filename: filename.into(),
            byte_size: content.len(),
            content,
            source_timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.source_timestamp = ts;
        self
    }
}

/// A raw file as returned by the origin store.
#[derive(Debug, Clone)]
pub struct OriginFile {
    pub filename: String,
    pub mime_type: String,
    pub content: Vec<u8>,
    pub modified: DateTime<Utc>,
}

/// The authoritative, expensive document source.
#[async_trait]
pub trait OriginStore: Send + Sync {
    /// The store name (e.g., "fs", "drive").
    fn name(&self) -> &str;

    /// Fetch every file of a namespace.
    async fn fetch_namespace(&self, namespace: &str) -> Result<Vec<OriginFile>, KnowledgeError>;
}

/// An external key-value cache (Redis-like) holding serialised payloads.
///
/// Entries written through this trait never expire on their own.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>, KnowledgeError>;

    async fn set(&self, key: &str, value: String) -> Result<(), KnowledgeError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, KnowledgeError>;
}
