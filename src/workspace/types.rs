//! Persisted record types for workspace sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::lock::SessionLock;
use crate::chunker::TextChunk;

/// Retry ceiling; chunks that reach it are excluded from auto-retry.
pub const MAX_CHUNK_RETRIES: u32 = 3;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Abandoned,
}

/// Processing state of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Processing,
    Done,
    Failed,
    Skipped,
}

/// Durable metadata for one processing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Caller-supplied correlation key (unsanitized)
    pub conversation_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<SessionLock>,
    #[serde(default)]
    pub total_chunks: usize,
    #[serde(default)]
    pub processed_chunks: usize,
    #[serde(default)]
    pub failed_chunks: usize,
    #[serde(default)]
    pub original_input_length: usize,
    /// Opaque caller configuration carried with the session
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl Session {
    pub fn new(
        conversation_id: &str,
        original_input_length: usize,
        config: BTreeMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.to_string(),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
            lock: None,
            total_chunks: 0,
            processed_chunks: 0,
            failed_chunks: 0,
            original_input_length,
            config,
        }
    }

    /// True when a lock exists and its age exceeded the timeout. An
    /// unlocked session is idle, not expired.
    pub fn is_lock_expired(&self, timeout_secs: u64) -> bool {
        self.lock
            .as_ref()
            .is_some_and(|lock| lock.is_expired(timeout_secs))
    }
}

/// Durable record for one chunk of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_num: usize,
    pub status: ChunkStatus,
    #[serde(default)]
    pub tokens: usize,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChunkRecord {
    /// Fresh pending record.
    pub fn new(chunk_num: usize, content: String, tokens: usize) -> Self {
        Self {
            chunk_num,
            status: ChunkStatus::Pending,
            tokens,
            content,
            summary: String::new(),
            retry_count: 0,
            last_error: None,
            created_at: None,
            completed_at: None,
        }
    }

    /// Pending record seeded from a chunker output.
    pub fn from_chunk(chunk: &TextChunk) -> Self {
        Self::new(chunk.index, chunk.content.clone(), chunk.tokens)
    }

    /// Whether this chunk is still eligible for automatic retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, ChunkStatus::Pending | ChunkStatus::Failed)
            && self.retry_count < MAX_CHUNK_RETRIES
    }
}
