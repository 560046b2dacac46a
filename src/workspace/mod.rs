//! Durable workspace for chunked processing sessions.
//!
//! Each session lives in its own directory under the workspace base:
//!
//! ```text
//! <base>/<sanitized-id>/
//! ├── meta.json      session metadata and lock state
//! ├── input.txt      original input snapshot
//! ├── chunks/
//! │   ├── 001.json   one record per chunk
//! │   └── ...
//! └── final.json     aggregated final summary
//! ```
//!
//! # Concurrency
//!
//! I/O is synchronous and assumes a single active writer per conversation
//! id, coordinated only by the advisory [`SessionLock`]. There is no
//! transactional atomicity between a chunk write and the counter recompute
//! that follows it; counters are derivable state and the rescan on the next
//! write repairs them after a crash. Cleanup tolerates concurrent mutation
//! but does not retry a lost race.

mod lock;
mod types;

pub use lock::SessionLock;
pub use types::{ChunkRecord, ChunkStatus, Session, SessionStatus, MAX_CHUNK_RETRIES};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use humansize::{format_size, BINARY};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::WorkspaceConfig;

const META_FILE: &str = "meta.json";
const INPUT_FILE: &str = "input.txt";
const CHUNKS_DIR: &str = "chunks";
const FINAL_FILE: &str = "final.json";

/// Aggregated rollup persisted once processing converges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalSummary {
    pub summary: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub aggregated: Value,
    /// Counts at save time; failures do not block completion
    pub chunks_processed: usize,
    pub chunks_failed: usize,
}

/// Lightweight listing entry for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub conversation_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_chunks: usize,
    pub processed_chunks: usize,
}

/// Storage totals across all sessions.
#[derive(Debug, Clone)]
pub struct WorkspaceStats {
    pub session_count: usize,
    pub total_size: u64,
    pub oldest: Option<SessionSummary>,
}

impl WorkspaceStats {
    /// Human-readable total size
    pub fn size_human(&self) -> String {
        format_size(self.total_size, BINARY)
    }
}

/// Manager for workspace sessions. The sole mutator of on-disk session
/// state; construct one at startup and pass it by handle.
pub struct WorkspaceManager {
    base_dir: PathBuf,
    config: WorkspaceConfig,
}

impl WorkspaceManager {
    /// Create a manager rooted at the configured base directory,
    /// creating it if needed.
    pub fn new(config: WorkspaceConfig) -> Result<Self> {
        let base_dir = config.base_path();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create workspace base: {:?}", base_dir))?;
        debug!(base = %base_dir.display(), "workspace ready");
        Ok(Self { base_dir, config })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Restrict an id to `[A-Za-z0-9_-]` so it is safe as a path segment.
    pub fn sanitize_id(id: &str) -> String {
        let sanitized: String = id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized.is_empty() {
            "_".to_string()
        } else {
            sanitized
        }
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.base_dir.join(Self::sanitize_id(id))
    }

    fn chunk_path(&self, id: &str, chunk_num: usize) -> PathBuf {
        self.session_dir(id)
            .join(CHUNKS_DIR)
            .join(format!("{chunk_num:03}.json"))
    }

    // ── Session lifecycle ──────────────────────────────────────────────

    /// Create a session for `id`, or return the existing one unchanged if
    /// it is Active with no expired lock. An Active session whose lock has
    /// expired is marked Abandoned and replaced.
    ///
    /// Two processes racing to create a brand-new id can interleave; the
    /// loser's next call receives the winner's session. The lock is the
    /// only write coordination offered.
    pub fn create_session(
        &self,
        id: &str,
        original_input: &str,
        config: BTreeMap<String, String>,
    ) -> Result<Session> {
        if let Some(mut existing) = self.load_session(id) {
            if existing.status == SessionStatus::Active {
                if existing.is_lock_expired(self.config.lock_timeout_secs) {
                    warn!(conversation_id = %existing.conversation_id, "abandoning session with expired lock");
                    existing.status = SessionStatus::Abandoned;
                    self.save_session(&mut existing)?;
                } else {
                    debug!(conversation_id = %existing.conversation_id, "returning existing active session");
                    return Ok(existing);
                }
            }
        }

        let dir = self.session_dir(id);
        fs::create_dir_all(dir.join(CHUNKS_DIR))
            .with_context(|| format!("Failed to create session directory: {:?}", dir))?;

        if !original_input.is_empty() {
            fs::write(dir.join(INPUT_FILE), original_input)
                .with_context(|| format!("Failed to snapshot input for session {id}"))?;
        }

        let mut session = Session::new(id, original_input.len(), config);
        self.save_session(&mut session)?;

        info!(conversation_id = id, "session created");
        Ok(session)
    }

    /// Load session metadata. Unreadable or malformed metadata is treated
    /// as not found.
    pub fn load_session(&self, id: &str) -> Option<Session> {
        read_json(&self.session_dir(id).join(META_FILE))
    }

    pub fn session_exists(&self, id: &str) -> bool {
        self.session_dir(id).join(META_FILE).exists()
    }

    pub fn update_status(&self, id: &str, status: SessionStatus) -> Result<()> {
        let mut session = self
            .load_session(id)
            .with_context(|| format!("No session metadata for {id}"))?;
        session.status = status;
        self.save_session(&mut session)?;
        info!(conversation_id = id, ?status, "session status updated");
        Ok(())
    }

    fn save_session(&self, session: &mut Session) -> Result<()> {
        session.updated_at = Utc::now();
        let dir = self.session_dir(&session.conversation_id);
        write_json(&dir.join(META_FILE), session)
    }

    // ── Locking ────────────────────────────────────────────────────────

    /// Try to take the advisory lock. Succeeds if the session is unlocked,
    /// the current lock has expired, or `owner` already holds it.
    pub fn acquire_lock(&self, id: &str, owner: &str) -> bool {
        let Some(mut session) = self.load_session(id) else {
            return false;
        };

        if let Some(lock) = &session.lock {
            if !lock.is_expired(self.config.lock_timeout_secs) && !lock.held_by(owner) {
                warn!(conversation_id = id, holder = %lock.owner, "session locked by another owner");
                return false;
            }
        }

        session.lock = Some(SessionLock::new(owner));
        match self.save_session(&mut session) {
            Ok(()) => {
                debug!(conversation_id = id, owner, "lock acquired");
                true
            }
            Err(e) => {
                warn!(conversation_id = id, error = %e, "failed to persist lock");
                false
            }
        }
    }

    /// Release the lock; only the current holder may release.
    pub fn release_lock(&self, id: &str, owner: &str) -> bool {
        let Some(mut session) = self.load_session(id) else {
            return false;
        };

        match &session.lock {
            Some(lock) if lock.held_by(owner) => {
                session.lock = None;
                match self.save_session(&mut session) {
                    Ok(()) => {
                        debug!(conversation_id = id, owner, "lock released");
                        true
                    }
                    Err(e) => {
                        warn!(conversation_id = id, error = %e, "failed to persist unlock");
                        false
                    }
                }
            }
            _ => {
                warn!(conversation_id = id, owner, "cannot release lock not held");
                false
            }
        }
    }

    // ── Chunk records ──────────────────────────────────────────────────

    /// Persist (or overwrite) a chunk record, stamping `created_at` on
    /// first write and `completed_at` when the record transitions to Done,
    /// then recompute the parent session's counters by rescanning every
    /// chunk record. The rescan is O(chunks) but correct after any crash.
    pub fn save_chunk(&self, id: &str, chunk_num: usize, mut record: ChunkRecord) -> Result<()> {
        let chunks_dir = self.session_dir(id).join(CHUNKS_DIR);
        if !chunks_dir.exists() {
            anyhow::bail!("No chunks directory for session {id}");
        }

        record.chunk_num = chunk_num;
        let now = Utc::now();
        if record.created_at.is_none() {
            record.created_at = Some(now);
        }
        if record.status == ChunkStatus::Done && record.completed_at.is_none() {
            record.completed_at = Some(now);
        }

        write_json(&self.chunk_path(id, chunk_num), &record)?;
        debug!(conversation_id = id, chunk_num, status = ?record.status, "chunk saved");

        if let Some(mut session) = self.load_session(id) {
            let chunks = self.load_all_chunks(id);
            session.total_chunks = session.total_chunks.max(chunk_num);
            session.processed_chunks = chunks
                .iter()
                .filter(|c| c.status == ChunkStatus::Done)
                .count();
            session.failed_chunks = chunks
                .iter()
                .filter(|c| c.status == ChunkStatus::Failed)
                .count();
            self.save_session(&mut session)?;
        }

        Ok(())
    }

    /// Load one chunk record; unreadable records are treated as not found.
    pub fn load_chunk(&self, id: &str, chunk_num: usize) -> Option<ChunkRecord> {
        read_json(&self.chunk_path(id, chunk_num))
    }

    /// Load all chunk records, ordered by chunk number. Malformed records
    /// are logged and skipped.
    pub fn load_all_chunks(&self, id: &str) -> Vec<ChunkRecord> {
        let chunks_dir = self.session_dir(id).join(CHUNKS_DIR);
        let Ok(entries) = fs::read_dir(&chunks_dir) else {
            return Vec::new();
        };

        let mut chunks: Vec<ChunkRecord> = entries
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|e| read_json(&e.path()))
            .collect();
        chunks.sort_by_key(|c| c.chunk_num);
        chunks
    }

    /// Chunk numbers still awaiting work: Pending or Failed with retries
    /// left. Callers increment `retry_count` themselves before re-dispatch;
    /// chunks at the ceiling stay out of this list permanently.
    pub fn get_pending_chunks(&self, id: &str) -> Vec<usize> {
        self.load_all_chunks(id)
            .iter()
            .filter(|c| c.is_retryable())
            .map(|c| c.chunk_num)
            .collect()
    }

    // ── Final summary ──────────────────────────────────────────────────

    /// Persist the aggregated rollup and mark the session Completed,
    /// regardless of outstanding failures: partial results remain useful.
    pub fn save_final_summary(
        &self,
        id: &str,
        summary: &str,
        aggregated: Value,
    ) -> Result<FinalSummary> {
        let chunks = self.load_all_chunks(id);
        let final_summary = FinalSummary {
            summary: summary.to_string(),
            created_at: Utc::now(),
            aggregated,
            chunks_processed: chunks
                .iter()
                .filter(|c| c.status == ChunkStatus::Done)
                .count(),
            chunks_failed: chunks
                .iter()
                .filter(|c| c.status == ChunkStatus::Failed)
                .count(),
        };

        write_json(&self.session_dir(id).join(FINAL_FILE), &final_summary)?;
        self.update_status(id, SessionStatus::Completed)?;

        info!(conversation_id = id, "final summary saved");
        Ok(final_summary)
    }

    pub fn load_final_summary(&self, id: &str) -> Option<FinalSummary> {
        read_json(&self.session_dir(id).join(FINAL_FILE))
    }

    // ── Cleanup & stats ────────────────────────────────────────────────

    /// Reclaim stale and excess sessions. Three passes:
    /// directories without readable metadata are deleted outright; sessions
    /// older than the age limit are deleted when eligible; among the
    /// survivors, the oldest by `updated_at` beyond the session cap are
    /// deleted under the same rule. Returns the number of sessions deleted.
    /// A session is eligible when `force` is set, it is not Active, or its
    /// lock has expired. Per-session failures are absorbed.
    pub fn cleanup(
        &self,
        max_age_hours: Option<u64>,
        max_sessions: Option<usize>,
        force: bool,
    ) -> usize {
        let max_age = max_age_hours.unwrap_or(self.config.max_age_hours);
        let max_sessions = max_sessions.unwrap_or(self.config.max_sessions);
        let cutoff = Utc::now() - Duration::hours(max_age as i64);
        let mut deleted = 0;

        let Ok(entries) = fs::read_dir(&self.base_dir) else {
            return 0;
        };

        let mut survivors: Vec<(PathBuf, Session)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match read_json::<Session>(&path.join(META_FILE)) {
                Some(session) => survivors.push((path, session)),
                None => {
                    // Orphaned directory; reclaim it
                    if remove_session_dir(&path) {
                        deleted += 1;
                    }
                }
            }
        }

        let mut remaining: Vec<(PathBuf, Session)> = Vec::new();
        for (path, session) in survivors {
            if session.created_at < cutoff && self.deletable(&session, force) {
                if remove_session_dir(&path) {
                    info!(conversation_id = %session.conversation_id, "deleted old session");
                    deleted += 1;
                    continue;
                }
            }
            remaining.push((path, session));
        }

        if remaining.len() > max_sessions {
            remaining.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at));
            for (path, session) in remaining.drain(max_sessions..) {
                if self.deletable(&session, force) && remove_session_dir(&path) {
                    info!(conversation_id = %session.conversation_id, "deleted excess session");
                    deleted += 1;
                }
            }
        }

        if deleted > 0 {
            info!(deleted, "cleanup complete");
        }
        deleted
    }

    fn deletable(&self, session: &Session, force: bool) -> bool {
        force
            || session.status != SessionStatus::Active
            || session.is_lock_expired(self.config.lock_timeout_secs)
    }

    /// List all sessions with readable metadata, oldest first.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let Ok(entries) = fs::read_dir(&self.base_dir) else {
            return Vec::new();
        };

        let mut sessions: Vec<SessionSummary> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| read_json::<Session>(&e.path().join(META_FILE)))
            .map(|s| SessionSummary {
                conversation_id: s.conversation_id,
                status: s.status,
                created_at: s.created_at,
                updated_at: s.updated_at,
                total_chunks: s.total_chunks,
                processed_chunks: s.processed_chunks,
            })
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    /// Total bytes used by all sessions.
    pub fn total_size_bytes(&self) -> u64 {
        dir_size(&self.base_dir)
    }

    /// Whether on-disk usage exceeds the configured cap.
    pub fn exceeds_size_limit(&self) -> bool {
        self.total_size_bytes() > self.config.max_total_size_mb * 1024 * 1024
    }

    pub fn stats(&self) -> WorkspaceStats {
        let sessions = self.list_sessions();
        WorkspaceStats {
            session_count: sessions.len(),
            total_size: self.total_size_bytes(),
            oldest: sessions.into_iter().next(),
        }
    }
}

/// Read and parse a JSON record; any failure is logged and maps to `None`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable record");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed record");
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).context("Failed to serialize record")?;
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

fn remove_session_dir(path: &Path) -> bool {
    match fs::remove_dir_all(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to delete session directory");
            false
        }
    }
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                dir_size(&path)
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}
