//! Conversation persistence: load/save, idempotent-processing bookkeeping, and
//! the 30-day cleanup sweep (§4.2).
//!
//! Mirrors the async, `Arc<dyn Trait>`-based collaborator shape the teacher uses
//! for [`crate::runtime::tool_protocol::ToolRegistry`]'s protocols, but adds a
//! per-conversation [`tokio::sync::Mutex`] since, unlike tool protocols, two
//! inbound events for the same conversation really can race.

use crate::runtime::error::OrchestrationError;
use crate::runtime::model::Conversation;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Conversation storage and idempotent-processing bookkeeping.
///
/// Every method that touches a single conversation's state takes its id so
/// implementations can serialise access per-conversation rather than behind
/// one global lock.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>, OrchestrationError>;

    async fn save(&self, conversation: &Conversation) -> Result<(), OrchestrationError>;

    /// True if `event_id` has already been recorded as processed for this
    /// conversation, per the non-duplication rule in §4.9.
    async fn is_processed(&self, conversation_id: &str, event_id: &str) -> Result<bool, OrchestrationError>;

    async fn mark_processed(&self, conversation_id: &str, event_id: &str) -> Result<(), OrchestrationError>;

    /// Remove conversations whose last activity is older than `max_age_secs`.
    /// Returns the number of conversations removed.
    async fn cleanup(&self, now: i64, max_age_secs: i64) -> Result<usize, OrchestrationError>;

    /// Serialise access to a single conversation for the duration of one
    /// coordinator turn, so that two inbound events racing on the same
    /// conversation id observe a single-writer ordering.
    async fn lock_conversation(&self, conversation_id: &str) -> Arc<Mutex<()>>;
}

const DEFAULT_CLEANUP_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

pub fn default_cleanup_max_age_secs() -> i64 {
    DEFAULT_CLEANUP_MAX_AGE_SECS
}

struct Record {
    conversation: Conversation,
    processed_events: HashSet<String>,
    last_activity: i64,
}

/// In-process store, suitable for a single coordinator instance or tests.
/// Each conversation gets its own `Mutex<()>` turnstile, handed out by
/// [`ConversationStore::lock_conversation`] and held for the lifetime of a
/// coordinator turn.
pub struct InMemoryConversationStore {
    records: Mutex<HashMap<String, Record>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>, OrchestrationError> {
        let records = self.records.lock().await;
        Ok(records.get(conversation_id).map(|r| r.conversation.clone()))
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), OrchestrationError> {
        let mut records = self.records.lock().await;
        let last_activity = conversation
            .messages
            .last()
            .map(|m| m.timestamp)
            .or(conversation.phase_started_at)
            .unwrap_or(0);
        let entry = records
            .entry(conversation.id.clone())
            .or_insert_with(|| Record {
                conversation: conversation.clone(),
                processed_events: HashSet::new(),
                last_activity,
            });
        entry.conversation = conversation.clone();
        entry.last_activity = last_activity;
        Ok(())
    }

    async fn is_processed(&self, conversation_id: &str, event_id: &str) -> Result<bool, OrchestrationError> {
        let records = self.records.lock().await;
        Ok(records
            .get(conversation_id)
            .map(|r| r.processed_events.contains(event_id))
            .unwrap_or(false))
    }

    async fn mark_processed(&self, conversation_id: &str, event_id: &str) -> Result<(), OrchestrationError> {
        let mut records = self.records.lock().await;
        let entry = records
            .entry(conversation_id.to_string())
            .or_insert_with(|| Record {
                conversation: Conversation::new(conversation_id, ""),
                processed_events: HashSet::new(),
                last_activity: 0,
            });
        entry.processed_events.insert(event_id.to_string());
        Ok(())
    }

    async fn cleanup(&self, now: i64, max_age_secs: i64) -> Result<usize, OrchestrationError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| now - r.last_activity < max_age_secs);
        Ok(before - records.len())
    }

    async fn lock_conversation(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// File-backed store: one JSON file per conversation under `root_dir`, plus a
/// sidecar `.processed` file listing seen event ids. Simpler than a database
/// and sufficient for a single coordinator process, matching the teacher's
/// preference for plain structs over an embedded-database dependency
/// (`CloudLLMConfig` has no such dependency either).
pub struct FileConversationStore {
    root_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileConversationStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn conversation_path(&self, conversation_id: &str) -> PathBuf {
        self.root_dir.join(format!("{}.json", sanitize(conversation_id)))
    }

    fn processed_path(&self, conversation_id: &str) -> PathBuf {
        self.root_dir
            .join(format!("{}.processed", sanitize(conversation_id)))
    }

    async fn ensure_root(&self) -> Result<(), OrchestrationError> {
        tokio::fs::create_dir_all(&self.root_dir)
            .await
            .map_err(|e| OrchestrationError::Persistence(format!("create store dir: {}", e)))
    }
}

/// Conversation ids come from event ids / tag values, which should already be
/// filesystem-safe, but untrusted external input is never trusted with a raw
/// path join.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>, OrchestrationError> {
        let path = self.conversation_path(conversation_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let conversation = serde_json::from_slice(&bytes)
                    .map_err(|e| OrchestrationError::Persistence(format!("decode conversation: {}", e)))?;
                Ok(Some(conversation))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OrchestrationError::Persistence(format!("read conversation: {}", e))),
        }
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), OrchestrationError> {
        self.ensure_root().await?;
        let path = self.conversation_path(&conversation.id);
        let bytes = serde_json::to_vec_pretty(conversation)
            .map_err(|e| OrchestrationError::Persistence(format!("encode conversation: {}", e)))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| OrchestrationError::Persistence(format!("write conversation: {}", e)))
    }

    async fn is_processed(&self, conversation_id: &str, event_id: &str) -> Result<bool, OrchestrationError> {
        let path = self.processed_path(conversation_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(contents.lines().any(|l| l == event_id)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(OrchestrationError::Persistence(format!("read processed log: {}", e))),
        }
    }

    async fn mark_processed(&self, conversation_id: &str, event_id: &str) -> Result<(), OrchestrationError> {
        self.ensure_root().await?;
        let path = self.processed_path(conversation_id);
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| OrchestrationError::Persistence(format!("open processed log: {}", e)))?;
        file.write_all(format!("{}\n", event_id).as_bytes())
            .await
            .map_err(|e| OrchestrationError::Persistence(format!("append processed log: {}", e)))
    }

    async fn cleanup(&self, now: i64, max_age_secs: i64) -> Result<usize, OrchestrationError> {
        self.ensure_root().await?;
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.root_dir)
            .await
            .map_err(|e| OrchestrationError::Persistence(format!("list store dir: {}", e)))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OrchestrationError::Persistence(format!("walk store dir: {}", e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            let modified_secs = metadata
                .modified()
                .ok()
                .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(now);
            if now - modified_secs >= max_age_secs {
                let _ = tokio::fs::remove_file(&path).await;
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    let _ = tokio::fs::remove_file(self.processed_path(stem)).await;
                }
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn lock_conversation(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips_a_conversation() {
        let store = InMemoryConversationStore::new();
        let mut convo = Conversation::new("c1", "title");
        convo.seed_system_message("sys", 0);
        store.save(&convo).await.unwrap();

        let loaded = store.load("c1").await.unwrap().unwrap();
        assert_eq!(loaded.title, "title");
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn in_memory_store_tracks_processed_events() {
        let store = InMemoryConversationStore::new();
        assert!(!store.is_processed("c1", "e1").await.unwrap());
        store.mark_processed("c1", "e1").await.unwrap();
        assert!(store.is_processed("c1", "e1").await.unwrap());
    }

    #[tokio::test]
    async fn in_memory_store_cleanup_removes_stale_conversations() {
        let store = InMemoryConversationStore::new();
        let mut convo = Conversation::new("c1", "title");
        convo.append(crate::runtime::model::Message::user("hi", 0, None));
        store.save(&convo).await.unwrap();

        let removed = store.cleanup(1_000_000, default_cleanup_max_age_secs()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.load("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_round_trips_via_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConversationStore::new(dir.path());
        let mut convo = Conversation::new("conv-1", "title");
        convo.seed_system_message("sys", 0);
        store.save(&convo).await.unwrap();

        let loaded = store.load("conv-1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "conv-1");

        store.mark_processed("conv-1", "evt-a").await.unwrap();
        assert!(store.is_processed("conv-1", "evt-a").await.unwrap());
        assert!(!store.is_processed("conv-1", "evt-b").await.unwrap());
    }

    #[tokio::test]
    async fn conversation_ids_are_sanitized_for_filesystem_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConversationStore::new(dir.path());
        let convo = Conversation::new("../../etc/passwd", "x");
        store.save(&convo).await.unwrap();
        assert!(!dir.path().join("../../etc/passwd.json").exists());
    }
}
