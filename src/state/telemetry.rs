//! Best-effort persistence of chat logs, match history and account records.
//!
//! The manager never awaits a store. It pushes [`TelemetryEvent`]s through a
//! [`TelemetryHandle`] (an unbounded channel, so emitting never blocks and
//! needs no runtime), and a background worker drains the channel into a
//! [`TelemetryStore`]. Store failures are logged and dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::chat::ChatEntry;
use super::session::MatchDocument;

/// Win/loss increment for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecordDelta {
    pub username: String,
    pub display_name: String,
    pub is_win: bool,
    pub match_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    RecordChat(ChatEntry),
    UpsertMatch(MatchDocument),
    IncrementUserRecord(UserRecordDelta),
}

impl TelemetryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecordChat(_) => "record_chat",
            Self::UpsertMatch(_) => "upsert_match",
            Self::IncrementUserRecord(_) => "increment_user_record",
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry store unavailable: {0}")]
    Unavailable(String),

    #[error("telemetry record rejected: {0}")]
    Rejected(String),
}

/// Persistence backend for telemetry.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn record_chat_message(&self, entry: &ChatEntry) -> Result<(), TelemetryError>;

    async fn upsert_match_history(&self, document: &MatchDocument) -> Result<(), TelemetryError>;

    async fn increment_user_record(&self, delta: &UserRecordDelta) -> Result<(), TelemetryError>;
}

/// Sending side held by the manager.
#[derive(Debug, Clone, Default)]
pub struct TelemetryHandle {
    tx: Option<mpsc::UnboundedSender<TelemetryEvent>>,
}

impl TelemetryHandle {
    /// A handle that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// A handle plus the receiving end, for callers running their own worker.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Queue an event. Never blocks; a closed channel is logged.
    pub fn emit(&self, event: TelemetryEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        let kind = event.kind();
        if tx.send(event).is_err() {
            tracing::warn!(kind, "telemetry worker gone, event dropped");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }
}

/// Drain `rx` into `store` until every handle is dropped.
pub async fn run_telemetry_worker(
    mut rx: mpsc::UnboundedReceiver<TelemetryEvent>,
    store: Arc<dyn TelemetryStore>,
) {
    while let Some(event) = rx.recv().await {
        let kind = event.kind();
        let result = match &event {
            TelemetryEvent::RecordChat(entry) => store.record_chat_message(entry).await,
            TelemetryEvent::UpsertMatch(document) => store.upsert_match_history(document).await,
            TelemetryEvent::IncrementUserRecord(delta) => {
                store.increment_user_record(delta).await
            }
        };

        if let Err(e) = result {
            tracing::warn!(kind, error = %e, "telemetry write failed");
        }
    }
    tracing::debug!("telemetry worker stopped");
}

/// Spawn a worker on the current tokio runtime.
pub fn spawn_telemetry_worker(store: Arc<dyn TelemetryStore>) -> (TelemetryHandle, JoinHandle<()>) {
    let (handle, rx) = TelemetryHandle::channel();
    let task = tokio::spawn(run_telemetry_worker(rx, store));
    (handle, task)
}

/// Aggregated per-account results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStats {
    pub display_name: String,
    pub wins: u32,
    pub losses: u32,
    pub games_played: u32,
}

#[derive(Debug, Default)]
struct MemoryInner {
    chat_logs: Vec<ChatEntry>,
    matches: HashMap<String, MatchDocument>,
    users: HashMap<String, UserStats>,
}

/// In-process store for development and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTelemetryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl InMemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, TelemetryError> {
        self.inner
            .lock()
            .map_err(|_| TelemetryError::Unavailable("store lock poisoned".to_string()))
    }

    pub fn chat_count(&self) -> usize {
        self.lock().map(|i| i.chat_logs.len()).unwrap_or(0)
    }

    pub fn match_document(&self, id: &str) -> Option<MatchDocument> {
        self.lock().ok()?.matches.get(id).cloned()
    }

    pub fn match_count(&self) -> usize {
        self.lock().map(|i| i.matches.len()).unwrap_or(0)
    }

    pub fn user_stats(&self, username: &str) -> Option<UserStats> {
        self.lock().ok()?.users.get(&normalize_username(username)).cloned()
    }
}

fn normalize_username(username: &str) -> String {
    username
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(32)
        .collect()
}

#[async_trait]
impl TelemetryStore for InMemoryTelemetryStore {
    async fn record_chat_message(&self, entry: &ChatEntry) -> Result<(), TelemetryError> {
        self.lock()?.chat_logs.push(entry.clone());
        Ok(())
    }

    async fn upsert_match_history(&self, document: &MatchDocument) -> Result<(), TelemetryError> {
        if document.id.trim().is_empty() {
            return Err(TelemetryError::Rejected("match document without id".to_string()));
        }
        self.lock()?
            .matches
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn increment_user_record(&self, delta: &UserRecordDelta) -> Result<(), TelemetryError> {
        let username = normalize_username(&delta.username);
        if username.is_empty() {
            return Err(TelemetryError::Rejected("empty username".to_string()));
        }

        let mut inner = self.lock()?;
        let stats = inner.users.entry(username).or_insert_with(|| UserStats {
            display_name: delta.display_name.clone(),
            ..UserStats::default()
        });
        if delta.is_win {
            stats.wins += 1;
        } else {
            stats.losses += 1;
        }
        stats.games_played = stats.wins + stats.losses;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chat_entry() -> ChatEntry {
        ChatEntry {
            id: "c1".to_string(),
            room_id: "lobby".to_string(),
            player_id: "p1".to_string(),
            player_name: "Alice".to_string(),
            account_username: None,
            message: "hello".to_string(),
            sent_at: Utc::now(),
        }
    }

    fn delta(username: &str, is_win: bool) -> UserRecordDelta {
        UserRecordDelta {
            username: username.to_string(),
            display_name: username.to_string(),
            is_win,
            match_id: "m1".to_string(),
        }
    }

    struct FailingStore;

    #[async_trait]
    impl TelemetryStore for FailingStore {
        async fn record_chat_message(&self, _: &ChatEntry) -> Result<(), TelemetryError> {
            Err(TelemetryError::Unavailable("down".to_string()))
        }

        async fn upsert_match_history(&self, _: &MatchDocument) -> Result<(), TelemetryError> {
            Err(TelemetryError::Unavailable("down".to_string()))
        }

        async fn increment_user_record(&self, _: &UserRecordDelta) -> Result<(), TelemetryError> {
            Err(TelemetryError::Unavailable("down".to_string()))
        }
    }

    #[test]
    fn test_disabled_handle_is_silent() {
        let handle = TelemetryHandle::disabled();
        assert!(!handle.is_enabled());
        handle.emit(TelemetryEvent::RecordChat(chat_entry()));
    }

    #[test]
    fn test_emit_without_runtime() {
        let (handle, mut rx) = TelemetryHandle::channel();
        handle.emit(TelemetryEvent::IncrementUserRecord(delta("alice", true)));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind(), "increment_user_record");
    }

    #[tokio::test]
    async fn test_worker_drains_into_store() {
        let store = InMemoryTelemetryStore::new();
        let (handle, task) = spawn_telemetry_worker(Arc::new(store.clone()));

        handle.emit(TelemetryEvent::RecordChat(chat_entry()));
        handle.emit(TelemetryEvent::IncrementUserRecord(delta("Alice", true)));
        handle.emit(TelemetryEvent::IncrementUserRecord(delta("alice", false)));
        drop(handle);
        task.await.unwrap();

        assert_eq!(store.chat_count(), 1);
        let stats = store.user_stats("alice").unwrap();
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.games_played, 2);
    }

    #[tokio::test]
    async fn test_worker_survives_store_failures() {
        let (handle, task) = spawn_telemetry_worker(Arc::new(FailingStore));

        handle.emit(TelemetryEvent::RecordChat(chat_entry()));
        handle.emit(TelemetryEvent::IncrementUserRecord(delta("alice", true)));
        drop(handle);

        // Worker logs and keeps going until the channel closes.
        task.await.unwrap();
    }

    #[test]
    fn test_emit_after_worker_gone() {
        let (handle, rx) = TelemetryHandle::channel();
        drop(rx);
        handle.emit(TelemetryEvent::RecordChat(chat_entry()));
    }
}
