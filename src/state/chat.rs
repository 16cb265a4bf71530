//! Room chat: sanitizing, spam policy and history.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use super::config::ChatConfig;
use super::player::PlayerId;

/// One accepted chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    pub id: String,
    pub room_id: String,
    pub player_id: PlayerId,
    pub player_name: String,
    pub account_username: Option<String>,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatEntry {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "room_id": self.room_id,
            "player_id": self.player_id,
            "player_name": self.player_name,
            "message": self.message,
            "sent_at": self.sent_at.timestamp_millis()
        })
    }
}

/// Chat rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Message is empty.")]
    Empty,

    #[error("You are muted for {0} more seconds.")]
    Muted(i64),

    #[error("You are sending messages too quickly.")]
    RateLimited,

    #[error("Duplicate message.")]
    Duplicate,

    #[error("Message contains blocked content.")]
    Blocked,

    #[error("Message looks like spam.")]
    RepeatedCharacters,
}

/// Normalize a raw chat message.
///
/// Control characters are dropped, whitespace runs collapse to one space,
/// and the result is capped at `max_len` characters.
pub fn sanitize_message(raw: &str, max_len: usize) -> Option<String> {
    let cleaned: String = raw
        .split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let capped: String = cleaned.chars().take(max_len).collect();
    let capped = capped.trim_end().to_string();

    if capped.is_empty() {
        None
    } else {
        Some(capped)
    }
}

/// Length of the longest run of one repeated character.
fn longest_run(text: &str) -> usize {
    let mut best = 0;
    let mut run = 0;
    let mut prev = None;

    for c in text.chars().flat_map(char::to_lowercase) {
        if Some(c) == prev {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        best = best.max(run);
    }

    best
}

/// Rate-limit record for one player.
#[derive(Debug, Clone, Default)]
struct SenderRecord {
    recent: VecDeque<DateTime<Utc>>,
    muted_until: Option<DateTime<Utc>>,
    last_message: Option<(String, DateTime<Utc>)>,
}

/// Per-player chat policy.
#[derive(Debug, Default)]
pub struct ChatGuard {
    config: ChatConfig,
    records: HashMap<PlayerId, SenderRecord>,
}

impl ChatGuard {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
        }
    }

    /// Decide whether `player_id` may send `message` at `now`.
    ///
    /// Accepted messages are recorded against the sliding window. Any
    /// violation except an active mute starts a new mute.
    pub fn check(
        &mut self,
        player_id: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ChatError> {
        let config = &self.config;
        let record = self.records.entry(player_id.to_string()).or_default();

        if let Some(until) = record.muted_until {
            if now < until {
                let remaining = (until - now).num_seconds().max(1);
                return Err(ChatError::Muted(remaining));
            }
            record.muted_until = None;
        }

        let window_start = now - Duration::seconds(config.window_secs);
        while record.recent.front().is_some_and(|t| *t <= window_start) {
            record.recent.pop_front();
        }

        let verdict = if record.recent.len() >= config.max_messages_per_window {
            Err(ChatError::RateLimited)
        } else if record.last_message.as_ref().is_some_and(|(last, at)| {
            last.eq_ignore_ascii_case(message)
                && now - *at < Duration::seconds(config.duplicate_window_secs)
        }) {
            Err(ChatError::Duplicate)
        } else if is_blocked(&config.blocked_terms, message) {
            Err(ChatError::Blocked)
        } else if longest_run(message) > config.max_repeated_chars {
            Err(ChatError::RepeatedCharacters)
        } else {
            Ok(())
        };

        match verdict {
            Ok(()) => {
                record.recent.push_back(now);
                record.last_message = Some((message.to_string(), now));
                Ok(())
            }
            Err(err) => {
                record.muted_until = Some(now + Duration::seconds(config.mute_secs));
                Err(err)
            }
        }
    }

    /// Drop a player's record (on leave).
    pub fn forget(&mut self, player_id: &str) {
        self.records.remove(player_id);
    }

    pub fn tracked_count(&self) -> usize {
        self.records.len()
    }
}

fn is_blocked(terms: &[String], message: &str) -> bool {
    let lowered = message.to_lowercase();
    terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .any(|t| lowered.contains(&t.to_lowercase()))
}

/// Bounded chat history of one room.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    entries: VecDeque<ChatEntry>,
    capacity: usize,
}

impl ChatHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: ChatEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<ChatEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
