//! Match sessions: who played a room's game and what they did.
//!
//! A session lives alongside its room and is turned into a
//! [`MatchDocument`] exactly once when the game finishes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::player::{Player, PlayerId};

/// Someone who sat in the room during the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub player_id: PlayerId,
    pub name: String,
    pub auth_type: String,
    pub account_user_id: Option<String>,
    pub account_username: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// Kinds of recorded actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchActionKind {
    Join,
    Leave,
    StartGame,
    Bid,
    Dudo,
    Calza,
    Rematch,
}

/// One accepted action, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchAction {
    pub seq: u64,
    pub kind: MatchActionKind,
    pub player_id: PlayerId,
    pub player_name: String,
    pub round_number: u32,
    pub detail: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

/// Winner as recorded in the match document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchWinner {
    pub player_id: PlayerId,
    pub name: String,
    pub account_username: Option<String>,
}

/// Telemetry document for a finished match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDocument {
    pub id: String,
    pub room_id: String,
    pub trigger: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub rounds_played: u32,
    pub participants: Vec<Participant>,
    pub actions: Vec<MatchAction>,
    pub final_action_log: Vec<String>,
    pub final_resolution: Option<serde_json::Value>,
    pub winner: Option<MatchWinner>,
}

/// Running record of one room's match.
#[derive(Debug, Clone)]
pub struct MatchSession {
    pub id: String,
    pub room_id: String,
    pub started_at: DateTime<Utc>,
    participants: Vec<Participant>,
    actions: Vec<MatchAction>,
    next_seq: u64,
}

impl MatchSession {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            started_at: Utc::now(),
            participants: Vec::new(),
            actions: Vec::new(),
            next_seq: 1,
        }
    }

    /// Register a participant once; rejoins under the same id are ignored.
    pub fn add_participant(&mut self, player: &Player) {
        if self.participants.iter().any(|p| p.player_id == player.id) {
            return;
        }
        self.participants.push(Participant {
            player_id: player.id.clone(),
            name: player.name.clone(),
            auth_type: player.auth_type.as_str().to_string(),
            account_user_id: player.account.as_ref().map(|a| a.user_id.clone()),
            account_username: player.account_username().map(str::to_string),
            joined_at: Utc::now(),
        });
    }

    pub fn record(
        &mut self,
        kind: MatchActionKind,
        player: &Player,
        round_number: u32,
        detail: Option<serde_json::Value>,
    ) {
        self.actions.push(MatchAction {
            seq: self.next_seq,
            kind,
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            round_number,
            detail,
            at: Utc::now(),
        });
        self.next_seq += 1;
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn actions(&self) -> &[MatchAction] {
        &self.actions
    }

    /// Build the final document.
    pub fn to_document(
        &self,
        trigger: &str,
        rounds_played: u32,
        final_action_log: Vec<String>,
        final_resolution: Option<serde_json::Value>,
        winner: Option<MatchWinner>,
    ) -> MatchDocument {
        MatchDocument {
            id: self.id.clone(),
            room_id: self.room_id.clone(),
            trigger: trigger.to_string(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            rounds_played,
            participants: self.participants.clone(),
            actions: self.actions.clone(),
            final_action_log,
            final_resolution,
            winner,
        }
    }
}
