//! Player records and the room action log.
//!
//! A [`Player`] is owned by exactly one room roster. Everything else refers
//! to it by [`PlayerId`] or by the [`ConnectionId`] it was joined with.
//!
//! # Dice lifecycle
//!
//! ```text
//!  join (waiting) ──▶ active ──lose last die──▶ eliminated (spectator)
//!                       ▲
//!  join (bidding) ──▶ sitting out ──next round starts──┘
//! ```

use std::collections::VecDeque;
use std::fmt;

use super::connection::ConnectionId;
use super::round::RevealedHand;

/// Opaque player identifier, stable for the lifetime of a connection.
pub type PlayerId = String;

/// How a player identified themselves on join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthType {
    #[default]
    Guest,
    Account,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Account => "account",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers of a signed-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    pub user_id: String,
    pub username: String,
}

/// A seat in a room.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,

    /// Display name (already sanitized)
    pub name: String,

    /// Transport handle this player is bound to
    pub connection: ConnectionId,

    /// Dice remaining, never above the room's starting count
    pub dice_count: u8,

    /// Faces rolled this round; empty when eliminated or sitting out
    pub current_dice: Vec<u8>,

    /// Joined while a round was running; plays from the next round on
    pub sitting_out: bool,

    pub auth_type: AuthType,

    pub account: Option<AccountIdentity>,
}

impl Player {
    /// Create a guest player. Dice are dealt when the player is seated.
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, connection: ConnectionId) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            connection,
            dice_count: 0,
            current_dice: Vec::new(),
            sitting_out: false,
            auth_type: AuthType::Guest,
            account: None,
        }
    }

    pub fn with_account(mut self, account: AccountIdentity) -> Self {
        self.auth_type = AuthType::Account;
        self.account = Some(account);
        self
    }

    /// Still holds dice (sitting-out joiners included).
    pub fn has_dice(&self) -> bool {
        self.dice_count > 0
    }

    /// Takes part in the current round.
    pub fn is_active(&self) -> bool {
        self.has_dice() && !self.sitting_out
    }

    pub fn is_eliminated(&self) -> bool {
        !self.has_dice()
    }

    pub fn account_username(&self) -> Option<&str> {
        self.account.as_ref().map(|a| a.username.as_str())
    }

    /// Remove one die. Returns the count afterwards.
    pub fn lose_die(&mut self) -> u8 {
        self.dice_count = self.dice_count.saturating_sub(1);
        if self.dice_count == 0 {
            self.current_dice.clear();
        }
        self.dice_count
    }

    /// Add one die, capped at `cap`. Returns the count afterwards.
    pub fn gain_die(&mut self, cap: u8) -> u8 {
        self.dice_count = self.dice_count.saturating_add(1).min(cap);
        self.dice_count
    }

    /// Public view: dice counts only, never faces.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "dice_count": self.dice_count,
            "eliminated": self.is_eliminated(),
            "sitting_out": self.sitting_out,
            "auth_type": self.auth_type.as_str()
        })
    }

    /// Full reveal of this player's hand, used once a challenge resolves.
    pub fn reveal(&self) -> RevealedHand {
        RevealedHand {
            player_id: self.id.clone(),
            player_name: self.name.clone(),
            dice: self.current_dice.clone(),
        }
    }
}

/// Bounded log of human-readable room events.
#[derive(Debug, Clone)]
pub struct ActionLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl ActionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a line, dropping the oldest once full.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_player() -> Player {
        let mut player = Player::new("p1", "Alice", ConnectionId(1));
        player.dice_count = 2;
        player.current_dice = vec![3, 4];
        player
    }

    #[test]
    fn test_lose_die_clamps_and_clears() {
        let mut player = make_player();

        assert_eq!(player.lose_die(), 1);
        assert!(player.is_active());

        assert_eq!(player.lose_die(), 0);
        assert!(player.is_eliminated());
        assert!(player.current_dice.is_empty());

        // Never underflows
        assert_eq!(player.lose_die(), 0);
    }

    #[test]
    fn test_gain_die_capped() {
        let mut player = make_player();
        assert_eq!(player.gain_die(3), 3);
        assert_eq!(player.gain_die(3), 3);
    }

    #[test]
    fn test_sitting_out_is_not_active() {
        let mut player = make_player();
        player.sitting_out = true;
        assert!(player.has_dice());
        assert!(!player.is_active());
    }

    #[test]
    fn test_public_json_hides_faces() {
        let player = make_player().with_account(AccountIdentity {
            user_id: "u1".to_string(),
            username: "alice".to_string(),
        });
        let json = player.to_json();

        assert_eq!(json["dice_count"], 2);
        assert_eq!(json["auth_type"], "account");
        assert!(json.get("current_dice").is_none());
        assert!(json.get("dice").is_none());
        assert_eq!(player.reveal().dice, vec![3, 4]);
    }

    #[test]
    fn test_action_log_ring() {
        let mut log = ActionLog::new(3);
        for i in 0..5 {
            log.push(format!("line {}", i));
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.to_vec(), vec!["line 2", "line 3", "line 4"]);
        assert_eq!(log.last(), Some("line 4"));
    }
}
