//! Per-room round state machine.
//!
//! ```text
//!            start_new_round                 set_game_over
//! ┌─────────┐ ──────────────▶ ┌─────────┐ ──────────────▶ ┌───────────┐
//! │ waiting │                 │ bidding │                 │ game_over │
//! └─────────┘ ◀────────────── └─────────┘                 └───────────┘
//!              set_waiting         │ ▲
//!                                  └─┘ start_new_round
//! ```
//!
//! `game_over` is terminal; a rematch builds a fresh room.

use super::bid::Bid;
use super::player::PlayerId;

/// Round phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundPhase {
    /// No round running, no active bid
    #[default]
    Waiting,
    /// A round is in progress
    Bidding,
    /// A winner has been decided
    GameOver,
}

impl RoundPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Bidding => "bidding",
            Self::GameOver => "game_over",
        }
    }
}

/// Hand revealed after a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealedHand {
    pub player_id: PlayerId,
    pub player_name: String,
    pub dice: Vec<u8>,
}

impl RevealedHand {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "player_id": self.player_id,
            "player_name": self.player_name,
            "dice": self.dice
        })
    }
}

/// Outcome of a Dudo challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DudoResolution {
    pub doubter_id: PlayerId,
    pub doubter_name: String,
    pub bidder_id: PlayerId,
    pub bidder_name: String,
    pub quantity: u32,
    pub face: u8,
    pub actual_count: u32,
    pub bid_was_correct: bool,
    pub loser_id: PlayerId,
    pub loser_name: String,
    pub loser_remaining_dice: u8,
    pub revealed: Vec<RevealedHand>,
}

/// Outcome of a Calza call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalzaResolution {
    pub caller_id: PlayerId,
    pub caller_name: String,
    pub bidder_id: PlayerId,
    pub bidder_name: String,
    pub quantity: u32,
    pub face: u8,
    pub actual_count: u32,
    pub bid_is_exact: bool,
    pub caller_dice_before: u8,
    pub caller_dice_after: u8,
    pub revealed: Vec<RevealedHand>,
}

/// Last challenge outcome shown to every player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Dudo(DudoResolution),
    Calza(CalzaResolution),
}

impl Resolution {
    pub fn revealed(&self) -> &[RevealedHand] {
        match self {
            Self::Dudo(r) => &r.revealed,
            Self::Calza(r) => &r.revealed,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let revealed: Vec<serde_json::Value> =
            self.revealed().iter().map(|h| h.to_json()).collect();

        match self {
            Self::Dudo(r) => serde_json::json!({
                "type": "dudo",
                "doubter_player_id": r.doubter_id,
                "doubter_name": r.doubter_name,
                "bidder_player_id": r.bidder_id,
                "bidder_name": r.bidder_name,
                "bid": {"quantity": r.quantity, "face": r.face},
                "actual_count": r.actual_count,
                "bid_was_correct": r.bid_was_correct,
                "loser_player_id": r.loser_id,
                "loser_name": r.loser_name,
                "loser_remaining_dice": r.loser_remaining_dice,
                "revealed_dice": revealed
            }),
            Self::Calza(r) => serde_json::json!({
                "type": "calza",
                "caller_player_id": r.caller_id,
                "caller_name": r.caller_name,
                "bidder_player_id": r.bidder_id,
                "bidder_name": r.bidder_name,
                "bid": {"quantity": r.quantity, "face": r.face},
                "actual_count": r.actual_count,
                "bid_is_exact": r.bid_is_exact,
                "caller_dice_before": r.caller_dice_before,
                "caller_dice_after": r.caller_dice_after,
                "revealed_dice": revealed
            }),
        }
    }
}

/// Mutable state of the round in progress.
#[derive(Debug, Clone, Default)]
pub struct RoundState {
    pub phase: RoundPhase,

    /// Roster index of the player to act
    pub turn_index: usize,

    /// Rounds started so far; 0 before the first
    pub round_number: u32,

    pub palifico_round: bool,

    /// Face locked by a Palifico opening bid
    pub palifico_face: Option<u8>,

    pub last_bid: Option<Bid>,

    pub last_resolution: Option<Resolution>,

    pub winner_player_id: Option<PlayerId>,
}

impl RoundState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `bidding` with a normalized starter index.
    ///
    /// `player_count` must be non-zero.
    pub fn start_new_round(&mut self, starter_index: usize, player_count: usize, palifico_round: bool) {
        self.round_number += 1;
        self.phase = RoundPhase::Bidding;
        self.turn_index = starter_index % player_count.max(1);
        self.last_bid = None;
        self.palifico_round = palifico_round;
        self.palifico_face = None;
        self.winner_player_id = None;
    }

    /// Pause: no bid, no Palifico, turn pointer reset.
    pub fn set_waiting(&mut self) {
        self.phase = RoundPhase::Waiting;
        self.turn_index = 0;
        self.last_bid = None;
        self.palifico_round = false;
        self.palifico_face = None;
    }

    pub fn set_game_over(&mut self, winner_player_id: PlayerId) {
        self.phase = RoundPhase::GameOver;
        self.last_bid = None;
        self.winner_player_id = Some(winner_player_id);
    }

    pub fn is_bidding(&self) -> bool {
        self.phase == RoundPhase::Bidding
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == RoundPhase::GameOver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let round = RoundState::new();
        assert_eq!(round.phase, RoundPhase::Waiting);
        assert_eq!(round.round_number, 0);
        assert!(round.last_bid.is_none());
    }

    #[test]
    fn test_start_new_round_normalizes_index() {
        let mut round = RoundState::new();
        round.start_new_round(7, 3, false);

        assert_eq!(round.phase, RoundPhase::Bidding);
        assert_eq!(round.turn_index, 1);
        assert_eq!(round.round_number, 1);

        round.last_bid = Some(Bid::new(2, 3, "p"));
        round.palifico_face = Some(3);
        round.start_new_round(0, 3, true);

        assert_eq!(round.round_number, 2);
        assert!(round.last_bid.is_none());
        assert!(round.palifico_round);
        assert!(round.palifico_face.is_none());
    }

    #[test]
    fn test_set_waiting_clears_bid() {
        let mut round = RoundState::new();
        round.start_new_round(1, 2, true);
        round.last_bid = Some(Bid::new(2, 3, "p"));
        round.set_waiting();

        assert_eq!(round.phase, RoundPhase::Waiting);
        assert_eq!(round.turn_index, 0);
        assert!(round.last_bid.is_none());
        assert!(!round.palifico_round);
        // round number keeps counting across pauses
        assert_eq!(round.round_number, 1);
    }

    #[test]
    fn test_game_over_records_winner() {
        let mut round = RoundState::new();
        round.start_new_round(0, 2, false);
        round.set_game_over("winner".to_string());

        assert!(round.is_game_over());
        assert_eq!(round.winner_player_id.as_deref(), Some("winner"));
        assert_eq!(round.phase.as_str(), "game_over");
    }
}
