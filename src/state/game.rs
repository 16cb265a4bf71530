//! A single Perudo room.
//!
//! [`PerudoGame`] owns the roster, every player's dice, the
//! [`RoundState`] and the action log. All handlers validate first and
//! mutate only on success, so a rejected action leaves the room untouched.
//!
//! Roster order is turn order. Eliminated players keep their seat as
//! spectators until they disconnect.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use super::bid::{Bid, MAX_FACE};
use super::config::GameConfig;
use super::connection::ConnectionId;
use super::player::{ActionLog, Player};
use super::round::{CalzaResolution, DudoResolution, Resolution, RoundPhase, RoundState};
use super::rules;

/// Source of die faces.
///
/// Injected so tests can script every roll.
pub trait DiceRoller: Send + Sync {
    /// Exactly `count` faces in `1..=6`.
    fn roll(&self, count: usize) -> Vec<u8>;
}

/// Uniform dice from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDiceRoller;

impl DiceRoller for RandomDiceRoller {
    fn roll(&self, count: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        (0..count).map(|_| rng.gen_range(1..=MAX_FACE)).collect()
    }
}

impl<F> DiceRoller for F
where
    F: Fn(usize) -> Vec<u8> + Send + Sync,
{
    fn roll(&self, count: usize) -> Vec<u8> {
        self(count)
    }
}

/// Player-facing rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Room is full (max {0} players).")]
    RoomFull(usize),

    #[error("Already seated in this room.")]
    AlreadySeated,

    #[error("Player not found in room.")]
    NotInRoom,

    #[error("Game already started.")]
    AlreadyStarted,

    #[error("Game is over. Request a rematch to play again.")]
    GameOver,

    #[error("At least {0} players are required.")]
    NotEnoughPlayers(usize),

    #[error("Round is not in bidding phase.")]
    NotBidding,

    #[error("You have no dice left.")]
    Eliminated,

    #[error("You joined mid-round. Wait for the next round.")]
    SittingOut,

    #[error("Not your turn.")]
    NotYourTurn,

    #[error("Invalid opening bid. First bid cannot be Pacos outside Palifico.")]
    InvalidOpeningBid,

    #[error("Invalid opening bid for Palifico round.")]
    InvalidPalificoOpeningBid,

    #[error("Bid must legally outbid the previous bid.")]
    BidTooLow,

    #[error("Cannot call Dudo before any bid.")]
    NoBidToDudo,

    #[error("Cannot call Calza before any bid.")]
    NoBidToCalza,

    #[error("You cannot call Calza on your own bid.")]
    CalzaOwnBid,

    #[error("Calza is not allowed in Palifico round.")]
    CalzaInPalifico,

    #[error("Calza is not allowed with only two players left.")]
    CalzaHeadsUp,
}

/// How the next round's Palifico flag is decided after a resolution.
#[derive(Debug, Clone, Copy)]
enum PalificoTrigger {
    /// Palifico when the next starter is down to one die
    StarterOnLastDie,
    Fixed(bool),
}

/// One room's game.
pub struct PerudoGame {
    pub room_id: String,
    players: Vec<Player>,
    round: RoundState,
    log: ActionLog,
    config: GameConfig,
    roller: Arc<dyn DiceRoller>,
    seat_rng: StdRng,

    /// Shared destination for everyone rematching out of this room
    pub rematch_room_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for PerudoGame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerudoGame")
            .field("room_id", &self.room_id)
            .field("players", &self.players)
            .field("round", &self.round)
            .field("rematch_room_id", &self.rematch_room_id)
            .finish_non_exhaustive()
    }
}

impl PerudoGame {
    pub fn new(room_id: impl Into<String>, config: GameConfig, roller: Arc<dyn DiceRoller>) -> Self {
        let mut log = ActionLog::new(config.action_log_capacity);
        log.push("Room created. Waiting for players.");

        Self {
            room_id: room_id.into(),
            players: Vec::new(),
            round: RoundState::new(),
            log,
            config,
            roller,
            seat_rng: StdRng::from_entropy(),
            rematch_room_id: None,
            created_at: Utc::now(),
        }
    }

    /// Seed the RNG behind the opening turn-order shuffle.
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.seat_rng = StdRng::seed_from_u64(seed);
        self
    }

    // Lookups

    pub fn roster(&self) -> &[Player] {
        &self.players
    }

    pub fn round(&self) -> &RoundState {
        &self.round
    }

    pub fn phase(&self) -> RoundPhase {
        self.round.phase
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn action_log(&self) -> &ActionLog {
        &self.log
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn index_of(&self, player_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    pub fn find_player_by_id(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn find_player_by_connection(&self, connection: ConnectionId) -> Option<&Player> {
        self.players.iter().find(|p| p.connection == connection)
    }

    /// Player whose turn it is, only while bidding.
    pub fn current_turn_player(&self) -> Option<&Player> {
        if !self.round.is_bidding() {
            return None;
        }
        self.players.get(self.round.turn_index)
    }

    pub fn winner(&self) -> Option<&Player> {
        self.round
            .winner_player_id
            .as_deref()
            .and_then(|id| self.find_player_by_id(id))
    }

    /// Players taking part in the current round.
    pub fn active_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_active()).count()
    }

    /// Players still holding dice, mid-round joiners included.
    pub fn contender_count(&self) -> usize {
        self.players.iter().filter(|p| p.has_dice()).count()
    }

    /// First active index scanning forward from `start`, wrapping.
    pub fn find_active_index_at_or_after(&self, start: usize) -> Option<usize> {
        let len = self.players.len();
        (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&i| self.players[i].is_active())
    }

    /// Next active index strictly after `index`, wrapping.
    pub fn next_active_index(&self, index: usize) -> Option<usize> {
        let len = self.players.len();
        (1..=len)
            .map(|offset| (index + offset) % len)
            .find(|&i| self.players[i].is_active())
    }

    fn add_log(&mut self, line: impl Into<String>) {
        self.log.push(line);
    }

    // Roster

    /// Seat a player with a full starting hand.
    ///
    /// While a round is running the joiner sits out until the next round.
    pub fn add_player(&mut self, mut player: Player) -> Result<(), GameError> {
        if self.players.len() >= self.config.max_players {
            return Err(GameError::RoomFull(self.config.max_players));
        }
        if self.index_of(&player.id).is_some() {
            return Err(GameError::AlreadySeated);
        }

        player.dice_count = self.config.starting_dice;
        player.current_dice.clear();
        player.sitting_out = self.round.phase != RoundPhase::Waiting;

        let name = player.name.clone();
        if player.sitting_out {
            self.add_log(format!("{} joined and will play from the next round.", name));
        } else {
            self.add_log(format!("{} joined the room.", name));
        }
        self.players.push(player);

        tracing::info!(room = %self.room_id, player = %name, players = self.players.len(), "player joined");

        if self.config.auto_start
            && self.round.phase == RoundPhase::Waiting
            && self.round.round_number == 0
            && self.active_count() >= self.config.min_players
        {
            self.begin_first_round();
        }

        Ok(())
    }

    /// Remove the player bound to `connection`, keeping turn order consistent.
    pub fn remove_player_by_connection(&mut self, connection: ConnectionId) -> Option<Player> {
        let leaving_index = self.players.iter().position(|p| p.connection == connection)?;
        let leaving = self.players.remove(leaving_index);
        self.add_log(format!("{} left the room.", leaving.name));
        tracing::info!(room = %self.room_id, player = %leaving.name, "player left");

        if self.players.is_empty() {
            return Some(leaving);
        }

        if self.round.is_bidding() {
            if leaving_index < self.round.turn_index {
                self.round.turn_index -= 1;
            } else if self.round.turn_index >= self.players.len() {
                self.round.turn_index = 0;
            }
        }

        let started = self.round.round_number > 0 && !self.round.is_game_over();

        if started && self.contender_count() == 1 {
            if let Some(last) = self.players.iter().find(|p| p.has_dice()) {
                let (id, name) = (last.id.clone(), last.name.clone());
                self.round.set_game_over(id);
                self.add_log(format!("{} wins (last remaining player).", name));
                tracing::info!(room = %self.room_id, winner = %name, "game over");
            }
        } else if self.round.is_bidding() && self.active_count() < self.config.min_players {
            self.round.set_waiting();
            self.add_log(format!(
                "Round paused: waiting for at least {} players.",
                self.config.min_players
            ));
        } else {
            self.restore_turn_invariant();
        }

        Some(leaving)
    }

    // Rounds

    fn begin_first_round(&mut self) {
        if self.config.shuffle_turn_order {
            self.players.shuffle(&mut self.seat_rng);
            tracing::debug!(room = %self.room_id, "turn order shuffled");
        }
        self.start_round(0, false);
    }

    /// Seat mid-round joiners, roll every active hand and open a round.
    fn start_round(&mut self, starter_index: usize, palifico_round: bool) {
        for player in self.players.iter_mut() {
            player.sitting_out = false;
        }

        let starter = match self.find_active_index_at_or_after(starter_index) {
            Some(i) if self.active_count() >= self.config.min_players => i,
            _ => {
                self.round.set_waiting();
                self.add_log(format!(
                    "Waiting for at least {} players.",
                    self.config.min_players
                ));
                return;
            }
        };

        self.round
            .start_new_round(starter, self.players.len(), palifico_round);

        for player in self.players.iter_mut() {
            player.current_dice = if player.is_active() {
                self.roller.roll(usize::from(player.dice_count))
            } else {
                Vec::new()
            };
        }

        let opener = self.players[self.round.turn_index].name.clone();
        let palifico_text = if palifico_round {
            " Palifico round: Pacos are not wild."
        } else {
            ""
        };
        self.add_log(format!(
            "Round {} started. {} opens.{}",
            self.round.round_number, opener, palifico_text
        ));
        tracing::info!(
            room = %self.room_id,
            round = self.round.round_number,
            palifico = palifico_round,
            opener = %opener,
            "round started"
        );
    }

    /// Keep the turn pointer on an active player while bidding.
    fn restore_turn_invariant(&mut self) {
        if !self.round.is_bidding() {
            return;
        }
        match self.find_active_index_at_or_after(self.round.turn_index) {
            Some(i) => self.round.turn_index = i,
            None => {
                self.round.set_waiting();
                self.add_log("No active players left. Waiting for players.");
            }
        }
    }

    /// Explicit start, or resume after the room was paused by departures.
    pub fn handle_start_game(&mut self, player_id: &str) -> Result<(), GameError> {
        let index = self.index_of(player_id).ok_or(GameError::NotInRoom)?;

        match self.round.phase {
            RoundPhase::Bidding => return Err(GameError::AlreadyStarted),
            RoundPhase::GameOver => return Err(GameError::GameOver),
            RoundPhase::Waiting => {}
        }

        let ready = self.players.iter().filter(|p| p.has_dice()).count();
        if ready < self.config.min_players {
            return Err(GameError::NotEnoughPlayers(self.config.min_players));
        }

        let name = self.players[index].name.clone();
        if self.round.round_number == 0 {
            self.add_log(format!("{} started the game.", name));
            self.begin_first_round();
        } else {
            self.add_log(format!("{} resumed the game.", name));
            let from = self.round.turn_index;
            self.start_round(from, false);
        }
        Ok(())
    }

    /// Common checks for an in-round action by `player_id`.
    fn acting_index(&self, player_id: &str) -> Result<usize, GameError> {
        let index = self.index_of(player_id).ok_or(GameError::NotInRoom)?;

        match self.round.phase {
            RoundPhase::Bidding => {}
            RoundPhase::GameOver => return Err(GameError::GameOver),
            RoundPhase::Waiting => return Err(GameError::NotBidding),
        }

        let player = &self.players[index];
        if player.sitting_out {
            return Err(GameError::SittingOut);
        }
        if !player.has_dice() {
            return Err(GameError::Eliminated);
        }
        Ok(index)
    }

    pub fn handle_bid(&mut self, player_id: &str, bid: Bid) -> Result<(), GameError> {
        let index = self.acting_index(player_id)?;

        if self.active_count() < self.config.min_players {
            return Err(GameError::NotEnoughPlayers(self.config.min_players));
        }
        if self.round.turn_index != index {
            return Err(GameError::NotYourTurn);
        }

        let bid = Bid {
            player_id: self.players[index].id.clone(),
            ..bid
        };
        let palifico = self.round.palifico_round;

        match &self.round.last_bid {
            None => {
                if !rules::is_valid_first_bid(&self.players, &bid, palifico) {
                    return Err(if palifico {
                        GameError::InvalidPalificoOpeningBid
                    } else {
                        GameError::InvalidOpeningBid
                    });
                }
                if palifico {
                    self.round.palifico_face = Some(bid.face);
                }
            }
            Some(previous) => {
                if !rules::is_valid_raised_bid(
                    &self.players,
                    previous,
                    &bid,
                    palifico,
                    self.round.palifico_face,
                ) {
                    return Err(GameError::BidTooLow);
                }
            }
        }

        let name = self.players[index].name.clone();
        self.add_log(format!("{} bids {} x {}.", name, bid.quantity, bid.face));
        tracing::debug!(room = %self.room_id, player = %name, quantity = bid.quantity, face = bid.face, "bid");
        self.round.last_bid = Some(bid);

        match self.next_active_index(index) {
            Some(next) => self.round.turn_index = next,
            None => self.round.set_waiting(),
        }
        Ok(())
    }

    pub fn handle_dudo(&mut self, player_id: &str) -> Result<(), GameError> {
        let index = self.acting_index(player_id)?;

        if self.round.last_bid.is_none() {
            return Err(GameError::NoBidToDudo);
        }
        if self.round.turn_index != index {
            return Err(GameError::NotYourTurn);
        }

        self.resolve_after_dudo(index);
        Ok(())
    }

    pub fn handle_calza(&mut self, player_id: &str) -> Result<(), GameError> {
        let index = self.acting_index(player_id)?;

        let last_bid = self.round.last_bid.as_ref().ok_or(GameError::NoBidToCalza)?;
        if last_bid.player_id == player_id {
            return Err(GameError::CalzaOwnBid);
        }
        if self.round.palifico_round {
            return Err(GameError::CalzaInPalifico);
        }
        if self.active_count() <= 2 {
            return Err(GameError::CalzaHeadsUp);
        }

        self.resolve_after_calza(index);
        Ok(())
    }

    /// Bidder of the current bid, or a round reset if they are gone.
    fn bidder_index_or_reset(&mut self, bid: &Bid) -> Option<usize> {
        let found = self.index_of(&bid.player_id);
        if found.is_none() {
            tracing::warn!(room = %self.room_id, bidder = %bid.player_id, "bidder missing at resolution, resetting round");
            self.add_log("Round reset due to missing bidder.");
            self.start_round(0, false);
        }
        found
    }

    fn resolve_after_dudo(&mut self, doubter_index: usize) {
        let Some(bid) = self.round.last_bid.clone() else {
            return;
        };
        let Some(bidder_index) = self.bidder_index_or_reset(&bid) else {
            return;
        };

        let actual_count =
            rules::count_matching_dice(&self.players, &bid, self.round.palifico_round);
        let bid_was_correct = actual_count >= bid.quantity;
        let loser_index = if bid_was_correct {
            doubter_index
        } else {
            bidder_index
        };

        let revealed = self.players.iter().map(Player::reveal).collect();
        let remaining = self.players[loser_index].lose_die();

        let doubter = &self.players[doubter_index];
        let bidder = &self.players[bidder_index];
        let loser = &self.players[loser_index];
        let resolution = DudoResolution {
            doubter_id: doubter.id.clone(),
            doubter_name: doubter.name.clone(),
            bidder_id: bidder.id.clone(),
            bidder_name: bidder.name.clone(),
            quantity: bid.quantity,
            face: bid.face,
            actual_count,
            bid_was_correct,
            loser_id: loser.id.clone(),
            loser_name: loser.name.clone(),
            loser_remaining_dice: remaining,
            revealed,
        };

        self.add_log(format!(
            "{} calls Dudo on {}'s bid {} x {}.",
            resolution.doubter_name, resolution.bidder_name, bid.quantity, bid.face
        ));
        if bid_was_correct {
            self.add_log(format!(
                "Bid stands ({} matching). {} loses a die.",
                actual_count, resolution.doubter_name
            ));
        } else {
            self.add_log(format!(
                "Bid fails ({} matching). {} loses a die.",
                actual_count, resolution.bidder_name
            ));
        }
        tracing::info!(
            room = %self.room_id,
            actual = actual_count,
            quantity = bid.quantity,
            face = bid.face,
            loser = %resolution.loser_name,
            "dudo resolved"
        );

        self.round.last_resolution = Some(Resolution::Dudo(resolution));
        self.finish_resolution(loser_index, PalificoTrigger::StarterOnLastDie);
    }

    fn resolve_after_calza(&mut self, caller_index: usize) {
        let Some(bid) = self.round.last_bid.clone() else {
            return;
        };
        let Some(bidder_index) = self.bidder_index_or_reset(&bid) else {
            return;
        };

        let actual_count =
            rules::count_matching_dice(&self.players, &bid, self.round.palifico_round);
        let bid_is_exact = actual_count == bid.quantity;

        let revealed = self.players.iter().map(Player::reveal).collect();
        let starting_dice = self.config.starting_dice;
        let caller = &mut self.players[caller_index];
        let before = caller.dice_count;
        let after = if bid_is_exact {
            caller.gain_die(starting_dice)
        } else {
            caller.lose_die()
        };

        let caller = &self.players[caller_index];
        let bidder = &self.players[bidder_index];
        let resolution = CalzaResolution {
            caller_id: caller.id.clone(),
            caller_name: caller.name.clone(),
            bidder_id: bidder.id.clone(),
            bidder_name: bidder.name.clone(),
            quantity: bid.quantity,
            face: bid.face,
            actual_count,
            bid_is_exact,
            caller_dice_before: before,
            caller_dice_after: after,
            revealed,
        };

        self.add_log(format!(
            "{} calls Calza on {}'s bid {} x {}.",
            resolution.caller_name, resolution.bidder_name, bid.quantity, bid.face
        ));
        if bid_is_exact {
            self.add_log(format!(
                "Calza successful: exact count ({}). {} gains a die.",
                actual_count, resolution.caller_name
            ));
        } else {
            self.add_log(format!(
                "Calza failed: count is {}. {} loses a die.",
                actual_count, resolution.caller_name
            ));
        }
        tracing::info!(
            room = %self.room_id,
            actual = actual_count,
            quantity = bid.quantity,
            exact = bid_is_exact,
            caller = %resolution.caller_name,
            "calza resolved"
        );

        self.round.last_resolution = Some(Resolution::Calza(resolution));
        let palifico = !bid_is_exact && before == 2 && after == 1;
        self.finish_resolution(caller_index, PalificoTrigger::Fixed(palifico));
    }

    /// Eliminate, declare a winner, or open the next round from `focus`.
    fn finish_resolution(&mut self, focus: usize, trigger: PalificoTrigger) {
        if !self.players[focus].has_dice() {
            self.players[focus].current_dice.clear();
            let name = self.players[focus].name.clone();
            self.add_log(format!("{} is eliminated.", name));
            tracing::info!(room = %self.room_id, player = %name, "player eliminated");
        }

        if self.contender_count() <= 1 {
            let last = self
                .players
                .iter()
                .find(|p| p.has_dice())
                .map(|p| (p.id.clone(), p.name.clone()));
            match last {
                Some((id, name)) => {
                    self.round.set_game_over(id);
                    self.add_log(format!("{} wins the game.", name));
                    tracing::info!(room = %self.room_id, winner = %name, "game over");
                }
                None => self.round.set_waiting(),
            }
            return;
        }

        for player in self.players.iter_mut() {
            player.sitting_out = false;
        }

        let Some(starter) = self.find_active_index_at_or_after(focus) else {
            self.round.set_waiting();
            return;
        };
        let palifico = match trigger {
            PalificoTrigger::StarterOnLastDie => self.players[starter].dice_count == 1,
            PalificoTrigger::Fixed(value) => value,
        };
        self.start_round(starter, palifico);
    }

    // Snapshots

    /// Per-player snapshot: public counts, own faces only.
    pub fn build_state_for_player(&self, player: &Player) -> serde_json::Value {
        let players: Vec<serde_json::Value> = self.players.iter().map(|p| p.to_json()).collect();

        let last_bid = self.round.last_bid.as_ref().map(|bid| {
            let bidder_name = self
                .find_player_by_id(&bid.player_id)
                .map(|p| p.name.as_str())
                .unwrap_or("Unknown");
            serde_json::json!({
                "quantity": bid.quantity,
                "face": bid.face,
                "player_id": bid.player_id,
                "player_name": bidder_name
            })
        });

        let your_dice = self
            .find_player_by_id(&player.id)
            .map(|p| p.current_dice.clone())
            .unwrap_or_default();

        serde_json::json!({
            "type": "state",
            "room_id": self.room_id,
            "phase": self.round.phase.as_str(),
            "round_number": self.round.round_number,
            "palifico_round": self.round.palifico_round,
            "palifico_face": self.round.palifico_face,
            "players": players,
            "current_turn_player_id": self.current_turn_player().map(|p| p.id.as_str()),
            "last_bid": last_bid,
            "your_dice": your_dice,
            "action_log": self.log.to_vec(),
            "last_resolution": self.round.last_resolution.as_ref().map(|r| r.to_json()),
            "winner_player_id": self.round.winner_player_id,
            "rematch_room_id": self.rematch_room_id
        })
    }
}
