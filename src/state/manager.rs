//! Cross-room orchestration.
//!
//! [`GameManager`] binds connections to rooms, turns client actions into
//! calls on the right [`PerudoGame`], broadcasts per-player snapshots and
//! owns everything rooms don't know about: chat policy, match sessions,
//! rematch routing and telemetry.
//!
//! Every handler runs to completion without awaiting. Callers sharing a
//! manager across tasks must serialize access (one owner task, or a mutex).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use super::auth::{NoAuth, TokenVerifier};
use super::bid::{Bid, BidPayload};
use super::chat::{sanitize_message, ChatEntry, ChatError, ChatGuard, ChatHistory};
use super::config::{ConfigError, ManagerConfig};
use super::connection::{ClientAction, ConnectionId, Outbound, ServerMessage};
use super::game::{DiceRoller, GameError, PerudoGame, RandomDiceRoller};
use super::player::{Player, PlayerId};
use super::room::{sanitize_name, sanitize_room_id, RoomRegistry, Seat};
use super::session::{MatchActionKind, MatchSession, MatchWinner};
use super::telemetry::{TelemetryEvent, TelemetryHandle, UserRecordDelta};

/// Why an action was rejected. The `Display` text is sent to the player.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("Already joined a room.")]
    AlreadyJoined,

    #[error("Invalid or expired session.")]
    InvalidSession,

    #[error("Join a room first.")]
    NotJoined,

    #[error("Room unavailable.")]
    RoomUnavailable,

    #[error("Invalid bid format.")]
    InvalidBid,

    #[error("Invalid message payload.")]
    InvalidPayload,

    #[error("Rematch is only available after the game ends.")]
    RematchUnavailable,

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// Join parameters as sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinRequest {
    pub room_id: Option<String>,
    pub name: Option<String>,
    pub auth_token: Option<String>,
}

/// Owner of every room in the process.
pub struct GameManager {
    config: ManagerConfig,
    rooms: RoomRegistry,
    outbound: Arc<dyn Outbound>,
    verifier: Arc<dyn TokenVerifier>,
    telemetry: TelemetryHandle,
    roller: Arc<dyn DiceRoller>,

    /// Chat ring buffer per room
    chat_histories: HashMap<String, ChatHistory>,
    chat_guard: ChatGuard,

    /// Match record per room
    sessions: HashMap<String, MatchSession>,

    /// Rooms whose match document has been emitted
    finalized: HashSet<String>,
}

impl GameManager {
    /// Fails if `config` does not pass [`ManagerConfig::validate`].
    pub fn new(config: ManagerConfig, outbound: Arc<dyn Outbound>) -> Result<Self, ConfigError> {
        config.validate()?;
        let chat_guard = ChatGuard::new(config.chat.clone());
        Ok(Self {
            config,
            rooms: RoomRegistry::new(),
            outbound,
            verifier: Arc::new(NoAuth),
            telemetry: TelemetryHandle::disabled(),
            roller: Arc::new(RandomDiceRoller),
            chat_histories: HashMap::new(),
            chat_guard,
            sessions: HashMap::new(),
            finalized: HashSet::new(),
        })
    }

    pub fn with_token_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryHandle) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_dice_roller(mut self, roller: Arc<dyn DiceRoller>) -> Self {
        self.roller = roller;
        self
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn room(&self, room_id: &str) -> Option<&PerudoGame> {
        self.rooms.get(room_id)
    }

    pub fn session(&self, room_id: &str) -> Option<&MatchSession> {
        self.sessions.get(room_id)
    }

    pub fn chat_history(&self, room_id: &str) -> Vec<ChatEntry> {
        self.chat_histories
            .get(room_id)
            .map(ChatHistory::entries)
            .unwrap_or_default()
    }

    pub fn is_finalized(&self, room_id: &str) -> bool {
        self.finalized.contains(room_id)
    }

    // Dispatch

    /// Parse one text frame and handle it. Errors go back to the sender.
    pub fn handle_message(&mut self, connection: ConnectionId, text: &str) {
        match ClientAction::parse(text) {
            Ok(action) => self.handle_action(connection, action),
            Err(e) => {
                tracing::debug!(%connection, error = %e, "unparseable message");
                self.send_error(connection, &ManagerError::InvalidPayload);
            }
        }
    }

    pub fn handle_action(&mut self, connection: ConnectionId, action: ClientAction) {
        let result = match action {
            ClientAction::Join {
                room_id,
                name,
                auth_token,
            } => self.join(
                connection,
                JoinRequest {
                    room_id,
                    name,
                    auth_token,
                },
            ),
            ClientAction::StartGame => self.handle_start_game(connection),
            ClientAction::Bid { quantity, face } => {
                self.handle_bid(connection, BidPayload { quantity, face })
            }
            ClientAction::Dudo => self.handle_dudo(connection),
            ClientAction::Calza => self.handle_calza(connection),
            ClientAction::Rematch => self.handle_rematch(connection),
            ClientAction::Chat { message } => self.handle_chat(connection, &message),
            ClientAction::Leave => {
                self.leave(connection);
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::debug!(%connection, error = %e, "action rejected");
            self.send_error(connection, &e);
        }
    }

    /// The transport lost the connection.
    pub fn disconnect(&mut self, connection: ConnectionId) {
        self.leave(connection);
    }

    fn send_error(&self, connection: ConnectionId, error: &ManagerError) {
        self.outbound
            .send(connection, &ServerMessage::error(error.to_string()));
    }

    fn broadcast_state(&self, room_id: &str) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        for player in room.roster() {
            let state = room.build_state_for_player(player);
            self.outbound
                .send(player.connection, &ServerMessage::State(state));
        }
    }

    /// Broadcast after an accepted action, finalizing a finished match.
    fn commit(&mut self, room_id: &str) {
        if self.rooms.get(room_id).is_some_and(|r| r.round().is_game_over()) {
            self.finalize_match_if_needed(room_id, "game_over");
        }
        self.broadcast_state(room_id);
    }

    /// Room and player bound to `connection`.
    fn context(&self, connection: ConnectionId) -> Result<Seat, ManagerError> {
        let seat = self.rooms.seat(connection).ok_or(ManagerError::NotJoined)?;
        let room = self
            .rooms
            .get(&seat.room_id)
            .ok_or(ManagerError::RoomUnavailable)?;
        if room.find_player_by_id(&seat.player_id).is_none() {
            return Err(GameError::NotInRoom.into());
        }
        Ok(seat.clone())
    }

    fn record_action(
        &mut self,
        seat: &Seat,
        kind: MatchActionKind,
        round_number: u32,
        detail: Option<serde_json::Value>,
    ) {
        let Some(player) = self
            .rooms
            .get(&seat.room_id)
            .and_then(|room| room.find_player_by_id(&seat.player_id))
        else {
            return;
        };
        self.sessions
            .entry(seat.room_id.clone())
            .or_insert_with(|| MatchSession::new(seat.room_id.as_str()))
            .record(kind, player, round_number, detail);
    }

    // Membership

    pub fn join(&mut self, connection: ConnectionId, request: JoinRequest) -> Result<(), ManagerError> {
        if self.rooms.seat(connection).is_some() {
            return Err(ManagerError::AlreadyJoined);
        }

        let token = request
            .auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let identity = match token {
            Some(token) => Some(
                self.verifier
                    .verify_token(token)
                    .ok_or(ManagerError::InvalidSession)?,
            ),
            None => None,
        };

        let room_id = sanitize_room_id(request.room_id.as_deref());
        let player = match identity {
            Some(identity) => Player::new(
                uuid::Uuid::new_v4().to_string(),
                sanitize_name(Some(&identity.display_name)),
                connection,
            )
            .with_account(identity.account()),
            None => Player::new(
                uuid::Uuid::new_v4().to_string(),
                sanitize_name(request.name.as_deref()),
                connection,
            ),
        };

        self.join_room(connection, &room_id, player)
    }

    /// Seat `player` in `room_id`, creating the room on first arrival.
    fn join_room(
        &mut self,
        connection: ConnectionId,
        room_id: &str,
        player: Player,
    ) -> Result<(), ManagerError> {
        let (_, created) = self
            .rooms
            .find_or_create(room_id, &self.config.game, &self.roller);
        let player_id = player.id.clone();

        if let Err(e) = self.rooms.add_player(room_id, player) {
            if created {
                self.destroy_room(room_id);
            }
            return Err(e.into());
        }

        let room = self.rooms.get(room_id).ok_or(ManagerError::RoomUnavailable)?;
        let player = room
            .find_player_by_id(&player_id)
            .ok_or(GameError::NotInRoom)?;

        let session = self
            .sessions
            .entry(room_id.to_string())
            .or_insert_with(|| MatchSession::new(room_id));
        session.add_participant(player);
        session.record(MatchActionKind::Join, player, room.round().round_number, None);

        tracing::info!(
            room = %room_id,
            player = %player.name,
            auth = %player.auth_type,
            %connection,
            "joined"
        );

        let chat_history = self
            .chat_histories
            .get(room_id)
            .map(ChatHistory::entries)
            .unwrap_or_default();
        self.outbound.send(
            connection,
            &ServerMessage::Joined {
                player_id: player.id.clone(),
                auth_type: player.auth_type,
                state: room.build_state_for_player(player),
                chat_history,
            },
        );

        self.commit(room_id);
        Ok(())
    }

    /// Unseat a connection; empty rooms are destroyed. No-op if not joined.
    pub fn leave(&mut self, connection: ConnectionId) -> Option<Player> {
        let player = self.unseat(connection)?;
        self.chat_guard.forget(&player.id);
        Some(player)
    }

    /// Leave the current room while keeping the player's chat record.
    fn unseat(&mut self, connection: ConnectionId) -> Option<Player> {
        let seat = self.rooms.seat(connection)?.clone();
        let round_number = self
            .rooms
            .get(&seat.room_id)
            .map_or(0, |room| room.round().round_number);
        self.record_action(&seat, MatchActionKind::Leave, round_number, None);

        let (room_id, player) = self.rooms.remove_player(connection)?;
        tracing::info!(room = %room_id, player = %player.name, %connection, "left");

        if self.rooms.get(&room_id).is_some_and(PerudoGame::is_empty) {
            self.destroy_room(&room_id);
        } else {
            self.commit(&room_id);
        }
        Some(player)
    }

    fn destroy_room(&mut self, room_id: &str) {
        self.rooms.remove(room_id);
        self.sessions.remove(room_id);
        self.chat_histories.remove(room_id);
        self.finalized.remove(room_id);
    }

    // Game actions

    pub fn handle_start_game(&mut self, connection: ConnectionId) -> Result<(), ManagerError> {
        let seat = self.context(connection)?;
        let room = self
            .rooms
            .get_mut(&seat.room_id)
            .ok_or(ManagerError::RoomUnavailable)?;
        let round_number = room.round().round_number;

        room.handle_start_game(&seat.player_id)?;

        self.record_action(&seat, MatchActionKind::StartGame, round_number, None);
        self.commit(&seat.room_id);
        Ok(())
    }

    pub fn handle_bid(&mut self, connection: ConnectionId, payload: BidPayload) -> Result<(), ManagerError> {
        let seat = self.context(connection)?;
        let bid = Bid::from_payload(payload, seat.player_id.as_str()).ok_or(ManagerError::InvalidBid)?;
        let detail = bid.to_json();

        let room = self
            .rooms
            .get_mut(&seat.room_id)
            .ok_or(ManagerError::RoomUnavailable)?;
        let round_number = room.round().round_number;

        room.handle_bid(&seat.player_id, bid)?;

        self.record_action(&seat, MatchActionKind::Bid, round_number, Some(detail));
        self.commit(&seat.room_id);
        Ok(())
    }

    pub fn handle_dudo(&mut self, connection: ConnectionId) -> Result<(), ManagerError> {
        let seat = self.context(connection)?;
        let room = self
            .rooms
            .get_mut(&seat.room_id)
            .ok_or(ManagerError::RoomUnavailable)?;
        let round_number = room.round().round_number;

        room.handle_dudo(&seat.player_id)?;

        let detail = room.round().last_resolution.as_ref().map(|r| r.to_json());
        self.record_action(&seat, MatchActionKind::Dudo, round_number, detail);
        self.commit(&seat.room_id);
        Ok(())
    }

    pub fn handle_calza(&mut self, connection: ConnectionId) -> Result<(), ManagerError> {
        let seat = self.context(connection)?;
        let room = self
            .rooms
            .get_mut(&seat.room_id)
            .ok_or(ManagerError::RoomUnavailable)?;
        let round_number = room.round().round_number;

        room.handle_calza(&seat.player_id)?;

        let detail = room.round().last_resolution.as_ref().map(|r| r.to_json());
        self.record_action(&seat, MatchActionKind::Calza, round_number, detail);
        self.commit(&seat.room_id);
        Ok(())
    }

    // Rematch

    /// Move the caller from a finished room into its shared rematch room.
    pub fn handle_rematch(&mut self, connection: ConnectionId) -> Result<(), ManagerError> {
        let seat = self.context(connection)?;
        let room = self
            .rooms
            .get(&seat.room_id)
            .ok_or(ManagerError::RoomUnavailable)?;
        if !room.round().is_game_over() {
            return Err(ManagerError::RematchUnavailable);
        }

        let carried = room
            .find_player_by_id(&seat.player_id)
            .ok_or(GameError::NotInRoom)?
            .clone();
        let round_number = room.round().round_number;

        let target = match room.rematch_room_id.clone() {
            Some(code) => code,
            None => {
                let code = self
                    .rooms
                    .generate_unique_code(&mut rand::thread_rng(), self.config.rematch_code_length);
                if let Some(room) = self.rooms.get_mut(&seat.room_id) {
                    room.rematch_room_id = Some(code.clone());
                }
                tracing::info!(room = %seat.room_id, rematch = %code, "rematch room assigned");
                code
            }
        };

        self.finalize_match_if_needed(&seat.room_id, "rematch");
        self.record_action(&seat, MatchActionKind::Rematch, round_number, None);
        self.unseat(connection);

        let mut player = Player::new(carried.id, carried.name, connection);
        if let Some(account) = carried.account {
            player = player.with_account(account);
        }
        self.join_room(connection, &target, player)
    }

    /// Emit the match document and account records for a room, once.
    pub fn finalize_match_if_needed(&mut self, room_id: &str, trigger: &str) {
        if self.finalized.contains(room_id) {
            return;
        }
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        let session = self
            .sessions
            .entry(room_id.to_string())
            .or_insert_with(|| MatchSession::new(room_id));

        let winner = room.winner().map(|p| MatchWinner {
            player_id: p.id.clone(),
            name: p.name.clone(),
            account_username: p.account_username().map(str::to_string),
        });
        let winner_id: Option<PlayerId> = winner.as_ref().map(|w| w.player_id.clone());

        let document = session.to_document(
            trigger,
            room.round().round_number,
            room.action_log().to_vec(),
            room.round().last_resolution.as_ref().map(|r| r.to_json()),
            winner,
        );
        self.finalized.insert(room_id.to_string());

        tracing::info!(
            room = %room_id,
            trigger,
            match_id = %document.id,
            winner = ?winner_id,
            "match finalized"
        );

        for participant in &document.participants {
            let Some(username) = &participant.account_username else {
                continue;
            };
            self.telemetry
                .emit(TelemetryEvent::IncrementUserRecord(UserRecordDelta {
                    username: username.clone(),
                    display_name: participant.name.clone(),
                    is_win: winner_id.as_deref() == Some(participant.player_id.as_str()),
                    match_id: document.id.clone(),
                }));
        }
        self.telemetry.emit(TelemetryEvent::UpsertMatch(document));
    }

    // Chat

    pub fn handle_chat(&mut self, connection: ConnectionId, raw: &str) -> Result<(), ManagerError> {
        let seat = self.context(connection)?;
        let message = sanitize_message(raw, self.config.chat.max_message_length)
            .ok_or(ChatError::Empty)?;

        let now = Utc::now();
        self.chat_guard.check(&seat.player_id, &message, now)?;

        let room = self
            .rooms
            .get(&seat.room_id)
            .ok_or(ManagerError::RoomUnavailable)?;
        let player = room
            .find_player_by_id(&seat.player_id)
            .ok_or(GameError::NotInRoom)?;

        let entry = ChatEntry {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: seat.room_id.clone(),
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            account_username: player.account_username().map(str::to_string),
            message,
            sent_at: now,
        };

        let capacity = self.config.chat.history_capacity;
        self.chat_histories
            .entry(seat.room_id.clone())
            .or_insert_with(|| ChatHistory::new(capacity))
            .push(entry.clone());
        self.telemetry.emit(TelemetryEvent::RecordChat(entry.clone()));

        let message = ServerMessage::Chat(entry);
        for member in room.roster() {
            self.outbound.send(member.connection, &message);
        }
        Ok(())
    }
}
