//! Room registry.
//!
//! Rooms are keyed by their sanitized id and created on first join. The
//! registry also indexes which room and player each connection is bound to,
//! so a connection is in at most one room at a time.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use super::config::GameConfig;
use super::connection::ConnectionId;
use super::game::{DiceRoller, GameError, PerudoGame};
use super::player::{Player, PlayerId};

/// Room joined when the client names none.
pub const DEFAULT_ROOM_ID: &str = "lobby";

/// Name used when the client sends none.
pub const DEFAULT_PLAYER_NAME: &str = "Player";

pub const MAX_NAME_LEN: usize = 20;

pub const MAX_ROOM_ID_LEN: usize = 24;

/// Rematch code alphabet, without look-alike characters.
const ROOM_CODE_ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";

const CODE_ATTEMPTS_PER_LENGTH: usize = 32;

/// Trim, default to "Player", cap at 20 characters.
pub fn sanitize_name(raw: Option<&str>) -> String {
    let trimmed = raw.unwrap_or_default().trim();
    if trimmed.is_empty() {
        return DEFAULT_PLAYER_NAME.to_string();
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}

/// Lowercase, keep `[a-z0-9_-]`, cap at 24; "lobby" when nothing is left.
pub fn sanitize_room_id(raw: Option<&str>) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
        .take(MAX_ROOM_ID_LEN)
        .collect();

    if cleaned.is_empty() {
        DEFAULT_ROOM_ID.to_string()
    } else {
        cleaned
    }
}

/// Random room code of `len` characters.
pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect()
}

/// Where a connection is seated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub room_id: String,
    pub player_id: PlayerId,
}

/// All live rooms.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// Rooms by id
    rooms: HashMap<String, PerudoGame>,

    /// Connection to seat mapping
    seat_index: HashMap<ConnectionId, Seat>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room_id: &str) -> Option<&PerudoGame> {
        self.rooms.get(room_id)
    }

    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut PerudoGame> {
        self.rooms.get_mut(room_id)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Seat of a connection, if it has joined a room.
    pub fn seat(&self, connection: ConnectionId) -> Option<&Seat> {
        self.seat_index.get(&connection)
    }

    pub fn room_for_connection(&self, connection: ConnectionId) -> Option<&PerudoGame> {
        self.seat_index
            .get(&connection)
            .and_then(|seat| self.rooms.get(&seat.room_id))
    }

    /// Get a room, creating it if needed. Returns whether it was created.
    pub fn find_or_create(
        &mut self,
        room_id: &str,
        config: &GameConfig,
        roller: &Arc<dyn DiceRoller>,
    ) -> (&mut PerudoGame, bool) {
        let created = !self.rooms.contains_key(room_id);
        let room = self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            tracing::info!(room = %room_id, "room created");
            PerudoGame::new(room_id, config.clone(), Arc::clone(roller))
        });
        (room, created)
    }

    /// Seat a player in an existing room and index their connection.
    pub fn add_player(&mut self, room_id: &str, player: Player) -> Result<(), GameError> {
        let room = self.rooms.get_mut(room_id).ok_or(GameError::NotInRoom)?;
        let seat = Seat {
            room_id: room_id.to_string(),
            player_id: player.id.clone(),
        };
        let connection = player.connection;

        room.add_player(player)?;
        self.seat_index.insert(connection, seat);
        Ok(())
    }

    /// Unseat a connection. The room is kept even if it ends up empty.
    pub fn remove_player(&mut self, connection: ConnectionId) -> Option<(String, Player)> {
        let seat = self.seat_index.remove(&connection)?;
        let room = self.rooms.get_mut(&seat.room_id)?;
        let player = room.remove_player_by_connection(connection)?;
        Some((seat.room_id, player))
    }

    /// Remove a room and every seat pointing into it.
    pub fn remove(&mut self, room_id: &str) -> Option<PerudoGame> {
        let room = self.rooms.remove(room_id)?;
        for player in room.roster() {
            self.seat_index.remove(&player.connection);
        }
        tracing::info!(room = %room_id, "room destroyed");
        Some(room)
    }

    /// A code not used by any live room.
    ///
    /// Grows one character at a time if `len` keeps colliding.
    pub fn generate_unique_code<R: Rng + ?Sized>(&self, rng: &mut R, len: usize) -> String {
        let mut len = len.max(1);
        loop {
            for _ in 0..CODE_ATTEMPTS_PER_LENGTH {
                let code = generate_room_code(rng, len);
                if !self.rooms.contains_key(&code) {
                    return code;
                }
            }
            tracing::warn!(len, "room code space crowded, lengthening");
            len += 1;
        }
    }

    pub fn count(&self) -> usize {
        self.rooms.len()
    }
}
