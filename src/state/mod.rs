//! State management for Perudo rooms.
//!
//! - `bid`, `rules` - Bids and the legality/counting rules
//! - `round` - Per-room round state machine and challenge outcomes
//! - `player` - Seats, dice and the room action log
//! - `game` - A single room: roster, turns, resolutions, snapshots
//! - `room` - Room registry and connection seating
//! - `manager` - Cross-room orchestration: joins, rematches, chat, telemetry
//! - `chat`, `session`, `telemetry`, `auth`, `config`, `connection` - Supporting pieces
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            GameManager                               │
//! │                                                                      │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐    │
//! │  │  RoomRegistry    │  │  ChatGuard       │  │  MatchSession    │    │
//! │  │                  │  │                  │  │  (per room)      │    │
//! │  │ room_id →        │  │ player_id →      │  │                  │    │
//! │  │   PerudoGame     │  │   rate record    │  │ participants,    │    │
//! │  │                  │  │                  │  │ ordered actions  │    │
//! │  │ connection →     │  │ room_id →        │  │                  │    │
//! │  │   (room, player) │  │   ChatHistory    │  │                  │    │
//! │  └──────────────────┘  └──────────────────┘  └──────────────────┘    │
//! │           │                                          │               │
//! │           ▼                                          ▼               │
//! │  ┌────────────────────────────────┐        ┌───────────────────┐     │
//! │  │ PerudoGame                     │        │ TelemetryHandle   │     │
//! │  │  roster ─ RoundState ─ rules   │        │ (unbounded mpsc)  │     │
//! │  └────────────────────────────────┘        └───────────────────┘     │
//! └──────────────────────────────────────────────────────│───────────────┘
//!                                                        ▼
//!                                   telemetry worker ──▶ TelemetryStore
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use perudo_state::state::{ConnectionId, GameManager, ManagerConfig, ServerMessage};
//!
//! let outbound = std::sync::Arc::new(|conn, msg: &ServerMessage| transport.send(conn, msg.to_json()));
//! let mut manager = GameManager::new(ManagerConfig::default(), outbound)?;
//!
//! manager.handle_message(ConnectionId(1), r#"{"type":"join","room_id":"table-1","name":"Alice"}"#);
//! manager.handle_message(ConnectionId(1), r#"{"type":"bid","quantity":3,"face":4}"#);
//! manager.disconnect(ConnectionId(1));
//! ```

pub mod auth;
pub mod bid;
pub mod chat;
pub mod config;
pub mod connection;
pub mod game;
pub mod manager;
pub mod player;
pub mod room;
pub mod round;
pub mod rules;
pub mod session;
pub mod telemetry;

#[cfg(test)]
mod properties;

// Re-export commonly used types
pub use auth::{NoAuth, StaticTokenVerifier, TokenVerifier, VerifiedIdentity};
pub use bid::{Bid, BidPayload, MAX_FACE, WILDCARD_FACE};
pub use chat::{ChatEntry, ChatError, ChatGuard, ChatHistory};
pub use config::{ChatConfig, ConfigError, GameConfig, ManagerConfig};
pub use connection::{ClientAction, ConnectionId, Outbound, ServerMessage};
pub use game::{DiceRoller, GameError, PerudoGame, RandomDiceRoller};
pub use manager::{GameManager, JoinRequest, ManagerError};
pub use player::{AccountIdentity, ActionLog, AuthType, Player, PlayerId};
pub use room::{sanitize_name, sanitize_room_id, RoomRegistry, Seat};
pub use round::{CalzaResolution, DudoResolution, Resolution, RevealedHand, RoundPhase, RoundState};
pub use session::{MatchAction, MatchActionKind, MatchDocument, MatchSession, MatchWinner, Participant};
pub use telemetry::{
    run_telemetry_worker, spawn_telemetry_worker, InMemoryTelemetryStore, TelemetryError,
    TelemetryEvent, TelemetryHandle, TelemetryStore, UserRecordDelta, UserStats,
};
