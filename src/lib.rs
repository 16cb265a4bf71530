//! Perudo State Library
//!
//! This crate provides room, turn and rule state for multiplayer Perudo
//! (Liar's Dice).
//!
//! # Overview
//!
//! The state module provides:
//!
//! - **Rules** - Bid legality including Pacos (wildcard ones) and Palifico
//!   rounds, and matching-die counts.
//!
//! - **Rooms** - Roster, turn order, Dudo and Calza resolution, elimination,
//!   winner detection and per-player snapshots that never leak other hands.
//!
//! - **Orchestration** - Connection binding, rematch rooms, chat safety and
//!   best-effort match telemetry.
//!
//! # Design Principles
//!
//! 1. **Rejected actions change nothing** - Handlers validate first and return
//!    a player-facing error without mutating the room.
//!
//! 2. **The roster owns players** - Connection indexes hold ids, never
//!    references.
//!
//! 3. **No networking** - The transport hands in text frames and receives
//!    [`ServerMessage`](state::ServerMessage)s through an `Outbound` sink.
//!
//! 4. **Never wait on I/O** - Telemetry is queued on a channel and written by
//!    a background worker.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use perudo_state::state::{ConnectionId, GameManager, ManagerConfig, RoundPhase, ServerMessage};
//!
//! let outbox: Arc<Mutex<Vec<(ConnectionId, ServerMessage)>>> = Arc::default();
//! let sink = {
//!     let outbox = Arc::clone(&outbox);
//!     move |conn: ConnectionId, msg: &ServerMessage| outbox.lock().unwrap().push((conn, msg.clone()))
//! };
//!
//! let mut manager = GameManager::new(ManagerConfig::default(), Arc::new(sink)).unwrap();
//! manager.handle_message(ConnectionId(1), r#"{"type":"join","room_id":"table-1","name":"Alice"}"#);
//! manager.handle_message(ConnectionId(2), r#"{"type":"join","room_id":"table-1","name":"Bob"}"#);
//!
//! // Two players are enough; the first round starts on its own.
//! let room = manager.room("table-1").unwrap();
//! assert_eq!(room.phase(), RoundPhase::Bidding);
//! assert!(outbox.lock().unwrap().iter().any(|(_, msg)| msg.kind() == "joined"));
//! ```

pub mod state;

// Re-export everything from state module at crate root
pub use state::*;
