//! Configuration for rooms, chat policy and the manager.
//!
//! Every struct deserializes with defaults for missing fields, so a TOML
//! file only needs to name the values it overrides:
//!
//! ```toml
//! [game]
//! max_players = 8
//!
//! [chat]
//! blocked_terms = ["spam.example"]
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-room game settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Active players needed before a round can start
    pub min_players: usize,

    /// Roster capacity, spectators included
    pub max_players: usize,

    /// Dice each player starts with (also the Calza cap)
    pub starting_dice: u8,

    /// Lines kept in the room's action log
    pub action_log_capacity: usize,

    /// Start round 1 as soon as enough players have joined
    pub auto_start: bool,

    /// Shuffle the roster once before the first round
    pub shuffle_turn_order: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 6,
            starting_dice: 5,
            action_log_capacity: 24,
            auto_start: true,
            shuffle_turn_order: true,
        }
    }
}

/// Chat safety policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub max_message_length: usize,

    /// Entries kept per room and replayed to joiners
    pub history_capacity: usize,

    /// Sliding window length for the rate limit
    pub window_secs: i64,
    pub max_messages_per_window: usize,

    /// Mute applied after any violation
    pub mute_secs: i64,

    /// Identical messages inside this window are suppressed
    pub duplicate_window_secs: i64,

    /// Longest allowed run of one repeated character
    pub max_repeated_chars: usize,

    /// Case-insensitive substrings that reject a message
    pub blocked_terms: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: 200,
            history_capacity: 50,
            window_secs: 10,
            max_messages_per_window: 5,
            mute_secs: 20,
            duplicate_window_secs: 8,
            max_repeated_chars: 12,
            blocked_terms: Vec::new(),
        }
    }
}

/// Top-level configuration handed to [`GameManager`](super::GameManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub game: GameConfig,
    pub chat: ChatConfig,
    pub rematch_code_length: usize,
}

impl ManagerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: ManagerConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the game cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let game = &self.game;
        if game.min_players < 2 {
            return Err(ConfigError::Invalid("game.min_players must be at least 2"));
        }
        if game.max_players < game.min_players {
            return Err(ConfigError::Invalid(
                "game.max_players must not be below game.min_players",
            ));
        }
        if game.starting_dice == 0 || game.starting_dice > 20 {
            return Err(ConfigError::Invalid("game.starting_dice must be in 1..=20"));
        }
        if game.action_log_capacity == 0 {
            return Err(ConfigError::Invalid("game.action_log_capacity must be positive"));
        }
        if self.chat.history_capacity == 0 || self.chat.max_message_length == 0 {
            return Err(ConfigError::Invalid("chat capacities must be positive"));
        }
        if self.chat.max_messages_per_window == 0 || self.chat.window_secs <= 0 {
            return Err(ConfigError::Invalid("chat rate window must be positive"));
        }
        if self.rematch_code_length < 4 {
            return Err(ConfigError::Invalid("rematch_code_length must be at least 4"));
        }
        Ok(())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            chat: ChatConfig::default(),
            rematch_code_length: 6,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}
