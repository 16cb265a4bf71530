//! Connection handles and the message contract with the transport.
//!
//! The transport owns sockets. This crate only sees an opaque
//! [`ConnectionId`] per socket, hands outgoing [`ServerMessage`]s to an
//! [`Outbound`] sink, and receives [`ClientAction`]s.

use std::fmt;

use serde::Deserialize;

use super::chat::ChatEntry;
use super::player::{AuthType, PlayerId};

/// Transport-assigned handle for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Fire-and-forget delivery to a connection.
///
/// Implementations must not block and must silently drop messages for
/// connections that are already closed.
pub trait Outbound: Send + Sync {
    fn send(&self, connection: ConnectionId, message: &ServerMessage);
}

impl<F> Outbound for F
where
    F: Fn(ConnectionId, &ServerMessage) + Send + Sync,
{
    fn send(&self, connection: ConnectionId, message: &ServerMessage) {
        self(connection, message)
    }
}

/// Messages produced for a single connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Sent once after a successful join
    Joined {
        player_id: PlayerId,
        auth_type: AuthType,
        state: serde_json::Value,
        chat_history: Vec<ChatEntry>,
    },

    /// Per-player snapshot after every accepted action
    State(serde_json::Value),

    Chat(ChatEntry),

    /// Human-readable reason for a rejected action
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "joined",
            Self::State(_) => "state",
            Self::Chat(_) => "chat",
            Self::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Joined {
                player_id,
                auth_type,
                state,
                chat_history,
            } => {
                let history: Vec<serde_json::Value> =
                    chat_history.iter().map(|c| c.to_json()).collect();
                serde_json::json!({
                    "type": "joined",
                    "player_id": player_id,
                    "auth_type": auth_type.as_str(),
                    "state": state,
                    "chat_history": history
                })
            }
            Self::State(state) => state.clone(),
            Self::Chat(entry) => {
                let mut obj = entry.to_json();
                obj["type"] = serde_json::json!("chat");
                obj
            }
            Self::Error { message } => serde_json::json!({
                "type": "error",
                "message": message
            }),
        }
    }
}

/// Actions a client can submit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    Join {
        #[serde(default, alias = "roomId")]
        room_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default, alias = "authToken")]
        auth_token: Option<String>,
    },
    StartGame,
    Bid {
        quantity: i64,
        face: i64,
    },
    Dudo,
    Calza,
    Rematch,
    Chat {
        #[serde(default)]
        message: String,
    },
    Leave,
}

impl ClientAction {
    /// Parse one framed text message.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            ClientAction::parse(r#"{"type":"join","roomId":"Table-1","name":"Alice"}"#).unwrap(),
            ClientAction::Join {
                room_id: Some("Table-1".to_string()),
                name: Some("Alice".to_string()),
                auth_token: None,
            }
        );
        assert_eq!(
            ClientAction::parse(r#"{"type":"bid","quantity":3,"face":4}"#).unwrap(),
            ClientAction::Bid {
                quantity: 3,
                face: 4
            }
        );
        assert_eq!(
            ClientAction::parse(r#"{"type":"start_game"}"#).unwrap(),
            ClientAction::StartGame
        );
        assert_eq!(ClientAction::parse(r#"{"type":"dudo"}"#).unwrap(), ClientAction::Dudo);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(ClientAction::parse(r#"{"type":"roll"}"#).is_err());
        assert!(ClientAction::parse("not json").is_err());
        assert!(ClientAction::parse(r#"{"type":"bid","face":4}"#).is_err());
    }

    #[test]
    fn test_error_message_json() {
        let msg = ServerMessage::error("Not your turn.");
        assert_eq!(msg.kind(), "error");
        assert_eq!(
            msg.to_json(),
            serde_json::json!({"type": "error", "message": "Not your turn."})
        );
    }

    #[test]
    fn test_closure_outbound() {
        let sent: Arc<Mutex<Vec<(ConnectionId, String)>>> = Arc::default();
        let sink = {
            let sent = Arc::clone(&sent);
            move |conn: ConnectionId, msg: &ServerMessage| {
                sent.lock().unwrap().push((conn, msg.kind().to_string()));
            }
        };

        sink.send(ConnectionId(7), &ServerMessage::error("x"));
        assert_eq!(sent.lock().unwrap()[0], (ConnectionId(7), "error".to_string()));
        assert_eq!(ConnectionId(7).to_string(), "conn-7");
    }
}
