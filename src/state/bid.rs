//! Bids.

use serde::Deserialize;

use super::player::PlayerId;

/// The wildcard face ("Pacos").
pub const WILDCARD_FACE: u8 = 1;

/// Highest die face.
pub const MAX_FACE: u8 = 6;

/// An immutable claim: at least `quantity` dice show `face`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bid {
    pub quantity: u32,
    pub face: u8,
    pub player_id: PlayerId,
}

/// Raw bid fields as they arrive from a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BidPayload {
    pub quantity: i64,
    pub face: i64,
}

impl Bid {
    pub fn new(quantity: u32, face: u8, player_id: impl Into<PlayerId>) -> Self {
        Self {
            quantity,
            face,
            player_id: player_id.into(),
        }
    }

    /// Validate the shape of a client payload.
    ///
    /// Only the format is checked here; whether the bid is legal depends on
    /// the round and is decided by [`rules`](super::rules).
    pub fn from_payload(payload: BidPayload, player_id: impl Into<PlayerId>) -> Option<Self> {
        if payload.face < 1 || payload.face > i64::from(MAX_FACE) {
            return None;
        }
        let quantity = u32::try_from(payload.quantity).ok()?;
        Some(Self::new(quantity, payload.face as u8, player_id))
    }

    pub fn is_wildcard(&self) -> bool {
        self.face == WILDCARD_FACE
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "quantity": self.quantity,
            "face": self.face
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_payload_accepts_valid_faces() {
        for face in 1..=6 {
            let bid = Bid::from_payload(BidPayload { quantity: 3, face }, "p1").unwrap();
            assert_eq!(bid.face as i64, face);
            assert_eq!(bid.quantity, 3);
            assert_eq!(bid.player_id, "p1");
        }
    }

    #[test]
    fn test_from_payload_rejects_bad_shape() {
        assert!(Bid::from_payload(BidPayload { quantity: 2, face: 0 }, "p1").is_none());
        assert!(Bid::from_payload(BidPayload { quantity: 2, face: 7 }, "p1").is_none());
        assert!(Bid::from_payload(BidPayload { quantity: -1, face: 3 }, "p1").is_none());
    }

    #[test]
    fn test_zero_quantity_is_well_formed() {
        // Rejected later by the rules, not by the parser.
        let bid = Bid::from_payload(BidPayload { quantity: 0, face: 3 }, "p1").unwrap();
        assert_eq!(bid.quantity, 0);
    }

    #[test]
    fn test_payload_from_json() {
        let payload: BidPayload = serde_json::from_str(r#"{"quantity": 4, "face": 2}"#).unwrap();
        assert_eq!(payload, BidPayload { quantity: 4, face: 2 });
        assert!(Bid::new(2, 1, "p1").is_wildcard());
    }
}
