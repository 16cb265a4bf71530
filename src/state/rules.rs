//! Bid legality and die counting.
//!
//! Pure functions over a roster. Only [active](Player::is_active) players
//! hold dice in the current round, so eliminated and sitting-out seats never
//! contribute to counts or bounds.

use super::bid::{Bid, WILDCARD_FACE};
use super::player::Player;

/// Dice held by players taking part in the round.
pub fn total_dice_in_play(players: &[Player]) -> u32 {
    players
        .iter()
        .filter(|p| p.is_active())
        .map(|p| u32::from(p.dice_count))
        .sum()
}

/// Dice that satisfy `bid` under the round's wildcard rules.
///
/// Outside Palifico the wildcard face also matches any non-wildcard bid.
pub fn count_matching_dice(players: &[Player], bid: &Bid, palifico_round: bool) -> u32 {
    let wild = !palifico_round && !bid.is_wildcard();

    players
        .iter()
        .filter(|p| p.is_active())
        .flat_map(|p| p.current_dice.iter())
        .filter(|&&die| die == bid.face || (wild && die == WILDCARD_FACE))
        .count() as u32
}

fn quantity_in_bounds(players: &[Player], bid: &Bid) -> bool {
    bid.quantity >= 1 && bid.quantity <= total_dice_in_play(players)
}

/// Opening bid of a round. Wildcards may only open a Palifico round.
pub fn is_valid_first_bid(players: &[Player], bid: &Bid, palifico_round: bool) -> bool {
    if !quantity_in_bounds(players, bid) {
        return false;
    }

    palifico_round || !bid.is_wildcard()
}

/// Whether `next` legally outbids `previous`.
pub fn is_valid_raised_bid(
    players: &[Player],
    previous: &Bid,
    next: &Bid,
    palifico_round: bool,
    palifico_face: Option<u8>,
) -> bool {
    if !quantity_in_bounds(players, next) {
        return false;
    }

    if palifico_round {
        return Some(next.face) == palifico_face && next.quantity > previous.quantity;
    }

    match (previous.is_wildcard(), next.is_wildcard()) {
        (false, false) => {
            next.quantity > previous.quantity
                || (next.quantity == previous.quantity && next.face > previous.face)
        }
        (false, true) => next.quantity >= previous.quantity.div_ceil(2),
        (true, true) => next.quantity > previous.quantity,
        (true, false) => next.quantity >= previous.quantity * 2 + 1,
    }
}
