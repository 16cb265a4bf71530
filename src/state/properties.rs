//! Randomized checks of the room invariants.
//!
//! Tables of 2 to 5 players run random action sequences (sensible raises,
//! challenges, out-of-turn noise) and every step is checked against the
//! invariants the handlers promise to maintain.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::bid::Bid;
use super::config::GameConfig;
use super::connection::ConnectionId;
use super::game::{DiceRoller, GameError, PerudoGame};
use super::player::Player;
use super::round::{Resolution, RoundPhase};

const STARTING_DICE: u8 = 3;

fn seeded_roller(seed: u64) -> Arc<dyn DiceRoller> {
    let rng = Mutex::new(StdRng::seed_from_u64(seed));
    Arc::new(move |count: usize| {
        let mut rng = rng.lock().unwrap();
        (0..count).map(|_| rng.gen_range(1..=6u8)).collect::<Vec<u8>>()
    })
}

fn seat_table(seed: u64, players: usize) -> PerudoGame {
    let config = GameConfig {
        starting_dice: STARTING_DICE,
        shuffle_turn_order: false,
        ..GameConfig::default()
    };
    let mut game = PerudoGame::new("prop", config, seeded_roller(seed));
    for i in 0..players {
        let player = Player::new(format!("p{}", i), format!("P{}", i), ConnectionId(i as u64));
        game.add_player(player).unwrap();
    }
    game
}

type Fingerprint = (RoundPhase, usize, u32, Option<Bid>, Vec<u8>, Vec<Vec<u8>>);

fn fingerprint(game: &PerudoGame) -> Fingerprint {
    let round = game.round();
    (
        round.phase,
        round.turn_index,
        round.round_number,
        round.last_bid.clone(),
        game.roster().iter().map(|p| p.dice_count).collect(),
        game.roster().iter().map(|p| p.current_dice.clone()).collect(),
    )
}

fn total_dice(game: &PerudoGame) -> i32 {
    game.roster().iter().map(|p| i32::from(p.dice_count)).sum()
}

/// A raise that is legal whenever the quantity fits the table.
fn next_raise(game: &PerudoGame) -> (u32, u8) {
    let round = game.round();
    match &round.last_bid {
        None if round.palifico_round => (1, 3),
        None => (1, 2),
        Some(bid) if round.palifico_round => (bid.quantity + 1, bid.face),
        Some(bid) if bid.is_wildcard() => (bid.quantity + 1, bid.face),
        Some(bid) if bid.face < 6 => (bid.quantity, bid.face + 1),
        Some(bid) => (bid.quantity + 1, 2),
    }
}

#[derive(Debug, Clone)]
enum Step {
    Raise,
    Dudo,
    Calza(usize),
    Noise { seat: usize, quantity: u32, face: u8 },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => Just(Step::Raise),
        2 => Just(Step::Dudo),
        1 => any::<usize>().prop_map(Step::Calza),
        1 => (any::<usize>(), 0u32..12, 1u8..=6)
            .prop_map(|(seat, quantity, face)| Step::Noise { seat, quantity, face }),
    ]
}

fn check_invariants(game: &PerudoGame) -> Result<(), TestCaseError> {
    for player in game.roster() {
        prop_assert!(player.dice_count <= STARTING_DICE);
        prop_assert!(player.dice_count > 0 || player.current_dice.is_empty());
        if player.is_active() && game.round().is_bidding() {
            prop_assert_eq!(player.current_dice.len(), usize::from(player.dice_count));
        }
    }

    match game.round().phase {
        RoundPhase::Bidding => {
            let turn = game.current_turn_player();
            prop_assert!(turn.is_some_and(|p| p.is_active()));
        }
        _ => prop_assert!(game.round().last_bid.is_none()),
    }

    if game.round().is_game_over() {
        prop_assert_eq!(game.contender_count(), 1);
        prop_assert!(game.winner().is_some_and(|p| p.has_dice()));
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_room_invariants_hold(
        seed in any::<u64>(),
        players in 2usize..=5,
        steps in prop::collection::vec(step_strategy(), 1..120),
    ) {
        let mut game = seat_table(seed, players);
        prop_assert_eq!(game.phase(), RoundPhase::Bidding);
        check_invariants(&game)?;

        for step in steps {
            if game.round().is_game_over() {
                break;
            }

            let before = fingerprint(&game);
            let dice_before = total_dice(&game);
            let round_before = game.round().round_number;
            let turn_id = game.current_turn_player().map(|p| p.id.clone()).unwrap_or_default();

            let result: Result<(), GameError> = match &step {
                Step::Raise => {
                    let (quantity, face) = next_raise(&game);
                    game.handle_bid(&turn_id, Bid::new(quantity, face, turn_id.as_str()))
                }
                Step::Dudo => game.handle_dudo(&turn_id),
                Step::Calza(seat) => {
                    let id = game.roster()[seat % players].id.clone();
                    game.handle_calza(&id)
                }
                Step::Noise { seat, quantity, face } => {
                    let id = game.roster()[seat % players].id.clone();
                    game.handle_bid(&id, Bid::new(*quantity, *face, id.as_str()))
                }
            };

            match result {
                Err(_) => prop_assert_eq!(fingerprint(&game), before),
                Ok(()) => match &step {
                    Step::Dudo => {
                        prop_assert_eq!(dice_before - total_dice(&game), 1);
                        prop_assert!(matches!(game.round().last_resolution, Some(Resolution::Dudo(_))));
                    }
                    Step::Calza(_) => {
                        let Some(Resolution::Calza(r)) = &game.round().last_resolution else {
                            return Err(TestCaseError::fail("calza without resolution"));
                        };
                        let delta = i32::from(r.caller_dice_after) - i32::from(r.caller_dice_before);
                        prop_assert_eq!(total_dice(&game) - dice_before, delta);
                        if r.bid_is_exact {
                            prop_assert!(delta == 1 || r.caller_dice_before == STARTING_DICE);
                        } else {
                            prop_assert_eq!(delta, -1);
                        }
                    }
                    _ => prop_assert_eq!(total_dice(&game), dice_before),
                },
            }

            let round_after = game.round().round_number;
            prop_assert!(round_after >= round_before);
            if result.is_ok() && matches!(step, Step::Dudo | Step::Calza(_)) && game.round().is_bidding() {
                prop_assert_eq!(round_after, round_before + 1);
                prop_assert!(game.round().last_bid.is_none());
            }

            check_invariants(&game)?;
        }
    }

    #[test]
    fn prop_departures_keep_turn_on_active_player(
        seed in any::<u64>(),
        players in 3usize..=5,
        raises in 0usize..6,
        leaving in prop::collection::vec(any::<usize>(), 1..4),
    ) {
        let mut game = seat_table(seed, players);

        for _ in 0..raises {
            let turn_id = game.current_turn_player().map(|p| p.id.clone()).unwrap_or_default();
            let (quantity, face) = next_raise(&game);
            let _ = game.handle_bid(&turn_id, Bid::new(quantity, face, turn_id.as_str()));
        }

        for pick in leaving {
            if game.is_empty() {
                break;
            }
            let connection = game.roster()[pick % game.player_count()].connection;
            prop_assert!(game.remove_player_by_connection(connection).is_some());

            match game.phase() {
                RoundPhase::Bidding => {
                    prop_assert!(game.active_count() >= game.config().min_players);
                    prop_assert!(game.current_turn_player().is_some_and(|p| p.is_active()));
                }
                RoundPhase::GameOver => {
                    prop_assert_eq!(game.contender_count(), 1);
                    break;
                }
                RoundPhase::Waiting => prop_assert!(game.round().last_bid.is_none()),
            }
        }
    }
}
