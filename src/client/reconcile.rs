//! Reconciliation
//!
//! Applies an authoritative snapshot of the local player to the prediction
//! state. The snapshot carries `last_processed_tick` T:
//!
//! 1. Entries up to T are confirmed and leave the buffer.
//! 2. The prediction for T is compared with the server's state (position
//!    within epsilon).
//! 3. Match: keep the local prediction. Mismatch: take the server state and
//!    replay the remaining inputs in tick order, rewriting their recorded
//!    states.
//!
//! Only ticks that were never rendered are replayed, so the corrected
//! present has no visible snap back.

use tracing::debug;

use crate::core::fixed::{Fixed, Units};
use crate::game::state::PlayerState;
use crate::game::tick::simulate;
use crate::game::world::World;
use crate::client::prediction::PredictionBuffer;

/// Outcome of one reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    /// Prediction at `tick` matched; nothing replayed.
    Confirmed { tick: u32 },
    /// Prediction diverged; server state adopted and `replayed` inputs re-run.
    Corrected { tick: u32, error: Fixed, replayed: usize },
    /// Server is at or past the local tick counter; adopted outright.
    Adopted { tick: u32 },
}

impl Reconciliation {
    /// True when a rollback happened.
    pub fn is_correction(&self) -> bool {
        matches!(self, Reconciliation::Corrected { .. })
    }
}

/// Reconcile the local prediction against the server's state for this player.
///
/// `next_tick` is the local tick counter (the next tick to be predicted).
pub fn reconcile(
    local: &mut PlayerState,
    buffer: &mut PredictionBuffer,
    authoritative: &PlayerState,
    next_tick: u32,
    world: &World,
    epsilon: Fixed,
) -> Reconciliation {
    let tick = authoritative.last_processed_tick;

    if tick >= next_tick {
        buffer.clear();
        *local = *authoritative;
        return Reconciliation::Adopted { tick };
    }

    // Server-owned progress always comes from the server.
    local.adopt_progress(authoritative);

    let predicted = buffer.confirm(tick);
    if let Some(entry) = predicted {
        if entry.state_after.position.within(authoritative.position, epsilon) {
            return Reconciliation::Confirmed { tick };
        }
    }

    let error = predicted
        .map(|entry| position_error(&entry.state_after, authoritative))
        .unwrap_or(Fixed::MAX);
    let replayed = buffer.len();
    *local = replay_from(authoritative, buffer, world);

    debug!(
        "Rollback at tick {}: error {} units, replayed {} ticks from {}",
        tick,
        Units(error),
        replayed,
        authoritative.summary()
    );
    Reconciliation::Corrected { tick, error, replayed }
}

/// Replay every buffered input from `start`, rewriting the recorded states.
pub fn replay_from(start: &PlayerState, buffer: &mut PredictionBuffer, world: &World) -> PlayerState {
    let mut state = *start;
    for entry in buffer.iter_mut() {
        state = simulate(&state, &entry.input, world);
        entry.state_after = state;
    }
    state
}

/// Largest per-axis position difference, saturating.
fn position_error(a: &PlayerState, b: &PlayerState) -> Fixed {
    let dx = (a.position.x as i64 - b.position.x as i64).abs();
    let dy = (a.position.y as i64 - b.position.y as i64).abs();
    dx.max(dy).min(Fixed::MAX as i64) as Fixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::core::fixed::FIXED_ONE;
    use crate::core::vec2::FixedVec2;
    use crate::client::prediction::PredictionEntry;
    use crate::game::input::InputFrame;
    use crate::game::state::PlayerId;
    use crate::game::tick::replay_inputs;

    const OPEN_ROOM: &str = "\
00000000000000000000
0                  0
0                  0
0                  0
0                  0
0 X                0
00000000000000000000";

    fn room() -> World {
        World::parse(OPEN_ROOM).unwrap()
    }

    /// Predict ticks 51..=55 running right from (100, 100) at tick 50.
    fn predicted_run(world: &World) -> (PlayerState, PredictionBuffer, PlayerState) {
        let mut at_50 = PlayerState::spawn(PlayerId(1), FixedVec2::from_ints(100, 100));
        at_50.last_processed_tick = 50;

        let mut buffer = PredictionBuffer::default();
        buffer.push(PredictionEntry {
            tick: 50,
            input: InputFrame::neutral(50),
            state_after: at_50,
        });

        let mut local = at_50;
        for tick in 51..=55 {
            let input = InputFrame::with_buttons(tick, InputFrame::RIGHT);
            local = simulate(&local, &input, world);
            buffer.push(PredictionEntry { tick, input, state_after: local });
        }
        (at_50, buffer, local)
    }

    #[test]
    fn test_matching_snapshot_keeps_prediction() {
        let world = room();
        let (at_50, mut buffer, mut local) = predicted_run(&world);
        let before = local;

        let mut server = at_50;
        server.level_ticks = 99;
        let outcome = reconcile(&mut local, &mut buffer, &server, 56, &world, FIXED_ONE);

        assert_eq!(outcome, Reconciliation::Confirmed { tick: 50 });
        assert_eq!(local.position, before.position);
        assert_eq!(local.velocity, before.velocity);
        assert_eq!(local.level_ticks, 99);
        assert_eq!(buffer.oldest_tick(), Some(51));
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_within_epsilon_is_not_a_mismatch() {
        let world = room();
        let (at_50, mut buffer, mut local) = predicted_run(&world);
        let before = local;

        let mut server = at_50;
        server.position.x += FIXED_ONE / 2;
        let outcome = reconcile(&mut local, &mut buffer, &server, 56, &world, FIXED_ONE);
        assert!(!outcome.is_correction());
        assert_eq!(local.position, before.position);
    }

    #[test]
    fn test_mismatch_rolls_back_and_replays() {
        let world = room();
        let (at_50, mut buffer, mut local) = predicted_run(&world);
        let before = local;

        let mut server = at_50;
        server.position = FixedVec2::from_ints(96, 100);
        let outcome = reconcile(&mut local, &mut buffer, &server, 56, &world, FIXED_ONE);

        match outcome {
            Reconciliation::Corrected { tick, error, replayed } => {
                assert_eq!(tick, 50);
                assert_eq!(error, 4 * FIXED_ONE);
                assert_eq!(replayed, 5);
            }
            other => panic!("expected correction, got {:?}", other),
        }
        assert_ne!(local.position, before.position);

        let inputs: Vec<InputFrame> = (51..=55)
            .map(|t| InputFrame::with_buttons(t, InputFrame::RIGHT))
            .collect();
        assert_eq!(local, replay_inputs(&server, &inputs, &world));
        assert_eq!(buffer.get(55).map(|e| e.state_after), Some(local));
    }

    #[test]
    fn test_server_ahead_is_adopted() {
        let world = room();
        let (at_50, mut buffer, mut local) = predicted_run(&world);

        let mut server = at_50;
        server.last_processed_tick = 56;
        server.position = FixedVec2::from_ints(300, 40);
        let outcome = reconcile(&mut local, &mut buffer, &server, 56, &world, FIXED_ONE);

        assert_eq!(outcome, Reconciliation::Adopted { tick: 56 });
        assert_eq!(local, server);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_unbuffered_tick_replays_everything_left() {
        let world = room();
        let (at_50, mut buffer, mut local) = predicted_run(&world);

        let mut server = at_50;
        server.last_processed_tick = 49;
        let outcome = reconcile(&mut local, &mut buffer, &server, 56, &world, FIXED_ONE);
        assert!(matches!(outcome, Reconciliation::Corrected { replayed: 6, .. }));
        assert_eq!(buffer.len(), 6);
    }

    fn frames(raw: &[(u8, f32, f32)]) -> Vec<InputFrame> {
        raw.iter()
            .enumerate()
            .map(|(i, &(buttons, x, y))| InputFrame::with_buttons(i as u32 + 1, buttons & 0x1f).aimed(x, y))
            .collect()
    }

    proptest! {
        #[test]
        fn prop_replay_from_matching_state_is_identity(
            raw in proptest::collection::vec((any::<u8>(), -1.0f32..1.0, -1.0f32..1.0), 2..90),
            split in any::<prop::sample::Index>(),
        ) {
            let world = room();
            let inputs = frames(&raw);
            let start = PlayerState::spawn(PlayerId(1), world.spawn());

            let mut buffer = PredictionBuffer::default();
            let mut local = start;
            for input in &inputs {
                local = simulate(&local, input, &world);
                buffer.push(PredictionEntry { tick: input.tick, input: *input, state_after: local });
            }

            let confirmed_tick = split.index(inputs.len()) as u32 + 1;
            let authoritative = buffer.get(confirmed_tick).map(|e| e.state_after).unwrap();
            let mut remaining = buffer.clone();
            remaining.confirm(confirmed_tick);
            prop_assert_eq!(replay_from(&authoritative, &mut remaining, &world), local);

            let mut reconciled = local;
            let outcome = reconcile(
                &mut reconciled,
                &mut buffer,
                &authoritative,
                inputs.len() as u32 + 1,
                &world,
                FIXED_ONE,
            );
            prop_assert!(!outcome.is_correction());
            prop_assert_eq!(reconciled, local);
        }
    }
}
