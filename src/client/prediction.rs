//! Prediction Buffer
//!
//! Every locally simulated tick is recorded as (tick, input, state after).
//! Entries leave when the server confirms a tick at or past their own. The
//! buffer is bounded: on overflow the oldest entry is dropped, which also
//! bounds how far back a rollback can reach.

use std::collections::VecDeque;

use crate::game::input::InputFrame;
use crate::game::state::PlayerState;

/// Default capacity (a little over two seconds at 60 Hz).
pub const PREDICTION_CAPACITY: usize = 128;

/// One predicted tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PredictionEntry {
    /// Client tick
    pub tick: u32,
    /// Input applied on this tick
    pub input: InputFrame,
    /// Local state after applying `input`
    pub state_after: PlayerState,
}

/// Ring of unconfirmed predictions, oldest first.
#[derive(Clone, Debug)]
pub struct PredictionBuffer {
    entries: VecDeque<PredictionEntry>,
    capacity: usize,
}

impl Default for PredictionBuffer {
    fn default() -> Self {
        Self::with_capacity(PREDICTION_CAPACITY)
    }
}

impl PredictionBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a prediction, dropping the oldest when full.
    pub fn push(&mut self, entry: PredictionEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Remove every entry with tick <= `tick`; returns the entry for `tick`.
    pub fn confirm(&mut self, tick: u32) -> Option<PredictionEntry> {
        let mut confirmed = None;
        while self.entries.front().is_some_and(|e| e.tick <= tick) {
            if let Some(entry) = self.entries.pop_front() {
                if entry.tick == tick {
                    confirmed = Some(entry);
                }
            }
        }
        confirmed
    }

    /// Entry for a tick, if still buffered.
    pub fn get(&self, tick: u32) -> Option<&PredictionEntry> {
        self.entries.iter().find(|e| e.tick == tick)
    }

    pub fn oldest_tick(&self) -> Option<u32> {
        self.entries.front().map(|e| e.tick)
    }

    pub fn newest_tick(&self) -> Option<u32> {
        self.entries.back().map(|e| e.tick)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PredictionEntry> {
        self.entries.iter()
    }

    /// Mutable access in tick order (used when replaying).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PredictionEntry> {
        self.entries.iter_mut()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
