//! Input Frames
//!
//! The per-tick input snapshot fed to `simulate`. Buttons are a packed
//! bitmask; the dash direction travels as two raw f32 components and is
//! quantized to fixed-point inside the simulation so that both sides see
//! identical bits.

use serde::{Serialize, Deserialize};
use crate::core::fixed::quantize_unit;
use crate::core::vec2::FixedVec2;

// =============================================================================
// INPUT TYPES
// =============================================================================

/// Raw input state for a single tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Client tick this input belongs to (monotonically increasing).
    pub tick: u32,

    /// Button flags (packed bits):
    /// - Bit 0: Left held
    /// - Bit 1: Right held
    /// - Bit 2: Jump held
    /// - Bit 3: Jump pressed this tick
    /// - Bit 4: Dash pressed this tick
    /// - Bit 5-7: Reserved
    pub buttons: u8,

    /// Dash aim, x component. Keys give ±1, sticks anything in between.
    pub dash_x: f32,

    /// Dash aim, y component (+Y is down).
    pub dash_y: f32,
}

impl InputFrame {
    /// Left held
    pub const LEFT: u8 = 0x01;

    /// Right held
    pub const RIGHT: u8 = 0x02;

    /// Jump held
    pub const JUMP_HELD: u8 = 0x04;

    /// Jump press edge
    pub const JUMP_PRESS: u8 = 0x08;

    /// Dash press edge
    pub const DASH_PRESS: u8 = 0x10;

    /// Bits that only fire on the tick a button goes down.
    pub const EDGE_MASK: u8 = Self::JUMP_PRESS | Self::DASH_PRESS;

    /// Create an empty frame for a tick.
    pub const fn neutral(tick: u32) -> Self {
        Self {
            tick,
            buttons: 0,
            dash_x: 0.0,
            dash_y: 0.0,
        }
    }

    /// Create a frame with the given buttons and no dash aim.
    pub const fn with_buttons(tick: u32, buttons: u8) -> Self {
        Self {
            tick,
            buttons,
            dash_x: 0.0,
            dash_y: 0.0,
        }
    }

    /// Builder: set the dash aim.
    pub fn aimed(mut self, dash_x: f32, dash_y: f32) -> Self {
        self.dash_x = dash_x;
        self.dash_y = dash_y;
        self
    }

    /// Check a button bit.
    #[inline]
    pub fn has(&self, bit: u8) -> bool {
        self.buttons & bit != 0
    }

    /// Set or clear a button bit.
    #[inline]
    pub fn set(&mut self, bit: u8, on: bool) {
        if on {
            self.buttons |= bit;
        } else {
            self.buttons &= !bit;
        }
    }

    /// Horizontal intent: -1, 0 or +1. Left and right together cancel.
    #[inline]
    pub fn horizontal(&self) -> i32 {
        (self.has(Self::RIGHT) as i32) - (self.has(Self::LEFT) as i32)
    }

    /// Dash aim quantized to fixed-point.
    #[inline]
    pub fn dash_direction(&self) -> FixedVec2 {
        FixedVec2::new(quantize_unit(self.dash_x), quantize_unit(self.dash_y))
    }

    /// Fold the press edges of an older, superseded frame into this one.
    ///
    /// When several frames arrive within one server tick only the newest is
    /// simulated; a press carried by an older frame must not be lost.
    pub fn absorb_edges(&mut self, older: &InputFrame) {
        let carried = older.buttons & Self::EDGE_MASK;
        if carried & Self::DASH_PRESS != 0 && !self.has(Self::DASH_PRESS) {
            self.dash_x = older.dash_x;
            self.dash_y = older.dash_y;
        }
        self.buttons |= carried;
    }
}

// =============================================================================
// TESTS
// =============================================================================
