//! Input Sampling
//!
//! Devices are observed once per render frame, but the simulation consumes
//! input once per fixed tick. Each button runs a small state machine that
//! only changes state at a tick boundary:
//!
//! ```text
//! Idle ──press seen──▶ Pressed ──still down──▶ Held ──released──▶ Idle
//! ```
//!
//! A press seen between two ticks is latched, so a tap shorter than a tick
//! still yields exactly one `Pressed` tick.

use crate::game::input::InputFrame;

/// Stick magnitude below which the arrow keys aim the dash instead.
pub const STICK_DEAD_ZONE: f32 = 0.1;

/// Button state for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ButtonState {
    #[default]
    Idle,
    /// Went down since the previous tick
    Pressed,
    /// Down for more than one tick
    Held,
}

/// Edge tracker for a single button.
#[derive(Clone, Copy, Debug, Default)]
pub struct Button {
    state: ButtonState,
    down: bool,
    latched: bool,
}

impl Button {
    /// Record the physical state seen this frame.
    pub fn observe(&mut self, down: bool) {
        if down && !self.down {
            self.latched = true;
        }
        self.down = down;
    }

    /// Move to the state for the next tick.
    pub fn advance(&mut self) -> ButtonState {
        self.state = if std::mem::take(&mut self.latched) {
            ButtonState::Pressed
        } else if self.down {
            ButtonState::Held
        } else {
            ButtonState::Idle
        };
        self.state
    }

    pub fn state(&self) -> ButtonState {
        self.state
    }

    /// Down this tick (pressed or held).
    pub fn is_down(&self) -> bool {
        self.state != ButtonState::Idle
    }

    pub fn is_pressed(&self) -> bool {
        self.state == ButtonState::Pressed
    }
}

/// Physical device state for one render frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DeviceState {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub jump: bool,
    pub dash: bool,
    /// Analog stick, each axis in [-1, 1], y down
    pub stick: (f32, f32),
}

/// Turns per-frame device state into per-tick `InputFrame`s.
#[derive(Clone, Debug, Default)]
pub struct InputSampler {
    left: Button,
    right: Button,
    up: Button,
    down: Button,
    jump: Button,
    dash: Button,
    stick: (f32, f32),
}

impl InputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one render frame of device state.
    pub fn observe(&mut self, device: &DeviceState) {
        self.left.observe(device.left);
        self.right.observe(device.right);
        self.up.observe(device.up);
        self.down.observe(device.down);
        self.jump.observe(device.jump);
        self.dash.observe(device.dash);
        self.stick = device.stick;
    }

    /// Advance every button one tick and build that tick's frame.
    pub fn sample(&mut self, tick: u32) -> InputFrame {
        for button in [
            &mut self.left,
            &mut self.right,
            &mut self.up,
            &mut self.down,
            &mut self.jump,
            &mut self.dash,
        ] {
            button.advance();
        }

        let mut frame = InputFrame::neutral(tick);
        frame.set(InputFrame::LEFT, self.left.is_down());
        frame.set(InputFrame::RIGHT, self.right.is_down());
        frame.set(InputFrame::JUMP_HELD, self.jump.is_down());
        frame.set(InputFrame::JUMP_PRESS, self.jump.is_pressed());
        frame.set(InputFrame::DASH_PRESS, self.dash.is_pressed());

        if self.dash.is_pressed() {
            let (x, y) = self.aim();
            frame = frame.aimed(x, y);
        }
        frame
    }

    /// Dash aim: the stick outside its dead zone, else the arrow keys.
    fn aim(&self) -> (f32, f32) {
        let (sx, sy) = self.stick;
        if sx.is_finite() && sy.is_finite() && sx * sx + sy * sy >= STICK_DEAD_ZONE * STICK_DEAD_ZONE {
            return (sx, sy);
        }
        let axis = |neg: &Button, pos: &Button| (pos.is_down() as i8 - neg.is_down() as i8) as f32;
        (axis(&self.left, &self.right), axis(&self.up, &self.down))
    }
}
