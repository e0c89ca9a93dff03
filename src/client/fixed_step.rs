//! Fixed-Step Accumulator
//!
//! Wall-clock frame time accumulates; whole ticks are consumed and the
//! remainder carries to the next frame. Long frames are clamped so a stall
//! does not trigger hundreds of catch-up ticks.

use std::time::Duration;

/// Longest frame time fed into the accumulator.
pub const MAX_FRAME_TIME: Duration = Duration::from_millis(250);

/// Tick accumulator.
#[derive(Clone, Debug)]
pub struct FixedStep {
    step: Duration,
    accumulator: Duration,
}

impl FixedStep {
    /// Accumulator for a fixed tick length.
    pub fn new(step: Duration) -> Self {
        Self {
            step: step.max(Duration::from_nanos(1)),
            accumulator: Duration::ZERO,
        }
    }

    /// Accumulator for a tick rate in Hz.
    pub fn for_tick_rate(hz: u32) -> Self {
        Self::new(Duration::from_secs(1) / hz.max(1))
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Add a frame's elapsed time; returns how many ticks are due.
    pub fn advance(&mut self, frame_time: Duration) -> u32 {
        self.accumulator += frame_time.min(MAX_FRAME_TIME);
        let mut ticks = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            ticks += 1;
        }
        ticks
    }

    /// Progress toward the next tick in [0, 1), for interpolation.
    pub fn alpha(&self) -> f32 {
        (self.accumulator.as_secs_f64() / self.step.as_secs_f64()) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_ticks_and_remainder() {
        let mut fs = FixedStep::new(Duration::from_millis(10));
        assert_eq!(fs.advance(Duration::from_millis(25)), 2);
        assert!((fs.alpha() - 0.5).abs() < 1e-6);
        assert_eq!(fs.advance(Duration::from_millis(5)), 1);
        assert_eq!(fs.alpha(), 0.0);
    }

    #[test]
    fn test_long_frames_clamped() {
        let mut fs = FixedStep::new(Duration::from_millis(10));
        assert_eq!(fs.advance(Duration::from_secs(5)), 25);
    }

    #[test]
    fn test_tick_rate() {
        let mut fs = FixedStep::for_tick_rate(60);
        assert_eq!(fs.step(), Duration::from_nanos(16_666_666));
        assert_eq!(fs.advance(fs.step()), 1);
        assert_eq!(fs.advance(Duration::from_millis(1)), 0);
    }
}
