//! Q16.16 Fixed-Point Arithmetic
//!
//! Deterministic fixed-point math shared by client prediction and the
//! authoritative server. All operations use integer arithmetic only.
//!
//! ## Format: Q16.16
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bit Layout: Q16.16 (32-bit signed integer)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  [S][IIIIIIIIIIIIIIII][FFFFFFFFFFFFFFFF]                    │
//! │   │  └──── 16 bits ────┘└──── 16 bits ────┘                 │
//! │   └─ Sign bit                                               │
//! │                                                             │
//! │  Range: -32768.0 to +32767.99998 (approx)                   │
//! │  Precision: 1/65536 ≈ 0.000015 units                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A level may be at most 1000 tiles of 32 units on each axis, so every
//! in-world coordinate stays inside the Q16.16 range.

use std::fmt;

/// Q16.16 fixed-point number stored as i32.
/// 16 bits integer, 16 bits fractional.
pub type Fixed = i32;

/// Number of fractional bits (16)
pub const FIXED_SCALE: i32 = 16;

/// 1.0 in fixed-point (65536)
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE; // 65536

/// 0.5 in fixed-point (32768)
pub const FIXED_HALF: Fixed = FIXED_ONE >> 1; // 32768

// =============================================================================
// PHYSICS CONSTANTS (All as integer literals - NO float conversion!)
// =============================================================================

/// Tile edge length in world units.
pub const TILE_SIZE_UNITS: i32 = 32;

/// Tile edge length: 32 * 65536 = 2097152
pub const TILE_SIZE: Fixed = TILE_SIZE_UNITS << FIXED_SCALE;

/// Shift converting a fixed-point coordinate into a tile index (floor).
pub const TILE_SHIFT: i32 = FIXED_SCALE + 5;

/// Fixed step: 1/60 second = round(65536/60) = 1092
pub const FIXED_DT: Fixed = 1092;

/// Horizontal run speed: 350 units/sec
pub const MOVE_SPEED: Fixed = 350 << FIXED_SCALE;

/// Horizontal acceleration toward the run speed: 8000 units/sec²
pub const MOVE_ACCEL: Fixed = 8000 << FIXED_SCALE;

/// Deceleration on release or reversal: 6000 units/sec²
pub const MOVE_DECEL: Fixed = 6000 << FIXED_SCALE;

/// Gravity: 1820 units/sec² (y grows downward)
pub const GRAVITY: Fixed = 1820 << FIXED_SCALE;

/// Jump impulse magnitude: 806 units/sec, applied upward (negative y)
pub const JUMP_FORCE: Fixed = 806 << FIXED_SCALE;

/// Terminal fall speed: 1170 units/sec
pub const MAX_FALL_SPEED: Fixed = 1170 << FIXED_SCALE;

/// Multiplier applied to upward velocity when jump is released early: 0.45
pub const JUMP_CUT_MULTIPLIER: Fixed = 29491; // floor(0.45 * 65536)

/// Horizontal kick of a wall jump: 507 units/sec
pub const WALL_JUMP_FORCE_X: Fixed = 507 << FIXED_SCALE;

/// Exponential decay rate of the wall-jump kick: 5 per second
pub const WALL_JUMP_FRICTION: Fixed = 5 << FIXED_SCALE;

/// Kick speeds below 1 unit/sec snap to zero.
pub const WALL_JUMP_REST: Fixed = FIXED_ONE;

/// Default reach of the wall sensor beyond the body edge: TILE/4 = 8 units
pub const WALL_SENSE_REACH: Fixed = 8 << FIXED_SCALE;

/// Dash speed: 975 units/sec
pub const DASH_SPEED: Fixed = 975 << FIXED_SCALE;

/// Dash direction magnitudes below 0.1 count as "no direction".
pub const DASH_DEAD_ZONE: Fixed = 6553; // floor(0.1 * 65536)

/// Units ignored at the top and bottom of the body during horizontal resolve.
pub const RESOLVE_INSET_X: Fixed = 2 << FIXED_SCALE;

/// Units ignored at the left and right of the body during vertical resolve.
pub const RESOLVE_INSET_Y: Fixed = 1 << FIXED_SCALE;

/// Ticks a jump press stays armed before landing.
pub const JUMP_BUFFER_TICKS: u8 = 10;

/// Ticks after leaving ground during which a jump is still allowed.
pub const COYOTE_TICKS: u8 = 6;

/// Ticks a dash stays active.
pub const DASH_ACTIVE_TICKS: u8 = 12;

/// Ticks of cooldown after a dash ends.
pub const DASH_COOLDOWN_TICKS: u8 = 25;

// =============================================================================
// CORE OPERATIONS (All deterministic, wrapping semantics)
// =============================================================================

/// Convert a compile-time float to fixed-point.
///
/// # Warning
/// Only use at compile-time or initialization. NEVER in tick loop.
///
/// # Example
/// ```
/// use tilerace::core::fixed::{to_fixed, FIXED_ONE};
/// const MY_VALUE: i32 = to_fixed(2.5);
/// assert_eq!(MY_VALUE, FIXED_ONE * 2 + FIXED_ONE / 2);
/// ```
#[inline]
pub const fn to_fixed(f: f64) -> Fixed {
    (f * (FIXED_ONE as f64)) as Fixed
}

/// Convert fixed-point to float for display/rendering.
///
/// # Warning
/// Only use for visual output. NEVER use result in game logic.
#[inline]
pub fn to_float(f: Fixed) -> f32 {
    f as f32 / FIXED_ONE as f32
}

/// Quantize an untrusted float axis into fixed-point.
///
/// The value is clamped to [-1, 1] first. Scaling by 65536 is exact in
/// binary floating point and `as` truncates toward zero, so every platform
/// produces the same bits. NaN maps to 0.
#[inline]
pub fn quantize_unit(v: f32) -> Fixed {
    if !v.is_finite() {
        return 0;
    }
    (v.clamp(-1.0, 1.0) * FIXED_ONE as f32) as Fixed
}

/// Multiply two fixed-point numbers.
///
/// Uses i64 intermediate to prevent overflow, then shifts back
/// (arithmetic shift, rounds toward negative infinity).
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    let wide = (a as i64) * (b as i64);
    (wide >> FIXED_SCALE) as Fixed
}

/// Divide two fixed-point numbers.
///
/// Pre-shifts numerator to maintain precision.
/// Returns 0 on divide-by-zero.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if b == 0 {
        return 0; // Deterministic: don't panic
    }
    let wide = (a as i64) << FIXED_SCALE;
    (wide / b as i64) as Fixed
}

/// Square root using Newton-Raphson iteration.
///
/// Returns 0 for non-positive inputs.
/// Uses exactly 6 iterations for determinism.
#[inline]
pub fn fixed_sqrt(x: Fixed) -> Fixed {
    if x <= 0 {
        return 0;
    }

    // Initial guess: x/2, but never zero
    let mut guess = (x >> 1).max(1);

    for _ in 0..6 {
        let div = fixed_div(x, guess);
        guess = (guess.wrapping_add(div)) >> 1;

        if guess == 0 {
            guess = 1;
        }
    }

    guess
}

/// Absolute value of a fixed-point number.
#[inline]
pub fn fixed_abs(x: Fixed) -> Fixed {
    if x < 0 { x.wrapping_neg() } else { x }
}

/// Clamp a fixed-point number to a range.
#[inline]
pub fn fixed_clamp(value: Fixed, min: Fixed, max: Fixed) -> Fixed {
    value.max(min).min(max)
}

/// Move `current` toward `target` by at most `max_delta`.
#[inline]
pub fn approach(current: Fixed, target: Fixed, max_delta: Fixed) -> Fixed {
    let delta = target.saturating_sub(current);
    current.saturating_add(fixed_clamp(delta, -max_delta, max_delta))
}

/// Floor a fixed-point world coordinate to its tile index.
#[inline]
pub const fn tile_index(coord: Fixed) -> i32 {
    coord >> TILE_SHIFT
}

/// World coordinate of the left/top edge of a tile.
#[inline]
pub const fn tile_origin(index: i32) -> Fixed {
    index << TILE_SHIFT
}

/// Display wrapper for logging raw fixed-point values.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Units(pub Fixed);

impl fmt::Debug for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({:.4})", to_float(self.0))
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", to_float(self.0))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_constants() {
        assert_eq!(FIXED_ONE, 65536);
        assert_eq!(FIXED_HALF, 32768);
        assert_eq!(FIXED_SCALE, 16);
        assert_eq!(TILE_SIZE, 32 * FIXED_ONE);
    }

    #[test]
    fn test_to_fixed() {
        assert_eq!(to_fixed(1.0), FIXED_ONE);
        assert_eq!(to_fixed(0.5), FIXED_HALF);
        assert_eq!(to_fixed(-1.0), -FIXED_ONE);
        assert_eq!(to_fixed(0.45), JUMP_CUT_MULTIPLIER);
        assert_eq!(to_fixed(0.1), DASH_DEAD_ZONE);
    }

    #[test]
    fn test_fixed_mul() {
        let result = fixed_mul(to_fixed(2.0), to_fixed(3.0));
        assert_eq!(result, to_fixed(6.0));

        let result2 = fixed_mul(FIXED_HALF, FIXED_HALF);
        assert_eq!(result2, to_fixed(0.25));

        let result3 = fixed_mul(to_fixed(-2.0), to_fixed(3.0));
        assert_eq!(result3, to_fixed(-6.0));
    }

    #[test]
    fn test_fixed_div() {
        assert_eq!(fixed_div(to_fixed(6.0), to_fixed(2.0)), to_fixed(3.0));
        assert_eq!(fixed_div(FIXED_ONE, to_fixed(4.0)), to_fixed(0.25));
        assert_eq!(fixed_div(FIXED_ONE, 0), 0);
    }

    #[test]
    fn test_fixed_sqrt() {
        let result = fixed_sqrt(to_fixed(4.0));
        assert!((result - to_fixed(2.0)).abs() < 100, "sqrt(4) should be ~2.0");

        let result2 = fixed_sqrt(FIXED_ONE);
        assert!((result2 - FIXED_ONE).abs() < 100, "sqrt(1) should be ~1.0");

        assert_eq!(fixed_sqrt(0), 0);
        assert_eq!(fixed_sqrt(-FIXED_ONE), 0);
        assert!(fixed_sqrt(1) >= 0);
    }

    #[test]
    fn test_gravity_per_tick() {
        // One tick of gravity is ~30.33 units/sec of downward speed.
        let dv = fixed_mul(GRAVITY, FIXED_DT);
        assert_eq!(dv, 1820 * 1092);
        assert!(to_float(dv) > 30.0 && to_float(dv) < 30.5);
    }

    #[test]
    fn test_quantize_unit() {
        assert_eq!(quantize_unit(1.0), FIXED_ONE);
        assert_eq!(quantize_unit(-1.0), -FIXED_ONE);
        assert_eq!(quantize_unit(0.5), FIXED_HALF);
        assert_eq!(quantize_unit(7.0), FIXED_ONE);
        assert_eq!(quantize_unit(f32::NAN), 0);
        assert_eq!(quantize_unit(f32::NEG_INFINITY), 0);
    }

    #[test]
    fn test_approach() {
        assert_eq!(approach(0, 100, 30), 30);
        assert_eq!(approach(90, 100, 30), 100);
        assert_eq!(approach(0, -100, 30), -30);
        assert_eq!(approach(50, 50, 30), 50);
    }

    #[test]
    fn test_tile_index_floors_negative() {
        assert_eq!(tile_index(0), 0);
        assert_eq!(tile_index(TILE_SIZE - 1), 0);
        assert_eq!(tile_index(TILE_SIZE), 1);
        assert_eq!(tile_index(-1), -1);
        assert_eq!(tile_origin(3), 3 * TILE_SIZE);
    }

    #[test]
    fn test_fixed_determinism() {
        for _ in 0..1000 {
            let a = 12345678;
            let b = 87654321;
            assert_eq!(fixed_mul(a, b), fixed_mul(a, b));
            assert_eq!(fixed_div(a, b), fixed_div(a, b));
            assert_eq!(fixed_sqrt(a), fixed_sqrt(a));
        }
    }
}
