//! Core deterministic primitives.
//!
//! All types in this module are designed for bit-identical results on the
//! client and the server. They form the foundation of prediction and rollback.

pub mod fixed;
pub mod vec2;
pub mod hash;

// Re-export core types
pub use fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use vec2::FixedVec2;
pub use hash::{StateHash, compute_state_hash};
