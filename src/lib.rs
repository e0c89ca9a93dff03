//! # TileRace Netcode
//!
//! Deterministic movement, client prediction with rollback, and the
//! authoritative session server for TileRace.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TILERACE NETCODE                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point and movement tuning    │
//! │  ├── vec2.rs     - 2D vector with fixed-point                │
//! │  └── hash.rs     - State hashing for determinism checks      │
//! │                                                              │
//! │  game/           - Simulation (deterministic)                │
//! │  ├── input.rs    - Per-tick input frames                     │
//! │  ├── state.rs    - Player and game state                     │
//! │  ├── world.rs    - Tile grid parsing and queries             │
//! │  ├── collision.rs- AABB vs tile resolution                   │
//! │  ├── tick.rs     - The simulate step                         │
//! │  └── level.rs    - Level catalogs                            │
//! │                                                              │
//! │  network/        - Server side (non-deterministic)           │
//! │  ├── protocol.rs - Packet types and codec                    │
//! │  ├── transport.rs- Transport trait, channels, peers          │
//! │  ├── memory.rs   - In-process transport                      │
//! │  ├── websocket.rs- WebSocket transport                       │
//! │  ├── auth.rs     - Session token gate                        │
//! │  ├── session.rs  - Lobby, countdown, race, results           │
//! │  └── server.rs   - Authoritative tick loop                   │
//! │                                                              │
//! │  client/         - Client side (non-deterministic)           │
//! │  ├── input.rs    - Button edge sampling                      │
//! │  ├── fixed_step.rs - Frame time accumulator                  │
//! │  ├── prediction.rs - Prediction ring buffer                  │
//! │  ├── reconcile.rs  - Rollback and replay                     │
//! │  ├── game_client.rs- Predicting client                       │
//! │  └── local_server.rs - Embedded server for offline play      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are deterministic:
//! - Integer fixed-point only; the one float input (dash aim) is quantized
//!   before use
//! - No HashMap (BTreeMap for sorted iteration)
//! - No clocks
//!
//! The same state, input and world produce the same next state on the
//! client and the server, which is what makes prediction and replay agree.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod client;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use core::vec2::FixedVec2;
pub use game::input::InputFrame;
pub use game::state::{GameState, PlayerState, PlayerId};
pub use game::tick::simulate;
pub use game::world::World;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire protocol version; both handshake packets carry it.
pub const PROTOCOL_VERSION: u32 = 1;

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
