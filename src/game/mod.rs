//! Deterministic gameplay.
//!
//! Everything the client predicts and the server decides: inputs, player
//! state, the tile world, collision and the simulation step itself.

pub mod input;
pub mod state;
pub mod world;
pub mod collision;
pub mod tick;
pub mod level;

pub use input::InputFrame;
pub use state::{PlayerId, PlayerState, GameState, DisplayName, WallSide, DashState, MAX_PLAYERS};
pub use world::{World, WorldError, Tile};
pub use tick::{simulate, advance_progress, replay_inputs};
pub use level::{Level, LevelCatalog, FileLevels, MemoryLevels};
