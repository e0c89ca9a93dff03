//! Client Side
//!
//! Input sampling, the fixed-step clock, prediction with rollback
//! reconciliation, and the embedded server used for offline play.
//! Like `network/`, this layer is **non-deterministic**; it only calls into
//! `game/` for simulation.

pub mod input;
pub mod fixed_step;
pub mod prediction;
pub mod reconcile;
pub mod game_client;
pub mod local_server;

pub use input::{Button, ButtonState, DeviceState, InputSampler};
pub use fixed_step::FixedStep;
pub use prediction::{PredictionBuffer, PredictionEntry, PREDICTION_CAPACITY};
pub use reconcile::{reconcile, Reconciliation};
pub use game_client::{ClientConfig, ClientError, ClientPhase, GameClient};
pub use local_server::{LocalServer, LocalServerError};
