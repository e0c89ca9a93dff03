//! Game Client
//!
//! Drives the local player with prediction:
//! 1. Poll the transport (handshake, snapshots, level changes)
//! 2. Advance the fixed-step clock by the frame time
//! 3. For every due tick: sample input, simulate locally, record the
//!    prediction, send the input (unreliable)
//!
//! Snapshots reconcile the local player against the server and replace the
//! remote players outright. The client never advances level progress; the
//! server owns finish times.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::fixed::{Fixed, FIXED_ONE, WALL_SENSE_REACH};
use crate::client::fixed_step::FixedStep;
use crate::client::input::{DeviceState, InputSampler};
use crate::client::prediction::{PredictionBuffer, PredictionEntry, PREDICTION_CAPACITY};
use crate::client::reconcile::{reconcile, Reconciliation};
use crate::game::level::LevelCatalog;
use crate::game::state::{DisplayName, GameState, PlayerId, PlayerState};
use crate::game::tick::simulate;
use crate::game::world::{World, WorldError};
use crate::network::protocol::{
    json_or_error, ClientMessage, ConnectRequest, DisconnectReason, LevelResults, LoadLevel, PlayerInfo,
    ServerMessage,
};
use crate::network::transport::{Channel, Transport, TransportEvent, SERVER_PEER};
use crate::{PROTOCOL_VERSION, TICK_RATE};

// =============================================================================
// CONFIG
// =============================================================================

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Display name sent after Welcome.
    pub name: String,
    /// Session token presented to the server (0 = none).
    pub session_token: u32,
    /// Protocol version announced in the handshake.
    pub protocol_version: u32,
    /// Largest per-axis position error accepted without a rollback.
    pub epsilon: Fixed,
    /// Network polls allowed before the handshake must complete.
    pub handshake_polls: u32,
    /// Prediction buffer capacity (ticks).
    pub prediction_capacity: usize,
    /// Simulation rate (Hz). Must match the server.
    pub tick_rate: u32,
    /// Wall sensor reach. Must match the server.
    pub wall_reach: Fixed,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "player".to_string(),
            session_token: 0,
            protocol_version: PROTOCOL_VERSION,
            epsilon: FIXED_ONE,
            handshake_polls: 300,
            prediction_capacity: PREDICTION_CAPACITY,
            tick_rate: TICK_RATE,
            wall_reach: WALL_SENSE_REACH,
        }
    }
}

/// Connection progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientPhase {
    /// Waiting for the transport to open.
    Connecting,
    /// ConnectRequest sent, waiting for Welcome.
    Handshaking,
    /// Welcomed; predicting and sending inputs.
    Playing,
    /// Connection closed.
    Closed(DisconnectReason),
}

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Handshake not completed after {0} polls")]
    HandshakeTimeout(u32),

    #[error("Disconnected by server: {0:?}")]
    Disconnected(DisconnectReason),

    #[error("Protocol version mismatch: server={server} client={client}")]
    VersionMismatch { server: u32, client: u32 },

    #[error("Server loaded level {0}, which is not available locally")]
    MissingLevel(u32),

    #[error("Level error: {0}")]
    Level(#[from] WorldError),
}

// =============================================================================
// CLIENT
// =============================================================================

/// A predicting game client.
pub struct GameClient<T: Transport, C: LevelCatalog> {
    config: ClientConfig,
    transport: T,
    catalog: C,

    phase: ClientPhase,
    handshake_polls: u32,
    player_id: Option<PlayerId>,
    session_token: u32,
    server_version: Option<u32>,

    level: u32,
    world: World,
    local: PlayerState,
    remotes: Vec<PlayerState>,
    last_snapshot: Option<GameState>,
    results: Option<LevelResults>,
    session_over: bool,

    buffer: PredictionBuffer,
    sampler: InputSampler,
    clock: FixedStep,
    tick: u32,
    /// First tick predicted on the current level.
    level_start_tick: u32,
    last_reconciliation: Option<Reconciliation>,
    corrections: u64,
}

impl<T: Transport, C: LevelCatalog> GameClient<T, C> {
    /// Create a client on a transport. The lobby is loaded right away.
    pub fn new(config: ClientConfig, transport: T, catalog: C) -> Result<Self, ClientError> {
        let world = catalog.lobby()?.world.with_wall_reach(config.wall_reach);
        let local = PlayerState::spawn(PlayerId::default(), world.spawn());
        let buffer = PredictionBuffer::with_capacity(config.prediction_capacity);
        let clock = FixedStep::for_tick_rate(config.tick_rate);

        Ok(Self {
            config,
            transport,
            catalog,
            phase: ClientPhase::Connecting,
            handshake_polls: 0,
            player_id: None,
            session_token: 0,
            server_version: None,
            level: 0,
            world,
            local,
            remotes: Vec::new(),
            last_snapshot: None,
            results: None,
            session_over: false,
            buffer,
            sampler: InputSampler::new(),
            clock,
            tick: 1,
            level_start_tick: 0,
            last_reconciliation: None,
            corrections: 0,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    /// Assigned player ID once welcomed.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    /// Session token echoed by the server in Welcome.
    pub fn session_token(&self) -> u32 {
        self.session_token
    }

    /// Current level number (0 = lobby).
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Predicted local player.
    pub fn local_player(&self) -> &PlayerState {
        &self.local
    }

    /// Other players as of the latest snapshot.
    pub fn remote_players(&self) -> &[PlayerState] {
        &self.remotes
    }

    /// Latest snapshot (countdown, time remaining, lobby flag).
    pub fn last_snapshot(&self) -> Option<&GameState> {
        self.last_snapshot.as_ref()
    }

    /// Results of the level just finished, until the next level loads.
    pub fn results(&self) -> Option<&LevelResults> {
        self.results.as_ref()
    }

    /// The server announced the last level is done.
    pub fn is_session_over(&self) -> bool {
        self.session_over
    }

    /// Next tick to be predicted.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn prediction(&self) -> &PredictionBuffer {
        &self.buffer
    }

    pub fn last_reconciliation(&self) -> Option<Reconciliation> {
        self.last_reconciliation
    }

    /// Rollbacks since the client started.
    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    /// Progress toward the next tick in [0, 1), for render interpolation.
    pub fn alpha(&self) -> f32 {
        self.clock.alpha()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // =========================================================================
    // Frame loop
    // =========================================================================

    /// Record this render frame's device state.
    pub fn observe(&mut self, device: &DeviceState) {
        self.sampler.observe(device);
    }

    /// One render frame: poll the network, then run every tick now due.
    ///
    /// Returns the number of ticks simulated.
    pub fn frame(&mut self, elapsed: Duration) -> Result<u32, ClientError> {
        self.poll_network()?;
        let due = self.clock.advance(elapsed);
        for _ in 0..due {
            self.step();
        }
        Ok(due)
    }

    /// One fixed tick. The tick counter advances even before the handshake.
    pub fn step(&mut self) {
        let input = self.sampler.sample(self.tick);

        if self.phase == ClientPhase::Playing {
            self.local = simulate(&self.local, &input, &self.world);
            self.buffer.push(PredictionEntry {
                tick: self.tick,
                input,
                state_after: self.local,
            });
            self.send(Channel::Unreliable, &ClientMessage::Input(input));
        }

        self.tick = self.tick.wrapping_add(1);
    }

    /// Ask the server to put the local player back at the level spawn.
    pub fn request_restart(&mut self) {
        if self.phase == ClientPhase::Playing {
            self.send(Channel::Reliable, &ClientMessage::Restart);
        }
    }

    /// Tell the server the results have been read.
    pub fn request_ready(&mut self) {
        if self.phase == ClientPhase::Playing {
            self.send(Channel::Reliable, &ClientMessage::Ready);
        }
    }

    /// Close the connection.
    pub fn disconnect(&mut self) {
        if !matches!(self.phase, ClientPhase::Closed(_)) {
            self.transport.disconnect(SERVER_PEER, DisconnectReason::Generic);
            self.phase = ClientPhase::Closed(DisconnectReason::Generic);
        }
    }

    // =========================================================================
    // Network
    // =========================================================================

    /// Drain transport events.
    ///
    /// Fails on a server disconnect (other than the normal end of a session),
    /// a version mismatch, a level that cannot be loaded, or a handshake that
    /// does not finish within `handshake_polls` polls.
    pub fn poll_network(&mut self) -> Result<(), ClientError> {
        if let ClientPhase::Closed(reason) = self.phase {
            return self.closed_result(reason);
        }

        while let Some(event) = self.transport.poll_event() {
            match event {
                TransportEvent::Connected { .. } => {
                    debug!("Transport open, sending ConnectRequest");
                    self.phase = ClientPhase::Handshaking;
                    let request = ClientMessage::ConnectRequest(ConnectRequest {
                        protocol_version: self.config.protocol_version,
                        session_token: self.config.session_token,
                    });
                    self.send(Channel::Reliable, &request);
                }
                TransportEvent::Received { payload, .. } => match ServerMessage::from_bytes(&payload) {
                    Ok(msg) => self.handle_message(msg)?,
                    Err(e) => debug!("Dropping server packet: {}", e),
                },
                TransportEvent::Disconnected { reason, .. } => {
                    info!("Disconnected by server ({:?})", reason);
                    self.phase = ClientPhase::Closed(reason);
                    return self.closed_result(reason);
                }
            }
        }

        if matches!(self.phase, ClientPhase::Connecting | ClientPhase::Handshaking) {
            self.handshake_polls += 1;
            if self.handshake_polls > self.config.handshake_polls {
                warn!("Handshake timed out after {} polls", self.config.handshake_polls);
                self.transport.disconnect(SERVER_PEER, DisconnectReason::Generic);
                self.phase = ClientPhase::Closed(DisconnectReason::Generic);
                return Err(ClientError::HandshakeTimeout(self.config.handshake_polls));
            }
        }
        Ok(())
    }

    fn closed_result(&self, reason: DisconnectReason) -> Result<(), ClientError> {
        match reason {
            DisconnectReason::SessionEnded if self.session_over => Ok(()),
            DisconnectReason::VersionMismatch => Err(ClientError::VersionMismatch {
                server: self.server_version.unwrap_or(0),
                client: self.config.protocol_version,
            }),
            other => Err(ClientError::Disconnected(other)),
        }
    }

    fn handle_message(&mut self, msg: ServerMessage) -> Result<(), ClientError> {
        if !matches!(msg, ServerMessage::Snapshot(_)) {
            debug!("Server sent {}", json_or_error(msg.to_json()));
        }
        match msg {
            ServerMessage::Welcome(welcome) => {
                if self.phase != ClientPhase::Handshaking {
                    debug!("Ignoring Welcome in {:?}", self.phase);
                    return Ok(());
                }
                self.player_id = Some(welcome.player_id);
                self.session_token = welcome.session_token;
                self.local = PlayerState::spawn(welcome.player_id, self.world.spawn());
                self.local.name = DisplayName::new(&self.config.name);
                self.buffer.clear();
                self.phase = ClientPhase::Playing;

                let info = ClientMessage::PlayerInfo(PlayerInfo {
                    name: self.local.name,
                    protocol_version: self.config.protocol_version,
                });
                self.send(Channel::Reliable, &info);
                info!("Joined as {}", welcome.player_id);
            }
            ServerMessage::Snapshot(state) => {
                if self.phase == ClientPhase::Playing {
                    self.apply_snapshot(state);
                }
            }
            ServerMessage::VersionMismatch { server_version } => {
                warn!(
                    "Server speaks protocol {}, client speaks {}",
                    server_version, self.config.protocol_version
                );
                self.server_version = Some(server_version);
            }
            ServerMessage::LevelResults(results) => {
                info!("Level {} results: {} entries", results.level, results.entries.len());
                self.results = Some(results);
            }
            ServerMessage::LoadLevel(load) => self.load_level(load)?,
        }
        Ok(())
    }

    fn apply_snapshot(&mut self, state: GameState) {
        let Some(me) = self.player_id else {
            return;
        };
        if let Some(mine) = state.players().iter().find(|p| p.id == me) {
            if mine.last_processed_tick < self.level_start_tick {
                debug!(
                    "Dropping snapshot {} from before level {} (tick {} < {})",
                    state.server_tick, self.level, mine.last_processed_tick, self.level_start_tick
                );
                return;
            }
        }

        self.remotes.clear();
        for player in state.players() {
            if player.id != me {
                self.remotes.push(*player);
                continue;
            }
            let outcome = reconcile(
                &mut self.local,
                &mut self.buffer,
                player,
                self.tick,
                &self.world,
                self.config.epsilon,
            );
            if outcome.is_correction() {
                self.corrections += 1;
            }
            self.last_reconciliation = Some(outcome);
        }
        self.last_snapshot = Some(state);
    }

    fn load_level(&mut self, load: LoadLevel) -> Result<(), ClientError> {
        if load.is_last {
            info!("Session over after level {}", self.level);
            self.session_over = true;
            return Ok(());
        }

        let level = if load.level == 0 {
            self.catalog.lobby()?
        } else {
            self.catalog
                .level(load.level)?
                .ok_or(ClientError::MissingLevel(load.level))?
        };
        self.world = level.world.with_wall_reach(self.config.wall_reach);
        self.level = load.level;
        self.local.reset_to_spawn(self.world.spawn());
        self.remotes.clear();
        self.buffer.clear();
        self.level_start_tick = self.tick;
        self.results = None;
        info!("Loaded level {} ({})", load.level, load.path);
        Ok(())
    }

    fn send(&mut self, channel: Channel, msg: &ClientMessage) {
        match msg.to_bytes() {
            Ok(bytes) => {
                if let Err(e) = self.transport.send(SERVER_PEER, channel, bytes) {
                    debug!("Send failed: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode {:?}: {}", msg.packet_type(), e),
        }
    }
}
