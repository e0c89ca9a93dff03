//! Authoritative Game Server
//!
//! One fixed-rate loop over a `Transport`:
//! 1. Drain transport events (connects, packets, disconnects)
//! 2. Drop connections that never finished the handshake
//! 3. Step the session once (one simulate per player)
//! 4. Broadcast one unreliable snapshot
//!
//! Handshake: transport connect (token gate) → ConnectRequest → Welcome →
//! PlayerInfo (version check, display name). Only then does the peer count
//! as a player for inputs and control messages.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::level::LevelCatalog;
use crate::game::state::PlayerId;
use crate::network::auth::TokenGate;
use crate::network::protocol::{json_or_error, ClientMessage, ConnectRequest, DisconnectReason, ServerMessage, Welcome};
use crate::network::session::{Session, SessionConfig, SessionError, SessionEvent};
use crate::network::transport::{Channel, PeerId, Transport, TransportEvent};
use crate::{PROTOCOL_VERSION, TICK_RATE};

// =============================================================================
// CONFIG
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: String,
    /// Directory holding `_lobby.txt` and `level_NN.txt`.
    pub levels_dir: String,
    /// Loop rate (Hz). Movement constants assume `TICK_RATE`, so
    /// `from_env` only accepts that value.
    pub tick_rate: u32,
    /// Session token clients must present (0 = open server).
    pub session_token: u32,
    /// Time allowed between connect and ConnectRequest.
    pub handshake_timeout: Duration,
    /// Session timing and capacity.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7777".to_string(),
            levels_dir: "assets/levels".to_string(),
            tick_rate: TICK_RATE,
            session_token: 0,
            handshake_timeout: Duration::from_secs(5),
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut session = defaults.session.clone();
        session.max_players = env_or("TILERACE_MAX_PLAYERS", session.max_players);

        Self {
            bind_addr: std::env::var("TILERACE_BIND").unwrap_or(defaults.bind_addr),
            levels_dir: std::env::var("TILERACE_LEVELS").unwrap_or(defaults.levels_dir),
            tick_rate: checked_tick_rate(env_or("TILERACE_TICK_RATE", defaults.tick_rate)),
            session_token: env_or("TILERACE_SESSION_TOKEN", defaults.session_token),
            handshake_timeout: Duration::from_millis(env_or(
                "TILERACE_HANDSHAKE_TIMEOUT_MS",
                defaults.handshake_timeout.as_millis() as u64,
            )),
            session,
        }
    }

    /// Duration of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

/// The simulation is tuned for `TICK_RATE`; any other request is ignored.
fn checked_tick_rate(requested: u32) -> u32 {
    if requested != TICK_RATE {
        warn!(
            "Ignoring TILERACE_TICK_RATE={}: the simulation runs at {} Hz",
            requested, TICK_RATE
        );
    }
    TICK_RATE
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Session could not start (lobby missing or unparseable).
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Per-connection handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connection {
    /// Connected, waiting for ConnectRequest.
    Handshaking { since: Instant },
    /// Welcomed; owns a session player.
    Joined { player: PlayerId },
}

// =============================================================================
// SERVER
// =============================================================================

/// The authoritative server.
pub struct GameServer<T: Transport> {
    config: ServerConfig,
    transport: T,
    session: Session,
    gate: TokenGate,
    connections: BTreeMap<PeerId, Connection>,
    peers: BTreeMap<PlayerId, PeerId>,
}

impl<T: Transport> GameServer<T> {
    /// Create a server around a transport and a level catalog.
    pub fn new(
        config: ServerConfig,
        transport: T,
        catalog: Box<dyn LevelCatalog + Send>,
        now: Instant,
    ) -> Result<Self, GameServerError> {
        let session = Session::new(config.session.clone(), catalog, now)?;
        let gate = TokenGate::new(config.session_token);
        if gate.is_gated() {
            info!("Session token required");
        }

        Ok(Self {
            config,
            transport,
            session,
            gate,
            connections: BTreeMap::new(),
            peers: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Open connections, including those still handshaking.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run until `stop` is set, one `step` per tick.
    pub async fn run(&mut self, stop: &AtomicBool) {
        let mut ticker = interval(self.config.tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Server loop running at {} Hz", self.config.tick_rate);

        while !stop.load(Ordering::Relaxed) {
            ticker.tick().await;
            self.step(Instant::now());
        }

        self.peers.clear();
        for peer in std::mem::take(&mut self.connections).into_keys() {
            self.transport.disconnect(peer, DisconnectReason::Generic);
        }
        info!("Server loop stopped at tick {}", self.session.server_tick());
    }

    /// One server tick.
    pub fn step(&mut self, now: Instant) {
        while let Some(event) = self.transport.poll_event() {
            self.handle_transport_event(event, now);
        }

        self.expire_handshakes(now);

        let events = self.session.step(now);
        self.dispatch(events);

        self.broadcast_snapshot(now);
    }

    // =========================================================================
    // Transport events
    // =========================================================================

    fn handle_transport_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Connected { peer, token } => {
                if let Err(e) = self.gate.check(token) {
                    warn!("Peer {} refused: {}", peer, e);
                    self.transport.disconnect(peer, DisconnectReason::InvalidToken);
                    return;
                }
                debug!("Peer {} connected", peer);
                self.connections.insert(peer, Connection::Handshaking { since: now });
            }
            TransportEvent::Received { peer, payload } => {
                match ClientMessage::from_bytes(&payload) {
                    Ok(msg) => self.handle_message(peer, msg, now),
                    Err(e) => debug!("Dropping packet from peer {}: {}", peer, e),
                }
            }
            TransportEvent::Disconnected { peer, reason } => {
                debug!("Peer {} disconnected ({:?})", peer, reason);
                if let Some(Connection::Joined { player }) = self.connections.remove(&peer) {
                    self.peers.remove(&player);
                    let events = self.session.remove_player(player, now);
                    self.dispatch(events);
                }
            }
        }
    }

    fn handle_message(&mut self, peer: PeerId, msg: ClientMessage, now: Instant) {
        let Some(&connection) = self.connections.get(&peer) else {
            return;
        };
        if !matches!(msg, ClientMessage::Input(_)) {
            debug!("Peer {} sent {}", peer, json_or_error(msg.to_json()));
        }

        match (connection, msg) {
            (Connection::Handshaking { .. }, ClientMessage::ConnectRequest(req)) => {
                self.handle_connect_request(peer, req, now);
            }
            (Connection::Handshaking { .. }, other) => {
                debug!("Peer {} sent {:?} before the handshake", peer, other.packet_type());
            }
            (Connection::Joined { player }, ClientMessage::PlayerInfo(info)) => {
                if info.protocol_version != PROTOCOL_VERSION {
                    self.refuse_version(peer, info.protocol_version, now);
                    return;
                }
                if let Err(e) = self.session.set_name(player, info.name) {
                    warn!("PlayerInfo from peer {}: {}", peer, e);
                }
            }
            (Connection::Joined { player }, ClientMessage::Input(frame)) => {
                if let Err(e) = self.session.submit_input(player, frame) {
                    warn!("Input from peer {}: {}", peer, e);
                }
            }
            (Connection::Joined { player }, ClientMessage::Restart) => {
                if let Err(e) = self.session.restart(player) {
                    warn!("Restart from peer {}: {}", peer, e);
                }
            }
            (Connection::Joined { player }, ClientMessage::Ready) => {
                match self.session.mark_ready(player, now) {
                    Ok(events) => self.dispatch(events),
                    Err(e) => warn!("Ready from peer {}: {}", peer, e),
                }
            }
            (Connection::Joined { .. }, ClientMessage::ConnectRequest(_)) => {
                debug!("Peer {} repeated its ConnectRequest", peer);
            }
        }
    }

    fn handle_connect_request(&mut self, peer: PeerId, req: ConnectRequest, now: Instant) {
        if req.protocol_version != PROTOCOL_VERSION {
            self.refuse_version(peer, req.protocol_version, now);
            return;
        }
        if let Err(e) = self.gate.check(req.session_token) {
            warn!("Peer {} refused: {}", peer, e);
            self.drop_peer(peer, DisconnectReason::InvalidToken, now);
            return;
        }

        let player = match self.session.add_player() {
            Ok(player) => player,
            Err(e) => {
                info!("Peer {} refused: {}", peer, e);
                self.drop_peer(peer, DisconnectReason::ServerBusy, now);
                return;
            }
        };

        self.connections.insert(peer, Connection::Joined { player });
        self.peers.insert(player, peer);
        self.send(
            peer,
            Channel::Reliable,
            &ServerMessage::Welcome(Welcome {
                player_id: player,
                session_token: self.gate.token(),
            }),
        );
        info!("Peer {} joined as {}", peer, player);
    }

    /// Tell the peer our version, then drop it.
    fn refuse_version(&mut self, peer: PeerId, client_version: u32, now: Instant) {
        warn!(
            "Version mismatch on peer {}: client={} server={}",
            peer, client_version, PROTOCOL_VERSION
        );
        self.send(
            peer,
            Channel::Reliable,
            &ServerMessage::VersionMismatch { server_version: PROTOCOL_VERSION },
        );
        self.drop_peer(peer, DisconnectReason::VersionMismatch, now);
    }

    /// Disconnect a peer and release its player.
    fn drop_peer(&mut self, peer: PeerId, reason: DisconnectReason, now: Instant) {
        self.transport.disconnect(peer, reason);
        if let Some(Connection::Joined { player }) = self.connections.remove(&peer) {
            self.peers.remove(&player);
            let events = self.session.remove_player(player, now);
            self.dispatch(events);
        }
    }

    fn expire_handshakes(&mut self, now: Instant) {
        let timeout = self.config.handshake_timeout;
        let expired: Vec<PeerId> = self
            .connections
            .iter()
            .filter_map(|(&peer, conn)| match conn {
                Connection::Handshaking { since } if now.duration_since(*since) >= timeout => Some(peer),
                _ => None,
            })
            .collect();

        for peer in expired {
            info!("Peer {} handshake timed out", peer);
            self.connections.remove(&peer);
            self.transport.disconnect(peer, DisconnectReason::Generic);
        }
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    fn dispatch(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            match event {
                SessionEvent::PlayerFinished { player, ticks } => {
                    debug!("{} finished in {} ticks", player, ticks);
                }
                SessionEvent::Results(results) => {
                    self.broadcast(Channel::Reliable, &ServerMessage::LevelResults(results));
                }
                SessionEvent::LevelLoaded(load) => {
                    self.broadcast(Channel::Reliable, &ServerMessage::LoadLevel(load));
                }
                SessionEvent::GameOver { notice, players } => {
                    let msg = ServerMessage::LoadLevel(notice);
                    for player in players {
                        let Some(peer) = self.peers.remove(&player) else {
                            continue;
                        };
                        self.send(peer, Channel::Reliable, &msg);
                        self.connections.remove(&peer);
                        self.transport.disconnect(peer, DisconnectReason::SessionEnded);
                    }
                }
            }
        }
    }

    fn broadcast_snapshot(&mut self, now: Instant) {
        if self.peers.is_empty() {
            return;
        }
        let snapshot = ServerMessage::Snapshot(self.session.snapshot(now));
        self.broadcast(Channel::Unreliable, &snapshot);
    }

    fn broadcast(&mut self, channel: Channel, msg: &ServerMessage) {
        let bytes = match msg.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode {:?}: {}", msg.packet_type(), e);
                return;
            }
        };
        let peers: Vec<PeerId> = self.peers.values().copied().collect();
        for peer in peers {
            if let Err(e) = self.transport.send(peer, channel, bytes.clone()) {
                debug!("Send to peer {} failed: {}", peer, e);
            }
        }
    }

    fn send(&mut self, peer: PeerId, channel: Channel, msg: &ServerMessage) {
        match msg.to_bytes() {
            Ok(bytes) => {
                if let Err(e) = self.transport.send(peer, channel, bytes) {
                    debug!("Send to peer {} failed: {}", peer, e);
                }
            }
            Err(e) => warn!("Failed to encode {:?}: {}", msg.packet_type(), e),
        }
    }
}
