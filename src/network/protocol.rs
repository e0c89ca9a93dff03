//! Protocol Messages
//!
//! Wire format for client-server communication.
//!
//! ```text
//! ┌──────────┬──────────────────────────────┐
//! │ type: u8 │ body: bincode (may be empty) │
//! └──────────┴──────────────────────────────┘
//! ```
//!
//! Client packet types live in 1..16, server packet types from 16 up. Any
//! packet that is empty, larger than `MAX_PACKET_SIZE`, of an unknown type
//! or with a body that fails to decode is rejected with `ProtocolError`;
//! callers drop it and keep the connection.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::input::InputFrame;
use crate::game::state::{PlayerId, DisplayName, GameState};

/// Largest packet accepted from the wire.
pub const MAX_PACKET_SIZE: usize = 4096;

// =============================================================================
// ERRORS
// =============================================================================

/// Packet decoding errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,

    #[error("packet of {0} bytes exceeds {MAX_PACKET_SIZE}")]
    TooLarge(usize),

    #[error("unknown packet type {0}")]
    UnknownType(u8),

    #[error("malformed packet body: {0}")]
    Malformed(#[from] bincode::Error),
}

// =============================================================================
// PACKET TYPES
// =============================================================================

/// First byte of every packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    ConnectRequest = 1,
    PlayerInfo = 2,
    Input = 3,
    Restart = 4,
    Ready = 5,
    Welcome = 16,
    Snapshot = 17,
    VersionMismatch = 18,
    LevelResults = 19,
    LoadLevel = 20,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => PacketType::ConnectRequest,
            2 => PacketType::PlayerInfo,
            3 => PacketType::Input,
            4 => PacketType::Restart,
            5 => PacketType::Ready,
            16 => PacketType::Welcome,
            17 => PacketType::Snapshot,
            18 => PacketType::VersionMismatch,
            19 => PacketType::LevelResults,
            20 => PacketType::LoadLevel,
            other => return Err(ProtocolError::UnknownType(other)),
        })
    }
}

/// Why a connection was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum DisconnectReason {
    /// Plain disconnect, handshake timeout, transport failure
    Generic = 0,
    /// A race is in progress or the server is full
    ServerBusy = 1,
    /// Client and server protocol versions differ
    VersionMismatch = 2,
    /// Session token missing or wrong
    InvalidToken = 3,
    /// Every level was played; the session closed
    SessionEnded = 4,
}

impl DisconnectReason {
    /// Numeric reason code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Parse a reason code. Unknown codes read as `Generic`.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => DisconnectReason::ServerBusy,
            2 => DisconnectReason::VersionMismatch,
            3 => DisconnectReason::InvalidToken,
            4 => DisconnectReason::SessionEnded,
            _ => DisconnectReason::Generic,
        }
    }
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// First packet after the transport connects.
    ConnectRequest(ConnectRequest),

    /// Display name, sent after Welcome.
    PlayerInfo(PlayerInfo),

    /// Player input for one client tick.
    Input(InputFrame),

    /// Return to the level spawn.
    Restart,

    /// Done reading the results.
    Ready,
}

/// Handshake opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Client protocol version
    pub protocol_version: u32,
    /// Session token (0 = none)
    pub session_token: u32,
}

/// Player name announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Display name
    pub name: DisplayName,
    /// Client protocol version
    pub protocol_version: u32,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted.
    Welcome(Welcome),

    /// Authoritative state (every tick, unreliable).
    Snapshot(GameState),

    /// Client speaks another protocol version; a disconnect follows.
    VersionMismatch { server_version: u32 },

    /// Ranked results at the end of a level.
    LevelResults(LevelResults),

    /// Switch to another level, or the session is over.
    LoadLevel(LoadLevel),
}

/// Handshake reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Welcome {
    /// Assigned player ID
    pub player_id: PlayerId,
    /// Session token (non-zero only on token-gated servers)
    pub session_token: u32,
}

/// One row of the results table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub player_id: PlayerId,
    pub name: DisplayName,
    /// Reached the exit this level
    pub finished: bool,
    /// Best finish time, or partial time for a DNF
    pub ticks: u32,
}

/// Results of a level, ranked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelResults {
    /// Level number (1-based)
    pub level: u32,
    /// Finished before DNF, then ascending ticks
    pub entries: Vec<ResultEntry>,
}

/// Level change notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadLevel {
    /// New level number (0 = lobby)
    pub level: u32,
    /// Level path (empty when `is_last`)
    pub path: String,
    /// No further level: the session is over
    pub is_last: bool,
}

// =============================================================================
// SERIALIZATION
// =============================================================================

fn frame<T: Serialize>(kind: PacketType, body: Option<&T>) -> Result<Vec<u8>, ProtocolError> {
    let mut out = vec![kind as u8];
    if let Some(body) = body {
        bincode::serialize_into(&mut out, body)?;
    }
    Ok(out)
}

fn split(data: &[u8]) -> Result<(PacketType, &[u8]), ProtocolError> {
    if data.len() > MAX_PACKET_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }
    let (&kind, body) = data.split_first().ok_or(ProtocolError::Empty)?;
    Ok((PacketType::try_from(kind)?, body))
}

impl ClientMessage {
    /// Packet type byte.
    pub fn packet_type(&self) -> PacketType {
        match self {
            ClientMessage::ConnectRequest(_) => PacketType::ConnectRequest,
            ClientMessage::PlayerInfo(_) => PacketType::PlayerInfo,
            ClientMessage::Input(_) => PacketType::Input,
            ClientMessage::Restart => PacketType::Restart,
            ClientMessage::Ready => PacketType::Ready,
        }
    }

    /// Serialize to a wire packet.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let kind = self.packet_type();
        match self {
            ClientMessage::ConnectRequest(req) => frame(kind, Some(req)),
            ClientMessage::PlayerInfo(info) => frame(kind, Some(info)),
            ClientMessage::Input(input) => frame(kind, Some(input)),
            ClientMessage::Restart | ClientMessage::Ready => frame::<()>(kind, None),
        }
    }

    /// Deserialize from a wire packet.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, body) = split(data)?;
        Ok(match kind {
            PacketType::ConnectRequest => ClientMessage::ConnectRequest(bincode::deserialize(body)?),
            PacketType::PlayerInfo => ClientMessage::PlayerInfo(bincode::deserialize(body)?),
            PacketType::Input => ClientMessage::Input(bincode::deserialize(body)?),
            PacketType::Restart => ClientMessage::Restart,
            PacketType::Ready => ClientMessage::Ready,
            other => return Err(ProtocolError::UnknownType(other as u8)),
        })
    }

    /// Serialize to JSON string (debug logging).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    /// Packet type byte.
    pub fn packet_type(&self) -> PacketType {
        match self {
            ServerMessage::Welcome(_) => PacketType::Welcome,
            ServerMessage::Snapshot(_) => PacketType::Snapshot,
            ServerMessage::VersionMismatch { .. } => PacketType::VersionMismatch,
            ServerMessage::LevelResults(_) => PacketType::LevelResults,
            ServerMessage::LoadLevel(_) => PacketType::LoadLevel,
        }
    }

    /// Serialize to a wire packet.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let kind = self.packet_type();
        match self {
            ServerMessage::Welcome(w) => frame(kind, Some(w)),
            ServerMessage::Snapshot(state) => frame(kind, Some(state)),
            ServerMessage::VersionMismatch { server_version } => frame(kind, Some(server_version)),
            ServerMessage::LevelResults(results) => frame(kind, Some(results)),
            ServerMessage::LoadLevel(load) => frame(kind, Some(load)),
        }
    }

    /// Deserialize from a wire packet.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, body) = split(data)?;
        Ok(match kind {
            PacketType::Welcome => ServerMessage::Welcome(bincode::deserialize(body)?),
            PacketType::Snapshot => ServerMessage::Snapshot(bincode::deserialize(body)?),
            PacketType::VersionMismatch => ServerMessage::VersionMismatch {
                server_version: bincode::deserialize(body)?,
            },
            PacketType::LevelResults => ServerMessage::LevelResults(bincode::deserialize(body)?),
            PacketType::LoadLevel => ServerMessage::LoadLevel(bincode::deserialize(body)?),
            other => return Err(ProtocolError::UnknownType(other as u8)),
        })
    }

    /// Serialize to JSON string (debug logging).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JSON rendering for debug lines; falls back to the encoder error.
pub fn json_or_error(rendered: Result<String, serde_json::Error>) -> String {
    rendered.unwrap_or_else(|e| format!("<unrenderable: {}>", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;
    use crate::game::state::PlayerState;

    #[test]
    fn test_input_packet_layout() {
        let frame = InputFrame::with_buttons(0x0102_0304, InputFrame::RIGHT | InputFrame::JUMP_PRESS)
            .aimed(1.0, -0.5);
        let bytes = ClientMessage::Input(frame).to_bytes().unwrap();

        // type + u32 tick + u8 buttons + two f32
        assert_eq!(bytes.len(), 1 + 4 + 1 + 4 + 4);
        assert_eq!(bytes[0], PacketType::Input as u8);
        assert_eq!(&bytes[1..5], &0x0102_0304u32.to_le_bytes());

        let parsed = ClientMessage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, ClientMessage::Input(frame));
    }

    #[test]
    fn test_bodyless_packets() {
        assert_eq!(ClientMessage::Restart.to_bytes().unwrap(), vec![PacketType::Restart as u8]);
        assert_eq!(ClientMessage::from_bytes(&[5]).unwrap(), ClientMessage::Ready);
    }

    #[test]
    fn test_snapshot_packet() {
        let mut state = GameState::default();
        let mut player = PlayerState::spawn(PlayerId(7), FixedVec2::from_ints(32, 64));
        player.name = DisplayName::new("ada");
        state.push(player);
        state.server_tick = 900;
        state.time_remaining_secs = 42;
        state.is_lobby = false;

        let bytes = ServerMessage::Snapshot(state).to_bytes().unwrap();
        assert!(bytes.len() <= MAX_PACKET_SIZE);

        match ServerMessage::from_bytes(&bytes).unwrap() {
            ServerMessage::Snapshot(parsed) => {
                assert_eq!(parsed.compute_hash(), state.compute_hash());
                assert_eq!(parsed.players()[0].name.as_str(), "ada");
            }
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_results_packet() {
        let msg = ServerMessage::LevelResults(LevelResults {
            level: 2,
            entries: vec![ResultEntry {
                player_id: PlayerId(1),
                name: DisplayName::new("bob"),
                finished: true,
                ticks: 1234,
            }],
        });
        let parsed = ServerMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_malformed_packets_rejected() {
        assert!(matches!(ClientMessage::from_bytes(&[]), Err(ProtocolError::Empty)));
        assert!(matches!(ClientMessage::from_bytes(&[99]), Err(ProtocolError::UnknownType(99))));
        // Server packet type on the client->server path.
        assert!(matches!(ClientMessage::from_bytes(&[16]), Err(ProtocolError::UnknownType(16))));
        // Truncated input body.
        assert!(matches!(ClientMessage::from_bytes(&[3, 1, 0]), Err(ProtocolError::Malformed(_))));

        let oversized = vec![3u8; MAX_PACKET_SIZE + 1];
        assert!(matches!(ClientMessage::from_bytes(&oversized), Err(ProtocolError::TooLarge(_))));

        assert!(matches!(ServerMessage::from_bytes(&[1]), Err(ProtocolError::UnknownType(1))));
    }

    #[test]
    fn test_disconnect_reason_codes() {
        assert_eq!(DisconnectReason::Generic.code(), 0);
        assert_eq!(DisconnectReason::ServerBusy.code(), 1);
        assert_eq!(DisconnectReason::VersionMismatch.code(), 2);
        assert_eq!(DisconnectReason::from_code(3), DisconnectReason::InvalidToken);
        assert_eq!(DisconnectReason::from_code(4), DisconnectReason::SessionEnded);
        assert_eq!(DisconnectReason::from_code(77), DisconnectReason::Generic);
    }

    #[test]
    fn test_json_debug_output() {
        let json = ServerMessage::VersionMismatch { server_version: 3 }.to_json().unwrap();
        assert!(json.contains("version_mismatch"));
        assert!(json.contains("3"));

        let json = ClientMessage::Ready.to_json().unwrap();
        assert!(json.contains("ready"));

        assert_eq!(json_or_error(ClientMessage::Restart.to_json()), "\"restart\"");
    }
}
