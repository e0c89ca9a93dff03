//! Network Layer
//!
//! Wire protocol, transports, the race session and the authoritative server.
//! This layer is **non-deterministic** (clocks, sockets); all movement runs
//! through `game/`.

pub mod protocol;
pub mod transport;
pub mod memory;
pub mod websocket;
pub mod auth;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, DisconnectReason, ProtocolError, PacketType};
pub use transport::{Transport, TransportEvent, TransportError, Channel, PeerId, SERVER_PEER};
pub use memory::{MemoryServerTransport, MemoryClientTransport, MemoryConnector};
pub use websocket::{WsServerTransport, WsClientTransport};
pub use auth::{TokenGate, AuthError};
pub use session::{Session, SessionConfig, SessionPhase, SessionEvent, SessionError};
pub use server::{GameServer, ServerConfig, GameServerError};
