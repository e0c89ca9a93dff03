//! Transport Abstraction
//!
//! The session and client only need four things from the network: poll the
//! next event, send bytes on a reliable or unreliable channel, and drop a
//! peer with a reason code. Implementations: in-process channels
//! (`memory`) and WebSockets (`websocket`).
//!
//! Polling never blocks. Implementations deliver events in arrival order
//! and discard events from peers the owner has already disconnected.

use thiserror::Error;

use crate::network::protocol::DisconnectReason;

/// Peer handle assigned by a transport.
pub type PeerId = u64;

/// On the client side the only peer is the server.
pub const SERVER_PEER: PeerId = 0;

/// Delivery channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Channel {
    /// Ordered, never dropped
    Reliable = 0,
    /// May be dropped under pressure; newer data supersedes older
    Unreliable = 1,
}

/// Event reported by `Transport::poll_event`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer connected. `token` is the session token it presented (0 = none).
    Connected { peer: PeerId, token: u32 },

    /// A packet arrived.
    Received { peer: PeerId, payload: Vec<u8> },

    /// A peer went away.
    Disconnected { peer: PeerId, reason: DisconnectReason },
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("connection closed")]
    Closed,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
}

/// Message transport used by `GameServer` and `GameClient`.
pub trait Transport {
    /// Next pending event, if any. Never blocks.
    fn poll_event(&mut self) -> Option<TransportEvent>;

    /// Queue a packet for a peer.
    fn send(&mut self, peer: PeerId, channel: Channel, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Close a peer's connection with a reason code. Unknown peers are ignored.
    fn disconnect(&mut self, peer: PeerId, reason: DisconnectReason);
}
