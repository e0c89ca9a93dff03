//! In-Process Transport
//!
//! A pair of unbounded tokio channels per connection. Used by tests and
//! for running a client and server in one process without sockets. Both
//! channels are lossless, so `Channel::Unreliable` behaves like reliable.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::mpsc::error::TryRecvError;

use crate::network::protocol::DisconnectReason;
use crate::network::transport::{
    Channel, PeerId, Transport, TransportError, TransportEvent, SERVER_PEER,
};

/// Client -> server traffic.
enum Inbound {
    Connect { peer: PeerId, token: u32, reply: UnboundedSender<Outbound> },
    Data { peer: PeerId, payload: Vec<u8> },
    Disconnect { peer: PeerId, reason: DisconnectReason },
}

/// Server -> client traffic.
enum Outbound {
    Data(Vec<u8>),
    Close(DisconnectReason),
}

// =============================================================================
// SERVER SIDE
// =============================================================================

/// Server end of the in-process transport.
pub struct MemoryServerTransport {
    inbound: UnboundedReceiver<Inbound>,
    peers: BTreeMap<PeerId, UnboundedSender<Outbound>>,
}

/// Handle for opening client connections to a `MemoryServerTransport`.
#[derive(Clone)]
pub struct MemoryConnector {
    inbound: UnboundedSender<Inbound>,
    next_peer: Arc<AtomicU64>,
}

impl MemoryServerTransport {
    /// Create a server transport and the connector clients use to reach it.
    pub fn new() -> (Self, MemoryConnector) {
        let (tx, rx) = mpsc::unbounded_channel();
        let server = Self {
            inbound: rx,
            peers: BTreeMap::new(),
        };
        let connector = MemoryConnector {
            inbound: tx,
            next_peer: Arc::new(AtomicU64::new(1)),
        };
        (server, connector)
    }

    /// Number of open connections.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl Transport for MemoryServerTransport {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        loop {
            let msg = self.inbound.try_recv().ok()?;
            match msg {
                Inbound::Connect { peer, token, reply } => {
                    self.peers.insert(peer, reply);
                    return Some(TransportEvent::Connected { peer, token });
                }
                Inbound::Data { peer, payload } => {
                    if self.peers.contains_key(&peer) {
                        return Some(TransportEvent::Received { peer, payload });
                    }
                }
                Inbound::Disconnect { peer, reason } => {
                    if self.peers.remove(&peer).is_some() {
                        return Some(TransportEvent::Disconnected { peer, reason });
                    }
                }
            }
        }
    }

    fn send(&mut self, peer: PeerId, _channel: Channel, payload: Vec<u8>) -> Result<(), TransportError> {
        let tx = self.peers.get(&peer).ok_or(TransportError::UnknownPeer(peer))?;
        tx.send(Outbound::Data(payload)).map_err(|_| TransportError::Closed)
    }

    fn disconnect(&mut self, peer: PeerId, reason: DisconnectReason) {
        if let Some(tx) = self.peers.remove(&peer) {
            let _ = tx.send(Outbound::Close(reason));
        }
    }
}

impl MemoryConnector {
    /// Open a connection presenting a session token (0 = none).
    pub fn connect(&self, token: u32) -> MemoryClientTransport {
        let peer = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let open = self
            .inbound
            .send(Inbound::Connect { peer, token, reply: tx })
            .is_ok();

        MemoryClientTransport {
            peer,
            token,
            outbound: self.inbound.clone(),
            inbound: rx,
            announced: false,
            closed: !open,
        }
    }
}

// =============================================================================
// CLIENT SIDE
// =============================================================================

/// Client end of the in-process transport.
pub struct MemoryClientTransport {
    peer: PeerId,
    token: u32,
    outbound: UnboundedSender<Inbound>,
    inbound: UnboundedReceiver<Outbound>,
    announced: bool,
    closed: bool,
}

impl MemoryClientTransport {
    /// Peer ID the server knows this connection by.
    pub fn peer_id(&self) -> PeerId {
        self.peer
    }
}

impl Transport for MemoryClientTransport {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        if !self.announced {
            self.announced = true;
            return Some(TransportEvent::Connected { peer: SERVER_PEER, token: self.token });
        }
        match self.inbound.try_recv() {
            Ok(Outbound::Data(payload)) => Some(TransportEvent::Received {
                peer: SERVER_PEER,
                payload,
            }),
            Ok(Outbound::Close(reason)) => {
                self.closed = true;
                Some(TransportEvent::Disconnected { peer: SERVER_PEER, reason })
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Some(TransportEvent::Disconnected {
                    peer: SERVER_PEER,
                    reason: DisconnectReason::Generic,
                })
            }
        }
    }

    fn send(&mut self, _peer: PeerId, _channel: Channel, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(Inbound::Data { peer: self.peer, payload })
            .map_err(|_| TransportError::Closed)
    }

    fn disconnect(&mut self, _peer: PeerId, reason: DisconnectReason) {
        if !self.closed {
            self.closed = true;
            let _ = self.outbound.send(Inbound::Disconnect { peer: self.peer, reason });
        }
    }
}

impl Drop for MemoryClientTransport {
    fn drop(&mut self) {
        self.disconnect(SERVER_PEER, DisconnectReason::Generic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_send_receive() {
        let (mut server, connector) = MemoryServerTransport::new();
        let mut client = connector.connect(42);

        assert_eq!(
            client.poll_event(),
            Some(TransportEvent::Connected { peer: SERVER_PEER, token: 42 })
        );
        let peer = client.peer_id();
        assert_eq!(server.poll_event(), Some(TransportEvent::Connected { peer, token: 42 }));

        client.send(SERVER_PEER, Channel::Unreliable, vec![1, 2, 3]).unwrap();
        assert_eq!(
            server.poll_event(),
            Some(TransportEvent::Received { peer, payload: vec![1, 2, 3] })
        );

        server.send(peer, Channel::Reliable, vec![9]).unwrap();
        assert_eq!(
            client.poll_event(),
            Some(TransportEvent::Received { peer: SERVER_PEER, payload: vec![9] })
        );
        assert_eq!(client.poll_event(), None);
        assert_eq!(server.poll_event(), None);
    }

    #[test]
    fn test_server_disconnect_carries_reason() {
        let (mut server, connector) = MemoryServerTransport::new();
        let mut client = connector.connect(0);
        client.poll_event();
        let peer = client.peer_id();
        server.poll_event();

        client.send(SERVER_PEER, Channel::Reliable, vec![1]).unwrap();
        server.disconnect(peer, DisconnectReason::ServerBusy);
        assert_eq!(server.peer_count(), 0);

        // Traffic from a peer the server already dropped is discarded.
        assert_eq!(server.poll_event(), None);
        assert!(matches!(
            server.send(peer, Channel::Reliable, vec![1]),
            Err(TransportError::UnknownPeer(_))
        ));

        assert_eq!(
            client.poll_event(),
            Some(TransportEvent::Disconnected {
                peer: SERVER_PEER,
                reason: DisconnectReason::ServerBusy
            })
        );
        assert!(client.send(SERVER_PEER, Channel::Reliable, vec![1]).is_err());
    }

    #[test]
    fn test_client_drop_reports_disconnect() {
        let (mut server, connector) = MemoryServerTransport::new();
        let client = connector.connect(0);
        let peer = client.peer_id();
        drop(client);

        assert_eq!(server.poll_event(), Some(TransportEvent::Connected { peer, token: 0 }));
        assert_eq!(
            server.poll_event(),
            Some(TransportEvent::Disconnected { peer, reason: DisconnectReason::Generic })
        );
    }

    #[test]
    fn test_server_drop_closes_clients() {
        let (server, connector) = MemoryServerTransport::new();
        drop(server);

        // Nobody is listening: the connection never opens.
        let mut client = connector.connect(0);
        assert_eq!(client.poll_event(), None);
        assert!(client.send(SERVER_PEER, Channel::Reliable, vec![1]).is_err());

        let (mut server, connector) = MemoryServerTransport::new();
        let mut client = connector.connect(0);
        client.poll_event();
        server.poll_event();
        drop(server);
        assert_eq!(
            client.poll_event(),
            Some(TransportEvent::Disconnected {
                peer: SERVER_PEER,
                reason: DisconnectReason::Generic
            })
        );
    }
}
