//! WebSocket Transport
//!
//! Binary WebSocket frames over tokio-tungstenite. Clients connect to
//! `ws://host:port/?token=N`; the token is read from the upgrade request
//! and reported with the `Connected` event.
//!
//! Each connection gets a writer task fed by two queues:
//! - reliable: unbounded, always delivered in order
//! - unreliable: bounded, packets are dropped when the queue is full
//!
//! The reliable queue is always drained first. Disconnect reasons travel as
//! WebSocket close codes `4000 + reason`.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_hdr_async, connect_async};
use tracing::{debug, info, trace, warn};

use crate::network::protocol::DisconnectReason;
use crate::network::transport::{
    Channel, PeerId, Transport, TransportError, TransportEvent, SERVER_PEER,
};

/// Unreliable packets buffered per connection before new ones are dropped.
pub const UNRELIABLE_QUEUE: usize = 32;

/// Close code offset for disconnect reasons.
pub const CLOSE_CODE_BASE: u16 = 4000;

enum Outbound {
    Data(Vec<u8>),
    Close(DisconnectReason),
}

/// Sending half of a connection.
struct Link {
    reliable: UnboundedSender<Outbound>,
    unreliable: mpsc::Sender<Vec<u8>>,
}

impl Link {
    fn send(&self, channel: Channel, payload: Vec<u8>) -> Result<(), TransportError> {
        match channel {
            Channel::Reliable => self
                .reliable
                .send(Outbound::Data(payload))
                .map_err(|_| TransportError::Closed),
            Channel::Unreliable => match self.unreliable.try_send(payload) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    trace!("Unreliable queue full, packet dropped");
                    Ok(())
                }
                Err(TrySendError::Closed(_)) => Err(TransportError::Closed),
            },
        }
    }

    fn close(&self, reason: DisconnectReason) {
        let _ = self.reliable.send(Outbound::Close(reason));
    }
}

enum PeerEvent {
    Connected { peer: PeerId, token: u32, link: Link },
    Received { peer: PeerId, payload: Vec<u8> },
    Disconnected { peer: PeerId, reason: DisconnectReason },
}

// =============================================================================
// HELPERS
// =============================================================================

/// WebSocket close code for a disconnect reason.
pub fn close_code(reason: DisconnectReason) -> u16 {
    CLOSE_CODE_BASE + reason.code() as u16
}

/// Disconnect reason carried by a close code.
pub fn reason_from_close(code: u16) -> DisconnectReason {
    match code.checked_sub(CLOSE_CODE_BASE) {
        Some(offset) => DisconnectReason::from_code(offset as u32),
        None => DisconnectReason::Generic,
    }
}

/// Extract `token=N` from a query string. Missing or invalid reads as 0.
pub fn parse_token(query: Option<&str>) -> u32 {
    query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .find_map(|pair| pair.strip_prefix("token="))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Append the session token to a server URL.
pub fn url_with_token(url: &str, token: u32) -> String {
    if token == 0 {
        return url.to_string();
    }
    if url.contains('?') {
        format!("{}&token={}", url, token)
    } else if url.ends_with('/') {
        format!("{}?token={}", url, token)
    } else {
        format!("{}/?token={}", url, token)
    }
}

fn link_channels() -> (Link, UnboundedReceiver<Outbound>, mpsc::Receiver<Vec<u8>>) {
    let (reliable, reliable_rx) = mpsc::unbounded_channel();
    let (unreliable, unreliable_rx) = mpsc::channel(UNRELIABLE_QUEUE);
    (Link { reliable, unreliable }, reliable_rx, unreliable_rx)
}

/// Drain both queues into the socket until closed.
async fn write_loop<S>(
    mut sink: S,
    mut reliable: UnboundedReceiver<Outbound>,
    mut unreliable: mpsc::Receiver<Vec<u8>>,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            msg = reliable.recv() => match msg {
                Some(Outbound::Data(bytes)) => {
                    if sink.send(Message::Binary(bytes)).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close(reason)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(close_code(reason)),
                        reason: "".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            Some(bytes) = unreliable.recv() => {
                if sink.send(Message::Binary(bytes)).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Read frames until the socket closes; returns the close reason.
async fn read_loop<S>(mut stream: S, peer: PeerId, events: &UnboundedSender<PeerEvent>) -> DisconnectReason
where
    S: futures_util::Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Binary(payload))) => {
                if events.send(PeerEvent::Received { peer, payload }).is_err() {
                    return DisconnectReason::Generic;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                return frame
                    .map(|f| reason_from_close(u16::from(f.code)))
                    .unwrap_or(DisconnectReason::Generic);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!("WebSocket error on peer {}: {}", peer, e);
                return DisconnectReason::Generic;
            }
            None => return DisconnectReason::Generic,
        }
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// Listening WebSocket transport.
pub struct WsServerTransport {
    local_addr: SocketAddr,
    events: UnboundedReceiver<PeerEvent>,
    peers: BTreeMap<PeerId, Link>,
    accept_task: JoinHandle<()>,
}

impl WsServerTransport {
    /// Bind and start accepting connections. Must run inside a tokio runtime.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        info!("WebSocket transport listening on {}", local_addr);

        let (events_tx, events) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_loop(listener, events_tx));

        Ok(Self {
            local_addr,
            events,
            peers: BTreeMap::new(),
            accept_task,
        })
    }

    /// Bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

async fn accept_loop(listener: TcpListener, events: UnboundedSender<PeerEvent>) {
    let mut next_peer: PeerId = 1;
    while !events.is_closed() {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let peer = next_peer;
                next_peer += 1;
                debug!("TCP connection from {} as peer {}", addr, peer);
                tokio::spawn(serve_peer(stream, peer, events.clone()));
            }
            Err(e) => warn!("Accept error: {}", e),
        }
    }
}

async fn serve_peer(stream: TcpStream, peer: PeerId, events: UnboundedSender<PeerEvent>) {
    let _ = stream.set_nodelay(true);

    let mut token = 0u32;
    let read_token = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        token = parse_token(req.uri().query());
        Ok(resp)
    };
    let ws = match accept_hdr_async(stream, read_token).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for peer {}: {}", peer, e);
            return;
        }
    };

    let (sink, stream) = ws.split();
    let (link, reliable_rx, unreliable_rx) = link_channels();
    if events.send(PeerEvent::Connected { peer, token, link }).is_err() {
        return;
    }
    let writer = tokio::spawn(write_loop(sink, reliable_rx, unreliable_rx));

    let reason = read_loop(stream, peer, &events).await;
    let _ = events.send(PeerEvent::Disconnected { peer, reason });
    writer.abort();
}

impl Transport for WsServerTransport {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.events.try_recv().ok()? {
                PeerEvent::Connected { peer, token, link } => {
                    self.peers.insert(peer, link);
                    return Some(TransportEvent::Connected { peer, token });
                }
                PeerEvent::Received { peer, payload } => {
                    if self.peers.contains_key(&peer) {
                        return Some(TransportEvent::Received { peer, payload });
                    }
                }
                PeerEvent::Disconnected { peer, reason } => {
                    if self.peers.remove(&peer).is_some() {
                        return Some(TransportEvent::Disconnected { peer, reason });
                    }
                }
            }
        }
    }

    fn send(&mut self, peer: PeerId, channel: Channel, payload: Vec<u8>) -> Result<(), TransportError> {
        self.peers
            .get(&peer)
            .ok_or(TransportError::UnknownPeer(peer))?
            .send(channel, payload)
    }

    fn disconnect(&mut self, peer: PeerId, reason: DisconnectReason) {
        if let Some(link) = self.peers.remove(&peer) {
            link.close(reason);
        }
    }
}

impl Drop for WsServerTransport {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// WebSocket connection to a game server.
pub struct WsClientTransport {
    token: u32,
    events: UnboundedReceiver<PeerEvent>,
    link: Link,
    announced: bool,
    closed: bool,
}

impl WsClientTransport {
    /// Connect to `url`, presenting a session token (0 = none).
    pub async fn connect(url: &str, token: u32) -> Result<Self, TransportError> {
        let full = url_with_token(url, token);
        let (ws, _) = connect_async(full.as_str()).await.map_err(|e| TransportError::Connect {
            url: full.clone(),
            reason: e.to_string(),
        })?;
        info!("Connected to {}", url);

        let (sink, stream) = ws.split();
        let (link, reliable_rx, unreliable_rx) = link_channels();
        let (events_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(sink, reliable_rx, unreliable_rx));
        tokio::spawn(async move {
            let reason = read_loop(stream, SERVER_PEER, &events_tx).await;
            let _ = events_tx.send(PeerEvent::Disconnected { peer: SERVER_PEER, reason });
        });

        Ok(Self {
            token,
            events,
            link,
            announced: false,
            closed: false,
        })
    }
}

impl Transport for WsClientTransport {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        if !self.announced {
            self.announced = true;
            return Some(TransportEvent::Connected { peer: SERVER_PEER, token: self.token });
        }
        match self.events.try_recv() {
            Ok(PeerEvent::Received { payload, .. }) => Some(TransportEvent::Received {
                peer: SERVER_PEER,
                payload,
            }),
            Ok(PeerEvent::Disconnected { reason, .. }) => {
                self.closed = true;
                Some(TransportEvent::Disconnected { peer: SERVER_PEER, reason })
            }
            Ok(PeerEvent::Connected { .. }) | Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Some(TransportEvent::Disconnected {
                    peer: SERVER_PEER,
                    reason: DisconnectReason::Generic,
                })
            }
        }
    }

    fn send(&mut self, _peer: PeerId, channel: Channel, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.link.send(channel, payload)
    }

    fn disconnect(&mut self, _peer: PeerId, reason: DisconnectReason) {
        if !self.closed {
            self.closed = true;
            self.link.close(reason);
        }
    }
}
