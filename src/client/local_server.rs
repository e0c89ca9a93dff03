//! Embedded Server
//!
//! Offline play runs a full `GameServer` on a background thread, bound to
//! loopback on an ephemeral port and gated by a fresh session token. The
//! local client connects like any remote one, presenting that token.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info};

use crate::game::level::{FileLevels, LevelCatalog};
use crate::network::auth::generate_token;
use crate::network::server::{GameServer, GameServerError, ServerConfig};
use crate::network::transport::TransportError;
use crate::network::websocket::{url_with_token, WsServerTransport};

/// Embedded server errors.
#[derive(Debug, Error)]
pub enum LocalServerError {
    #[error("failed to spawn server thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to build server runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("server error: {0}")]
    Server(#[from] GameServerError),

    #[error("server thread exited before it was ready")]
    Exited,
}

/// A server running on its own thread.
pub struct LocalServer {
    addr: SocketAddr,
    token: u32,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LocalServer {
    /// Serve levels from a directory.
    pub fn start(levels_dir: &str) -> Result<Self, LocalServerError> {
        let config = ServerConfig {
            levels_dir: levels_dir.to_string(),
            ..ServerConfig::default()
        };
        Self::start_with(config, Box::new(FileLevels::new(levels_dir)))
    }

    /// Start a server with `config` timing on loopback with a new token.
    ///
    /// Blocks until the listener is bound and the lobby is loaded.
    pub fn start_with(
        config: ServerConfig,
        catalog: Box<dyn LevelCatalog + Send>,
    ) -> Result<Self, LocalServerError> {
        let token = generate_token();
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            session_token: token,
            ..config
        };

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<SocketAddr, LocalServerError>>();

        let thread = std::thread::Builder::new()
            .name("tilerace-local-server".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(LocalServerError::Runtime(e)));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let transport = match WsServerTransport::bind(&config.bind_addr).await {
                        Ok(transport) => transport,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.into()));
                            return;
                        }
                    };
                    let addr = transport.local_addr();
                    let mut server = match GameServer::new(config, transport, catalog, Instant::now()) {
                        Ok(server) => server,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.into()));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(addr));
                    server.run(&thread_stop).await;
                });
            })
            .map_err(LocalServerError::Spawn)?;

        let addr = match ready_rx.recv() {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(LocalServerError::Exited);
            }
        };

        info!("Local server on {}", addr);
        Ok(Self {
            addr,
            token,
            stop,
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Session token the local client must present.
    pub fn token(&self) -> u32 {
        self.token
    }

    /// WebSocket URL carrying the session token.
    pub fn url(&self) -> String {
        url_with_token(&format!("ws://{}", self.addr), self.token)
    }

    /// Stop the loop and wait for the thread.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Local server thread panicked");
            }
            info!("Local server stopped");
        }
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        self.stop();
    }
}
