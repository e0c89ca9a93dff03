//! TileRace Server
//!
//! Authoritative session server. Configuration comes from `TILERACE_*`
//! environment variables; log filtering from `RUST_LOG`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tilerace::{
    PROTOCOL_VERSION, TICK_RATE, VERSION,
    core::hash::short_hex,
    game::{
        level::{FileLevels, LevelCatalog},
        state::{PlayerId, PlayerState},
        tick::{replay_inputs, scripted_inputs},
    },
    network::{GameServer, ServerConfig, WsServerTransport},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env();
    info!("TileRace Server v{}", VERSION);
    info!("Protocol: v{}, Tick Rate: {} Hz", PROTOCOL_VERSION, config.tick_rate);

    let catalog = FileLevels::new(config.levels_dir.clone());
    determinism_check(&catalog)?;

    let transport = WsServerTransport::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    let mut server = GameServer::new(config, transport, Box::new(catalog), Instant::now())
        .context("starting session")?;

    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            signal_stop.store(true, Ordering::Relaxed);
        }
    });

    server.run(&stop).await;
    Ok(())
}

/// Replay a fixed script on the lobby twice and compare the state hashes.
fn determinism_check(catalog: &FileLevels) -> anyhow::Result<()> {
    let lobby = catalog
        .lobby()
        .with_context(|| format!("loading lobby from {}", catalog.dir()))?;
    let start = PlayerState::spawn(PlayerId(1), lobby.world.spawn());
    let inputs = scripted_inputs(TICK_RATE * 10);

    let first = replay_inputs(&start, &inputs, &lobby.world).compute_hash();
    let second = replay_inputs(&start, &inputs, &lobby.world).compute_hash();
    info!("Determinism check: {} / {}", short_hex(&first), short_hex(&second));
    anyhow::ensure!(first == second, "simulation is not deterministic");
    Ok(())
}
