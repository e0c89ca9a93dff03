//! Race Session
//!
//! Owns the players, the current level and the lobby → countdown → race →
//! results cycle. The server feeds it inputs and control requests and calls
//! `step` once per tick; `step` reports what clients need to be told.
//!
//! ```text
//! Lobby ──all on exit──▶ Countdown ──3 s──▶ level 1 (Racing, locked)
//! Racing ──all on exit──▶ Countdown ──3 s──▶ Results
//! Racing ──time limit──▶ Results
//! Results ──all ready / 15 s──▶ next level | game over → Lobby
//! everyone left ──▶ Lobby
//! ```
//!
//! Time is passed in explicitly so tests control the clock.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::fixed::{Fixed, WALL_SENSE_REACH};
use crate::game::collision::touches_exit;
use crate::game::input::InputFrame;
use crate::game::level::{Level, LevelCatalog};
use crate::game::state::{DisplayName, GameState, PlayerId, PlayerState, MAX_PLAYERS};
use crate::game::tick::{advance_progress, simulate};
use crate::game::world::{World, WorldError};
use crate::network::protocol::{LevelResults, LoadLevel, ResultEntry};
use crate::TICK_RATE;

// =============================================================================
// CONFIG
// =============================================================================

/// Session timing and capacity.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum connected players (capped at `MAX_PLAYERS`).
    pub max_players: usize,
    /// Delay between everyone reaching the exit and the transition.
    pub countdown: Duration,
    /// Race time limit per level.
    pub level_time_limit: Duration,
    /// How long results stay up when not everyone is ready.
    pub results_duration: Duration,
    /// Wall sensor reach applied to every loaded level.
    pub wall_reach: Fixed,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: MAX_PLAYERS,
            countdown: Duration::from_secs(3),
            level_time_limit: Duration::from_secs(120),
            results_duration: Duration::from_secs(15),
            wall_reach: WALL_SENSE_REACH,
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// What a finished countdown leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTarget {
    /// Leave the lobby for level 1
    FirstLevel,
    /// End the race and show results
    Results,
}

/// Session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Lobby level, open for new players.
    Lobby,
    /// Everyone is on the exit; cancelled as soon as someone leaves it.
    Countdown { since: Instant, target: CountdownTarget },
    /// Timed race, closed to new players.
    Racing,
    /// Results shown, waiting for ready signals or the timeout.
    Results { since: Instant },
}

/// Something clients must be told.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A player reached the exit.
    PlayerFinished { player: PlayerId, ticks: u32 },
    /// The race ended.
    Results(LevelResults),
    /// A new level is loaded; players are back at spawn.
    LevelLoaded(LoadLevel),
    /// No level left. Players are gone; the session is back in the lobby.
    GameOver { notice: LoadLevel, players: Vec<PlayerId> },
}

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("race in progress")]
    Locked,

    #[error("session full ({0} players)")]
    Full(usize),

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("level error: {0}")]
    Level(#[from] WorldError),
}

/// A player in the session.
#[derive(Debug, Clone)]
struct SessionPlayer {
    state: PlayerState,
    /// Newest input received since the last step
    pending: Option<InputFrame>,
}

// =============================================================================
// SESSION
// =============================================================================

/// The authoritative race session.
pub struct Session {
    config: SessionConfig,
    catalog: Box<dyn LevelCatalog + Send>,
    lobby: Level,
    level: u32,
    level_path: String,
    world: World,
    phase: SessionPhase,
    level_started: Instant,
    locked: bool,
    players: BTreeMap<PlayerId, SessionPlayer>,
    ready: BTreeSet<PlayerId>,
    next_player_id: u32,
    server_tick: u32,
}

impl Session {
    /// Create a session in the lobby. Fails when the lobby cannot be loaded.
    pub fn new(
        mut config: SessionConfig,
        catalog: Box<dyn LevelCatalog + Send>,
        now: Instant,
    ) -> Result<Self, SessionError> {
        config.max_players = config.max_players.clamp(1, MAX_PLAYERS);
        let mut lobby = catalog.lobby()?;
        lobby.world.set_wall_reach(config.wall_reach);
        info!(
            "Lobby loaded from {} ({}x{} tiles)",
            lobby.path,
            lobby.world.width(),
            lobby.world.height()
        );

        Ok(Self {
            config,
            catalog,
            level: 0,
            level_path: lobby.path.clone(),
            world: lobby.world.clone(),
            lobby,
            phase: SessionPhase::Lobby,
            level_started: now,
            locked: false,
            players: BTreeMap::new(),
            ready: BTreeSet::new(),
            next_player_id: 1,
            server_tick: 0,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Current level number (0 = lobby).
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn level_path(&self) -> &str {
        &self.level_path
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// True while new players are refused.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.get(&id).map(|p| &p.state)
    }

    pub fn server_tick(&self) -> u32 {
        self.server_tick
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Add a player at the current spawn.
    pub fn add_player(&mut self) -> Result<PlayerId, SessionError> {
        if self.locked {
            return Err(SessionError::Locked);
        }
        if self.players.len() >= self.config.max_players {
            return Err(SessionError::Full(self.config.max_players));
        }

        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        let state = PlayerState::spawn(id, self.world.spawn());
        self.players.insert(id, SessionPlayer { state, pending: None });
        info!("Player {} joined ({} in session)", id, self.players.len());
        Ok(id)
    }

    /// Remove a player. May end the results phase or reset the session.
    pub fn remove_player(&mut self, id: PlayerId, now: Instant) -> Vec<SessionEvent> {
        if self.players.remove(&id).is_none() {
            return Vec::new();
        }
        self.ready.remove(&id);
        info!("Player {} left ({} in session)", id, self.players.len());

        if self.players.is_empty() {
            info!("Everyone left, back to the lobby");
            self.reset_to_lobby(now);
            return Vec::new();
        }
        if matches!(self.phase, SessionPhase::Results { .. }) && self.all_ready() {
            return self.change_level(now);
        }
        Vec::new()
    }

    /// Set a player's display name.
    pub fn set_name(&mut self, id: PlayerId, name: DisplayName) -> Result<(), SessionError> {
        let player = self.players.get_mut(&id).ok_or(SessionError::UnknownPlayer(id))?;
        player.state.name = name;
        info!("Player {} is now '{}'", id, name);
        Ok(())
    }

    /// Send a player back to the spawn. The best finish is kept.
    pub fn restart(&mut self, id: PlayerId) -> Result<(), SessionError> {
        let spawn = self.world.spawn();
        let player = self.players.get_mut(&id).ok_or(SessionError::UnknownPlayer(id))?;
        player.state.reset_to_spawn(spawn);
        player.pending = None;
        debug!("Player {} restarted", id);
        Ok(())
    }

    /// Ready for the next level. Ignored outside the results phase.
    pub fn mark_ready(&mut self, id: PlayerId, now: Instant) -> Result<Vec<SessionEvent>, SessionError> {
        if !self.players.contains_key(&id) {
            return Err(SessionError::UnknownPlayer(id));
        }
        if !matches!(self.phase, SessionPhase::Results { .. }) {
            return Ok(Vec::new());
        }
        self.ready.insert(id);
        info!("Player {} ready ({}/{})", id, self.ready.len(), self.players.len());
        if self.all_ready() {
            return Ok(self.change_level(now));
        }
        Ok(Vec::new())
    }

    /// Queue an input for the next step.
    ///
    /// Frames not newer than the last processed or pending tick are ignored.
    /// A newer frame replaces the pending one but keeps its press edges.
    pub fn submit_input(&mut self, id: PlayerId, mut frame: InputFrame) -> Result<(), SessionError> {
        let player = self.players.get_mut(&id).ok_or(SessionError::UnknownPlayer(id))?;
        if frame.tick <= player.state.last_processed_tick {
            return Ok(());
        }
        match player.pending {
            Some(older) if frame.tick <= older.tick => {}
            Some(older) => {
                frame.absorb_edges(&older);
                player.pending = Some(frame);
            }
            None => player.pending = Some(frame),
        }
        Ok(())
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance every player one tick, then run the phase transitions.
    pub fn step(&mut self, now: Instant) -> Vec<SessionEvent> {
        self.server_tick = self.server_tick.wrapping_add(1);
        let mut events = Vec::new();

        for (id, player) in self.players.iter_mut() {
            let input = player
                .pending
                .take()
                .unwrap_or_else(|| InputFrame::neutral(player.state.last_processed_tick));
            player.state = simulate(&player.state, &input, &self.world);

            if advance_progress(&mut player.state, &self.world) && self.level > 0 {
                info!("Player {} finished level {} in {} ticks", id, self.level, player.state.level_ticks);
                debug!("Finish state: {}", player.state.summary());
                events.push(SessionEvent::PlayerFinished {
                    player: *id,
                    ticks: player.state.level_ticks,
                });
            }
        }

        events.extend(self.update(now));
        events
    }

    /// Phase transitions driven by the exit zone and the wall clock.
    pub fn update(&mut self, now: Instant) -> Vec<SessionEvent> {
        if self.players.is_empty() {
            return Vec::new();
        }
        let in_zone = self.all_on_exit();

        match self.phase {
            SessionPhase::Lobby if in_zone => {
                info!("Everyone on the exit, leaving the lobby in {:?}", self.config.countdown);
                self.phase = SessionPhase::Countdown { since: now, target: CountdownTarget::FirstLevel };
            }
            SessionPhase::Racing if in_zone => {
                info!("Everyone on the exit, results in {:?}", self.config.countdown);
                self.phase = SessionPhase::Countdown { since: now, target: CountdownTarget::Results };
            }
            SessionPhase::Countdown { target, .. } if !in_zone => {
                debug!("Countdown cancelled");
                self.phase = match target {
                    CountdownTarget::FirstLevel => SessionPhase::Lobby,
                    CountdownTarget::Results => SessionPhase::Racing,
                };
            }
            SessionPhase::Countdown { since, target } if now.duration_since(since) >= self.config.countdown => {
                return match target {
                    CountdownTarget::FirstLevel => self.change_level(now),
                    CountdownTarget::Results => vec![self.enter_results(now, "exit")],
                };
            }
            SessionPhase::Results { since } if now.duration_since(since) >= self.config.results_duration => {
                return self.change_level(now);
            }
            _ => {}
        }

        let racing = matches!(
            self.phase,
            SessionPhase::Racing | SessionPhase::Countdown { target: CountdownTarget::Results, .. }
        );
        if racing && now.duration_since(self.level_started) >= self.config.level_time_limit {
            return vec![self.enter_results(now, "time limit")];
        }
        Vec::new()
    }

    /// Authoritative snapshot for broadcast.
    pub fn snapshot(&self, now: Instant) -> GameState {
        let mut state = GameState {
            server_tick: self.server_tick,
            is_lobby: self.level == 0,
            ..GameState::default()
        };
        for player in self.players.values() {
            if !state.push(player.state) {
                break;
            }
        }

        if let SessionPhase::Countdown { since, .. } = self.phase {
            let elapsed = now.duration_since(since);
            if let Some(left) = self.config.countdown.checked_sub(elapsed) {
                state.countdown_ticks = (left.as_millis() as u64 * TICK_RATE as u64 / 1000) as u32;
            }
        }

        let racing = self.level > 0 && !matches!(self.phase, SessionPhase::Results { .. });
        if racing {
            let elapsed = now.duration_since(self.level_started);
            state.time_remaining_secs = self
                .config
                .level_time_limit
                .saturating_sub(elapsed)
                .as_secs() as u32;
        }
        state
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    fn all_on_exit(&self) -> bool {
        !self.players.is_empty()
            && self
                .players
                .values()
                .all(|p| touches_exit(&self.world, p.state.position))
    }

    fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.keys().all(|id| self.ready.contains(id))
    }

    fn enter_results(&mut self, now: Instant, reason: &str) -> SessionEvent {
        let entries = self
            .players
            .values()
            .map(|p| {
                let finished = p.state.best_finish_ticks > 0;
                ResultEntry {
                    player_id: p.state.id,
                    name: p.state.name,
                    finished,
                    ticks: if finished { p.state.best_finish_ticks } else { p.state.level_ticks },
                }
            })
            .collect();
        let results = LevelResults {
            level: self.level,
            entries: rank_results(entries),
        };

        self.phase = SessionPhase::Results { since: now };
        self.ready.clear();
        info!("Results ({}) for level {}: {} players", reason, self.level, results.entries.len());
        SessionEvent::Results(results)
    }

    /// Load the next level, or end the session when there is none.
    fn change_level(&mut self, now: Instant) -> Vec<SessionEvent> {
        self.ready.clear();
        let next = if self.level == 0 {
            self.locked = true;
            info!("Lobby complete, session locked");
            1
        } else {
            self.level + 1
        };

        let loaded = match self.catalog.level(next) {
            Ok(level) => level,
            Err(e) => {
                error!("Level {} failed to load, ending session: {}", next, e);
                None
            }
        };
        let Some(mut level) = loaded else {
            return vec![self.game_over(now)];
        };

        level.world.set_wall_reach(self.config.wall_reach);
        let spawn = level.world.spawn();
        for player in self.players.values_mut() {
            player.state.reset_to_spawn(spawn);
            player.state.best_finish_ticks = 0;
            player.pending = None;
        }
        info!("Level change → {} ({})", next, level.path);

        self.level = next;
        self.level_path = level.path.clone();
        self.world = level.world;
        self.phase = SessionPhase::Racing;
        self.level_started = now;

        vec![SessionEvent::LevelLoaded(LoadLevel {
            level: next,
            path: level.path,
            is_last: false,
        })]
    }

    fn game_over(&mut self, now: Instant) -> SessionEvent {
        let players = self.player_ids();
        info!("All levels complete, closing session with {} players", players.len());
        let notice = LoadLevel {
            level: self.level,
            path: String::new(),
            is_last: true,
        };
        self.players.clear();
        self.reset_to_lobby(now);
        SessionEvent::GameOver { notice, players }
    }

    fn reset_to_lobby(&mut self, now: Instant) {
        if !self.players.is_empty() {
            warn!("Resetting to the lobby with {} players still present", self.players.len());
        }
        self.level = 0;
        self.level_path = self.lobby.path.clone();
        self.world = self.lobby.world.clone();
        self.phase = SessionPhase::Lobby;
        self.level_started = now;
        self.locked = false;
        self.ready.clear();
        self.next_player_id = 1;
    }
}

/// Rank results: finished before DNF, then ascending ticks, then player id.
pub fn rank_results(mut entries: Vec<ResultEntry>) -> Vec<ResultEntry> {
    entries.sort_by_key(|e| (!e.finished, e.ticks, e.player_id));
    entries
}
