//! Game State Definitions
//!
//! Per-player simulated state and the authoritative snapshot the server
//! broadcasts every tick. Everything here is `Copy` and fixed-size so a
//! snapshot can be cloned into the prediction buffer without allocation.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, Units};
use crate::core::vec2::FixedVec2;
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};

/// Snapshot capacity. A session never holds more players than this.
pub const MAX_PLAYERS: usize = 8;

/// Display name length in bytes.
pub const NAME_LEN: usize = 16;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Numeric player identifier, assigned by the server on handshake.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

// =============================================================================
// DISPLAY NAME
// =============================================================================

/// Fixed-size display name, NUL padded.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayName(pub [u8; NAME_LEN]);

impl DisplayName {
    /// Build from a string, truncating on a UTF-8 boundary.
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(NAME_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; NAME_LEN];
        bytes[..end].copy_from_slice(&name.as_bytes()[..end]);
        Self(bytes)
    }

    /// Name as a string slice. Invalid bytes from the wire yield "".
    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        std::str::from_utf8(&self.0[..len]).unwrap_or("")
    }

    /// True when no name has been set.
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl fmt::Debug for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// SUB-STATES
// =============================================================================

/// Which wall the last wall jump pushed off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WallSide {
    /// No wall jump since the last ground contact
    #[default]
    None = 0,
    /// Last wall jump was off a wall on the left
    Left = 1,
    /// Last wall jump was off a wall on the right
    Right = 2,
}

/// Dash sub-state.
///
/// `active_ticks` and `cooldown_ticks` are never both non-zero: the
/// cooldown is armed only on the tick the active window runs out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashState {
    /// Dash available (refreshed on ground contact)
    pub ready: bool,

    /// Remaining ticks of the current dash (0 = not dashing)
    pub active_ticks: u8,

    /// Remaining cooldown ticks (0 = no cooldown)
    pub cooldown_ticks: u8,

    /// Normalized dash direction
    pub dir: FixedVec2,

    /// Last non-zero horizontal input (-1 / +1), 0 if never moved
    pub last_dir_x: i8,
}

impl Default for DashState {
    fn default() -> Self {
        Self {
            ready: true,
            active_ticks: 0,
            cooldown_ticks: 0,
            dir: FixedVec2::ZERO,
            last_dir_x: 0,
        }
    }
}

impl DashState {
    /// True while the dash window is running.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active_ticks > 0
    }

    /// True when a dash press would start a dash.
    #[inline]
    pub fn can_start(&self) -> bool {
        self.ready && self.active_ticks == 0 && self.cooldown_ticks == 0
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// State of a single player.
///
/// `velocity.x` carries external impulses (wall-jump kick) while
/// `move_vel_x` is the input-driven running speed; the two are summed when
/// moving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Unique player ID
    pub id: PlayerId,

    /// Display name
    pub name: DisplayName,

    /// Top-left corner of the 32x32 body
    pub position: FixedVec2,

    /// Impulse velocity (x) and vertical velocity (y)
    pub velocity: FixedVec2,

    /// Input-driven horizontal velocity
    pub move_vel_x: Fixed,

    /// Standing on a solid tile
    pub on_ground: bool,

    /// Wall within sensor reach on the left
    pub on_wall_left: bool,

    /// Wall within sensor reach on the right
    pub on_wall_right: bool,

    /// Jump button state last tick (for the jump cut edge)
    pub jump_held: bool,

    /// Remaining ticks of a buffered jump press
    pub jump_buffer_ticks: u8,

    /// Remaining coyote ticks after leaving ground
    pub coyote_ticks: u8,

    /// Side of the last wall jump, cleared on ground contact
    pub wall_jump_latch: WallSide,

    /// Dash sub-state
    pub dash: DashState,

    // =========================================================================
    // Level progress (server-advanced)
    // =========================================================================

    /// Ticks spent in the current level
    pub level_ticks: u32,

    /// Reached the exit this level
    pub finished: bool,

    /// Best finish time this level in ticks (0 = none)
    pub best_finish_ticks: u32,

    /// Most recent input tick reflected in this state
    pub last_processed_tick: u32,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::spawn(PlayerId::default(), FixedVec2::ZERO)
    }
}

impl PlayerState {
    /// Create a new player at spawn position.
    pub fn spawn(id: PlayerId, position: FixedVec2) -> Self {
        Self {
            id,
            name: DisplayName::default(),
            position,
            velocity: FixedVec2::ZERO,
            move_vel_x: 0,
            on_ground: false,
            on_wall_left: false,
            on_wall_right: false,
            jump_held: false,
            jump_buffer_ticks: 0,
            coyote_ticks: 0,
            wall_jump_latch: WallSide::None,
            dash: DashState::default(),
            level_ticks: 0,
            finished: false,
            best_finish_ticks: 0,
            last_processed_tick: 0,
        }
    }

    /// Reset movement and progress to a spawn point.
    ///
    /// Identity, the best finish and the input anchor survive.
    pub fn reset_to_spawn(&mut self, position: FixedVec2) {
        let mut fresh = Self::spawn(self.id, position);
        fresh.name = self.name;
        fresh.best_finish_ticks = self.best_finish_ticks;
        fresh.last_processed_tick = self.last_processed_tick;
        *self = fresh;
    }

    /// Copy the server-owned progress fields from an authoritative state.
    pub fn adopt_progress(&mut self, from: &PlayerState) {
        self.name = from.name;
        self.level_ticks = from.level_ticks;
        self.finished = from.finished;
        self.best_finish_ticks = from.best_finish_ticks;
    }

    /// Hash this player's simulated state for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32(self.id.0);
        hasher.update_vec2(self.position);
        hasher.update_vec2(self.velocity);
        hasher.update_fixed(self.move_vel_x);
        hasher.update_bool(self.on_ground);
        hasher.update_bool(self.on_wall_left);
        hasher.update_bool(self.on_wall_right);
        hasher.update_bool(self.jump_held);
        hasher.update_u8(self.jump_buffer_ticks);
        hasher.update_u8(self.coyote_ticks);
        hasher.update_u8(self.wall_jump_latch as u8);
        hasher.update_bool(self.dash.ready);
        hasher.update_u8(self.dash.active_ticks);
        hasher.update_u8(self.dash.cooldown_ticks);
        hasher.update_vec2(self.dash.dir);
        hasher.update_u8(self.dash.last_dir_x as u8);
        hasher.update_u32(self.level_ticks);
        hasher.update_bool(self.finished);
        hasher.update_u32(self.best_finish_ticks);
        hasher.update_u32(self.last_processed_tick);
    }

    /// Hash of this player alone.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_player_state();
        self.hash_into(&mut hasher);
        hasher.finalize()
    }

    /// Short human-readable summary for log lines.
    pub fn summary(&self) -> String {
        format!(
            "{} pos=({}, {}) vel=({}, {}) ground={} tick={}",
            self.id,
            Units(self.position.x),
            Units(self.position.y),
            Units(self.move_vel_x.saturating_add(self.velocity.x)),
            Units(self.velocity.y),
            self.on_ground,
            self.last_processed_tick,
        )
    }
}

// =============================================================================
// GAME STATE (snapshot)
// =============================================================================

/// Authoritative snapshot broadcast by the server once per tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Player slots; only the first `count` are meaningful
    pub players: [PlayerState; MAX_PLAYERS],

    /// Number of occupied slots
    pub count: u8,

    /// Server tick this snapshot was taken on
    pub server_tick: u32,

    /// Ticks left before the pending transition (0 = no countdown)
    pub countdown_ticks: u32,

    /// Seconds left in the level (0 in the lobby and in results)
    pub time_remaining_secs: u32,

    /// Session is in the lobby level
    pub is_lobby: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            players: [PlayerState::default(); MAX_PLAYERS],
            count: 0,
            server_tick: 0,
            countdown_ticks: 0,
            time_remaining_secs: 0,
            is_lobby: true,
        }
    }
}

impl GameState {
    /// Occupied player slots.
    pub fn players(&self) -> &[PlayerState] {
        let n = (self.count as usize).min(MAX_PLAYERS);
        &self.players[..n]
    }

    /// Mutable occupied player slots.
    pub fn players_mut(&mut self) -> &mut [PlayerState] {
        let n = (self.count as usize).min(MAX_PLAYERS);
        &mut self.players[..n]
    }

    /// Append a player. Returns false when the snapshot is full.
    pub fn push(&mut self, player: PlayerState) -> bool {
        let n = self.count as usize;
        if n >= MAX_PLAYERS {
            return false;
        }
        self.players[n] = player;
        self.count += 1;
        true
    }

    /// Find a player by ID.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players().iter().find(|p| p.id == id)
    }

    /// Find a player by ID (mutable).
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerState> {
        self.players_mut().iter_mut().find(|p| p.id == id)
    }

    /// Compute deterministic hash of the snapshot.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.server_tick, |hasher| {
            hasher.update_u8(self.count);
            hasher.update_u32(self.countdown_ticks);
            hasher.update_u32(self.time_remaining_secs);
            hasher.update_bool(self.is_lobby);
            for player in self.players() {
                player.hash_into(hasher);
            }
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_truncates_on_char_boundary() {
        let name = DisplayName::new("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(name.as_str(), "abcdefghijklmnop");

        // 'é' is two bytes; the 16th byte would split it.
        let name = DisplayName::new("abcdefghijklmnoé");
        assert_eq!(name.as_str(), "abcdefghijklmno");

        assert!(DisplayName::default().is_empty());
        assert_eq!(DisplayName::new("bob").to_string(), "bob");
    }

    #[test]
    fn test_display_name_invalid_bytes() {
        let name = DisplayName([0xff; NAME_LEN]);
        assert_eq!(name.as_str(), "");
    }

    #[test]
    fn test_summary_for_log_lines() {
        let mut player = PlayerState::spawn(PlayerId(2), FixedVec2::from_ints(64, 32));
        player.last_processed_tick = 7;
        let line = player.summary();
        assert!(line.contains("pos=(64.0000, 32.0000)"), "{line}");
        assert!(line.contains("ground=false tick=7"), "{line}");
    }

    #[test]
    fn test_reset_to_spawn_keeps_identity_and_best() {
        let mut player = PlayerState::spawn(PlayerId(3), FixedVec2::from_ints(64, 64));
        player.name = DisplayName::new("ada");
        player.velocity = FixedVec2::from_ints(10, -10);
        player.level_ticks = 500;
        player.finished = true;
        player.best_finish_ticks = 480;
        player.last_processed_tick = 77;

        player.reset_to_spawn(FixedVec2::from_ints(32, 32));

        assert_eq!(player.id, PlayerId(3));
        assert_eq!(player.name.as_str(), "ada");
        assert_eq!(player.position, FixedVec2::from_ints(32, 32));
        assert_eq!(player.velocity, FixedVec2::ZERO);
        assert_eq!(player.level_ticks, 0);
        assert!(!player.finished);
        assert_eq!(player.best_finish_ticks, 480);
        assert_eq!(player.last_processed_tick, 77);
    }

    #[test]
    fn test_adopt_progress() {
        let mut local = PlayerState::spawn(PlayerId(1), FixedVec2::ZERO);
        let mut server = local;
        server.level_ticks = 90;
        server.finished = true;
        server.best_finish_ticks = 90;
        server.position = FixedVec2::from_ints(5, 5);

        local.adopt_progress(&server);
        assert_eq!(local.level_ticks, 90);
        assert!(local.finished);
        assert_eq!(local.best_finish_ticks, 90);
        // Movement is not touched.
        assert_eq!(local.position, FixedVec2::ZERO);
    }

    #[test]
    fn test_player_hash_covers_movement() {
        let a = PlayerState::spawn(PlayerId(1), FixedVec2::ZERO);
        let mut b = a;
        assert_eq!(a.compute_hash(), b.compute_hash());

        b.dash.cooldown_ticks = 1;
        assert_ne!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn test_game_state_push_and_lookup() {
        let mut state = GameState::default();
        for i in 0..MAX_PLAYERS as u32 {
            assert!(state.push(PlayerState::spawn(PlayerId(i + 1), FixedVec2::ZERO)));
        }
        assert!(!state.push(PlayerState::spawn(PlayerId(99), FixedVec2::ZERO)));
        assert_eq!(state.players().len(), MAX_PLAYERS);
        assert!(state.player(PlayerId(4)).is_some());
        assert!(state.player(PlayerId(99)).is_none());
    }

    #[test]
    fn test_game_state_hash_ignores_empty_slots() {
        let mut a = GameState::default();
        a.push(PlayerState::spawn(PlayerId(1), FixedVec2::ZERO));
        let mut b = a;
        b.players[5].position = FixedVec2::from_ints(1, 1);
        assert_eq!(a.compute_hash(), b.compute_hash());

        b.server_tick = 1;
        assert_ne!(a.compute_hash(), b.compute_hash());
    }
}
