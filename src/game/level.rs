//! Level Catalog
//!
//! Where levels come from. The session asks for the lobby once and for
//! numbered levels as the race progresses; `Ok(None)` means the run is over.
//!
//! File layout:
//!
//! ```text
//! <dir>/_lobby.txt
//! <dir>/level_01.txt
//! <dir>/level_02.txt
//! ...
//! ```

use std::path::PathBuf;

use crate::game::world::{World, WorldError};

/// A loaded level: its source path and parsed world.
#[derive(Clone, Debug)]
pub struct Level {
    /// Path sent to clients in the load-level notice
    pub path: String,
    /// Parsed tile grid
    pub world: World,
}

/// Source of levels for a session.
pub trait LevelCatalog {
    /// Load the lobby level.
    fn lobby(&self) -> Result<Level, WorldError>;

    /// Load numbered level `n` (1-based). `Ok(None)` when it does not exist.
    fn level(&self, n: u32) -> Result<Option<Level>, WorldError>;
}

/// Path of the lobby file inside a level directory.
pub fn lobby_path(dir: &str) -> String {
    PathBuf::from(dir).join("_lobby.txt").to_string_lossy().into_owned()
}

/// Path of numbered level `n` inside a level directory.
pub fn level_path(dir: &str, n: u32) -> String {
    PathBuf::from(dir)
        .join(format!("level_{:02}.txt", n))
        .to_string_lossy()
        .into_owned()
}

// =============================================================================
// FILE CATALOG
// =============================================================================

/// Levels read from a directory on disk.
#[derive(Clone, Debug)]
pub struct FileLevels {
    dir: String,
}

impl FileLevels {
    /// Create a catalog rooted at `dir`.
    pub fn new(dir: impl Into<String>) -> Self {
        Self { dir: dir.into() }
    }

    /// Level directory.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    fn load(path: String) -> Result<Level, WorldError> {
        let text = std::fs::read_to_string(&path).map_err(|source| WorldError::Io {
            path: path.clone(),
            source,
        })?;
        let world = World::parse(&text)?;
        Ok(Level { path, world })
    }
}

impl LevelCatalog for FileLevels {
    fn lobby(&self) -> Result<Level, WorldError> {
        Self::load(lobby_path(&self.dir))
    }

    fn level(&self, n: u32) -> Result<Option<Level>, WorldError> {
        let path = level_path(&self.dir, n);
        match Self::load(path) {
            Ok(level) => Ok(Some(level)),
            Err(WorldError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// MEMORY CATALOG
// =============================================================================

/// Levels held in memory as text.
#[derive(Clone, Debug, Default)]
pub struct MemoryLevels {
    lobby: String,
    levels: Vec<String>,
}

impl MemoryLevels {
    /// Create a catalog from a lobby map and numbered maps (level 1 first).
    pub fn new(lobby: impl Into<String>, levels: Vec<String>) -> Self {
        Self {
            lobby: lobby.into(),
            levels,
        }
    }

    /// Number of numbered levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True when only the lobby exists.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl LevelCatalog for MemoryLevels {
    fn lobby(&self) -> Result<Level, WorldError> {
        Ok(Level {
            path: lobby_path("memory"),
            world: World::parse(&self.lobby)?,
        })
    }

    fn level(&self, n: u32) -> Result<Option<Level>, WorldError> {
        let Some(text) = n.checked_sub(1).and_then(|i| self.levels.get(i as usize)) else {
            return Ok(None);
        };
        Ok(Some(Level {
            path: level_path("memory", n),
            world: World::parse(text)?,
        }))
    }
}

// =============================================================================
// TESTS
// =============================================================================
