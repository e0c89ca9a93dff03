//! Tile World
//!
//! Immutable per-level tile grid parsed from a plain-text map.
//!
//! ```text
//! '0'  solid wall
//! 'E'  exit (passable, finishes the level on contact)
//! 'X'  spawn point (passable)
//! else air
//! ```
//!
//! Out-of-bounds columns are solid so nobody leaves the map sideways;
//! rows above and below the map are open.

use thiserror::Error;

use crate::core::fixed::{Fixed, WALL_SENSE_REACH, tile_origin};
use crate::core::vec2::FixedVec2;

/// Largest accepted map dimension in tiles (keeps coordinates in Q16.16 range).
pub const MAX_WORLD_TILES: usize = 1000;

// =============================================================================
// ERRORS
// =============================================================================

/// Level loading errors.
#[derive(Debug, Error)]
pub enum WorldError {
    /// The map has no rows
    #[error("level contains no tiles")]
    Empty,

    /// The map exceeds the supported size
    #[error("level is {width}x{height} tiles, limit is {MAX_WORLD_TILES} per axis")]
    TooLarge { width: usize, height: usize },

    /// The level file could not be read
    #[error("failed to read level {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// TILES
// =============================================================================

/// Tile kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Tile {
    /// Passable air (spawn markers load as air too)
    Empty = 0,
    /// Solid wall
    Solid = 1,
    /// Passable finish trigger
    Exit = 2,
}

impl Tile {
    /// Map a level-file character to a tile.
    pub fn from_char(c: char) -> Self {
        match c {
            '0' => Tile::Solid,
            'E' => Tile::Exit,
            _ => Tile::Empty,
        }
    }
}

// =============================================================================
// WORLD
// =============================================================================

/// Static tile grid for one level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct World {
    width: usize,
    height: usize,
    tiles: Vec<Tile>,
    spawn: FixedVec2,
    wall_reach: Fixed,
}

impl World {
    /// Parse a level from text.
    ///
    /// Width is the longest row; shorter rows are padded with air. The last
    /// 'X' is the spawn; without one players spawn at the origin.
    pub fn parse(text: &str) -> Result<Self, WorldError> {
        let rows: Vec<&str> = text
            .split('\n')
            .map(|row| row.strip_suffix('\r').unwrap_or(row))
            .collect();

        // A trailing newline does not add a row.
        let rows = match rows.split_last() {
            Some((last, rest)) if last.is_empty() => rest,
            _ => &rows[..],
        };

        let height = rows.len();
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);

        if width == 0 || height == 0 {
            return Err(WorldError::Empty);
        }
        if width > MAX_WORLD_TILES || height > MAX_WORLD_TILES {
            return Err(WorldError::TooLarge { width, height });
        }

        let mut tiles = vec![Tile::Empty; width * height];
        let mut spawn = FixedVec2::ZERO;

        for (ty, row) in rows.iter().enumerate() {
            for (tx, c) in row.chars().enumerate() {
                tiles[ty * width + tx] = Tile::from_char(c);
                if c == 'X' {
                    spawn = FixedVec2::new(tile_origin(tx as i32), tile_origin(ty as i32));
                }
            }
        }

        Ok(Self {
            width,
            height,
            tiles,
            spawn,
            wall_reach: WALL_SENSE_REACH,
        })
    }

    /// Width in tiles.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in tiles.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Spawn position (top-left of the spawn tile).
    #[inline]
    pub fn spawn(&self) -> FixedVec2 {
        self.spawn
    }

    /// Wall sensor reach beyond the body edge.
    #[inline]
    pub fn wall_reach(&self) -> Fixed {
        self.wall_reach
    }

    /// Override the wall sensor reach. Client and server must agree on it.
    pub fn set_wall_reach(&mut self, reach: Fixed) {
        self.wall_reach = reach.max(0);
    }

    /// Builder: override the wall sensor reach.
    pub fn with_wall_reach(mut self, reach: Fixed) -> Self {
        self.set_wall_reach(reach);
        self
    }

    /// Tile at grid coordinates. Out of bounds reads as air.
    #[inline]
    pub fn tile(&self, tx: i32, ty: i32) -> Tile {
        if tx < 0 || ty < 0 {
            return Tile::Empty;
        }
        let (x, y) = (tx as usize, ty as usize);
        if x >= self.width || y >= self.height {
            return Tile::Empty;
        }
        self.tiles[y * self.width + x]
    }

    /// Solid test used by the collision resolver.
    ///
    /// Columns outside the map are walls; rows outside are open.
    #[inline]
    pub fn is_solid(&self, tx: i32, ty: i32) -> bool {
        if tx < 0 || tx as usize >= self.width {
            return true;
        }
        self.tile(tx, ty) == Tile::Solid
    }

    /// Exit test.
    #[inline]
    pub fn is_exit(&self, tx: i32, ty: i32) -> bool {
        self.tile(tx, ty) == Tile::Exit
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::TILE_SIZE;

    #[test]
    fn test_parse_basic_map() {
        let world = World::parse("0  E\n0X \n0000\n").expect("parse");
        assert_eq!(world.width(), 4);
        assert_eq!(world.height(), 3);
        assert!(world.is_solid(0, 0));
        assert!(!world.is_solid(1, 0));
        assert!(world.is_exit(3, 0));
        assert!(!world.is_solid(3, 0));
        assert_eq!(world.spawn(), FixedVec2::new(TILE_SIZE, TILE_SIZE));
    }

    #[test]
    fn test_short_rows_pad_with_air() {
        let world = World::parse("0\n000\r\n").expect("parse");
        assert_eq!(world.width(), 3);
        assert_eq!(world.tile(2, 0), Tile::Empty);
        assert!(world.is_solid(2, 1));
    }

    #[test]
    fn test_bounds() {
        let world = World::parse("   \n   ").expect("parse");
        // Sides are walls.
        assert!(world.is_solid(-1, 0));
        assert!(world.is_solid(3, 1));
        // Above and below are open.
        assert!(!world.is_solid(1, -1));
        assert!(!world.is_solid(1, 2));
    }

    #[test]
    fn test_last_spawn_wins_and_default_spawn() {
        let world = World::parse("X  \n  X").expect("parse");
        assert_eq!(world.spawn(), FixedVec2::new(2 * TILE_SIZE, TILE_SIZE));

        let world = World::parse("000").expect("parse");
        assert_eq!(world.spawn(), FixedVec2::ZERO);
    }

    #[test]
    fn test_empty_and_oversized_rejected() {
        assert!(matches!(World::parse(""), Err(WorldError::Empty)));
        assert!(matches!(World::parse("\n\n"), Err(WorldError::Empty)));

        let wide = "0".repeat(MAX_WORLD_TILES + 1);
        assert!(matches!(World::parse(&wide), Err(WorldError::TooLarge { .. })));
    }

    #[test]
    fn test_wall_reach_setting() {
        let world = World::parse("0").expect("parse").with_wall_reach(-5);
        assert_eq!(world.wall_reach(), 0);
        let world = World::parse("0").expect("parse");
        assert_eq!(world.wall_reach(), WALL_SENSE_REACH);
    }
}
