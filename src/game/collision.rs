//! Collision Detection
//!
//! Discrete per-axis resolution of a 32x32 body against the tile grid.
//! Every function here is a pure function of (position, movement sign,
//! world). The body is addressed by its top-left corner.
//!
//! Horizontal checks ignore a 2 unit band at the top and bottom of the body
//! and vertical checks a 1 unit band at the sides, so a body sliding along
//! a floor does not snag on the next column and a body hugging a wall can
//! still land.

use crate::core::fixed::{
    Fixed, TILE_SIZE, RESOLVE_INSET_X, RESOLVE_INSET_Y,
    tile_index, tile_origin,
};
use crate::core::vec2::FixedVec2;
use crate::game::world::World;

/// Result of resolving one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisResolve {
    /// Corrected coordinate on the resolved axis
    pub coord: Fixed,
    /// A solid tile was hit and the coordinate snapped
    pub hit: bool,
}

impl AxisResolve {
    #[inline]
    fn clear(coord: Fixed) -> Self {
        Self { coord, hit: false }
    }

    #[inline]
    fn snapped(coord: Fixed) -> Self {
        Self { coord, hit: true }
    }
}

/// Wall contact flags from the wall sensors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WallContact {
    pub left: bool,
    pub right: bool,
}

// =============================================================================
// SPANS
// =============================================================================

/// Tile rows covered by the body for horizontal checks (inclusive).
#[inline]
fn x_rows(y: Fixed) -> (i32, i32) {
    (
        tile_index(y.saturating_add(RESOLVE_INSET_X)),
        tile_index(y.saturating_add(TILE_SIZE - RESOLVE_INSET_X - 1)),
    )
}

/// Tile columns covered by the body for vertical checks (inclusive).
#[inline]
fn y_columns(x: Fixed) -> (i32, i32) {
    (
        tile_index(x.saturating_add(RESOLVE_INSET_Y)),
        tile_index(x.saturating_add(TILE_SIZE - RESOLVE_INSET_Y - 1)),
    )
}

#[inline]
fn column_blocked(world: &World, tx: i32, rows: (i32, i32)) -> bool {
    (rows.0..=rows.1).any(|ty| world.is_solid(tx, ty))
}

#[inline]
fn row_blocked(world: &World, ty: i32, columns: (i32, i32)) -> bool {
    (columns.0..=columns.1).any(|tx| world.is_solid(tx, ty))
}

// =============================================================================
// AXIS RESOLUTION
// =============================================================================

/// Resolve a body that has just moved horizontally by `dx`.
///
/// Only the column entered by the leading edge is scanned. On a hit the
/// body snaps flush against the tile.
pub fn resolve_x(world: &World, pos: FixedVec2, dx: Fixed) -> AxisResolve {
    let rows = x_rows(pos.y);

    if dx > 0 {
        let tx = tile_index(pos.x.saturating_add(TILE_SIZE - 1));
        if column_blocked(world, tx, rows) {
            return AxisResolve::snapped(tile_origin(tx) - TILE_SIZE);
        }
    } else if dx < 0 {
        let tx = tile_index(pos.x);
        if column_blocked(world, tx, rows) {
            return AxisResolve::snapped(tile_origin(tx + 1));
        }
    }

    AxisResolve::clear(pos.x)
}

/// Resolve a body that has just moved vertically by `dy`.
///
/// Moving down snaps the feet onto the tile top (a landing); moving up
/// snaps the head under the tile bottom.
pub fn resolve_y(world: &World, pos: FixedVec2, dy: Fixed) -> AxisResolve {
    let columns = y_columns(pos.x);

    if dy > 0 {
        let ty = tile_index(pos.y.saturating_add(TILE_SIZE - 1));
        if row_blocked(world, ty, columns) {
            return AxisResolve::snapped(tile_origin(ty) - TILE_SIZE);
        }
    } else if dy < 0 {
        let ty = tile_index(pos.y);
        if row_blocked(world, ty, columns) {
            return AxisResolve::snapped(tile_origin(ty + 1));
        }
    }

    AxisResolve::clear(pos.y)
}

// =============================================================================
// SENSORS
// =============================================================================

/// True when the row directly under the feet is solid.
pub fn has_support(world: &World, pos: FixedVec2) -> bool {
    let ty = tile_index(pos.y.saturating_add(TILE_SIZE));
    row_blocked(world, ty, y_columns(pos.x))
}

/// Wall contact within the world's sensor reach on either side.
pub fn sense_walls(world: &World, pos: FixedVec2) -> WallContact {
    let rows = x_rows(pos.y);
    let reach = world.wall_reach();

    let right_tx = tile_index(pos.x.saturating_add(TILE_SIZE).saturating_add(reach));
    let left_tx = tile_index(pos.x.saturating_sub(reach).saturating_sub(1));

    WallContact {
        left: column_blocked(world, left_tx, rows),
        right: column_blocked(world, right_tx, rows),
    }
}

/// True when any corner of the body lies on an exit tile.
pub fn touches_exit(world: &World, pos: FixedVec2) -> bool {
    let left = tile_index(pos.x);
    let right = tile_index(pos.x.saturating_add(TILE_SIZE - 1));
    let top = tile_index(pos.y);
    let bottom = tile_index(pos.y.saturating_add(TILE_SIZE - 1));

    world.is_exit(left, top)
        || world.is_exit(right, top)
        || world.is_exit(left, bottom)
        || world.is_exit(right, bottom)
}

// =============================================================================
// TESTS
// =============================================================================
