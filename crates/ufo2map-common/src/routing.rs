// routing.rs -- Routing grid layout, constants and lump packing
//
// The grid covers the whole addressable world in UNIT_SIZE columns and
// PATHFINDING_HEIGHT levels of UNIT_HEIGHT each. Heights inside the grid
// are stored in QUANT steps, so one level is CELL_HEIGHT quants tall.

use byteorder::{ByteOrder, LittleEndian};

use crate::compression::{compress_routing, decompress_routing};
use crate::q_shared::{Vec3, MAX_WORLD_WIDTH};

// ============================================================
// Grid constants
// ============================================================

pub const UNIT_SIZE: i32 = 32;
pub const UNIT_HEIGHT: i32 = 64;
pub const QUANT: i32 = 4;
pub const CELL_HEIGHT: i32 = UNIT_HEIGHT / QUANT;

/// Columns along x and y, spanning -MAX_WORLD_WIDTH..MAX_WORLD_WIDTH.
pub const PATHFINDING_WIDTH: usize = 2 * 4096 / UNIT_SIZE as usize;
pub const PATHFINDING_HEIGHT: usize = 8;

/// Actor footprints are 1x1 and 2x2 cells.
pub const ACTOR_MAX_SIZE: usize = 2;

/// Free height an actor needs above a floor, in quants.
pub const PATHFINDING_MIN_OPENING: i32 = 6;
/// Highest step an actor climbs without help, in quants.
pub const PATHFINDING_MAX_STEPUP: i32 = 4;
/// Deepest drop an actor takes when moving to a neighbor, in quants.
pub const PATHFINDING_MAX_FALL: i32 = 16;

pub const NO_FLOOR: i8 = -1;
pub const ROUTE_BLOCKED: i8 = i8::MIN;

pub const CORE_DIRECTIONS: usize = 8;

/// Horizontal step for each direction: four straight moves, then four
/// diagonals.
pub const DVECS: [[i32; 2]; CORE_DIRECTIONS] = [
    [1, 0],
    [-1, 0],
    [0, 1],
    [0, -1],
    [1, 1],
    [-1, -1],
    [-1, 1],
    [1, -1],
];

// ============================================================
// Position helpers
// ============================================================

pub type Pos3 = [i32; 3];

/// Grid cell containing a world point, clamped to the grid.
pub fn vec_to_pos(v: &Vec3) -> Pos3 {
    let w = PATHFINDING_WIDTH as i32 - 1;
    let h = PATHFINDING_HEIGHT as i32 - 1;
    [
        (((v[0] + MAX_WORLD_WIDTH) / UNIT_SIZE as f32).floor() as i32).clamp(0, w),
        (((v[1] + MAX_WORLD_WIDTH) / UNIT_SIZE as f32).floor() as i32).clamp(0, w),
        ((v[2] / UNIT_HEIGHT as f32).floor() as i32).clamp(0, h),
    ]
}

/// World coordinates of a cell's lower corner.
pub fn pos_to_vec(pos: &Pos3) -> Vec3 {
    [
        (pos[0] * UNIT_SIZE) as f32 - MAX_WORLD_WIDTH,
        (pos[1] * UNIT_SIZE) as f32 - MAX_WORLD_WIDTH,
        (pos[2] * UNIT_HEIGHT) as f32,
    ]
}

// ============================================================
// Grid storage
// ============================================================

/// Floor, ceiling and connection tables for every actor size.
///
/// Floors and ceilings are laid out `[size][x][y][z]`, connections
/// `[size][x][y][dir][z]`, so every `(size, x, y)` column and every
/// `(size, x, y, dir)` column is a contiguous run of PATHFINDING_HEIGHT
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingGrid {
    pub floor: Vec<i8>,
    pub ceil: Vec<u8>,
    pub route: Vec<i8>,
}

const COLUMNS: usize = ACTOR_MAX_SIZE * PATHFINDING_WIDTH * PATHFINDING_WIDTH;

impl Default for RoutingGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingGrid {
    /// Everything unscanned: no floors, no ceilings, all moves blocked.
    pub fn new() -> Self {
        Self {
            floor: vec![NO_FLOOR; COLUMNS * PATHFINDING_HEIGHT],
            ceil: vec![0; COLUMNS * PATHFINDING_HEIGHT],
            route: vec![ROUTE_BLOCKED; COLUMNS * CORE_DIRECTIONS * PATHFINDING_HEIGHT],
        }
    }

    /// Index of the floor column for a 1-based actor size.
    pub fn column(actor_size: usize, x: usize, y: usize) -> usize {
        ((actor_size - 1) * PATHFINDING_WIDTH + x) * PATHFINDING_WIDTH + y
    }

    /// Inverse of `column`: `(actor_size, x, y)`.
    pub fn column_coords(column: usize) -> (usize, usize, usize) {
        let y = column % PATHFINDING_WIDTH;
        let x = (column / PATHFINDING_WIDTH) % PATHFINDING_WIDTH;
        let size = column / PATHFINDING_WIDTH / PATHFINDING_WIDTH + 1;
        (size, x, y)
    }

    pub fn cell_index(actor_size: usize, x: usize, y: usize, z: usize) -> usize {
        Self::column(actor_size, x, y) * PATHFINDING_HEIGHT + z
    }

    pub fn route_index(actor_size: usize, x: usize, y: usize, dir: usize, z: usize) -> usize {
        (Self::column(actor_size, x, y) * CORE_DIRECTIONS + dir) * PATHFINDING_HEIGHT + z
    }

    pub fn get_floor(&self, actor_size: usize, x: usize, y: usize, z: usize) -> i8 {
        self.floor[Self::cell_index(actor_size, x, y, z)]
    }

    pub fn get_ceiling(&self, actor_size: usize, x: usize, y: usize, z: usize) -> u8 {
        self.ceil[Self::cell_index(actor_size, x, y, z)]
    }

    pub fn get_route(&self, actor_size: usize, x: usize, y: usize, dir: usize, z: usize) -> i8 {
        self.route[Self::route_index(actor_size, x, y, dir, z)]
    }

    /// Absolute floor height in quants, or None if the cell has no floor.
    pub fn floor_height(&self, actor_size: usize, x: usize, y: usize, z: usize) -> Option<i32> {
        let f = self.get_floor(actor_size, x, y, z);
        (f != NO_FLOOR).then(|| z as i32 * CELL_HEIGHT + f as i32)
    }

    /// True if any level of the column has a floor for any actor size.
    pub fn column_has_floor(&self, x: usize, y: usize) -> bool {
        (1..=ACTOR_MAX_SIZE).any(|size| {
            let base = Self::cell_index(size, x, y, 0);
            self.floor[base..base + PATHFINDING_HEIGHT].iter().any(|&f| f != NO_FLOOR)
        })
    }

    /// Raw bytes in storage order: floors, ceilings, connections.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.floor.len() + self.ceil.len() + self.route.len());
        out.extend(self.floor.iter().map(|&f| f as u8));
        out.extend_from_slice(&self.ceil);
        out.extend(self.route.iter().map(|&r| r as u8));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let cells = COLUMNS * PATHFINDING_HEIGHT;
        let routes = COLUMNS * CORE_DIRECTIONS * PATHFINDING_HEIGHT;
        if bytes.len() != cells * 2 + routes {
            return None;
        }
        Some(Self {
            floor: bytes[..cells].iter().map(|&b| b as i8).collect(),
            ceil: bytes[cells..cells * 2].to_vec(),
            route: bytes[cells * 2..].iter().map(|&b| b as i8).collect(),
        })
    }
}

// ============================================================
// Lump packing
// ============================================================

fn pos_bytes(pos: &Pos3) -> [u8; 12] {
    let mut buf = [0u8; 12];
    LittleEndian::write_i32_into(pos, &mut buf);
    buf
}

/// Routing lump contents: packed mins, packed maxs, packed grid.
pub fn pack_routing(grid: &RoutingGrid, mins: &Pos3, maxs: &Pos3) -> Vec<u8> {
    let mut out = Vec::new();
    compress_routing(&pos_bytes(mins), &mut out);
    compress_routing(&pos_bytes(maxs), &mut out);
    compress_routing(&grid.to_bytes(), &mut out);
    out
}

/// Inverse of `pack_routing`; None if the lump is damaged.
pub fn unpack_routing(data: &[u8]) -> Option<(RoutingGrid, Pos3, Pos3)> {
    let mut rest = data;
    let mut bounds = [[0i32; 3]; 2];
    for b in bounds.iter_mut() {
        let (bytes, used) = decompress_routing(rest)?;
        if bytes.len() != 12 {
            return None;
        }
        LittleEndian::read_i32_into(&bytes, b);
        rest = &rest[used..];
    }
    let (bytes, _) = decompress_routing(rest)?;
    let grid = RoutingGrid::from_bytes(&bytes)?;
    Some((grid, bounds[0], bounds[1]))
}

// =============================================================================
// Tests
// =============================================================================
