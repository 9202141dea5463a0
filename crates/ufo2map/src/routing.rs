// routing.rs -- Floor and connection scan of the world model
//
// Every (actor size, x, y) column of the grid is scanned top down for
// floors, then every (actor size, x, y, direction) column for moves to the
// neighbor cell. Columns are independent, so both passes run on rayon with
// one trace scratch buffer per worker.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::ops::RangeInclusive;
use std::path::Path;

use log::{info, trace};
use rayon::prelude::*;
use ufo2map_common::bspfile::BspData;
use ufo2map_common::cmodel::{TraceModel, TraceScratch};
use ufo2map_common::q_shared::{ContentFlags, Trace, Vec3};
use ufo2map_common::qfiles::MAX_MAP_ROUTING;
use ufo2map_common::routing::{
    pack_routing, pos_to_vec, vec_to_pos, Pos3, RoutingGrid, ACTOR_MAX_SIZE, CELL_HEIGHT, CORE_DIRECTIONS, DVECS,
    NO_FLOOR, PATHFINDING_HEIGHT, PATHFINDING_MAX_FALL, PATHFINDING_MAX_STEPUP, PATHFINDING_MIN_OPENING, QUANT,
    ROUTE_BLOCKED, UNIT_HEIGHT, UNIT_SIZE,
};

use crate::config::CompileConfig;
use crate::error::{check_capacity, Result};
use crate::stats::Stats;

/// Gap between the footprint box and the cell border.
const FOOTPRINT_MARGIN: f32 = 4.0;
const MAX_CEILING: i32 = u8::MAX as i32;

const H: usize = PATHFINDING_HEIGHT;

fn clear(floor: &mut [i8], ceil: &mut [u8], levels: RangeInclusive<usize>) {
    for l in levels {
        floor[l] = NO_FLOOR;
        ceil[l] = 0;
    }
}

/// Scans columns of the grid against the compiled world.
pub struct RoutingScanner<'a> {
    model: &'a TraceModel,
    headnode: i32,
    /// Scanned cells, inclusive.
    pub mins: Pos3,
    pub maxs: Pos3,
}

impl<'a> RoutingScanner<'a> {
    /// Scanner for the tree at `headnode`, limited to the cells touched by
    /// the world bounds `map_mins..map_maxs`.
    pub fn new(model: &'a TraceModel, headnode: i32, map_mins: &Vec3, map_maxs: &Vec3) -> Self {
        let mins = vec_to_pos(map_mins);
        // the max bounds lie on a cell boundary and belong to the cell below
        let maxs = vec_to_pos(&[map_maxs[0] - 1.0, map_maxs[1] - 1.0, map_maxs[2] - 1.0]);
        Self { model, headnode, mins, maxs }
    }

    /// True if a `size` actor standing at `(x, y)` stays inside the bounds.
    pub fn in_bounds(&self, size: usize, x: i32, y: i32) -> bool {
        let reach = size as i32 - 1;
        x >= self.mins[0] && y >= self.mins[1] && x + reach <= self.maxs[0] && y + reach <= self.maxs[1]
    }

    fn footprint(size: usize, height: f32) -> (Vec3, Vec3) {
        let half = size as f32 * UNIT_SIZE as f32 / 2.0 - FOOTPRINT_MARGIN;
        ([-half, -half, 0.0], [half, half, height])
    }

    /// Horizontal center of the footprint of a `size` actor at `(x, y)`.
    fn center(size: usize, x: i32, y: i32) -> (f32, f32) {
        let corner = pos_to_vec(&[x, y, 0]);
        let half = size as f32 * UNIT_SIZE as f32 / 2.0;
        (corner[0] + half, corner[1] + half)
    }

    fn trace(&self, scratch: &mut TraceScratch, start: &Vec3, end: &Vec3, mins: &Vec3, maxs: &Vec3) -> Trace {
        self.model.box_trace(scratch, start, end, mins, maxs, self.headnode, ContentFlags::MASK_ROUTING)
    }

    /// Find the floor for level `z` of a column, looking down from the top
    /// of the level. Levels passed on the way down are cleared. Returns the
    /// level the floor was found on (or the lowest level cleared), so the
    /// caller continues below it.
    pub fn scan_floor(
        &self,
        scratch: &mut TraceScratch,
        size: usize,
        x: i32,
        y: i32,
        z: usize,
        floor: &mut [i8],
        ceil: &mut [u8],
    ) -> usize {
        let (cx, cy) = Self::center(size, x, y);
        let (bmins, bmaxs) = Self::footprint(size, 0.0);
        let bottom = (z as i32 * UNIT_HEIGHT) as f32;
        let mut start = [cx, cy, bottom + UNIT_HEIGHT as f32 - 1.0];

        // move out of any solid first
        while start[2] >= bottom {
            let tr = self.trace(scratch, &start, &start, &bmins, &bmaxs);
            if !tr.startsolid && !tr.allsolid {
                break;
            }
            start[2] -= QUANT as f32;
        }
        if start[2] < bottom {
            clear(floor, ceil, z..=z);
            return z;
        }

        let end = [cx, cy, -(UNIT_HEIGHT as f32)];
        let down = self.trace(scratch, &start, &end, &bmins, &bmaxs);
        let q = (down.endpos[2] / QUANT as f32).floor() as i32;
        if down.fraction >= 1.0 || q < 0 {
            clear(floor, ceil, 0..=z);
            return 0;
        }

        let fz = ((q / CELL_HEIGHT) as usize).min(z);
        if fz < z {
            clear(floor, ceil, fz + 1..=z);
        }

        let up_end = [cx, cy, down.endpos[2] + (MAX_CEILING * QUANT) as f32];
        let up = self.trace(scratch, &down.endpos, &up_end, &bmins, &bmaxs);
        let ceiling = if up.fraction >= 1.0 {
            MAX_CEILING
        } else {
            (((up.endpos[2] - down.endpos[2]) / QUANT as f32).floor() as i32).clamp(0, MAX_CEILING)
        };

        if ceiling < PATHFINDING_MIN_OPENING {
            clear(floor, ceil, fz..=fz);
        } else {
            floor[fz] = (q - fz as i32 * CELL_HEIGHT) as i8;
            ceil[fz] = ceiling as u8;
            trace!("size {size} ({x} {y} {fz}): floor {} ceiling {ceiling}", floor[fz]);
        }
        fz
    }

    /// All levels of a column, top down.
    pub fn scan_column(&self, scratch: &mut TraceScratch, size: usize, x: i32, y: i32, floor: &mut [i8], ceil: &mut [u8]) {
        let mut z = H as i32 - 1;
        while z >= 0 {
            let found = self.scan_floor(scratch, size, x, y, z as usize, floor, ceil);
            z = found as i32 - 1;
        }
    }

    /// Moves from every floor of the column at `(x, y)` to the neighbor
    /// in direction `dir`: the height change in quants, or ROUTE_BLOCKED.
    pub fn scan_connections(
        &self,
        scratch: &mut TraceScratch,
        grid: &RoutingGrid,
        size: usize,
        x: i32,
        y: i32,
        dir: usize,
        route: &mut [i8],
    ) {
        route.fill(ROUTE_BLOCKED);
        let [dx, dy] = DVECS[dir];
        let (nx, ny) = (x + dx, y + dy);
        if !self.in_bounds(size, nx, ny) {
            return;
        }
        let (ux, uy, unx, uny) = (x as usize, y as usize, nx as usize, ny as usize);

        let (sx, sy) = Self::center(size, x, y);
        let (ex, ey) = Self::center(size, nx, ny);
        let opening = (PATHFINDING_MIN_OPENING * QUANT) as f32 - 1.0;
        let (bmins, bmaxs) = Self::footprint(size, opening);

        for z in 0..H {
            let Some(h) = grid.floor_height(size, ux, uy, z) else { continue };

            // the closest reachable floor next door
            let lo = z.saturating_sub(1);
            let hi = (z + 1).min(H - 1);
            let best = (lo..=hi)
                .filter_map(|nz| grid.floor_height(size, unx, uny, nz).map(|nh| (nz, nh - h)))
                .filter(|&(_, delta)| (-PATHFINDING_MAX_FALL..=PATHFINDING_MAX_STEPUP).contains(&delta))
                .min_by_key(|&(_, delta)| delta.abs());
            let Some((nz, delta)) = best else { continue };

            let nh = h + delta;
            let top = h.max(nh) + PATHFINDING_MIN_OPENING;
            if h + (grid.get_ceiling(size, ux, uy, z) as i32) < top
                || nh + (grid.get_ceiling(size, unx, uny, nz) as i32) < top
            {
                continue;
            }

            let base = (h.max(nh) * QUANT) as f32 + 1.0;
            let tr = self.trace(scratch, &[sx, sy, base], &[ex, ey, base], &bmins, &bmaxs);
            if tr.startsolid || tr.fraction < 1.0 {
                continue;
            }
            route[z] = delta as i8;
        }
    }
}

/// Pull each x/y side of the bounds in while its outermost row has no
/// floor for any actor size.
pub fn shrink_bounds(grid: &RoutingGrid, mins: &mut Pos3, maxs: &mut Pos3) {
    let row_has_floor = |i: usize, fixed: i32, mins: &Pos3, maxs: &Pos3| {
        (mins[i]..=maxs[i]).any(|v| {
            let (x, y) = if i == 0 { (v, fixed) } else { (fixed, v) };
            grid.column_has_floor(x as usize, y as usize)
        })
    };

    for i in 0..2 {
        let j = i ^ 1;
        while maxs[j] > mins[j] && !row_has_floor(i, mins[j], mins, maxs) {
            mins[j] += 1;
        }
        while maxs[j] > mins[j] && !row_has_floor(i, maxs[j], mins, maxs) {
            maxs[j] -= 1;
        }
    }
}

fn write_trace_file(path: &Path, grid: &RoutingGrid, mins: &Pos3, maxs: &Pos3) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "size,x,y,z,floor,ceil,r0,r1,r2,r3,r4,r5,r6,r7")?;
    for size in 1..=ACTOR_MAX_SIZE {
        for x in mins[0]..=maxs[0] {
            for y in mins[1]..=maxs[1] {
                let (x, y) = (x as usize, y as usize);
                for z in 0..H {
                    let f = grid.get_floor(size, x, y, z);
                    if f == NO_FLOOR {
                        continue;
                    }
                    write!(out, "{size},{x},{y},{z},{f},{}", grid.get_ceiling(size, x, y, z))?;
                    for dir in 0..CORE_DIRECTIONS {
                        write!(out, ",{}", grid.get_route(size, x, y, dir, z))?;
                    }
                    writeln!(out)?;
                }
            }
        }
    }
    out.flush()
}

fn scan(scanner: &RoutingScanner, model: &TraceModel) -> RoutingGrid {
    let mut grid = RoutingGrid::new();

    grid.floor
        .par_chunks_mut(H)
        .zip(grid.ceil.par_chunks_mut(H))
        .enumerate()
        .for_each_init(
            || model.scratch(),
            |scratch, (column, (floor, ceil))| {
                let (size, x, y) = RoutingGrid::column_coords(column);
                let (x, y) = (x as i32, y as i32);
                if scanner.in_bounds(size, x, y) {
                    scanner.scan_column(scratch, size, x, y, floor, ceil);
                }
            },
        );

    let mut route = vec![ROUTE_BLOCKED; grid.route.len()];
    route.par_chunks_mut(H).enumerate().for_each_init(
        || model.scratch(),
        |scratch, (chunk, route)| {
            let (size, x, y) = RoutingGrid::column_coords(chunk / CORE_DIRECTIONS);
            let (x, y) = (x as i32, y as i32);
            if scanner.in_bounds(size, x, y) {
                scanner.scan_connections(scratch, &grid, size, x, y, chunk % CORE_DIRECTIONS, route);
            }
        },
    );
    grid.route = route;
    grid
}

/// Scan the world model of `bsp` and return the routing lump. The grid
/// is limited to the world bounds `map_mins..map_maxs`. When `trace_path`
/// is set the scan result is also dumped there as CSV.
pub fn do_routing(
    bsp: &BspData,
    map_mins: &Vec3,
    map_maxs: &Vec3,
    config: &CompileConfig,
    trace_path: Option<&Path>,
    stats: &mut Stats,
) -> Result<Vec<u8>> {
    info!("--- Routing ---");
    let model = TraceModel::from_bsp(bsp);
    let headnode = bsp.models.first().map_or(0, |m| m.headnode);
    let scanner = RoutingScanner::new(&model, headnode, map_mins, map_maxs);

    let grid = if config.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(config.threads).build()?;
        pool.install(|| scan(&scanner, &model))
    } else {
        scan(&scanner, &model)
    };

    let (mut mins, mut maxs) = (scanner.mins, scanner.maxs);
    shrink_bounds(&grid, &mut mins, &mut maxs);
    info!("routing bounds ({} {} {}) to ({} {} {})", mins[0], mins[1], mins[2], maxs[0], maxs[1], maxs[2]);

    let floors = grid.floor.iter().filter(|&&f| f != NO_FLOOR).count();
    let moves = grid.route.iter().filter(|&&r| r != ROUTE_BLOCKED).count();
    stats.floor_cells += floors;
    stats.open_connections += moves;
    info!("{:5} floor cells", floors);
    info!("{:5} open connections", moves);

    if let Some(path) = trace_path {
        info!("writing {}", path.display());
        write_trace_file(path, &grid, &mins, &maxs)?;
    }

    let data = pack_routing(&grid, &mins, &maxs);
    check_capacity("routing data", data.len(), MAX_MAP_ROUTING + 1)?;
    Ok(data)
}
