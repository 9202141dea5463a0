// qbsp.rs -- Compilation driver
//
// Runs every model of a parsed map through the geometry pipeline, scans the
// world for routing and hands the finished lumps to the bsp writer.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use ufo2map_common::bspfile::BspData;
use ufo2map_common::q_shared::{Vec3, MAX_WORLD_WIDTH};
use ufo2map_common::routing::{PATHFINDING_HEIGHT, UNIT_HEIGHT, UNIT_SIZE};

use crate::brushbsp::{brush_bsp, make_bsp_brush_list};
use crate::config::CompileConfig;
use crate::error::{CompileError, Result};
use crate::faces::{fix_tjuncs, make_faces};
use crate::map::MapData;
use crate::portals::{make_tree_portals, mark_visible_sides};
use crate::routing::do_routing;
use crate::stats::Stats;
use crate::tree::Tree;
use crate::writebsp::{set_model_numbers, BspWriter};

/// Portals, faces and emission for a finished tree of the brushes
/// `start..end`.
fn finish_model(
    map: &mut MapData,
    writer: &mut BspWriter,
    mut tree: Tree,
    (start, end): (usize, usize),
    prune: bool,
    config: &CompileConfig,
    stats: &mut Stats,
) -> Result<i32> {
    make_tree_portals(&mut tree, &map.planes, stats);
    mark_visible_sides(&mut tree, &mut map.brushes, &map.planes, start, end);
    make_faces(&mut tree, &map.brushes, &map.planes, &map.texinfo, config, stats)?;
    if prune {
        tree.prune_nodes(stats)?;
    }
    fix_tjuncs(&mut tree, &mut writer.bsp.vertexes, config, stats)?;
    let headnode = writer.write_tree(&mut tree, stats)?;
    writer.end_model();
    Ok(headnode)
}

/// The world volume: exact brush bounds, raised to the top of the routing
/// grid so every level above the geometry is open.
fn world_volume(map: &MapData) -> (Vec3, Vec3) {
    let (mut mins, mut maxs) = (map.map_mins, map.map_maxs);
    if mins[0] > maxs[0] {
        warn!("world has no brushes");
        mins = [0.0; 3];
        maxs = [UNIT_SIZE as f32, UNIT_SIZE as f32, 0.0];
    }
    maxs[2] = maxs[2].max((PATHFINDING_HEIGHT as i32 * UNIT_HEIGHT) as f32);
    (mins, maxs)
}

fn process_world_model(map: &mut MapData, writer: &mut BspWriter, config: &CompileConfig, stats: &mut Stats) -> Result<()> {
    let Some(world) = map.entities.first() else {
        return Ok(());
    };
    let range = (world.firstbrush, world.firstbrush + world.numbrushes);
    debug!("world model: brushes {}..{}", range.0, range.1);
    writer.begin_model(world, &map.brushes)?;

    let (mins, maxs) = world_volume(map);
    let list = make_bsp_brush_list(&map.brushes, range.0, range.1, &mins, &maxs);
    let tree = brush_bsp(&mut map.planes, list, &mins, &maxs, stats)?;
    finish_model(map, writer, tree, range, !config.noprune, config, stats)?;
    Ok(())
}

fn process_sub_model(
    map: &mut MapData,
    entitynum: usize,
    writer: &mut BspWriter,
    config: &CompileConfig,
    stats: &mut Stats,
) -> Result<()> {
    let e = &map.entities[entitynum];
    let range = (e.firstbrush, e.firstbrush + e.numbrushes);
    debug!("model {} ({}): brushes {}..{}", e.value_for_key("model"), e.classname(), range.0, range.1);

    for b in &map.brushes[range.0..range.1] {
        if let Some(axis) = (0..3).find(|&i| b.mins[i] < -MAX_WORLD_WIDTH || b.maxs[i] > MAX_WORLD_WIDTH) {
            let mut at = [0.0; 3];
            at[axis] = if b.mins[axis] < -MAX_WORLD_WIDTH { b.mins[axis] } else { b.maxs[axis] };
            return Err(CompileError::SubmodelBounds(at));
        }
    }
    writer.begin_model(e, &map.brushes)?;

    let mins = [-MAX_WORLD_WIDTH; 3];
    let maxs = [MAX_WORLD_WIDTH; 3];
    let list = make_bsp_brush_list(&map.brushes, range.0, range.1, &mins, &maxs);
    let tree = brush_bsp(&mut map.planes, list, &mins, &maxs, stats)?;
    if tree.nodes[tree.headnode].planenum.is_none() {
        return Err(CompileError::NoHeadNode { classname: map.entities[entitynum].classname().to_string() });
    }
    finish_model(map, writer, tree, range, false, config, stats)?;
    Ok(())
}

/// Compile a parsed map. With `trace_path` set the routing scan is also
/// dumped there.
pub fn compile(mut map: MapData, config: &CompileConfig, trace_path: Option<&Path>, stats: &mut Stats) -> Result<BspData> {
    let mut writer = BspWriter::new(config);
    set_model_numbers(&mut map.entities);

    process_world_model(&mut map, &mut writer, config, stats)?;

    // routing traces against the brushes of the finished world model
    writer.emit_brushes(&map.brushes, &mut map.planes)?;
    writer.emit_planes(&map.planes)?;
    writer.bsp.routedata = if config.noroute {
        info!("skipping routing");
        Vec::new()
    } else {
        do_routing(&writer.bsp, &map.map_mins, &map.map_maxs, config, trace_path, stats)?
    };

    for entitynum in 1..map.entities.len() {
        if map.entities[entitynum].numbrushes > 0 {
            process_sub_model(&mut map, entitynum, &mut writer, config, stats)?;
        }
    }

    writer.emit_brushes(&map.brushes, &mut map.planes)?;
    writer.emit_planes(&map.planes)?;
    writer.emit_texinfo(&map.texinfo)?;
    writer.emit_entities(&map.entities)?;
    stats.planes = map.planes.len();
    Ok(writer.finish())
}

/// Parse and compile map text.
pub fn compile_text(text: &str, config: &CompileConfig, stats: &mut Stats) -> Result<BspData> {
    let map = MapData::parse(text, config, stats)?;
    compile(map, config, None, stats)
}

/// Where `compile_map` writes the result for `map_path`.
pub fn bsp_path(map_path: &Path) -> PathBuf {
    map_path.with_extension("bsp")
}

fn is_up_to_date(source: &Path, target: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    matches!((modified(source), modified(target)), (Some(s), Some(t)) if t >= s)
}

/// Compile the map file at `path` into `<map>.bsp` next to it. Returns
/// the statistics, or None when `onlynewer` found the output up to date.
pub fn compile_map(path: &Path, config: &CompileConfig) -> Result<Option<Stats>> {
    let out = bsp_path(path);
    if config.onlynewer && is_up_to_date(path, &out) {
        info!("{} is up to date", out.display());
        return Ok(None);
    }

    info!("Loading {}", path.display());
    let mut stats = Stats::default();
    let map = MapData::load_map_file(path, config, &mut stats)?;
    let trace_path = config.debugtrace.then(|| path.with_extension("route.csv"));
    let bsp = compile(map, config, trace_path.as_deref(), &mut stats)?;

    bsp.write_bsp_file(&out)?;
    for line in bsp.file_sizes() {
        debug!("{line}");
    }
    stats.log();
    Ok(Some(stats))
}
