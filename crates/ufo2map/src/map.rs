// map.rs -- Map file parsing into entities and brushes
//
// Parsing runs in two passes. The first reads the text into raw entities
// holding the plane points of every side. The second finds each entity's
// origin, then builds planes, texinfo, windings and bevels from points
// already moved by that origin.

use std::fs;
use std::path::Path;

use log::{debug, error, info, warn};
use ufo2map_common::q_shared::{
    add_point_to_bounds, clear_bounds, vector_subtract, ContentFlags, SurfaceFlags, Vec3,
    MAX_WORLD_WIDTH, VEC3_ORIGIN,
};
use ufo2map_common::qfiles::{
    TexInfo, MAX_MAP_BRUSHES, MAX_MAP_ENTITIES, MAX_MAP_ENTSTRING, MAX_MAP_SIDES,
};

use crate::brush::{MapBrush, Side};
use crate::config::CompileConfig;
use crate::error::{check_capacity, CompileError, Result};
use crate::planes::PlaneRegistry;
use crate::scriplib::Script;
use crate::stats::Stats;
use crate::textures::{find_material, texinfo_for_brush_texture, BrushTexture};

const MAX_KEY: usize = 32;
const MAX_VALUE: usize = 1024;

/// Contents bits that make a side visible on their own.
const VISIBLE_CONTENTS: i32 = 0x7f;

// ============================================================
// Entities
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub epairs: Vec<(String, String)>,
    pub origin: Vec3,
    pub firstbrush: usize,
    pub numbrushes: usize,
}

impl Entity {
    /// Value for `key`, empty if unset.
    pub fn value_for_key(&self, key: &str) -> &str {
        self.epairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn set_key_value(&mut self, key: &str, value: &str) {
        match self.epairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value.to_string(),
            None => self.epairs.push((key.to_string(), value.to_string())),
        }
    }

    /// Three whitespace separated numbers; missing ones read as 0.
    pub fn vector_for_key(&self, key: &str) -> Vec3 {
        let mut v = VEC3_ORIGIN;
        for (c, tok) in v.iter_mut().zip(self.value_for_key(key).split_whitespace()) {
            *c = tok.parse().unwrap_or(0.0);
        }
        v
    }

    pub fn classname(&self) -> &str {
        self.value_for_key("classname")
    }
}

/// Text of the entity lump, NUL terminated.
pub fn unparse_entities(entities: &[Entity]) -> Result<Vec<u8>> {
    let mut out = String::new();
    for e in entities.iter().filter(|e| !e.epairs.is_empty()) {
        out.push_str("{\n");
        for (k, v) in &e.epairs {
            out.push_str(&format!("\"{}\" \"{}\"\n", k.trim_end(), v.trim_end()));
        }
        out.push_str("}\n");
    }
    let mut bytes = out.into_bytes();
    bytes.push(0);
    check_capacity("entity string", bytes.len() - 1, MAX_MAP_ENTSTRING)?;
    Ok(bytes)
}

// ============================================================
// Pass 1: raw text
// ============================================================

#[derive(Debug, Clone)]
struct RawSide {
    points: [Vec3; 3],
    texture: BrushTexture,
    contents: ContentFlags,
}

#[derive(Debug, Clone, Default)]
struct RawBrush {
    sides: Vec<RawSide>,
}

impl RawBrush {
    fn contents(&self) -> ContentFlags {
        self.sides.first().map(|s| s.contents).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
struct RawEntity {
    epairs: Vec<(String, String)>,
    brushes: Vec<RawBrush>,
}

fn parse_point(script: &mut Script, first: bool) -> Result<Vec3> {
    if !first {
        script.get_token(true)?;
    }
    if script.token != "(" {
        return Err(script.error("parsing brush: expected '('"));
    }
    let mut p = VEC3_ORIGIN;
    for c in p.iter_mut() {
        *c = script.parse_f32()?;
    }
    if script.expect_token()? != ")" {
        return Err(script.error("parsing brush: expected ')'"));
    }
    Ok(p)
}

fn parse_side(script: &mut Script, config: &CompileConfig) -> Result<RawSide> {
    let points = [
        parse_point(script, true)?,
        parse_point(script, false)?,
        parse_point(script, false)?,
    ];

    let mut texture = BrushTexture { name: script.expect_token()?.to_string(), ..Default::default() };
    texture.shift = [script.parse_f32()?, script.parse_f32()?];
    texture.rotate = script.parse_f32()?;
    texture.scale = [script.parse_f32()?, script.parse_f32()?];

    let material = find_material(&texture.name);
    let mut contents = material.contents;
    texture.surface_flags = material.surface_flags;
    texture.value = material.value;

    if script.token_available() {
        contents = ContentFlags::from_bits_retain(script.parse_i32()?);
        texture.surface_flags = SurfaceFlags::from_bits_retain(script.parse_i32()?);
        texture.value = script.parse_i32()?;
    }

    if texture.surface_flags.intersects(SurfaceFlags::TRANSLUCENT) {
        contents |= ContentFlags::DETAIL;
    }
    if config.fulldetail {
        contents.remove(ContentFlags::DETAIL);
    }
    if contents.bits() & VISIBLE_CONTENTS == 0 {
        contents |= ContentFlags::SOLID;
    }
    if texture.surface_flags.intersects(SurfaceFlags::HINT | SurfaceFlags::SKIP) {
        contents = ContentFlags::empty();
    }

    Ok(RawSide { points, texture, contents })
}

fn parse_brush(script: &mut Script, config: &CompileConfig, numsides: &mut usize) -> Result<RawBrush> {
    let mut brush = RawBrush::default();
    loop {
        if !script.get_token(true)? || script.token == "}" {
            break;
        }
        check_capacity("brush sides", *numsides, MAX_MAP_SIDES)?;
        brush.sides.push(parse_side(script, config)?);
        *numsides += 1;
    }
    Ok(brush)
}

fn parse_epair(script: &mut Script) -> Result<(String, String)> {
    let key = script.token.clone();
    if key.len() >= MAX_KEY {
        return Err(script.error(format!("key too long: {key}")));
    }
    let value = script.expect_token()?.to_string();
    if value.len() >= MAX_VALUE {
        return Err(script.error(format!("value too long for key {key}")));
    }
    Ok((key, value))
}

/// Next `{ ... }` block, or None at the end of the text.
fn parse_entity(
    script: &mut Script,
    config: &CompileConfig,
    numbrushes: &mut usize,
    numsides: &mut usize,
) -> Result<Option<RawEntity>> {
    if !script.get_token(true)? {
        return Ok(None);
    }
    if script.token != "{" {
        return Err(script.error("entity: '{' not found"));
    }

    let mut ent = RawEntity::default();
    loop {
        if !script.get_token(true)? {
            return Err(script.error("entity: EOF without closing brace"));
        }
        match script.token.as_str() {
            "}" => break,
            "{" => {
                check_capacity("brushes", *numbrushes, MAX_MAP_BRUSHES)?;
                ent.brushes.push(parse_brush(script, config, numsides)?);
                *numbrushes += 1;
            }
            _ => ent.epairs.push(parse_epair(script)?),
        }
    }
    Ok(Some(ent))
}

fn parse_raw_entities(text: &str, config: &CompileConfig) -> Result<Vec<RawEntity>> {
    let mut script = Script::new(text);
    let mut entities: Vec<RawEntity> = Vec::new();
    let (mut numbrushes, mut numsides) = (0, 0);

    while let Some(ent) = parse_entity(&mut script, config, &mut numbrushes, &mut numsides)? {
        let is_group = ent.epairs.iter().any(|(k, v)| k == "classname" && v == "func_group");
        match entities.first_mut() {
            Some(world) if is_group => world.brushes.extend(ent.brushes),
            _ => {
                check_capacity("entities", entities.len(), MAX_MAP_ENTITIES)?;
                entities.push(ent);
            }
        }
    }
    Ok(entities)
}

// ============================================================
// Pass 2: brushes
// ============================================================

/// Everything the compiler needs from the map file.
#[derive(Debug, Clone, Default)]
pub struct MapData {
    pub entities: Vec<Entity>,
    /// All kept brushes, grouped by entity in entity order.
    pub brushes: Vec<MapBrush>,
    pub planes: PlaneRegistry,
    pub texinfo: Vec<TexInfo>,
    /// Bounds of the world entity's brushes.
    pub map_mins: Vec3,
    pub map_maxs: Vec3,
}

struct BrushBuilder<'a> {
    config: &'a CompileConfig,
    planes: &'a mut PlaneRegistry,
    texinfo: &'a mut Vec<TexInfo>,
    stats: &'a mut Stats,
}

impl BrushBuilder<'_> {
    /// Planes, texinfo and windings for a raw brush moved by `-origin`.
    /// Bevels are not added yet.
    fn build(&mut self, raw: &RawBrush, entitynum: usize, brushnum: usize, origin: &Vec3) -> Result<MapBrush> {
        let mut b = MapBrush::new(entitynum, brushnum, Vec::with_capacity(raw.sides.len()));

        for rs in &raw.sides {
            let [p0, p1, p2] = rs.points.map(|p| vector_subtract(&p, origin));
            let Some(planenum) = self.planes.plane_from_points(&p0, &p1, &p2)? else {
                warn!("Entity {entitynum}, Brush {brushnum}: plane with no normal");
                continue;
            };

            if let Some(s2) = b.sides.iter().find(|s| s.planenum == planenum || s.planenum == planenum ^ 1) {
                if s2.planenum == planenum {
                    warn!("Entity {entitynum}, Brush {brushnum}: duplicate plane");
                } else {
                    warn!("Entity {entitynum}, Brush {brushnum}: mirrored plane");
                }
                continue;
            }

            let texinfo =
                texinfo_for_brush_texture(self.texinfo, self.planes.get(planenum), &rs.texture, origin)?;
            b.sides.push(Side {
                planenum,
                texinfo,
                texture: rs.texture.clone(),
                contents: rs.contents,
                surface_flags: rs.texture.surface_flags,
                winding: None,
                visible: false,
                bevel: false,
            });
        }

        b.contents = b.classify_contents();
        b.make_windings(self.planes);
        Ok(b)
    }

    fn keep(&self, contents: ContentFlags) -> bool {
        if self.config.nodetail && contents.contains(ContentFlags::DETAIL) {
            return false;
        }
        !(self.config.nowater && contents.intersects(ContentFlags::MASK_WATER))
    }

    /// Entity origin from its origin brush, if it has one.
    fn find_origin(&mut self, raw: &RawEntity, entitynum: usize) -> Result<Option<Vec3>> {
        for (brushnum, rb) in raw.brushes.iter().enumerate() {
            if !rb.contents().contains(ContentFlags::ORIGIN) {
                continue;
            }
            if entitynum == 0 {
                error!("{}", CompileError::OriginBrushInWorld { entity: entitynum, brush: brushnum });
                continue;
            }
            let b = self.build(rb, entitynum, brushnum, &VEC3_ORIGIN)?;
            if b.is_empty() {
                warn!("Entity {entitynum}, Brush {brushnum}: origin brush has no volume");
                continue;
            }
            // stored in the key as integers and read back from there
            let center: Vec3 = std::array::from_fn(|i| ((b.mins[i] + b.maxs[i]) * 0.5).trunc());
            return Ok(Some(center));
        }
        Ok(None)
    }

    fn build_entity(&mut self, raw: &RawEntity, entitynum: usize, brushes: &mut Vec<MapBrush>) -> Result<Entity> {
        let mut ent = Entity { epairs: raw.epairs.clone(), firstbrush: brushes.len(), ..Default::default() };

        if let Some(origin) = self.find_origin(raw, entitynum)? {
            ent.set_key_value("origin", &format!("{} {} {}", origin[0] as i32, origin[1] as i32, origin[2] as i32));
        }
        ent.origin = ent.vector_for_key("origin");
        if ent.origin != VEC3_ORIGIN && !raw.brushes.is_empty() {
            debug!("Entity {entitynum}: brushes offset by {:?}", ent.origin);
        }

        for (brushnum, rb) in raw.brushes.iter().enumerate() {
            if rb.contents().contains(ContentFlags::ORIGIN) {
                continue;
            }
            let mut b = self.build(rb, entitynum, brushnum, &ent.origin)?;
            if !self.keep(b.contents) {
                continue;
            }
            if b.contents.contains(ContentFlags::ORIGIN) {
                // a later side carried the origin material
                continue;
            }
            b.add_brush_bevels(self.planes, self.stats)?;
            self.stats.sides += b.sides.len();
            brushes.push(b);
            ent.numbrushes += 1;
        }
        Ok(ent)
    }
}

impl MapData {
    pub fn load_map_file(path: &Path, config: &CompileConfig, stats: &mut Stats) -> Result<Self> {
        info!("--- LoadMapFile ---");
        let text = fs::read_to_string(path)?;
        Self::parse(&text, config, stats)
    }

    pub fn parse(text: &str, config: &CompileConfig, stats: &mut Stats) -> Result<Self> {
        let raw = parse_raw_entities(text, config)?;

        let mut map = MapData::default();
        let mut builder = BrushBuilder {
            config,
            planes: &mut map.planes,
            texinfo: &mut map.texinfo,
            stats,
        };
        for (entitynum, re) in raw.iter().enumerate() {
            let ent = builder.build_entity(re, entitynum, &mut map.brushes)?;
            map.entities.push(ent);
        }

        let (mut mins, mut maxs) = clear_bounds();
        for b in map.world_brushes() {
            if b.mins[0] > MAX_WORLD_WIDTH {
                continue; // no valid points
            }
            add_point_to_bounds(&b.mins, &mut mins, &mut maxs);
            add_point_to_bounds(&b.maxs, &mut mins, &mut maxs);
        }
        map.map_mins = mins;
        map.map_maxs = maxs;

        stats.brushes = map.brushes.len();
        info!("{:5} entities", map.entities.len());
        info!("{:5} brushes", stats.brushes);
        info!("{:5} total sides", stats.sides);
        info!("{:5} boxbevels", stats.axial_bevels);
        info!("{:5} edgebevels", stats.edge_bevels);
        info!("size: {:5.0},{:5.0},{:5.0} to {:5.0},{:5.0},{:5.0}", mins[0], mins[1], mins[2], maxs[0], maxs[1], maxs[2]);
        Ok(map)
    }

    pub fn world_brushes(&self) -> &[MapBrush] {
        match self.entities.first() {
            Some(w) => &self.brushes[w.firstbrush..w.firstbrush + w.numbrushes],
            None => &[],
        }
    }
}
