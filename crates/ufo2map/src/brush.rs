// brush.rs -- Map brushes: contents, side windings and bevels

use log::{debug, warn};
use ufo2map_common::q_shared::{
    add_point_to_bounds, clear_bounds, cross_product, dot_product, vector_normalize,
    vector_subtract, ContentFlags, SurfaceFlags, Vec3, MAX_WORLD_WIDTH, VEC3_ORIGIN,
};

use crate::error::Result;
use crate::planes::{snap_vector, PlaneRegistry};
use crate::polylib::Winding;
use crate::stats::Stats;
use crate::textures::BrushTexture;

/// Distance a point may stick out of a candidate edge bevel.
const BEVEL_EPSILON: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct Side {
    pub planenum: usize,
    pub texinfo: usize,
    /// Projection data the texinfo was built from. Lives in the side so it
    /// stays paired with it when sides are reordered.
    pub texture: BrushTexture,
    pub contents: ContentFlags,
    pub surface_flags: SurfaceFlags,
    pub winding: Option<Winding>,
    pub visible: bool,
    pub bevel: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapBrush {
    pub entitynum: usize,
    /// Index inside its entity, for messages.
    pub brushnum: usize,
    pub contents: ContentFlags,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub sides: Vec<Side>,
}

impl MapBrush {
    pub fn new(entitynum: usize, brushnum: usize, sides: Vec<Side>) -> Self {
        let (mins, maxs) = clear_bounds();
        Self { entitynum, brushnum, contents: ContentFlags::empty(), mins, maxs, sides }
    }

    /// Merged contents of all sides. Translucent surfaces anywhere on the
    /// brush turn solid into window.
    pub fn classify_contents(&self) -> ContentFlags {
        let Some(first) = self.sides.first() else {
            return ContentFlags::empty();
        };
        let mut contents = first.contents;
        let mut trans = SurfaceFlags::empty();
        let mut mixed = false;
        for s in &self.sides {
            trans |= s.surface_flags;
            if s.contents != contents && !mixed {
                debug!(
                    "Entity {}, Brush {}: mixed face contents ({:#x}, {:#x})",
                    self.entitynum,
                    self.brushnum,
                    s.contents.bits(),
                    contents.bits()
                );
                mixed = true;
            }
        }
        if mixed {
            warn!("Entity {}, Brush {}: mixed face contents", self.entitynum, self.brushnum);
        }

        if trans.intersects(SurfaceFlags::TRANSLUCENT) {
            contents |= ContentFlags::TRANSLUCENT;
            if contents.contains(ContentFlags::SOLID) {
                contents.remove(ContentFlags::SOLID);
                contents.insert(ContentFlags::WINDOW);
            }
        }
        contents
    }

    /// Clip a full plane polygon for every side against all other
    /// non-bevel sides, and bound the brush by the results.
    pub fn make_windings(&mut self, planes: &PlaneRegistry) {
        let (mut mins, mut maxs) = clear_bounds();

        for i in 0..self.sides.len() {
            let plane = planes.get(self.sides[i].planenum);
            let mut w = Some(Winding::base_for_plane(&plane.normal, plane.dist));
            for (j, other) in self.sides.iter().enumerate() {
                if i == j || other.bevel {
                    continue;
                }
                let Some(cur) = w.take() else { break };
                let clip = planes.get(other.planenum ^ 1);
                w = cur.chop(&clip.normal, clip.dist, 0.0);
            }

            let side = &mut self.sides[i];
            if let Some(w) = &w {
                side.visible = true;
                for p in &w.p {
                    add_point_to_bounds(p, &mut mins, &mut maxs);
                }
            }
            side.winding = w;
        }

        self.mins = mins;
        self.maxs = maxs;

        if (0..3).any(|i| mins[i] < -MAX_WORLD_WIDTH || maxs[i] > MAX_WORLD_WIDTH) {
            warn!("Entity {}, Brush {}: bounds out of range", self.entitynum, self.brushnum);
        }
        if (0..3).any(|i| mins[i] > MAX_WORLD_WIDTH || maxs[i] < -MAX_WORLD_WIDTH) {
            warn!("Entity {}, Brush {}: no visible sides on brush", self.entitynum, self.brushnum);
        }
    }

    /// True if the brush has no winding anywhere.
    pub fn is_empty(&self) -> bool {
        self.sides.iter().all(|s| s.winding.is_none())
    }

    fn bevel_side(&self, planenum: usize) -> Side {
        let first = &self.sides[0];
        Side {
            planenum,
            texinfo: first.texinfo,
            texture: first.texture.clone(),
            contents: first.contents,
            surface_flags: first.surface_flags,
            winding: None,
            visible: false,
            bevel: true,
        }
    }

    /// Make sure the six axial planes bounding the brush are sides, stored
    /// at indices 0..6 in the order -x +x -y +y -z +z.
    pub fn add_axis_bevels(&mut self, planes: &mut PlaneRegistry, stats: &mut Stats) -> Result<()> {
        let mut order = 0;
        for axis in 0..3 {
            for dir in [-1.0f32, 1.0] {
                let found = self
                    .sides
                    .iter()
                    .position(|s| planes.get(s.planenum).normal[axis] == dir);

                let i = match found {
                    Some(i) => i,
                    None => {
                        let mut normal = VEC3_ORIGIN;
                        normal[axis] = dir;
                        let dist = if dir > 0.0 { self.maxs[axis] } else { -self.mins[axis] };
                        let planenum = planes.find_float_plane(&normal, dist)?;
                        self.sides.push(self.bevel_side(planenum));
                        stats.axial_bevels += 1;
                        self.sides.len() - 1
                    }
                };

                if i != order {
                    self.sides.swap(order, i);
                }
                order += 1;
            }
        }
        Ok(())
    }

    /// Add bevels along non-axial edges so that expanded boxes clip
    /// against the brush hull instead of its extended faces.
    pub fn add_edge_bevels(&mut self, planes: &mut PlaneRegistry, stats: &mut Stats) -> Result<()> {
        if self.sides.len() == 6 {
            return Ok(()); // pure axial
        }

        let mut i = 6;
        while i < self.sides.len() {
            let Some(w) = self.sides[i].winding.clone() else {
                i += 1;
                continue;
            };
            for j in 0..w.len() {
                let k = (j + 1) % w.len();
                let mut vec = vector_subtract(&w.p[j], &w.p[k]);
                if vector_normalize(&mut vec) < 0.5 {
                    continue;
                }
                snap_vector(&mut vec);
                if vec.iter().any(|&c| c == -1.0 || c == 1.0) {
                    continue; // only test non-axial edges
                }

                // the six slanted axials through this edge
                for axis in 0..3 {
                    for dir in [-1.0f32, 1.0] {
                        let mut vec2 = VEC3_ORIGIN;
                        vec2[axis] = dir;
                        let mut normal = cross_product(&vec, &vec2);
                        if vector_normalize(&mut normal) < 0.5 {
                            continue;
                        }
                        let dist = dot_product(&w.p[j], &normal);

                        if !self.is_outer_hull_plane(planes, &normal, dist) {
                            continue;
                        }

                        let planenum = planes.find_float_plane(&normal, dist)?;
                        self.sides.push(self.bevel_side(planenum));
                        stats.edge_bevels += 1;
                    }
                }
            }
            i += 1;
        }
        Ok(())
    }

    /// Not already a side, and every side winding lies on or behind it.
    fn is_outer_hull_plane(&self, planes: &PlaneRegistry, normal: &Vec3, dist: f32) -> bool {
        for s in &self.sides {
            if planes.get(s.planenum).equals(normal, dist) {
                return false;
            }
            if let Some(w) = &s.winding {
                if w.p.iter().any(|p| dot_product(p, normal) - dist > BEVEL_EPSILON) {
                    return false;
                }
            }
        }
        true
    }

    pub fn add_brush_bevels(&mut self, planes: &mut PlaneRegistry, stats: &mut Stats) -> Result<()> {
        self.add_axis_bevels(planes, stats)?;
        self.add_edge_bevels(planes, stats)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::polylib::ON_EPSILON;

    pub(crate) fn side(planes: &mut PlaneRegistry, normal: Vec3, dist: f32) -> Side {
        Side {
            planenum: planes.find_float_plane(&normal, dist).unwrap(),
            texinfo: 0,
            texture: BrushTexture::default(),
            contents: ContentFlags::SOLID,
            surface_flags: SurfaceFlags::empty(),
            winding: None,
            visible: false,
            bevel: false,
        }
    }

    /// Axis aligned box, sides in +x -x +y -y +z -z order.
    pub(crate) fn box_brush(planes: &mut PlaneRegistry, mins: Vec3, maxs: Vec3) -> MapBrush {
        let mut sides = Vec::new();
        for axis in 0..3 {
            let mut n = VEC3_ORIGIN;
            n[axis] = 1.0;
            sides.push(side(planes, n, maxs[axis]));
            n[axis] = -1.0;
            sides.push(side(planes, n, -mins[axis]));
        }
        let mut b = MapBrush::new(0, 0, sides);
        b.contents = b.classify_contents();
        b.make_windings(planes);
        b
    }

    /// Box with one vertical edge cut off at 45 degrees.
    fn wedge_brush(planes: &mut PlaneRegistry) -> MapBrush {
        let mut b = box_brush(planes, [0.0, 0.0, 0.0], [64.0, 64.0, 64.0]);
        let mut n = [1.0, 1.0, 0.0];
        vector_normalize(&mut n);
        b.sides.push(side(planes, n, dot_product(&n, &[64.0, 32.0, 0.0])));
        b.make_windings(planes);
        b
    }

    // ============================================================
    // Contents
    // ============================================================

    #[test]
    fn test_translucent_solid_becomes_window() {
        let mut planes = PlaneRegistry::new();
        let mut b = box_brush(&mut planes, [0.0; 3], [16.0; 3]);
        assert_eq!(b.classify_contents(), ContentFlags::SOLID);
        b.sides[3].surface_flags = SurfaceFlags::TRANS33;
        let c = b.classify_contents();
        assert!(c.contains(ContentFlags::WINDOW | ContentFlags::TRANSLUCENT));
        assert!(!c.contains(ContentFlags::SOLID));
    }

    #[test]
    fn test_mixed_contents_keep_first_side() {
        let mut planes = PlaneRegistry::new();
        let mut b = box_brush(&mut planes, [0.0; 3], [16.0; 3]);
        b.sides[2].contents = ContentFlags::WATER;
        assert_eq!(b.classify_contents(), ContentFlags::SOLID);
    }

    // ============================================================
    // Windings
    // ============================================================

    #[test]
    fn test_box_windings_and_bounds() {
        let mut planes = PlaneRegistry::new();
        let b = box_brush(&mut planes, [0.0, 0.0, 0.0], [10.0, 20.0, 30.0]);
        assert_eq!(b.mins, [0.0, 0.0, 0.0]);
        assert_eq!(b.maxs, [10.0, 20.0, 30.0]);
        for s in &b.sides {
            let w = s.winding.as_ref().unwrap();
            assert_eq!(w.len(), 4);
            assert!(s.visible);
        }
    }

    #[test]
    fn test_windings_are_inside_every_other_side() {
        let mut planes = PlaneRegistry::new();
        let b = wedge_brush(&mut planes);
        for (i, s) in b.sides.iter().enumerate() {
            let w = s.winding.as_ref().unwrap();
            for (j, other) in b.sides.iter().enumerate() {
                if i == j {
                    continue;
                }
                let p = planes.get(other.planenum);
                for pt in &w.p {
                    assert!(dot_product(pt, &p.normal) - p.dist <= ON_EPSILON);
                }
            }
        }
    }

    #[test]
    fn test_side_outside_the_brush_has_no_winding() {
        let mut planes = PlaneRegistry::new();
        let mut b = box_brush(&mut planes, [0.0; 3], [16.0; 3]);
        // a plane facing +x at 100 lies entirely outside the box volume
        b.sides.push(side(&mut planes, [1.0, 0.0, 0.0], 100.0));
        b.make_windings(&planes);
        assert!(b.sides[6].winding.is_none());
        assert!(!b.is_empty());
    }

    // ============================================================
    // Bevels
    // ============================================================

    #[test]
    fn test_axial_box_needs_no_bevels() {
        let mut planes = PlaneRegistry::new();
        let mut stats = Stats::default();
        let mut b = box_brush(&mut planes, [0.0; 3], [10.0; 3]);
        b.add_brush_bevels(&mut planes, &mut stats).unwrap();
        assert_eq!(b.sides.len(), 6);
        assert_eq!(stats.axial_bevels, 0);
        assert_eq!(stats.edge_bevels, 0);
        // canonical order: -x +x -y +y -z +z
        for (i, s) in b.sides.iter().enumerate() {
            let n = planes.get(s.planenum).normal;
            let dir = if i % 2 == 0 { -1.0 } else { 1.0 };
            assert_eq!(n[i / 2], dir);
        }
    }

    #[test]
    fn test_wedge_gets_axial_bevel_in_place() {
        let mut planes = PlaneRegistry::new();
        let mut stats = Stats::default();
        let mut b = wedge_brush(&mut planes);
        // drop the +y side so the slanted face bounds y on its own
        b.sides.retain(|s| planes.get(s.planenum).normal != [0.0, 1.0, 0.0]);
        b.make_windings(&planes);
        let slanted_texture = BrushTexture { name: "slant".into(), ..Default::default() };
        b.sides.last_mut().unwrap().texture = slanted_texture.clone();

        b.add_axis_bevels(&mut planes, &mut stats).unwrap();
        assert_eq!(stats.axial_bevels, 1);
        assert_eq!(b.sides.len(), 7);
        let plus_y = &b.sides[3];
        assert!(plus_y.bevel);
        assert_eq!(planes.get(plus_y.planenum).normal, [0.0, 1.0, 0.0]);
        // the slanted face reaches y = 96 at x = 0
        assert_eq!(planes.get(plus_y.planenum).dist, 96.0);
        // the slanted side moved with its texture data
        let slanted = b.sides.iter().find(|s| s.texture == slanted_texture).unwrap();
        assert!(!slanted.bevel);
        assert!(slanted.winding.is_some());
    }

    #[test]
    fn test_corner_cut_needs_no_edge_bevels() {
        let mut planes = PlaneRegistry::new();
        let mut stats = Stats::default();
        let mut b = box_brush(&mut planes, [0.0; 3], [64.0; 3]);
        // every edge of the cut triangle lies on an axial face
        let mut n = [1.0, 1.0, 1.0];
        vector_normalize(&mut n);
        b.sides.push(side(&mut planes, n, dot_product(&n, &[64.0, 64.0, 32.0])));
        b.make_windings(&planes);
        b.add_brush_bevels(&mut planes, &mut stats).unwrap();
        assert_eq!(stats.edge_bevels, 0);
    }

    #[test]
    fn test_edge_bevel_along_slanted_ridge() {
        let mut planes = PlaneRegistry::new();
        let mut stats = Stats::default();
        let mut b = box_brush(&mut planes, [0.0; 3], [64.0; 3]);
        // two slanted faces meeting at the ridge x + y = 96, z = 32
        let mut n1 = [1.0, 1.0, 1.0];
        let mut n2 = [1.0, 1.0, -1.0];
        vector_normalize(&mut n1);
        vector_normalize(&mut n2);
        b.sides.push(side(&mut planes, n1, dot_product(&n1, &[64.0, 32.0, 32.0])));
        b.sides.push(side(&mut planes, n2, dot_product(&n2, &[64.0, 32.0, 32.0])));
        b.make_windings(&planes);
        assert!(b.sides.iter().all(|s| s.winding.is_some()));
        b.add_brush_bevels(&mut planes, &mut stats).unwrap();
        assert!(stats.edge_bevels > 0);

        // the ridge is bounded by the diagonal vertical plane x + y = 96
        let diagonal = b.sides.iter().filter(|s| s.bevel).map(|s| planes.get(s.planenum)).find(|p| {
            p.normal[2].abs() < 0.01 && (p.normal[0] - p.normal[1]).abs() < 0.01 && p.normal[0] > 0.0
        });
        let diagonal = diagonal.unwrap();
        assert!((diagonal.dist - 96.0 / 2f32.sqrt()).abs() < 0.01);

        // every bevel keeps all side windings behind it
        for s in b.sides.iter().filter(|s| s.bevel) {
            let p = planes.get(s.planenum);
            for other in &b.sides {
                if let Some(w) = &other.winding {
                    for pt in &w.p {
                        assert!(dot_product(pt, &p.normal) - p.dist <= BEVEL_EPSILON);
                    }
                }
            }
        }
    }
}
