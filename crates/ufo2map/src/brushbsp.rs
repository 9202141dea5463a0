// brushbsp.rs -- Building the BSP tree from brush fragments

use log::{debug, info, warn};
use ufo2map_common::q_shared::{
    add_point_to_bounds, clear_bounds, dot_product, ContentFlags, SurfaceFlags, Vec3,
    MAX_WORLD_WIDTH, VEC3_ORIGIN,
};

use crate::brush::MapBrush;
use crate::error::Result;
use crate::planes::{Plane, PlaneRegistry};
use crate::polylib::Winding;
use crate::stats::Stats;
use crate::tree::{Node, Tree};

pub const PSIDE_FRONT: u8 = 1;
pub const PSIDE_BACK: u8 = 2;
pub const PSIDE_BOTH: u8 = PSIDE_FRONT | PSIDE_BACK;
/// The brush has a side on the plane itself.
pub const PSIDE_FACING: u8 = 4;

const PLANESIDE_EPSILON: f32 = 0.001;
const SPLIT_EPSILON: f32 = 0.1;
const MICRO_VOLUME: f32 = 1.0;

/// A side of a brush fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct BspSide {
    pub planenum: usize,
    /// None once the side lies on a split node.
    pub texinfo: Option<usize>,
    pub surface_flags: SurfaceFlags,
    pub winding: Option<Winding>,
    pub visible: bool,
    pub tested: bool,
    pub bevel: bool,
}

/// A convex piece of a map brush.
#[derive(Debug, Clone, PartialEq)]
pub struct BspBrush {
    /// Index of the map brush this was cut from.
    pub original: usize,
    pub contents: ContentFlags,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub sides: Vec<BspSide>,
    /// PSIDE_* bits relative to the chosen split plane.
    pub side: u8,
    pub testside: u8,
}

impl BspBrush {
    pub fn from_map_brush(index: usize, mb: &MapBrush) -> Self {
        let sides = mb
            .sides
            .iter()
            .map(|s| BspSide {
                planenum: s.planenum,
                texinfo: Some(s.texinfo),
                surface_flags: s.surface_flags,
                winding: s.winding.clone(),
                // hints are always visible
                visible: s.visible || s.surface_flags.contains(SurfaceFlags::HINT),
                tested: false,
                bevel: s.bevel,
            })
            .collect();
        Self {
            original: index,
            contents: mb.contents,
            mins: mb.mins,
            maxs: mb.maxs,
            sides,
            side: 0,
            testside: 0,
        }
    }

    /// Box brush used as the volume of the head node.
    pub fn from_bounds(planes: &mut PlaneRegistry, mins: &Vec3, maxs: &Vec3) -> Result<Self> {
        let mut sides = Vec::with_capacity(6);
        for i in 0..3 {
            let mut normal = VEC3_ORIGIN;
            normal[i] = 1.0;
            let front = planes.find_float_plane(&normal, maxs[i])?;
            normal[i] = -1.0;
            let back = planes.find_float_plane(&normal, -mins[i])?;
            for planenum in [front, back] {
                sides.push(BspSide {
                    planenum,
                    texinfo: None,
                    surface_flags: SurfaceFlags::empty(),
                    winding: None,
                    visible: false,
                    tested: false,
                    bevel: false,
                });
            }
        }
        let mut b = Self {
            original: 0,
            contents: ContentFlags::empty(),
            mins: *mins,
            maxs: *maxs,
            sides,
            side: 0,
            testside: 0,
        };
        b.create_windings(planes);
        Ok(b)
    }

    pub fn create_windings(&mut self, planes: &PlaneRegistry) {
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
            self.sides[i].winding = w;
        }
        self.bound();
    }

    pub fn bound(&mut self) {
        let (mut mins, mut maxs) = clear_bounds();
        for w in self.sides.iter().filter_map(|s| s.winding.as_ref()) {
            for p in &w.p {
                add_point_to_bounds(p, &mut mins, &mut maxs);
            }
        }
        self.mins = mins;
        self.maxs = maxs;
    }

    /// Sum of the pyramids from one corner to every side.
    pub fn volume(&self, planes: &PlaneRegistry) -> f32 {
        let Some(first) = self.sides.iter().position(|s| s.winding.is_some()) else {
            return 0.0;
        };
        let corner = self.sides[first].winding.as_ref().map(|w| w.p[0]).unwrap_or(VEC3_ORIGIN);
        let mut volume = 0.0;
        for s in &self.sides[first..] {
            let Some(w) = &s.winding else { continue };
            let plane = planes.get(s.planenum);
            let d = -(dot_product(&corner, &plane.normal) - plane.dist);
            volume += d * w.area();
        }
        volume / 3.0
    }

    fn mostly_on_side(&self, plane: &Plane) -> u8 {
        let mut max = 0.0;
        let mut side = PSIDE_FRONT;
        for w in self.sides.iter().filter_map(|s| s.winding.as_ref()) {
            for p in &w.p {
                let d = dot_product(p, &plane.normal) - plane.dist;
                if d > max {
                    max = d;
                    side = PSIDE_FRONT;
                }
                if -d > max {
                    max = -d;
                    side = PSIDE_BACK;
                }
            }
        }
        side
    }

    /// Front and back fragments of the brush cut by `planenum`. Either
    /// may be None when the brush is (nearly) on one side only.
    pub fn split(&self, planes: &PlaneRegistry, planenum: usize) -> (Option<BspBrush>, Option<BspBrush>) {
        let plane = *planes.get(planenum);

        let mut d_front = 0.0f32;
        let mut d_back = 0.0f32;
        for w in self.sides.iter().filter_map(|s| s.winding.as_ref()) {
            for p in &w.p {
                let d = dot_product(p, &plane.normal) - plane.dist;
                if d > 0.0 && d > d_front {
                    d_front = d;
                }
                if d < 0.0 && d < d_back {
                    d_back = d;
                }
            }
        }
        if d_front < SPLIT_EPSILON {
            return (None, Some(self.clone()));
        }
        if d_back > -SPLIT_EPSILON {
            return (Some(self.clone()), None);
        }

        // the new side shared by both halves
        let mut mid = Some(Winding::base_for_plane(&plane.normal, plane.dist));
        for s in &self.sides {
            let Some(w) = mid.take() else { break };
            let clip = planes.get(s.planenum ^ 1);
            mid = w.chop(&clip.normal, clip.dist, 0.0);
        }
        let midwinding = match mid {
            Some(w) if !w.is_tiny() => w,
            _ => {
                return match self.mostly_on_side(&plane) {
                    PSIDE_FRONT => (Some(self.clone()), None),
                    _ => (None, Some(self.clone())),
                };
            }
        };
        if midwinding.is_huge() {
            debug!("huge winding");
        }

        let mut halves: [BspBrush; 2] = std::array::from_fn(|_| BspBrush {
            original: self.original,
            contents: self.contents,
            mins: VEC3_ORIGIN,
            maxs: VEC3_ORIGIN,
            sides: Vec::with_capacity(self.sides.len() + 1),
            side: 0,
            testside: 0,
        });

        for s in &self.sides {
            let Some(w) = &s.winding else { continue };
            let (front, back) = w.clip_epsilon(&plane.normal, plane.dist, 0.0);
            for (half, cw) in halves.iter_mut().zip([front, back]) {
                if let Some(cw) = cw {
                    half.sides.push(BspSide { winding: Some(cw), tested: false, ..s.clone() });
                }
            }
        }

        let mut valid = [true; 2];
        for (i, half) in halves.iter_mut().enumerate() {
            half.bound();
            let bogus = (0..3).any(|j| half.mins[j] < -MAX_WORLD_WIDTH || half.maxs[j] > MAX_WORLD_WIDTH);
            if bogus {
                debug!("bogus brush after clip");
            }
            if half.sides.len() < 3 || bogus {
                valid[i] = false;
            }
        }

        if !(valid[0] && valid[1]) {
            if !valid[0] && !valid[1] {
                debug!("split removed brush");
            } else {
                debug!("split not on both sides");
            }
            let front = valid[0].then(|| self.clone());
            let back = valid[1].then(|| self.clone());
            return (front, back);
        }

        for (i, half) in halves.iter_mut().enumerate() {
            half.sides.push(BspSide {
                planenum: planenum ^ i ^ 1,
                texinfo: None,
                surface_flags: SurfaceFlags::empty(),
                winding: Some(midwinding.clone()),
                visible: false,
                tested: false,
                bevel: false,
            });
        }

        let [front, back] = halves;
        let keep = |b: BspBrush| (b.volume(planes) >= MICRO_VOLUME).then_some(b);
        (keep(front), keep(back))
    }

    /// PSIDE_* bits of the brush against `planenum`, plus the number of
    /// visible sides it would split, whether one of them is a hint, and
    /// whether the brush sits within an epsilon of the plane.
    fn test_planenum(&self, planes: &PlaneRegistry, planenum: usize) -> (u8, usize, bool, bool) {
        for s in &self.sides {
            if s.planenum == planenum {
                return (PSIDE_BACK | PSIDE_FACING, 0, false, false);
            }
            if s.planenum == planenum ^ 1 {
                return (PSIDE_FRONT | PSIDE_FACING, 0, false, false);
            }
        }

        let plane = planes.get(planenum);
        let side = box_on_plane_side(&self.mins, &self.maxs, plane);
        if side != PSIDE_BOTH {
            return (side, 0, false, false);
        }

        let mut splits = 0;
        let mut hintsplit = false;
        let mut d_front = 0.0f32;
        let mut d_back = 0.0f32;
        for s in &self.sides {
            if s.texinfo.is_none() || !s.visible {
                continue;
            }
            let Some(w) = &s.winding else { continue };
            let mut front = false;
            let mut back = false;
            for p in &w.p {
                let d = dot_product(p, &plane.normal) - plane.dist;
                d_front = d_front.max(d);
                d_back = d_back.min(d);
                front |= d > SPLIT_EPSILON;
                back |= d < -SPLIT_EPSILON;
            }
            if front && back && !s.surface_flags.contains(SurfaceFlags::SKIP) {
                splits += 1;
                hintsplit |= s.surface_flags.contains(SurfaceFlags::HINT);
            }
        }

        let epsilon_brush = (d_front > 0.0 && d_front < 1.0) || (d_back < 0.0 && d_back > -1.0);
        (side, splits, hintsplit, epsilon_brush)
    }
}

/// PSIDE_* bits of a box against a plane. Axial planes are assumed to
/// face the positive axis, as node planes do.
pub fn box_on_plane_side(mins: &Vec3, maxs: &Vec3, plane: &Plane) -> u8 {
    if plane.is_axial() {
        let t = plane.plane_type as usize;
        let mut side = 0;
        if maxs[t] > plane.dist + PLANESIDE_EPSILON {
            side |= PSIDE_FRONT;
        }
        if mins[t] < plane.dist - PLANESIDE_EPSILON {
            side |= PSIDE_BACK;
        }
        return side;
    }

    let mut corners = [VEC3_ORIGIN; 2];
    for i in 0..3 {
        if plane.normal[i] < 0.0 {
            corners[0][i] = mins[i];
            corners[1][i] = maxs[i];
        } else {
            corners[1][i] = mins[i];
            corners[0][i] = maxs[i];
        }
    }
    let dist1 = dot_product(&plane.normal, &corners[0]) - plane.dist;
    let dist2 = dot_product(&plane.normal, &corners[1]) - plane.dist;
    let mut side = 0;
    if dist1 >= PLANESIDE_EPSILON {
        side = PSIDE_FRONT;
    }
    if dist2 < PLANESIDE_EPSILON {
        side |= PSIDE_BACK;
    }
    side
}

/// Fragments of the map brushes `start..end` that touch the clip box.
pub fn make_bsp_brush_list(
    brushes: &[MapBrush],
    start: usize,
    end: usize,
    clipmins: &Vec3,
    clipmaxs: &Vec3,
) -> Vec<BspBrush> {
    let mut list = Vec::new();
    for (i, mb) in brushes.iter().enumerate().take(end).skip(start) {
        if mb.sides.is_empty() {
            continue;
        }
        if (0..3).any(|j| mb.mins[j] >= clipmaxs[j] || mb.maxs[j] <= clipmins[j]) {
            continue;
        }
        list.push(BspBrush::from_map_brush(i, mb));
    }
    list
}

// ============================================================
// Tree construction
// ============================================================

struct TreeBuilder<'a> {
    planes: &'a PlaneRegistry,
    stats: &'a mut Stats,
    tree: Tree,
}

impl TreeBuilder<'_> {
    fn plane_splits_volume(&self, node: usize, planenum: usize) -> bool {
        match &self.tree.nodes[node].volume {
            Some(v) => matches!(v.split(self.planes, planenum), (Some(_), Some(_))),
            None => false,
        }
    }

    /// Best side plane to split `brushes` with, scored on four passes:
    /// visible structural, visible detail, hidden structural, hidden
    /// detail. Later passes only run when earlier ones found nothing.
    fn select_split_side(&mut self, brushes: &mut [BspBrush], node: usize) -> Option<usize> {
        let mut best: Option<(i64, usize)> = None;

        for pass in 0..4 {
            for bi in 0..brushes.len() {
                let detail = brushes[bi].contents.contains(ContentFlags::DETAIL);
                if (pass & 1 == 1) != detail {
                    continue;
                }
                for si in 0..brushes[bi].sides.len() {
                    let side = &brushes[bi].sides[si];
                    if side.bevel
                        || side.winding.is_none()
                        || side.texinfo.is_none()
                        || side.tested
                        || side.surface_flags.contains(SurfaceFlags::SKIP)
                        || side.visible != (pass < 2)
                    {
                        continue;
                    }
                    let is_hint = side.surface_flags.contains(SurfaceFlags::HINT);
                    let pnum = side.planenum & !1;
                    if !self.plane_splits_volume(node, pnum) {
                        continue;
                    }

                    let (mut front, mut back, mut facing, mut splits) = (0i64, 0i64, 0i64, 0i64);
                    let mut hintsplit = false;
                    let mut epsilon_brushes = 0i64;
                    for test in brushes.iter_mut() {
                        let (s, bsplits, hint, eps) = test.test_planenum(self.planes, pnum);
                        splits += bsplits as i64;
                        hintsplit |= hint;
                        epsilon_brushes += i64::from(eps);
                        test.testside = s;
                        if s & PSIDE_FACING != 0 {
                            facing += 1;
                            for ts in test.sides.iter_mut() {
                                if ts.planenum & !1 == pnum {
                                    ts.tested = true;
                                }
                            }
                        }
                        if s & PSIDE_FRONT != 0 {
                            front += 1;
                        }
                        if s & PSIDE_BACK != 0 {
                            back += 1;
                        }
                    }

                    let mut value = 5 * facing - 5 * splits - (front - back).abs();
                    if self.planes.get(pnum).is_axial() {
                        value += 5;
                    }
                    value -= epsilon_brushes * 1000;
                    // never split a hint side except with another hint
                    if hintsplit && !is_hint {
                        value = -9_999_999;
                    }

                    if best.map_or(true, |(v, _)| value > v) {
                        best = Some((value, pnum));
                        for test in brushes.iter_mut() {
                            test.side = test.testside;
                        }
                    }
                }
            }

            if best.is_some() {
                if pass > 0 {
                    self.tree.nodes[node].detail_separator = true;
                }
                break;
            }
        }

        for b in brushes.iter_mut() {
            for s in b.sides.iter_mut() {
                s.tested = false;
            }
        }
        best.map(|(_, pnum)| pnum)
    }

    fn leaf_node(&mut self, node: usize, brushes: Vec<BspBrush>) {
        let mut contents = ContentFlags::empty();
        for b in &brushes {
            // a solid brush with every side on a node fills the leaf
            if b.contents.contains(ContentFlags::SOLID) && b.sides.iter().all(|s| s.texinfo.is_none()) {
                contents = ContentFlags::SOLID;
                break;
            }
            contents |= b.contents;
        }
        let n = &mut self.tree.nodes[node];
        n.planenum = None;
        n.contents = contents;
        n.brushlist = brushes;
        self.stats.leafs += 1;
    }

    fn split_brush_list(&self, brushes: Vec<BspBrush>, planenum: usize) -> (Vec<BspBrush>, Vec<BspBrush>) {
        let mut front = Vec::new();
        let mut back = Vec::new();
        for mut b in brushes {
            let sides = b.side;
            if sides == PSIDE_BOTH {
                let (f, bk) = b.split(self.planes, planenum);
                front.extend(f);
                back.extend(bk);
                continue;
            }

            // a side on the plane is used up as a splitter
            if sides & PSIDE_FACING != 0 {
                for s in b.sides.iter_mut() {
                    if s.planenum & !1 == planenum {
                        s.texinfo = None;
                    }
                }
            }
            if sides & PSIDE_FRONT != 0 {
                front.push(b);
            } else if sides & PSIDE_BACK != 0 {
                back.push(b);
            }
        }
        (front, back)
    }

    fn build_tree_r(&mut self, node: usize, mut brushes: Vec<BspBrush>) {
        let Some(planenum) = self.select_split_side(&mut brushes, node) else {
            self.leaf_node(node, brushes);
            return;
        };
        self.stats.nodes += 1;

        let (front, back) = self.split_brush_list(brushes, planenum);
        let volumes = match &self.tree.nodes[node].volume {
            Some(v) => v.split(self.planes, planenum),
            None => (None, None),
        };

        let children = [
            self.tree.alloc_node(Node { parent: Some(node), volume: volumes.0, ..Default::default() }),
            self.tree.alloc_node(Node { parent: Some(node), volume: volumes.1, ..Default::default() }),
        ];
        let n = &mut self.tree.nodes[node];
        n.planenum = Some(planenum);
        n.children = children;

        self.build_tree_r(children[0], front);
        self.build_tree_r(children[1], back);
    }
}

/// Partition `brushes` inside the box `mins..maxs`.
pub fn brush_bsp(
    planes: &mut PlaneRegistry,
    brushes: Vec<BspBrush>,
    mins: &Vec3,
    maxs: &Vec3,
    stats: &mut Stats,
) -> Result<Tree> {
    info!("--- BrushBSP ---");

    let mut tree = Tree::new();
    let (mut visible, mut hidden) = (0, 0);
    for b in &brushes {
        if b.volume(planes) < MICRO_VOLUME {
            warn!("brush {}: microbrush", b.original);
        }
        for s in &b.sides {
            if s.bevel || s.winding.is_none() || s.texinfo.is_none() {
                continue;
            }
            if s.visible {
                visible += 1;
            } else {
                hidden += 1;
            }
        }
        add_point_to_bounds(&b.mins, &mut tree.mins, &mut tree.maxs);
        add_point_to_bounds(&b.maxs, &mut tree.mins, &mut tree.maxs);
    }
    info!("{:5} brushes", brushes.len());
    info!("{:5} visible faces", visible);
    info!("{:5} nonvisible faces", hidden);

    if (0..3).any(|i| maxs[i] - mins[i] <= 0.0) {
        warn!("empty volume for the tree");
    }
    let volume = BspBrush::from_bounds(planes, mins, maxs)?;
    let head = tree.headnode;
    tree.nodes[head].volume = Some(volume);

    let nodes_before = stats.nodes;
    let leafs_before = stats.leafs;
    let mut builder = TreeBuilder { planes, stats, tree };
    builder.build_tree_r(head, brushes);

    let TreeBuilder { stats, tree, .. } = builder;
    info!("{:5} nodes", stats.nodes - nodes_before);
    info!("{:5} leafs", stats.leafs - leafs_before);
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::tests::box_brush;
    use assert_approx_eq::assert_approx_eq;

    fn fragment(planes: &mut PlaneRegistry, mins: Vec3, maxs: Vec3) -> BspBrush {
        let b = box_brush(planes, mins, maxs);
        BspBrush::from_map_brush(0, &b)
    }

    // ============================================================
    // Fragments
    // ============================================================

    #[test]
    fn test_volume_of_box() {
        let mut planes = PlaneRegistry::new();
        let b = fragment(&mut planes, [0.0; 3], [10.0, 20.0, 30.0]);
        assert_approx_eq!(b.volume(&planes), 6000.0, 0.5);
    }

    #[test]
    fn test_split_through_middle() {
        let mut planes = PlaneRegistry::new();
        let b = fragment(&mut planes, [0.0; 3], [64.0; 3]);
        let p = planes.find_float_plane(&[1.0, 0.0, 0.0], 16.0).unwrap();
        let (f, bk) = b.split(&planes, p);
        let (f, bk) = (f.unwrap(), bk.unwrap());
        assert_eq!(f.mins[0], 16.0);
        assert_eq!(f.maxs[0], 64.0);
        assert_eq!(bk.maxs[0], 16.0);
        assert_eq!(f.sides.len(), 6);
        assert_approx_eq!(f.volume(&planes) + bk.volume(&planes), 64.0 * 64.0 * 64.0, 1.0);
        // the new side is a node side on both halves
        let mid = f.sides.last().unwrap();
        assert_eq!(mid.planenum, p ^ 1);
        assert!(mid.texinfo.is_none());
        assert_eq!(bk.sides.last().unwrap().planenum, p);
    }

    #[test]
    fn test_split_off_to_one_side() {
        let mut planes = PlaneRegistry::new();
        let b = fragment(&mut planes, [0.0; 3], [64.0; 3]);
        let p = planes.find_float_plane(&[0.0, 0.0, 1.0], 64.05).unwrap();
        let (f, bk) = b.split(&planes, p);
        assert!(f.is_none());
        assert!(bk.is_some());
    }

    #[test]
    fn test_box_on_plane_side() {
        let mut planes = PlaneRegistry::new();
        let p = planes.find_float_plane(&[0.0, 0.0, 1.0], 32.0).unwrap();
        let plane = *planes.get(p);
        assert_eq!(box_on_plane_side(&[0.0; 3], &[8.0; 3], &plane), PSIDE_BACK);
        assert_eq!(box_on_plane_side(&[0.0, 0.0, 40.0], &[8.0, 8.0, 48.0], &plane), PSIDE_FRONT);
        assert_eq!(box_on_plane_side(&[0.0; 3], &[64.0; 3], &plane), PSIDE_BOTH);
    }

    // ============================================================
    // Trees
    // ============================================================

    #[test]
    fn test_single_cube_splits_once() {
        let mut planes = PlaneRegistry::new();
        let mut stats = Stats::default();
        let b = fragment(&mut planes, [0.0; 3], [10.0; 3]);
        let tree = brush_bsp(&mut planes, vec![b], &[0.0; 3], &[10.0, 10.0, 512.0], &mut stats).unwrap();

        assert_eq!(tree.split_nodes(), 1);
        let head = &tree.nodes[tree.headnode];
        let plane = planes.get(head.planenum.unwrap());
        assert_eq!(plane.normal, [0.0, 0.0, 1.0]);
        assert_eq!(plane.dist, 10.0);
        let [front, back] = head.children;
        assert!(tree.nodes[front].contents.is_empty());
        assert_eq!(tree.nodes[back].contents, ContentFlags::SOLID);
        assert_eq!(tree.nodes[back].brushlist.len(), 1);
    }

    #[test]
    fn test_node_planes_are_positive() {
        let mut planes = PlaneRegistry::new();
        let mut stats = Stats::default();
        let a = fragment(&mut planes, [0.0; 3], [32.0; 3]);
        let b = fragment(&mut planes, [64.0, 0.0, 0.0], [96.0, 32.0, 32.0]);
        let mut b = b;
        b.original = 1;
        let tree = brush_bsp(&mut planes, vec![a, b], &[0.0; 3], &[96.0, 32.0, 512.0], &mut stats).unwrap();

        for n in &tree.nodes {
            if let Some(p) = n.planenum {
                assert_eq!(p & 1, 0);
            }
        }
        // both cubes end up in solid leafs, the gap between them is empty
        let solid: Vec<_> = tree.leafs().into_iter().filter(|&l| tree.nodes[l].contents == ContentFlags::SOLID).collect();
        assert_eq!(solid.len(), 2);
        let gap = tree.point_leaf(&planes, &[48.0, 16.0, 16.0]);
        assert!(tree.nodes[gap].contents.is_empty());
        let inside = tree.point_leaf(&planes, &[80.0, 16.0, 16.0]);
        assert_eq!(tree.nodes[inside].contents, ContentFlags::SOLID);
    }

    #[test]
    fn test_detail_splits_come_last() {
        let mut planes = PlaneRegistry::new();
        let mut stats = Stats::default();
        let wall = fragment(&mut planes, [0.0; 3], [32.0, 128.0, 64.0]);
        let mut crate_box = fragment(&mut planes, [64.0, 32.0, 0.0], [96.0, 64.0, 32.0]);
        crate_box.original = 1;
        crate_box.contents = ContentFlags::SOLID | ContentFlags::DETAIL;
        let tree =
            brush_bsp(&mut planes, vec![wall, crate_box], &[0.0; 3], &[96.0, 128.0, 512.0], &mut stats).unwrap();

        // the first split comes from the structural wall
        let head = &tree.nodes[tree.headnode];
        assert!(!head.detail_separator);
        let plane = planes.get(head.planenum.unwrap());
        assert!(plane.dist == 32.0 || plane.dist == 64.0);
        assert!(tree.nodes.iter().any(|n| n.detail_separator));
    }
}
