// cmodel.rs -- Box tracing against compiled brush data
//
// The trace model is immutable once built, so any number of threads can
// trace against it at the same time. Per-trace bookkeeping (which brushes
// were already clipped) lives in a `TraceScratch` owned by the caller.

use crate::bspfile::BspData;
use crate::q_shared::{
    box_on_plane_side, dot_product, plane_type_for_normal, CPlane, ContentFlags, Trace, Vec3,
};

// ============================================================
// Internal structures
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct CNode {
    pub plane_idx: usize,
    pub children: [i32; 2], // negative numbers are leafs
}

#[derive(Debug, Clone, Default)]
pub struct CLeaf {
    pub contents: ContentFlags,
    pub firstleafbrush: usize,
    pub numleafbrushes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CBrush {
    pub contents: ContentFlags,
    pub firstbrushside: usize,
    pub numsides: usize,
}

const DIST_EPSILON: f32 = 0.03125;

// ============================================================
// Per-trace scratch space
// ============================================================

/// Marks brushes already tested during the current trace.
#[derive(Debug, Clone)]
pub struct TraceScratch {
    checkcount: u32,
    brush_checks: Vec<u32>,
}

impl TraceScratch {
    pub fn new(numbrushes: usize) -> Self {
        Self { checkcount: 0, brush_checks: vec![0; numbrushes] }
    }

    fn begin(&mut self) {
        self.checkcount = self.checkcount.wrapping_add(1);
        if self.checkcount == 0 {
            self.brush_checks.iter_mut().for_each(|c| *c = 0);
            self.checkcount = 1;
        }
    }

    /// True the first time a brush is seen in the current trace.
    fn first_visit(&mut self, brushnum: usize) -> bool {
        if self.brush_checks[brushnum] == self.checkcount {
            return false;
        }
        self.brush_checks[brushnum] = self.checkcount;
        true
    }
}

/// Parameters that stay fixed through one recursive trace.
struct TraceWork {
    contents: ContentFlags,
    mins: Vec3,
    maxs: Vec3,
    extents: Vec3,
    ispoint: bool,
}

// ============================================================
// Trace model
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct TraceModel {
    pub planes: Vec<CPlane>,
    pub nodes: Vec<CNode>,
    pub leafs: Vec<CLeaf>,
    pub leafbrushes: Vec<usize>,
    pub brushes: Vec<CBrush>,
    pub brushsides: Vec<usize>, // plane index per side
}

impl TraceModel {
    pub fn from_bsp(bsp: &BspData) -> Self {
        let planes = bsp
            .planes
            .iter()
            .map(|p| CPlane {
                normal: p.normal,
                dist: p.dist,
                plane_type: plane_type_for_normal(&p.normal),
            })
            .collect();
        let nodes = bsp
            .nodes
            .iter()
            .map(|n| CNode { plane_idx: n.planenum as usize, children: n.children })
            .collect();
        let leafs = bsp
            .leafs
            .iter()
            .map(|l| CLeaf {
                contents: ContentFlags::from_bits_retain(l.contents),
                firstleafbrush: l.firstleafbrush as usize,
                numleafbrushes: l.numleafbrushes as usize,
            })
            .collect();
        let brushes = bsp
            .brushes
            .iter()
            .map(|b| CBrush {
                contents: ContentFlags::from_bits_retain(b.contents),
                firstbrushside: b.firstside as usize,
                numsides: b.numsides as usize,
            })
            .collect();

        Self {
            planes,
            nodes,
            leafs,
            leafbrushes: bsp.leafbrushes.iter().map(|&b| b as usize).collect(),
            brushes,
            brushsides: bsp.brushsides.iter().map(|s| s.planenum as usize).collect(),
        }
    }

    pub fn scratch(&self) -> TraceScratch {
        TraceScratch::new(self.brushes.len())
    }

    // ============================================================
    // Point contents
    // ============================================================

    pub fn point_leafnum(&self, p: &Vec3, headnode: i32) -> usize {
        let mut num = headnode;
        while num >= 0 {
            let node = &self.nodes[num as usize];
            let plane = &self.planes[node.plane_idx];
            let d = dot_product(&plane.normal, p) - plane.dist;
            num = if d < 0.0 { node.children[1] } else { node.children[0] };
        }
        (-1 - num) as usize
    }

    pub fn point_contents(&self, p: &Vec3, headnode: i32) -> ContentFlags {
        if self.nodes.is_empty() {
            return ContentFlags::empty();
        }
        self.leafs[self.point_leafnum(p, headnode)].contents
    }

    // ============================================================
    // Box leaf lists
    // ============================================================

    fn box_leafnums_r(&self, mut nodenum: i32, mins: &Vec3, maxs: &Vec3, list: &mut Vec<usize>) {
        loop {
            if nodenum < 0 {
                list.push((-1 - nodenum) as usize);
                return;
            }

            let node = &self.nodes[nodenum as usize];
            let plane = &self.planes[node.plane_idx];
            match box_on_plane_side(mins, maxs, plane) {
                1 => nodenum = node.children[0],
                2 => nodenum = node.children[1],
                _ => {
                    self.box_leafnums_r(node.children[0], mins, maxs, list);
                    nodenum = node.children[1];
                }
            }
        }
    }

    pub fn box_leafnums(&self, mins: &Vec3, maxs: &Vec3, headnode: i32) -> Vec<usize> {
        let mut list = Vec::new();
        self.box_leafnums_r(headnode, mins, maxs, &mut list);
        list
    }

    // ============================================================
    // Brush clipping
    // ============================================================

    fn clip_box_to_brush(
        &self,
        work: &TraceWork,
        p1: &Vec3,
        p2: &Vec3,
        trace: &mut Trace,
        brush: &CBrush,
    ) {
        if brush.numsides == 0 {
            return;
        }

        let mut enterfrac: f32 = -1.0;
        let mut leavefrac: f32 = 1.0;
        let mut clipplane: Option<usize> = None;

        let mut getout = false;
        let mut startout = false;

        for i in 0..brush.numsides {
            let plane_idx = self.brushsides[brush.firstbrushside + i];
            let plane = &self.planes[plane_idx];

            let dist = if !work.ispoint {
                let mut ofs = [0.0f32; 3];
                for j in 0..3 {
                    ofs[j] = if plane.normal[j] < 0.0 { work.maxs[j] } else { work.mins[j] };
                }
                plane.dist - dot_product(&ofs, &plane.normal)
            } else {
                plane.dist
            };

            let d1 = dot_product(p1, &plane.normal) - dist;
            let d2 = dot_product(p2, &plane.normal) - dist;

            if d2 > 0.0 {
                getout = true;
            }
            if d1 > 0.0 {
                startout = true;
            }

            // completely in front of face, no intersection
            if d1 > 0.0 && d2 >= d1 {
                return;
            }
            if d1 <= 0.0 && d2 <= 0.0 {
                continue;
            }

            if d1 > d2 {
                let f = (d1 - DIST_EPSILON) / (d1 - d2);
                if f > enterfrac {
                    enterfrac = f;
                    clipplane = Some(plane_idx);
                }
            } else {
                let f = (d1 + DIST_EPSILON) / (d1 - d2);
                if f < leavefrac {
                    leavefrac = f;
                }
            }
        }

        if !startout {
            // original point was inside brush
            trace.startsolid = true;
            if !getout {
                trace.allsolid = true;
                trace.fraction = 0.0;
            }
            trace.contents = brush.contents;
            return;
        }

        if enterfrac < leavefrac && enterfrac > -1.0 && enterfrac < trace.fraction {
            trace.fraction = enterfrac.max(0.0);
            if let Some(idx) = clipplane {
                trace.plane = self.planes[idx];
            }
            trace.contents = brush.contents;
        }
    }

    fn test_box_in_brush(&self, work: &TraceWork, p1: &Vec3, trace: &mut Trace, brush: &CBrush) {
        if brush.numsides == 0 {
            return;
        }

        for i in 0..brush.numsides {
            let plane = &self.planes[self.brushsides[brush.firstbrushside + i]];

            let mut ofs = [0.0f32; 3];
            for j in 0..3 {
                ofs[j] = if plane.normal[j] < 0.0 { work.maxs[j] } else { work.mins[j] };
            }
            let dist = plane.dist - dot_product(&ofs, &plane.normal);
            let d1 = dot_product(p1, &plane.normal) - dist;

            // if completely in front of face, no intersection
            if d1 > 0.0 {
                return;
            }
        }

        trace.startsolid = true;
        trace.allsolid = true;
        trace.fraction = 0.0;
        trace.contents = brush.contents;
    }

    // ============================================================
    // Leaf and node traversal
    // ============================================================

    fn leaf_brushes<'a>(&'a self, leafnum: usize, work: &TraceWork) -> Option<&'a [usize]> {
        let leaf = &self.leafs[leafnum];
        if !leaf.contents.intersects(work.contents) {
            return None;
        }
        Some(&self.leafbrushes[leaf.firstleafbrush..leaf.firstleafbrush + leaf.numleafbrushes])
    }

    fn trace_to_leaf(
        &self,
        scratch: &mut TraceScratch,
        work: &TraceWork,
        leafnum: usize,
        start: &Vec3,
        end: &Vec3,
        trace: &mut Trace,
    ) {
        let Some(brushes) = self.leaf_brushes(leafnum, work) else {
            return;
        };
        for &brushnum in brushes {
            if !scratch.first_visit(brushnum) {
                continue; // already checked this brush in another leaf
            }
            let brush = &self.brushes[brushnum];
            if !brush.contents.intersects(work.contents) {
                continue;
            }
            self.clip_box_to_brush(work, start, end, trace, brush);
            if trace.fraction == 0.0 {
                return;
            }
        }
    }

    fn test_in_leaf(
        &self,
        scratch: &mut TraceScratch,
        work: &TraceWork,
        leafnum: usize,
        start: &Vec3,
        trace: &mut Trace,
    ) {
        let Some(brushes) = self.leaf_brushes(leafnum, work) else {
            return;
        };
        for &brushnum in brushes {
            if !scratch.first_visit(brushnum) {
                continue;
            }
            let brush = &self.brushes[brushnum];
            if !brush.contents.intersects(work.contents) {
                continue;
            }
            self.test_box_in_brush(work, start, trace, brush);
            if trace.fraction == 0.0 {
                return;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn recursive_hull_check(
        &self,
        scratch: &mut TraceScratch,
        work: &TraceWork,
        num: i32,
        p1f: f32,
        p2f: f32,
        p1: &Vec3,
        p2: &Vec3,
        start: &Vec3,
        end: &Vec3,
        trace: &mut Trace,
    ) {
        if trace.fraction <= p1f {
            return; // already hit something nearer
        }

        if num < 0 {
            self.trace_to_leaf(scratch, work, (-1 - num) as usize, start, end, trace);
            return;
        }

        let node = &self.nodes[num as usize];
        let plane = &self.planes[node.plane_idx];

        let (t1, t2, offset);
        if (0..3).contains(&plane.plane_type) {
            let pt = plane.plane_type as usize;
            t1 = p1[pt] - plane.dist;
            t2 = p2[pt] - plane.dist;
            offset = work.extents[pt];
        } else {
            t1 = dot_product(&plane.normal, p1) - plane.dist;
            t2 = dot_product(&plane.normal, p2) - plane.dist;
            offset = if work.ispoint {
                0.0
            } else {
                (work.extents[0] * plane.normal[0]).abs()
                    + (work.extents[1] * plane.normal[1]).abs()
                    + (work.extents[2] * plane.normal[2]).abs()
            };
        }

        // see which sides we need to consider
        if t1 >= offset && t2 >= offset {
            self.recursive_hull_check(scratch, work, node.children[0], p1f, p2f, p1, p2, start, end, trace);
            return;
        }
        if t1 < -offset && t2 < -offset {
            self.recursive_hull_check(scratch, work, node.children[1], p1f, p2f, p1, p2, start, end, trace);
            return;
        }

        // put the crosspoint DIST_EPSILON pixels on the near side
        let (side, frac, frac2);
        if t1 < t2 {
            let idist = 1.0 / (t1 - t2);
            side = 1usize;
            frac = ((t1 - offset + DIST_EPSILON) * idist).clamp(0.0, 1.0);
            frac2 = ((t1 + offset + DIST_EPSILON) * idist).clamp(0.0, 1.0);
        } else if t1 > t2 {
            let idist = 1.0 / (t1 - t2);
            side = 0usize;
            frac = ((t1 + offset + DIST_EPSILON) * idist).clamp(0.0, 1.0);
            frac2 = ((t1 - offset - DIST_EPSILON) * idist).clamp(0.0, 1.0);
        } else {
            side = 0;
            frac = 1.0;
            frac2 = 0.0;
        }

        let lerp = |f: f32| -> Vec3 {
            [
                p1[0] + f * (p2[0] - p1[0]),
                p1[1] + f * (p2[1] - p1[1]),
                p1[2] + f * (p2[2] - p1[2]),
            ]
        };

        // move up to the node
        let midf = p1f + (p2f - p1f) * frac;
        let mid = lerp(frac);
        self.recursive_hull_check(scratch, work, node.children[side], p1f, midf, p1, &mid, start, end, trace);

        // go past the node
        let midf2 = p1f + (p2f - p1f) * frac2;
        let mid2 = lerp(frac2);
        self.recursive_hull_check(scratch, work, node.children[side ^ 1], midf2, p2f, &mid2, p2, start, end, trace);
    }

    // ============================================================
    // Box trace
    // ============================================================

    /// Sweep the box `mins..maxs` from `start` to `end` through the tree
    /// rooted at `headnode`, stopping at brushes matching `brushmask`.
    /// A zero-length sweep is a position test.
    #[allow(clippy::too_many_arguments)]
    pub fn box_trace(
        &self,
        scratch: &mut TraceScratch,
        start: &Vec3,
        end: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        headnode: i32,
        brushmask: ContentFlags,
    ) -> Trace {
        scratch.begin();

        let mut trace = Trace::default();

        if self.nodes.is_empty() {
            trace.endpos = *end;
            return trace;
        }

        let ispoint = mins.iter().chain(maxs.iter()).all(|&c| c == 0.0);
        let extents = if ispoint {
            [0.0f32; 3]
        } else {
            [
                (-mins[0]).max(maxs[0]),
                (-mins[1]).max(maxs[1]),
                (-mins[2]).max(maxs[2]),
            ]
        };
        let work = TraceWork { contents: brushmask, mins: *mins, maxs: *maxs, extents, ispoint };

        // position test special case
        if start == end {
            let c1 = [start[0] + mins[0] - 1.0, start[1] + mins[1] - 1.0, start[2] + mins[2] - 1.0];
            let c2 = [start[0] + maxs[0] + 1.0, start[1] + maxs[1] + 1.0, start[2] + maxs[2] + 1.0];

            for leafnum in self.box_leafnums(&c1, &c2, headnode) {
                self.test_in_leaf(scratch, &work, leafnum, start, &mut trace);
                if trace.allsolid {
                    break;
                }
            }
            trace.endpos = *start;
            return trace;
        }

        self.recursive_hull_check(scratch, &work, headnode, 0.0, 1.0, start, end, start, end, &mut trace);

        if trace.fraction == 1.0 {
            trace.endpos = *end;
        } else {
            for i in 0..3 {
                trace.endpos[i] = start[i] + trace.fraction * (end[i] - start[i]);
            }
        }
        trace
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qfiles::{DBrush, DBrushSide, DLeaf, DNode, DPlane};
    use assert_approx_eq::assert_approx_eq;

    /// A single axial box brush `mins..maxs`, split off by its top plane.
    ///
    /// node 0 splits on z = maxs.z: front is the empty leaf 1, back goes
    /// to leaf 0 which holds the brush.
    fn box_model(mins: Vec3, maxs: Vec3) -> TraceModel {
        let mut bsp = BspData::default();
        let axial = |axis: usize, sign: f32, dist: f32| {
            let mut normal = [0.0; 3];
            normal[axis] = sign;
            DPlane { normal, dist, plane_type: axis as i32 }
        };
        for axis in 0..3 {
            bsp.planes.push(axial(axis, -1.0, -mins[axis]));
            bsp.planes.push(axial(axis, 1.0, maxs[axis]));
        }
        bsp.brushes.push(DBrush { firstside: 0, numsides: 6, contents: 1 });
        for i in 0..6 {
            bsp.brushsides.push(DBrushSide { planenum: i as u16, texinfo: 0 });
        }
        bsp.leafbrushes.push(0);
        bsp.leafs.push(DLeaf { contents: 1, firstleafbrush: 0, numleafbrushes: 1, ..Default::default() });
        bsp.leafs.push(DLeaf::default());
        bsp.nodes.push(DNode { planenum: 5, children: [-2, -1], ..Default::default() });
        TraceModel::from_bsp(&bsp)
    }

    #[test]
    fn test_point_contents() {
        let model = box_model([0.0; 3], [32.0, 32.0, 32.0]);
        assert_eq!(model.point_contents(&[16.0, 16.0, 16.0], 0), ContentFlags::SOLID);
        assert_eq!(model.point_contents(&[16.0, 16.0, 40.0], 0), ContentFlags::empty());
    }

    #[test]
    fn test_downward_box_trace_hits_top() {
        let model = box_model([0.0; 3], [32.0, 32.0, 32.0]);
        let mut scratch = model.scratch();
        let trace = model.box_trace(
            &mut scratch,
            &[16.0, 16.0, 100.0],
            &[16.0, 16.0, -100.0],
            &[-12.0, -12.0, 0.0],
            &[12.0, 12.0, 0.0],
            0,
            ContentFlags::SOLID,
        );
        assert!(trace.fraction < 1.0);
        assert!(!trace.startsolid);
        assert_approx_eq!(trace.endpos[2], 32.0, 0.1);
        assert_eq!(trace.plane.normal, [0.0, 0.0, 1.0]);
        assert_eq!(trace.contents, ContentFlags::SOLID);
    }

    #[test]
    fn test_mask_ignores_other_contents() {
        let model = box_model([0.0; 3], [32.0, 32.0, 32.0]);
        let mut scratch = model.scratch();
        let trace = model.box_trace(
            &mut scratch,
            &[16.0, 16.0, 100.0],
            &[16.0, 16.0, -100.0],
            &[0.0; 3],
            &[0.0; 3],
            0,
            ContentFlags::WATER,
        );
        assert_eq!(trace.fraction, 1.0);
        assert_eq!(trace.endpos, [16.0, 16.0, -100.0]);
    }

    #[test]
    fn test_position_test() {
        let model = box_model([0.0; 3], [32.0, 32.0, 32.0]);
        let mut scratch = model.scratch();
        let mins = [-4.0, -4.0, 0.0];
        let maxs = [4.0, 4.0, 0.0];

        let inside = [16.0, 16.0, 16.0];
        let trace = model.box_trace(&mut scratch, &inside, &inside, &mins, &maxs, 0, ContentFlags::SOLID);
        assert!(trace.startsolid);
        assert!(trace.allsolid);

        let above = [16.0, 16.0, 48.0];
        let trace = model.box_trace(&mut scratch, &above, &above, &mins, &maxs, 0, ContentFlags::SOLID);
        assert!(!trace.startsolid);
        assert_eq!(trace.fraction, 1.0);
    }

    #[test]
    fn test_sideways_trace_misses_past_brush() {
        let model = box_model([0.0; 3], [32.0, 32.0, 32.0]);
        let mut scratch = model.scratch();
        let trace = model.box_trace(
            &mut scratch,
            &[-50.0, 16.0, 40.0],
            &[80.0, 16.0, 40.0],
            &[-12.0, -12.0, 1.0],
            &[12.0, 12.0, 24.0],
            0,
            ContentFlags::SOLID,
        );
        assert_eq!(trace.fraction, 1.0);

        let trace = model.box_trace(
            &mut scratch,
            &[-50.0, 16.0, 20.0],
            &[80.0, 16.0, 20.0],
            &[-12.0, -12.0, 1.0],
            &[12.0, 12.0, 24.0],
            0,
            ContentFlags::SOLID,
        );
        assert!(trace.fraction < 1.0);
        assert_approx_eq!(trace.endpos[0], -12.0, 0.1);
    }

    #[test]
    fn test_scratch_wraps() {
        let mut scratch = TraceScratch::new(2);
        scratch.checkcount = u32::MAX;
        scratch.brush_checks[1] = 1;
        scratch.begin();
        assert_eq!(scratch.checkcount, 1);
        assert!(scratch.first_visit(1));
        assert!(!scratch.first_visit(1));
    }
}
