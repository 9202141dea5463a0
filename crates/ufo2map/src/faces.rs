// faces.rs -- Drawable faces from the portals of a tree
//
// Faces are created on the node that owns the portal, merged with their
// coplanar neighbors and cut down to the surface cache size. Before the
// tree is written, all face vertexes are welded and every edge that has
// another vertex lying on it is split so no cracks show.

use log::{debug, info};
use ufo2map_common::q_shared::{
    cross_product, dot_product, vector_compare_epsilon, vector_length, vector_ma, vector_normalize, vector_subtract,
    ContentFlags, SurfaceFlags, Vec3,
};
use ufo2map_common::qfiles::{DVertex, TexInfo, MAXEDGES, MAX_MAP_VERTS};

use crate::brush::MapBrush;
use crate::config::CompileConfig;
use crate::error::{push_checked, CompileError, Result};
use crate::planes::PlaneRegistry;
use crate::polylib::{Winding, ON_EPSILON};
use crate::stats::Stats;
use crate::tree::{Face, FaceState, Tree};

pub const EQUAL_EPSILON: f32 = 0.001;
const CONTINUOUS_EPSILON: f32 = 0.001;

const INTEGRAL_EPSILON: f32 = 0.01;
const POINT_EPSILON: f32 = 0.5;
const OFF_EPSILON: f32 = 0.5;

const MAX_SUPERVERTS: usize = 512;
const HASH_SIZE: usize = 64;

fn surface_flags(ti: &TexInfo) -> SurfaceFlags {
    SurfaceFlags::from_bits_retain(ti.surface_flags)
}

/// Copy of `f` standing on its own, with a new winding.
fn face_from_face(f: &Face, winding: Option<Winding>) -> Face {
    Face {
        winding,
        state: FaceState::Unsplit,
        vertexnums: Vec::new(),
        outputnumber: None,
        ..f.clone()
    }
}

// ============================================================
// Merging
// ============================================================

/// If two polygons share an edge and the edges meeting at its ends keep
/// the union convex, return the union.
pub fn try_merge_winding(f1: &Winding, f2: &Winding, planenormal: &Vec3) -> Option<Winding> {
    let (n1, n2) = (f1.len(), f2.len());

    // common edge: p1 -> p2 in f1 runs p4 -> p3 in f2
    let mut found = None;
    'outer: for i in 0..n1 {
        let p1 = &f1.p[i];
        let p2 = &f1.p[(i + 1) % n1];
        for j in 0..n2 {
            let p3 = &f2.p[j];
            let p4 = &f2.p[(j + 1) % n2];
            if vector_compare_epsilon(p1, p4, EQUAL_EPSILON) && vector_compare_epsilon(p2, p3, EQUAL_EPSILON) {
                found = Some((i, j));
                break 'outer;
            }
        }
    }
    let (i, j) = found?;
    let p1 = f1.p[i];
    let p2 = f1.p[(i + 1) % n1];

    // slope of the connected lines; colinear points can go
    let back = f1.p[(i + n1 - 1) % n1];
    let mut normal = cross_product(planenormal, &vector_subtract(&p1, &back));
    vector_normalize(&mut normal);
    let back = f2.p[(j + 2) % n2];
    let dot = dot_product(&vector_subtract(&back, &p1), &normal);
    if dot > CONTINUOUS_EPSILON {
        return None;
    }
    let keep1 = dot < -CONTINUOUS_EPSILON;

    let back = f1.p[(i + 2) % n1];
    let mut normal = cross_product(planenormal, &vector_subtract(&back, &p2));
    vector_normalize(&mut normal);
    let back = f2.p[(j + n2 - 1) % n2];
    let dot = dot_product(&vector_subtract(&back, &p2), &normal);
    if dot > CONTINUOUS_EPSILON {
        return None;
    }
    let keep2 = dot < -CONTINUOUS_EPSILON;

    let mut p = Vec::with_capacity(n1 + n2);
    let mut k = (i + 1) % n1;
    while k != i {
        if k != (i + 1) % n1 || keep2 {
            p.push(f1.p[k]);
        }
        k = (k + 1) % n1;
    }
    let mut l = (j + 1) % n2;
    while l != j {
        if l != (j + 1) % n2 || keep1 {
            p.push(f2.p[l]);
        }
        l = (l + 1) % n2;
    }
    Some(Winding::new(p))
}

fn try_merge(f1: &Face, f2: &Face, planenormal: &Vec3) -> Option<Face> {
    let (Some(w1), Some(w2)) = (&f1.winding, &f2.winding) else {
        return None;
    };
    if f1.texinfo != f2.texinfo || f1.planenum != f2.planenum || f1.contents != f2.contents {
        return None;
    }
    let w = try_merge_winding(w1, w2, planenormal)?;
    Some(face_from_face(f1, Some(w)))
}

// ============================================================
// Face creation
// ============================================================

struct FaceBuilder<'a> {
    tree: &'a mut Tree,
    brushes: &'a [MapBrush],
    planes: &'a PlaneRegistry,
    texinfo: &'a [TexInfo],
    config: &'a CompileConfig,
    stats: &'a mut Stats,
}

impl FaceBuilder<'_> {
    /// The face of portal `p` seen from `nodes[pside]`, if any is drawn.
    fn face_from_portal(&self, p: usize, pside: usize) -> Option<Face> {
        let portal = &self.tree.portals[p];
        // portal does not bridge different visible contents
        let sr = portal.side?;
        let side = &self.brushes[sr.brush].sides[sr.side];

        if side.surface_flags.contains(SurfaceFlags::NODRAW) && !side.surface_flags.contains(SurfaceFlags::SKIP) {
            return None;
        }

        let planenum = (side.planenum & !1) | pside;
        let own = self.tree.nodes[portal.nodes[pside]].contents;
        let other = self.tree.nodes[portal.nodes[1 - pside]].contents;

        // never show the inside of a window
        if own.contains(ContentFlags::WINDOW) && (own ^ other).visible() == ContentFlags::WINDOW {
            return None;
        }

        let flags = surface_flags(&self.texinfo[side.texinfo]);
        // nothing looks at the underside from above, unless it emits light
        if !self.config.nobackclip
            && self.planes.get(planenum).normal[2] < -0.9
            && !flags.contains(SurfaceFlags::LIGHT)
        {
            return None;
        }
        if flags.contains(SurfaceFlags::NODRAW) {
            return None;
        }

        let winding = if pside == 1 { portal.winding.reversed() } else { portal.winding.clone() };
        let mut face = Face::new(planenum, side.texinfo, own, winding);
        face.portal = Some(p);
        Some(face)
    }

    fn merge_node_faces(&mut self, node: usize) {
        let Some(planenum) = self.tree.nodes[node].planenum else { return };
        let normal = self.planes.get(planenum).normal;

        // merged faces go to the end so they are tried again
        let mut i = 0;
        while i < self.tree.nodes[node].faces.len() {
            let f1 = self.tree.nodes[node].faces[i];
            i += 1;
            if !self.tree.faces[f1].is_live() {
                continue;
            }
            for j in 0..i - 1 {
                let f2 = self.tree.nodes[node].faces[j];
                if !self.tree.faces[f2].is_live() {
                    continue;
                }
                let Some(merged) = try_merge(&self.tree.faces[f1], &self.tree.faces[f2], &normal) else {
                    continue;
                };
                let nf = self.tree.alloc_face(merged);
                self.tree.faces[f1].state = FaceState::Merged(nf);
                self.tree.faces[f2].state = FaceState::Merged(nf);
                self.tree.nodes[node].faces.push(nf);
                self.stats.merged += 1;
                break;
            }
        }
    }

    /// Chop faces larger than the surface cache wants.
    fn subdivide_face(&mut self, node: usize, f: usize) -> Result<()> {
        if !self.tree.faces[f].is_live() {
            return Ok(());
        }
        let tex = &self.texinfo[self.tree.faces[f].texinfo];
        // not surface cached
        if surface_flags(tex).contains(SurfaceFlags::WARP) {
            return Ok(());
        }

        let size = self.config.subdivide_size;
        for axis in 0..2 {
            let Some(w) = &self.tree.faces[f].winding else { return Ok(()) };
            let mut temp = [tex.vecs[axis][0], tex.vecs[axis][1], tex.vecs[axis][2]];
            let (mut mins, mut maxs) = (f32::MAX, f32::MIN);
            for p in &w.p {
                let v = dot_product(p, &temp);
                mins = mins.min(v);
                maxs = maxs.max(v);
            }
            if maxs - mins <= size {
                continue;
            }

            self.stats.subdivided += 1;
            let v = vector_normalize(&mut temp);
            let dist = (mins + size - 16.0) / v;
            let (Some(front), Some(back)) = w.clip_epsilon(&temp, dist, ON_EPSILON) else {
                return Err(CompileError::SubdivisionFailed);
            };

            let a = self.tree.alloc_face(face_from_face(&self.tree.faces[f], Some(front)));
            let b = self.tree.alloc_face(face_from_face(&self.tree.faces[f], Some(back)));
            self.tree.faces[f].state = FaceState::Split(a, b);
            self.tree.nodes[node].faces.extend([a, b]);

            self.subdivide_face(node, a)?;
            return self.subdivide_face(node, b);
        }
        Ok(())
    }

    fn subdivide_node_faces(&mut self, node: usize) -> Result<()> {
        for f in self.tree.nodes[node].faces.clone() {
            self.subdivide_face(node, f)?;
        }
        Ok(())
    }

    fn make_faces_r(&mut self, node: usize) -> Result<()> {
        if !self.tree.nodes[node].is_leaf() {
            let [front, back] = self.tree.nodes[node].children;
            self.make_faces_r(front)?;
            self.make_faces_r(back)?;

            if !self.config.nomerge {
                self.merge_node_faces(node);
            }
            if !self.config.nosubdiv {
                self.subdivide_node_faces(node)?;
            }
            return Ok(());
        }

        // solid leafs never have visible faces
        if self.tree.nodes[node].contents.contains(ContentFlags::SOLID) {
            return Ok(());
        }

        for p in self.tree.nodes[node].portals.clone() {
            let s = self.tree.portals[p].side_of(node);
            let Some(onnode) = self.tree.portals[p].onnode else { continue };
            let Some(face) = self.face_from_portal(p, s) else { continue };
            let f = self.tree.alloc_face(face);
            self.tree.portals[p].face[s] = Some(f);
            self.tree.nodes[onnode].faces.push(f);
            self.stats.node_faces += 1;
        }
        Ok(())
    }
}

/// Create, merge and subdivide the faces of every portal between
/// different visible contents.
pub fn make_faces(
    tree: &mut Tree,
    brushes: &[MapBrush],
    planes: &PlaneRegistry,
    texinfo: &[TexInfo],
    config: &CompileConfig,
    stats: &mut Stats,
) -> Result<()> {
    info!("--- MakeFaces ---");
    let before = (stats.node_faces, stats.merged, stats.subdivided);
    let head = tree.headnode;
    let mut builder = FaceBuilder { tree, brushes, planes, texinfo, config, stats: &mut *stats };
    builder.make_faces_r(head)?;
    info!("{:5} makefaces", stats.node_faces - before.0);
    info!("{:5} merged", stats.merged - before.1);
    info!("{:5} subdivided", stats.subdivided - before.2);
    Ok(())
}

// ============================================================
// Vertex welding and T-junctions
// ============================================================

fn hash_coord(v: f32) -> i32 {
    (4096 + (v + 0.5) as i32) >> 7
}

/// Spatial hash over x/y of the vertexes emitted for one model.
struct VertexHash {
    heads: Vec<Option<usize>>,
    /// Next vertex in the same bucket, by vertex number.
    chain: Vec<Option<usize>>,
}

impl VertexHash {
    fn new() -> Self {
        Self { heads: vec![None; HASH_SIZE * HASH_SIZE], chain: Vec::new() }
    }

    fn hash(v: &Vec3) -> Result<usize> {
        let (x, y) = (hash_coord(v[0]), hash_coord(v[1]));
        let range = 0..HASH_SIZE as i32;
        if !range.contains(&x) || !range.contains(&y) {
            return Err(CompileError::VertexOutOfRange(*v));
        }
        Ok(y as usize * HASH_SIZE + x as usize)
    }

    fn bucket(&self, h: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.heads[h], move |&v| self.chain.get(v).copied().flatten())
    }

    /// Number of the vertex at `p`, snapping near integral coordinates and
    /// reusing vertexes within POINT_EPSILON.
    fn vertexnum(&mut self, vertexes: &mut Vec<DVertex>, p: &Vec3, stats: &mut Stats) -> Result<usize> {
        stats.total_verts += 1;

        let mut vert = *p;
        for c in &mut vert {
            if (*c - c.round()).abs() < INTEGRAL_EPSILON {
                *c = c.round();
            }
        }

        let h = Self::hash(&vert)?;
        let existing = self.bucket(h).find(|&v| {
            let q = &vertexes[v].point;
            (0..3).all(|i| (q[i] - vert[i]).abs() < POINT_EPSILON)
        });
        if let Some(v) = existing {
            return Ok(v);
        }

        let v = push_checked(vertexes, DVertex { point: vert }, "vertexes", MAX_MAP_VERTS)?;
        if self.chain.len() <= v {
            self.chain.resize(v + 1, None);
        }
        self.chain[v] = self.heads[h];
        self.heads[h] = Some(v);
        stats.unique_verts += 1;
        Ok(v)
    }

    /// Vertexes in the buckets covering the x/y box of an edge.
    fn edge_verts(&self, v1: &Vec3, v2: &Vec3) -> Vec<usize> {
        let clamp = |c: i32| c.clamp(0, HASH_SIZE as i32 - 1) as usize;
        let (x1, x2) = (clamp(hash_coord(v1[0])), clamp(hash_coord(v2[0])));
        let (y1, y2) = (clamp(hash_coord(v1[1])), clamp(hash_coord(v2[1])));
        let mut out = Vec::new();
        for x in x1.min(x2)..=x1.max(x2) {
            for y in y1.min(y2)..=y1.max(y2) {
                out.extend(self.bucket(y * HASH_SIZE + x));
            }
        }
        out
    }
}

/// Put `superverts` into face `f`, starting at `base`. Faces with more
/// than MAXEDGES vertexes become a chain of split faces.
fn face_from_superverts(tree: &mut Tree, node: usize, mut f: usize, superverts: &[usize], mut base: usize, stats: &mut Stats) {
    let n = superverts.len();
    let mut remaining = n;
    while remaining > MAXEDGES {
        stats.face_overflows += 1;

        let mut first = face_from_face(&tree.faces[f], None);
        first.vertexnums = (0..MAXEDGES).map(|i| superverts[(i + base) % n]).collect();
        let a = tree.alloc_face(first);
        let b = tree.alloc_face(face_from_face(&tree.faces[f], None));
        tree.faces[f].state = FaceState::Split(a, b);
        tree.nodes[node].faces.extend([a, b]);
        f = b;

        remaining -= MAXEDGES - 2;
        base = (base + MAXEDGES - 1) % n;
    }
    tree.faces[f].vertexnums = (0..remaining).map(|i| superverts[(i + base) % n]).collect();
}

struct EdgeFixer<'a> {
    vertexes: &'a [DVertex],
    edge_verts: Vec<usize>,
    edge_start: Vec3,
    edge_dir: Vec3,
    superverts: Vec<usize>,
}

impl EdgeFixer<'_> {
    fn test_edge(&mut self, start: f32, end: f32, p1: usize, p2: usize, startvert: usize, stats: &mut Stats) -> Result<()> {
        if p1 == p2 {
            stats.degenerate_edges += 1;
            return Ok(());
        }

        for k in startvert..self.edge_verts.len() {
            let j = self.edge_verts[k];
            if j == p1 || j == p2 {
                continue;
            }
            let p = self.vertexes[j].point;
            let dist = dot_product(&vector_subtract(&p, &self.edge_start), &self.edge_dir);
            if dist <= start || dist >= end {
                continue; // off an end
            }
            let exact = vector_ma(&self.edge_start, dist, &self.edge_dir);
            if vector_length(&vector_subtract(&p, &exact)) > OFF_EPSILON {
                continue; // not on the edge
            }

            stats.tjunctions += 1;
            self.test_edge(start, dist, p1, j, k + 1, stats)?;
            return self.test_edge(dist, end, j, p2, k + 1, stats);
        }

        // p1 -> p2 is free of tjunctions
        if self.superverts.len() >= MAX_SUPERVERTS {
            return Err(CompileError::CapacityExceeded { what: "superverts", limit: MAX_SUPERVERTS });
        }
        self.superverts.push(p1);
        Ok(())
    }
}

fn fix_face_edges(tree: &mut Tree, node: usize, f: usize, vertexes: &[DVertex], hash: &VertexHash, stats: &mut Stats) -> Result<()> {
    if !tree.faces[f].is_live() {
        return Ok(());
    }
    let vertexnums = tree.faces[f].vertexnums.clone();
    let numpoints = vertexnums.len();
    let mut fixer = EdgeFixer {
        vertexes,
        edge_verts: Vec::new(),
        edge_start: [0.0; 3],
        edge_dir: [0.0; 3],
        superverts: Vec::new(),
    };
    let mut start = Vec::with_capacity(numpoints);
    let mut count = Vec::with_capacity(numpoints);

    for i in 0..numpoints {
        let p1 = vertexnums[i];
        let p2 = vertexnums[(i + 1) % numpoints];
        fixer.edge_start = vertexes[p1].point;
        let e2 = vertexes[p2].point;
        fixer.edge_verts = hash.edge_verts(&fixer.edge_start, &e2);
        fixer.edge_dir = vector_subtract(&e2, &fixer.edge_start);
        let len = vector_normalize(&mut fixer.edge_dir);

        start.push(fixer.superverts.len());
        fixer.test_edge(0.0, len, p1, p2, 0, stats)?;
        count.push(fixer.superverts.len() - start[i]);
    }

    if fixer.superverts.len() < 3 {
        tree.faces[f].vertexnums.clear();
        stats.collapsed_faces += 1;
        return Ok(());
    }

    // start on a vertex without tjunctions on either side, trifans crack
    // on them otherwise
    let good = (0..numpoints).find(|&i| count[i] == 1 && count[(i + numpoints - 1) % numpoints] == 1);
    let base = match good {
        Some(i) => start[i],
        None => {
            stats.bad_start_verts += 1;
            0
        }
    };

    face_from_superverts(tree, node, f, &fixer.superverts, base, stats);
    Ok(())
}

fn split_nodes_preorder(tree: &Tree) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![tree.headnode];
    while let Some(n) = stack.pop() {
        if !tree.nodes[n].is_leaf() {
            out.push(n);
            stack.push(tree.nodes[n].children[1]);
            stack.push(tree.nodes[n].children[0]);
        }
    }
    out
}

/// Weld the vertexes of all live faces of the tree into `vertexes` and
/// split edges on T-junctions.
pub fn fix_tjuncs(tree: &mut Tree, vertexes: &mut Vec<DVertex>, config: &CompileConfig, stats: &mut Stats) -> Result<()> {
    info!("--- FixTjuncs ---");
    let mut hash = VertexHash::new();
    let nodes = split_nodes_preorder(tree);

    let (total, unique) = (stats.total_verts, stats.unique_verts);
    for &node in &nodes {
        for f in tree.nodes[node].faces.clone() {
            if !tree.faces[f].is_live() {
                continue;
            }
            let Some(w) = tree.faces[f].winding.clone() else { continue };
            let mut superverts = Vec::with_capacity(w.len());
            for p in &w.p {
                let v = if config.noweld {
                    stats.total_verts += 1;
                    stats.unique_verts += 1;
                    push_checked(vertexes, DVertex { point: *p }, "vertexes", MAX_MAP_VERTS)?
                } else {
                    hash.vertexnum(vertexes, p, stats)?
                };
                superverts.push(v);
            }
            face_from_superverts(tree, node, f, &superverts, 0, stats);
        }
    }
    info!("{:5} unique from {}", stats.unique_verts - unique, stats.total_verts - total);

    if config.notjunc {
        return Ok(());
    }
    let before = stats.tjunctions;
    for &node in &nodes {
        for f in tree.nodes[node].faces.clone() {
            fix_face_edges(tree, node, f, vertexes, &hash, stats)?;
        }
    }
    debug!("{:5} edges added by tjunctions", stats.tjunctions - before);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::tests::box_brush;
    use crate::tree::{Node, Portal, SideRef};
    use assert_approx_eq::assert_approx_eq;

    /// Rectangle on z = 0 facing up.
    fn rect(x0: f32, x1: f32, y0: f32, y1: f32) -> Winding {
        Winding::base_for_plane(&[0.0, 0.0, 1.0], 0.0)
            .chop(&[1.0, 0.0, 0.0], x0, ON_EPSILON)
            .and_then(|w| w.chop(&[-1.0, 0.0, 0.0], -x1, ON_EPSILON))
            .and_then(|w| w.chop(&[0.0, 1.0, 0.0], y0, ON_EPSILON))
            .and_then(|w| w.chop(&[0.0, -1.0, 0.0], -y1, ON_EPSILON))
            .unwrap()
    }

    /// Tree whose head node lies on z = 0 and holds `windings` as faces.
    fn flat_tree(planes: &mut PlaneRegistry, windings: Vec<Winding>) -> (Tree, usize) {
        let planenum = planes.find_float_plane(&[0.0, 0.0, 1.0], 0.0).unwrap();
        let mut tree = Tree::new();
        let head = tree.headnode;
        let front = tree.alloc_node(Node { parent: Some(head), ..Default::default() });
        let back = tree.alloc_node(Node { parent: Some(head), contents: ContentFlags::SOLID, ..Default::default() });
        tree.nodes[head].planenum = Some(planenum);
        tree.nodes[head].children = [front, back];
        for w in windings {
            let f = tree.alloc_face(Face::new(planenum, 0, ContentFlags::empty(), w));
            tree.nodes[head].faces.push(f);
        }
        (tree, head)
    }

    fn live_faces(tree: &Tree, node: usize) -> Vec<usize> {
        tree.nodes[node].faces.iter().copied().filter(|&f| tree.faces[f].is_live()).collect()
    }

    fn texinfo_xy() -> Vec<TexInfo> {
        let mut ti = TexInfo::default();
        ti.vecs = [[1.0, 0.0, 0.0, 0.0], [0.0, -1.0, 0.0, 0.0]];
        vec![ti]
    }

    // ============================================================
    // Merging
    // ============================================================

    #[test]
    fn test_merge_neighbors_into_rectangle() {
        let a = rect(0.0, 16.0, 0.0, 32.0);
        let b = rect(16.0, 32.0, 0.0, 32.0);
        let m = try_merge_winding(&a, &b, &[0.0, 0.0, 1.0]).unwrap();
        assert_eq!(m.len(), 4);
        assert_approx_eq!(m.area(), 32.0 * 32.0, 0.01);
    }

    #[test]
    fn test_merge_needs_a_common_edge() {
        let a = rect(0.0, 16.0, 0.0, 16.0);
        let b = rect(16.0, 32.0, 0.0, 32.0);
        assert!(try_merge_winding(&a, &b, &[0.0, 0.0, 1.0]).is_none());
        let c = rect(64.0, 80.0, 0.0, 16.0);
        assert!(try_merge_winding(&a, &c, &[0.0, 0.0, 1.0]).is_none());
    }

    #[test]
    fn test_merge_node_faces_respects_texinfo() {
        let mut planes = PlaneRegistry::new();
        let (mut tree, head) = flat_tree(
            &mut planes,
            vec![rect(0.0, 16.0, 0.0, 16.0), rect(16.0, 32.0, 0.0, 16.0), rect(32.0, 48.0, 0.0, 16.0)],
        );
        let third = tree.nodes[head].faces[2];
        tree.faces[third].texinfo = 1;
        let config = CompileConfig::default();
        let mut stats = Stats::default();
        let mut b = FaceBuilder { tree: &mut tree, brushes: &[], planes: &planes, texinfo: &[], config: &config, stats: &mut stats };
        b.merge_node_faces(head);

        assert_eq!(stats.merged, 1);
        let live = live_faces(&tree, head);
        assert_eq!(live.len(), 2);
        assert!(live.contains(&third));
        let first = tree.nodes[head].faces[0];
        assert!(matches!(tree.faces[first].state, FaceState::Merged(_)));
    }

    // ============================================================
    // Subdivision
    // ============================================================

    #[test]
    fn test_subdivide_long_face() {
        let mut planes = PlaneRegistry::new();
        let (mut tree, head) = flat_tree(&mut planes, vec![rect(0.0, 4096.0, 0.0, 64.0)]);
        let texinfo = texinfo_xy();
        let config = CompileConfig { subdivide_size: 1024.0, ..Default::default() };
        let mut stats = Stats::default();
        let mut b = FaceBuilder { tree: &mut tree, brushes: &[], planes: &planes, texinfo: &texinfo, config: &config, stats: &mut stats };
        b.subdivide_node_faces(head).unwrap();

        let live = live_faces(&tree, head);
        assert!(live.len() >= 4);
        let mut area = 0.0;
        for f in live {
            let w = tree.faces[f].winding.as_ref().unwrap();
            let (mins, maxs) = w.bounds();
            assert!(maxs[0] - mins[0] <= 1024.0 + ON_EPSILON);
            area += w.area();
        }
        assert_approx_eq!(area, 4096.0 * 64.0, 1.0);
    }

    #[test]
    fn test_warped_faces_are_not_subdivided() {
        let mut planes = PlaneRegistry::new();
        let (mut tree, head) = flat_tree(&mut planes, vec![rect(0.0, 4096.0, 0.0, 64.0)]);
        let mut texinfo = texinfo_xy();
        texinfo[0].surface_flags = SurfaceFlags::WARP.bits();
        let config = CompileConfig { subdivide_size: 1024.0, ..Default::default() };
        let mut stats = Stats::default();
        let mut b = FaceBuilder { tree: &mut tree, brushes: &[], planes: &planes, texinfo: &texinfo, config: &config, stats: &mut stats };
        b.subdivide_node_faces(head).unwrap();
        assert_eq!(stats.subdivided, 0);
        assert_eq!(live_faces(&tree, head).len(), 1);
    }

    // ============================================================
    // Portal faces
    // ============================================================

    fn window_tree(planes: &mut PlaneRegistry, normal_z: f32) -> (Tree, Vec<MapBrush>, usize) {
        let brushes = vec![box_brush(planes, [0.0; 3], [16.0; 3])];
        let side = brushes[0].sides.iter().position(|s| planes.get(s.planenum).normal[2] == normal_z).unwrap();
        let planenum = brushes[0].sides[side].planenum & !1;

        let mut tree = Tree::new();
        let head = tree.headnode;
        let empty = tree.alloc_node(Node { parent: Some(head), ..Default::default() });
        let window = tree.alloc_node(Node { parent: Some(head), contents: ContentFlags::WINDOW, ..Default::default() });
        tree.nodes[head].planenum = Some(planenum);
        tree.nodes[head].children = [empty, window];
        tree.portals.push(Portal {
            plane: *planes.get(planenum),
            onnode: Some(head),
            nodes: [empty, window],
            winding: rect(0.0, 16.0, 0.0, 16.0),
            sidefound: true,
            side: Some(SideRef { brush: 0, side }),
            face: [None, None],
        });
        (tree, brushes, 0)
    }

    #[test]
    fn test_window_faces_only_from_outside() {
        let mut planes = PlaneRegistry::new();
        let (mut tree, brushes, p) = window_tree(&mut planes, 1.0);
        let texinfo = vec![TexInfo::default()];
        let config = CompileConfig::default();
        let mut stats = Stats::default();
        let b = FaceBuilder { tree: &mut tree, brushes: &brushes, planes: &planes, texinfo: &texinfo, config: &config, stats: &mut stats };

        let outside = b.face_from_portal(p, 0).unwrap();
        assert!(outside.contents.is_empty());
        assert_eq!(outside.planenum & 1, 0);
        assert!(b.face_from_portal(p, 1).is_none());
    }

    #[test]
    fn test_downward_faces_are_back_clipped() {
        let mut planes = PlaneRegistry::new();
        let (mut tree, brushes, p) = window_tree(&mut planes, 1.0);
        let texinfo = vec![TexInfo::default()];
        tree.nodes[2].contents = ContentFlags::SOLID;
        tree.nodes[3].contents = ContentFlags::empty();

        let config = CompileConfig::default();
        let mut stats = Stats::default();
        let b = FaceBuilder { tree: &mut tree, brushes: &brushes, planes: &planes, texinfo: &texinfo, config: &config, stats: &mut stats };
        // seen from the back the face points down
        assert!(b.face_from_portal(p, 1).is_none());

        let config = CompileConfig { nobackclip: true, ..Default::default() };
        let b = FaceBuilder { config: &config, ..b };
        let f = b.face_from_portal(p, 1).unwrap();
        assert_eq!(f.planenum & 1, 1);
        assert_eq!(f.winding.unwrap().p, rect(0.0, 16.0, 0.0, 16.0).reversed().p);
    }

    // ============================================================
    // T-junctions
    // ============================================================

    #[test]
    fn test_tjunction_gets_split() {
        let mut planes = PlaneRegistry::new();
        let (mut tree, head) = flat_tree(
            &mut planes,
            vec![rect(0.0, 64.0, 0.0, 32.0), rect(0.0, 32.0, 32.0, 64.0), rect(32.0, 64.0, 32.0, 64.0)],
        );
        let big = tree.nodes[head].faces[0];
        let mut vertexes = vec![DVertex::default()];
        let config = CompileConfig::default();
        let mut stats = Stats::default();
        fix_tjuncs(&mut tree, &mut vertexes, &config, &mut stats).unwrap();

        assert_eq!(stats.total_verts, 12);
        assert_eq!(stats.unique_verts, 8);
        assert_eq!(vertexes.len(), 9);
        assert_eq!(stats.tjunctions, 1);
        assert_eq!(tree.faces[big].vertexnums.len(), 5);
        let mid = vertexes.iter().position(|v| v.point == [32.0, 32.0, 0.0]).unwrap();
        assert!(tree.faces[big].vertexnums.contains(&mid));
    }

    #[test]
    fn test_notjunc_only_welds() {
        let mut planes = PlaneRegistry::new();
        let (mut tree, head) = flat_tree(
            &mut planes,
            vec![rect(0.0, 64.0, 0.0, 32.0), rect(0.0, 32.0, 32.0, 64.0), rect(32.0, 64.0, 32.0, 64.0)],
        );
        let mut vertexes = Vec::new();
        let config = CompileConfig { notjunc: true, ..Default::default() };
        let mut stats = Stats::default();
        fix_tjuncs(&mut tree, &mut vertexes, &config, &mut stats).unwrap();
        assert_eq!(stats.tjunctions, 0);
        assert!(tree.nodes[head].faces.iter().all(|&f| tree.faces[f].vertexnums.len() == 4));
    }

    #[test]
    fn test_many_sided_face_is_split_into_chain() {
        let mut tree = Tree::new();
        let head = tree.headnode;
        tree.nodes[head].planenum = Some(0);
        let f = tree.alloc_face(Face::new(0, 0, ContentFlags::empty(), Winding::default()));
        tree.nodes[head].faces.push(f);
        let superverts: Vec<usize> = (0..30).collect();
        let mut stats = Stats::default();
        face_from_superverts(&mut tree, head, f, &superverts, 0, &mut stats);

        assert_eq!(stats.face_overflows, 1);
        let live = live_faces(&tree, head);
        assert_eq!(live.len(), 2);
        assert_eq!(tree.faces[live[0]].vertexnums.len(), MAXEDGES);
        assert_eq!(tree.faces[live[1]].vertexnums.len(), 30 - (MAXEDGES - 2));
        assert!(live.iter().all(|&f| tree.faces[f].vertexnums.len() <= MAXEDGES));
    }

    #[test]
    fn test_vertex_outside_world_is_an_error() {
        let mut planes = PlaneRegistry::new();
        let w = Winding::new(vec![[5000.0, 0.0, 0.0], [5000.0, 16.0, 0.0], [5016.0, 16.0, 0.0]]);
        let (mut tree, _) = flat_tree(&mut planes, vec![w]);
        let mut vertexes = Vec::new();
        let mut stats = Stats::default();
        let res = fix_tjuncs(&mut tree, &mut vertexes, &CompileConfig::default(), &mut stats);
        assert!(matches!(res, Err(CompileError::VertexOutOfRange(_))));
    }
}
