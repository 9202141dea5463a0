// writebsp.rs -- Emit trees, brushes and planes into the compiled map lumps

use log::{debug, info};
use ufo2map_common::bspfile::BspData;
use ufo2map_common::q_shared::{add_point_to_bounds, clear_bounds, ContentFlags, Vec3, VEC3_ORIGIN};
use ufo2map_common::qfiles::{
    DBrush, DBrushSide, DEdge, DFace, DLeaf, DModel, DNode, DVertex, TexInfo, MAX_MAP_BRUSHES,
    MAX_MAP_BRUSHSIDES, MAX_MAP_EDGES, MAX_MAP_FACES, MAX_MAP_LEAFBRUSHES, MAX_MAP_LEAFFACES,
    MAX_MAP_LEAFS, MAX_MAP_MODELS, MAX_MAP_NODES, MAX_MAP_PLANES, MAX_MAP_SURFEDGES, MAX_MAP_TEXINFO,
};

use crate::brush::MapBrush;
use crate::config::CompileConfig;
use crate::error::{check_capacity, push_checked, Result};
use crate::map::{unparse_entities, Entity};
use crate::planes::PlaneRegistry;
use crate::stats::Stats;
use crate::tree::{FaceState, Tree};

/// Owner of an emitted edge, for sharing it with one more face.
#[derive(Debug, Clone, Copy)]
struct EdgeOwner {
    contents: ContentFlags,
    shared: bool,
}

fn to_short(v: &Vec3) -> [i16; 3] {
    v.map(|c| c as i16)
}

/// Accumulates the lumps of one compiled map, model by model.
#[derive(Debug)]
pub struct BspWriter {
    pub bsp: BspData,
    edge_owners: Vec<EdgeOwner>,
    /// Edges below this index belong to earlier models and are never shared.
    firstmodeledge: usize,
    noshare: bool,
    nodes_with_faces: usize,
    nodes_without_faces: usize,
}

impl BspWriter {
    /// Empty lumps with the reserved slots in place: edge 0 can't be
    /// negated, vertex 0 and the solid leaf 0 mark errors.
    pub fn new(config: &CompileConfig) -> Self {
        let mut bsp = BspData::default();
        bsp.edges.push(DEdge::default());
        bsp.vertexes.push(DVertex::default());
        bsp.leafs.push(DLeaf { contents: ContentFlags::SOLID.bits(), ..Default::default() });
        Self {
            bsp,
            edge_owners: vec![EdgeOwner { contents: ContentFlags::empty(), shared: true }],
            firstmodeledge: 1,
            noshare: config.noshare,
            nodes_with_faces: 0,
            nodes_without_faces: 0,
        }
    }

    /// Start the model record for `entity`, bounded by its real brushes.
    pub fn begin_model(&mut self, entity: &Entity, brushes: &[MapBrush]) -> Result<()> {
        check_capacity("models", self.bsp.models.len(), MAX_MAP_MODELS)?;
        self.firstmodeledge = self.bsp.edges.len();

        let (mut mins, mut maxs) = clear_bounds();
        for b in &brushes[entity.firstbrush..entity.firstbrush + entity.numbrushes] {
            if b.sides.is_empty() {
                continue;
            }
            add_point_to_bounds(&b.mins, &mut mins, &mut maxs);
            add_point_to_bounds(&b.maxs, &mut mins, &mut maxs);
        }
        self.bsp.models.push(DModel {
            mins,
            maxs,
            origin: VEC3_ORIGIN,
            headnode: 0,
            firstface: self.bsp.faces.len() as i32,
            numfaces: 0,
        });
        Ok(())
    }

    pub fn end_model(&mut self) {
        let numfaces = self.bsp.faces.len() as i32;
        if let Some(m) = self.bsp.models.last_mut() {
            m.numfaces = numfaces - m.firstface;
        }
    }

    /// Index of the edge `v1 -> v2`, negative when an existing edge of
    /// this model is reused backwards. An edge is shared by at most two
    /// faces of the same contents.
    fn get_edge(&mut self, v1: usize, v2: usize, contents: ContentFlags, stats: &mut Stats) -> Result<i32> {
        let (v1, v2) = (v1 as u16, v2 as u16);
        if !self.noshare {
            for i in self.firstmodeledge..self.bsp.edges.len() {
                let e = &self.bsp.edges[i];
                let owner = &mut self.edge_owners[i];
                if v1 == e.v[1] && v2 == e.v[0] && owner.contents == contents && !owner.shared {
                    owner.shared = true;
                    stats.shared_edges += 1;
                    return Ok(-(i as i32));
                }
            }
        }

        let i = push_checked(&mut self.bsp.edges, DEdge { v: [v1, v2] }, "edges", MAX_MAP_EDGES)?;
        self.edge_owners.push(EdgeOwner { contents, shared: false });
        stats.edges += 1;
        Ok(i as i32)
    }

    fn emit_face(&mut self, tree: &mut Tree, f: usize, stats: &mut Stats) -> Result<()> {
        tree.faces[f].outputnumber = None;
        let face = &tree.faces[f];
        let n = face.vertexnums.len();
        // degenerate, or not a final face
        if n < 3 || !face.is_live() {
            return Ok(());
        }
        check_capacity("faces", self.bsp.faces.len(), MAX_MAP_FACES)?;

        let (planenum, texinfo, contents) = (face.planenum, face.texinfo, face.contents);
        let vertexnums = face.vertexnums.clone();
        let firstedge = self.bsp.surfedges.len() as i32;
        for i in 0..n {
            let e = self.get_edge(vertexnums[i], vertexnums[(i + 1) % n], contents, stats)?;
            push_checked(&mut self.bsp.surfedges, e, "surfedges", MAX_MAP_SURFEDGES)?;
        }

        tree.faces[f].outputnumber = Some(self.bsp.faces.len());
        self.bsp.faces.push(DFace {
            planenum: (planenum & !1) as u16,
            side: (planenum & 1) as i16,
            firstedge,
            numedges: n as i16,
            texinfo: texinfo as i16,
            ..Default::default()
        });
        Ok(())
    }

    /// Reference face `f` from the leaf whose face list starts at `first`,
    /// following merges and splits to the faces actually written.
    fn emit_mark_face(&mut self, tree: &Tree, first: usize, mut f: usize) -> Result<()> {
        loop {
            match tree.faces[f].state {
                FaceState::Merged(next) => f = next,
                FaceState::Split(a, b) => {
                    self.emit_mark_face(tree, first, a)?;
                    return self.emit_mark_face(tree, first, b);
                }
                FaceState::Unsplit => break,
            }
        }

        // degenerate face
        let Some(facenum) = tree.faces[f].outputnumber else { return Ok(()) };
        let facenum = facenum as u16;
        if !self.bsp.leaffaces[first..].contains(&facenum) {
            push_checked(&mut self.bsp.leaffaces, facenum, "leaffaces", MAX_MAP_LEAFFACES)?;
        }
        Ok(())
    }

    fn emit_leaf(&mut self, tree: &Tree, node: usize) -> Result<()> {
        check_capacity("leafs", self.bsp.leafs.len(), MAX_MAP_LEAFS)?;
        let n = &tree.nodes[node];

        let firstleafbrush = self.bsp.leafbrushes.len();
        for b in &n.brushlist {
            let brushnum = b.original as u16;
            if !self.bsp.leafbrushes[firstleafbrush..].contains(&brushnum) {
                push_checked(&mut self.bsp.leafbrushes, brushnum, "leafbrushes", MAX_MAP_LEAFBRUSHES)?;
            }
        }

        let firstleafface = self.bsp.leaffaces.len();
        // no leaffaces in solids
        if !n.contents.contains(ContentFlags::SOLID) {
            for &p in &n.portals {
                let s = tree.portals[p].side_of(node);
                if let Some(f) = tree.portals[p].face[s] {
                    self.emit_mark_face(tree, firstleafface, f)?;
                }
            }
        }

        self.bsp.leafs.push(DLeaf {
            contents: n.contents.bits(),
            cluster: -1,
            area: 0,
            mins: to_short(&n.mins),
            maxs: to_short(&n.maxs),
            firstleafface: firstleafface as u16,
            numleaffaces: (self.bsp.leaffaces.len() - firstleafface) as u16,
            firstleafbrush: firstleafbrush as u16,
            numleafbrushes: (self.bsp.leafbrushes.len() - firstleafbrush) as u16,
        });
        Ok(())
    }

    fn emit_draw_node_r(&mut self, tree: &mut Tree, node: usize, stats: &mut Stats) -> Result<i32> {
        let Some(planenum) = tree.nodes[node].planenum else {
            self.emit_leaf(tree, node)?;
            return Ok(-(self.bsp.leafs.len() as i32));
        };

        check_capacity("nodes", self.bsp.nodes.len(), MAX_MAP_NODES)?;
        let index = self.bsp.nodes.len();
        let n = &tree.nodes[node];
        self.bsp.nodes.push(DNode {
            planenum: planenum as i32,
            children: [0, 0],
            mins: to_short(&n.mins),
            maxs: to_short(&n.maxs),
            firstface: self.bsp.faces.len() as u16,
            numfaces: 0,
        });

        if n.faces.is_empty() {
            self.nodes_without_faces += 1;
        } else {
            self.nodes_with_faces += 1;
        }
        for f in n.faces.clone() {
            self.emit_face(tree, f, stats)?;
        }
        let numfaces = self.bsp.faces.len() as u16 - self.bsp.nodes[index].firstface;
        self.bsp.nodes[index].numfaces = numfaces;

        for (i, child) in tree.nodes[node].children.into_iter().enumerate() {
            self.bsp.nodes[index].children[i] = if tree.nodes[child].is_leaf() {
                self.emit_leaf(tree, child)?;
                -(self.bsp.leafs.len() as i32)
            } else {
                self.emit_draw_node_r(tree, child, stats)?
            };
        }
        Ok(index as i32)
    }

    /// Write the nodes, leafs and faces of `tree` as the current model.
    /// Returns the head node number; a leaf head is returned as `-(leaf + 1)`.
    pub fn write_tree(&mut self, tree: &mut Tree, stats: &mut Stats) -> Result<i32> {
        info!("--- WriteBSP ---");
        let (oldfaces, oldnodes, oldleafs) = (self.bsp.faces.len(), self.bsp.nodes.len(), self.bsp.leafs.len());
        self.nodes_with_faces = 0;
        self.nodes_without_faces = 0;

        let headnode = self.emit_draw_node_r(tree, tree.headnode, stats)?;
        if let Some(m) = self.bsp.models.last_mut() {
            m.headnode = headnode;
        }

        stats.nodes += self.bsp.nodes.len() - oldnodes;
        stats.leafs += self.bsp.leafs.len() - oldleafs;
        info!("{:5} nodes with faces", self.nodes_with_faces);
        info!("{:5} nodes without faces", self.nodes_without_faces);
        info!("{:5} faces", self.bsp.faces.len() - oldfaces);
        Ok(headnode)
    }

    /// Brush and side records for every map brush. Axial planes missing
    /// from a brush are added again so box traces stay correct.
    pub fn emit_brushes(&mut self, brushes: &[MapBrush], planes: &mut PlaneRegistry) -> Result<()> {
        check_capacity("brushes", brushes.len(), MAX_MAP_BRUSHES + 1)?;
        self.bsp.brushsides.clear();
        self.bsp.brushes.clear();

        for b in brushes {
            let firstside = self.bsp.brushsides.len();
            for s in &b.sides {
                let side = DBrushSide { planenum: s.planenum as u16, texinfo: s.texinfo as i16 };
                push_checked(&mut self.bsp.brushsides, side, "brushsides", MAX_MAP_BRUSHSIDES)?;
            }

            for axis in 0..3 {
                for sign in [-1.0f32, 1.0] {
                    let mut normal = VEC3_ORIGIN;
                    normal[axis] = sign;
                    let dist = if sign < 0.0 { -b.mins[axis] } else { b.maxs[axis] };
                    let planenum = planes.find_float_plane(&normal, dist)?;
                    if b.sides.iter().any(|s| s.planenum == planenum) {
                        continue;
                    }
                    let texinfo = self.bsp.brushsides.last().map_or(0, |s| s.texinfo);
                    let side = DBrushSide { planenum: planenum as u16, texinfo };
                    push_checked(&mut self.bsp.brushsides, side, "brushsides", MAX_MAP_BRUSHSIDES)?;
                }
            }

            self.bsp.brushes.push(DBrush {
                firstside: firstside as i32,
                numsides: (self.bsp.brushsides.len() - firstside) as i32,
                contents: b.contents.bits(),
            });
        }
        debug!("{} brushes, {} brush sides", self.bsp.brushes.len(), self.bsp.brushsides.len());
        Ok(())
    }

    /// All planes are kept since every brush is saved.
    pub fn emit_planes(&mut self, planes: &PlaneRegistry) -> Result<()> {
        check_capacity("planes", planes.len(), MAX_MAP_PLANES + 1)?;
        self.bsp.planes = planes.to_disk();
        Ok(())
    }

    pub fn emit_texinfo(&mut self, texinfo: &[TexInfo]) -> Result<()> {
        check_capacity("texinfo", texinfo.len(), MAX_MAP_TEXINFO + 1)?;
        self.bsp.texinfo = texinfo.to_vec();
        Ok(())
    }

    pub fn emit_entities(&mut self, entities: &[Entity]) -> Result<()> {
        self.bsp.entdata = unparse_entities(entities)?;
        Ok(())
    }

    pub fn finish(self) -> BspData {
        self.bsp
    }
}

/// Name every inline model `*N` in the order the models are written.
pub fn set_model_numbers(entities: &mut [Entity]) {
    let mut models = 1;
    for e in entities.iter_mut().skip(1) {
        if e.numbrushes > 0 {
            e.set_key_value("model", &format!("*{models}"));
            models += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::tests::box_brush;
    use crate::tree::{Face, Node, Portal};
    use crate::polylib::Winding;
    use crate::planes::Plane;

    fn square(z: f32) -> Winding {
        Winding::new(vec![[0.0, 0.0, z], [0.0, 16.0, z], [16.0, 16.0, z], [16.0, 0.0, z]])
    }

    // ============================================================
    // Edges
    // ============================================================

    #[test]
    fn test_edges_are_shared_once() {
        let mut w = BspWriter::new(&CompileConfig::default());
        let mut stats = Stats::default();
        let e = ContentFlags::empty();
        assert_eq!(w.get_edge(1, 2, e, &mut stats).unwrap(), 1);
        assert_eq!(w.get_edge(2, 1, e, &mut stats).unwrap(), -1);
        // a third face gets its own edge
        assert_eq!(w.get_edge(2, 1, e, &mut stats).unwrap(), 2);
        assert_eq!(w.get_edge(1, 2, e, &mut stats).unwrap(), -2);
        // different contents don't share
        assert_eq!(w.get_edge(2, 1, ContentFlags::WATER, &mut stats).unwrap(), 3);
        assert_eq!(w.get_edge(1, 2, e, &mut stats).unwrap(), 4);
        assert_eq!(stats.shared_edges, 2);
        assert_eq!(stats.edges, 4);
    }

    #[test]
    fn test_noshare_and_model_boundaries() {
        let mut stats = Stats::default();
        let mut w = BspWriter::new(&CompileConfig { noshare: true, ..Default::default() });
        let e = ContentFlags::empty();
        assert_eq!(w.get_edge(1, 2, e, &mut stats).unwrap(), 1);
        assert_eq!(w.get_edge(2, 1, e, &mut stats).unwrap(), 2);

        let mut w = BspWriter::new(&CompileConfig::default());
        assert_eq!(w.get_edge(1, 2, e, &mut stats).unwrap(), 1);
        w.begin_model(&Entity::default(), &[]).unwrap();
        assert_eq!(w.get_edge(2, 1, e, &mut stats).unwrap(), 2);
    }

    // ============================================================
    // Tree emission
    // ============================================================

    /// One split node with an empty front leaf, a solid back leaf and a
    /// portal carrying a single face.
    fn simple_tree() -> Tree {
        let mut tree = Tree::new();
        let head = tree.headnode;
        let front = tree.alloc_node(Node { parent: Some(head), ..Default::default() });
        let back = tree.alloc_node(Node { parent: Some(head), contents: ContentFlags::SOLID, ..Default::default() });
        tree.nodes[head].planenum = Some(4);
        tree.nodes[head].children = [front, back];

        let mut face = Face::new(4, 0, ContentFlags::empty(), square(16.0));
        face.vertexnums = vec![1, 2, 3, 4];
        let f = tree.alloc_face(face);
        tree.nodes[head].faces.push(f);

        tree.portals.push(Portal {
            plane: Plane { normal: [0.0, 0.0, 1.0], dist: 16.0, plane_type: 2 },
            onnode: Some(head),
            nodes: [front, back],
            winding: square(16.0),
            sidefound: true,
            side: None,
            face: [Some(f), None],
        });
        tree.nodes[front].portals.push(0);
        tree.nodes[back].portals.push(0);
        tree.nodes[back].brushlist.push(crate::brushbsp::BspBrush::from_map_brush(
            3,
            &box_brush(&mut PlaneRegistry::new(), [0.0; 3], [16.0; 3]),
        ));
        tree
    }

    #[test]
    fn test_write_tree_layout() {
        let mut w = BspWriter::new(&CompileConfig::default());
        let mut stats = Stats::default();
        let mut tree = simple_tree();
        w.begin_model(&Entity::default(), &[]).unwrap();
        let head = w.write_tree(&mut tree, &mut stats).unwrap();
        w.end_model();
        let bsp = w.finish();

        assert_eq!(head, 0);
        assert_eq!(bsp.nodes.len(), 1);
        // leaf 0 is reserved
        assert_eq!(bsp.leafs.len(), 3);
        assert_eq!(bsp.nodes[0].children, [-2, -3]);
        assert_eq!(bsp.nodes[0].planenum, 4);
        assert_eq!(bsp.nodes[0].numfaces, 1);

        let front = &bsp.leafs[1];
        assert_eq!(front.contents, 0);
        assert_eq!(front.numleaffaces, 1);
        assert_eq!(bsp.leaffaces[front.firstleafface as usize], 0);

        let back = &bsp.leafs[2];
        assert_eq!(back.contents, ContentFlags::SOLID.bits());
        assert_eq!(back.numleaffaces, 0);
        assert_eq!(back.numleafbrushes, 1);
        assert_eq!(bsp.leafbrushes[back.firstleafbrush as usize], 3);

        assert_eq!(bsp.faces.len(), 1);
        assert_eq!(bsp.faces[0].numedges, 4);
        assert_eq!(bsp.surfedges.len(), 4);
        assert_eq!(bsp.models[0].numfaces, 1);
    }

    #[test]
    fn test_leaf_faces_follow_merges_and_splits() {
        let mut tree = simple_tree();
        let head = tree.headnode;
        let orig = tree.nodes[head].faces[0];

        let mut a = Face::new(4, 0, ContentFlags::empty(), square(16.0));
        a.vertexnums = vec![1, 2, 3];
        let mut b = a.clone();
        b.vertexnums = vec![1, 3, 4];
        let merged = tree.alloc_face(Face::new(4, 0, ContentFlags::empty(), square(16.0)));
        let a = tree.alloc_face(a);
        let b = tree.alloc_face(b);
        tree.faces[orig].state = FaceState::Merged(merged);
        tree.faces[merged].state = FaceState::Split(a, b);
        tree.nodes[head].faces.extend([merged, a, b]);

        let mut w = BspWriter::new(&CompileConfig::default());
        let mut stats = Stats::default();
        w.begin_model(&Entity::default(), &[]).unwrap();
        w.write_tree(&mut tree, &mut stats).unwrap();
        let bsp = w.finish();

        assert_eq!(bsp.faces.len(), 2);
        let front = &bsp.leafs[1];
        assert_eq!(front.numleaffaces, 2);
        assert_eq!(tree.faces[orig].outputnumber, None);
        assert_eq!(tree.faces[a].outputnumber, Some(0));
        // the shared diagonal is written once
        assert_eq!(stats.shared_edges, 1);
    }

    // ============================================================
    // Brushes and entities
    // ============================================================

    #[test]
    fn test_emit_brushes_adds_missing_axial_sides() {
        let mut planes = PlaneRegistry::new();
        let mut b = box_brush(&mut planes, [0.0; 3], [16.0; 3]);
        let full = box_brush(&mut planes, [0.0; 3], [16.0; 3]);
        b.sides.truncate(5);

        let mut w = BspWriter::new(&CompileConfig::default());
        w.emit_brushes(&[full, b], &mut planes).unwrap();
        assert_eq!(w.bsp.brushes.len(), 2);
        assert_eq!(w.bsp.brushes[0].numsides, 6);
        assert_eq!(w.bsp.brushes[1].numsides, 6);
        let last = w.bsp.brushsides.last().unwrap();
        assert_eq!(last.planenum as usize, planes.find_float_plane(&[0.0, 0.0, -1.0], 0.0).unwrap());
    }

    #[test]
    fn test_model_numbers() {
        let mut ents = vec![
            Entity { numbrushes: 3, ..Default::default() },
            Entity { numbrushes: 1, ..Default::default() },
            Entity::default(),
            Entity { numbrushes: 2, ..Default::default() },
        ];
        set_model_numbers(&mut ents);
        assert_eq!(ents[0].value_for_key("model"), "");
        assert_eq!(ents[1].value_for_key("model"), "*1");
        assert_eq!(ents[2].value_for_key("model"), "");
        assert_eq!(ents[3].value_for_key("model"), "*2");
    }
}
