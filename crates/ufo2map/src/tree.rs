// tree.rs -- BSP tree storage shared by the later compile phases
//
// Nodes, portals and faces live in arenas owned by `Tree` and refer to each
// other by index. Node 0 is the implicit outside leaf every hull portal
// opens onto.

use log::info;
use ufo2map_common::q_shared::{clear_bounds, dot_product, ContentFlags, Vec3};

use crate::brushbsp::BspBrush;
use crate::error::{CompileError, Result};
use crate::planes::{Plane, PlaneRegistry};
use crate::polylib::Winding;
use crate::stats::Stats;

/// A side of one of the map brushes: `(brush, side)` indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideRef {
    pub brush: usize,
    pub side: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Split plane, always the positive facing one of its pair. None for leafs.
    pub planenum: Option<usize>,
    pub parent: Option<usize>,
    pub children: [usize; 2],
    pub mins: Vec3,
    pub maxs: Vec3,
    pub contents: ContentFlags,
    pub brushlist: Vec<BspBrush>,
    pub faces: Vec<usize>,
    pub portals: Vec<usize>,
    /// Convex region of space the node covers.
    pub volume: Option<BspBrush>,
    pub detail_separator: bool,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.planenum.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Portal {
    pub plane: Plane,
    /// Node whose split created the portal. None on the outer hull.
    pub onnode: Option<usize>,
    /// `nodes[0]` is in front of the plane.
    pub nodes: [usize; 2],
    pub winding: Winding,
    pub sidefound: bool,
    pub side: Option<SideRef>,
    pub face: [Option<usize>; 2],
}

impl Portal {
    /// Index in `nodes` of `node`.
    pub fn side_of(&self, node: usize) -> usize {
        usize::from(self.nodes[1] == node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceState {
    Unsplit,
    /// Absorbed into the face with this index.
    Merged(usize),
    /// Replaced by two smaller faces.
    Split(usize, usize),
}

#[derive(Debug, Clone)]
pub struct Face {
    pub planenum: usize,
    pub texinfo: usize,
    pub contents: ContentFlags,
    pub winding: Option<Winding>,
    pub portal: Option<usize>,
    pub state: FaceState,
    pub vertexnums: Vec<usize>,
    /// Index in the faces lump once written.
    pub outputnumber: Option<usize>,
}

impl Face {
    pub fn new(planenum: usize, texinfo: usize, contents: ContentFlags, winding: Winding) -> Self {
        Self {
            planenum,
            texinfo,
            contents,
            winding: Some(winding),
            portal: None,
            state: FaceState::Unsplit,
            vertexnums: Vec::new(),
            outputnumber: None,
        }
    }

    /// Unsplit and unmerged, so it still stands for itself.
    pub fn is_live(&self) -> bool {
        self.state == FaceState::Unsplit
    }

    pub fn numpoints(&self) -> usize {
        self.winding.as_ref().map_or(0, Winding::len)
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    pub nodes: Vec<Node>,
    pub portals: Vec<Portal>,
    pub faces: Vec<Face>,
    pub headnode: usize,
    pub outside_node: usize,
    /// Bounds of the brushes the tree was built from.
    pub mins: Vec3,
    pub maxs: Vec3,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub const OUTSIDE: usize = 0;

    /// Empty tree: the outside leaf and a head leaf.
    pub fn new() -> Self {
        let (mins, maxs) = clear_bounds();
        let outside = Node { contents: ContentFlags::SOLID, ..Default::default() };
        Self {
            nodes: vec![outside, Node::default()],
            portals: Vec::new(),
            faces: Vec::new(),
            headnode: 1,
            outside_node: Self::OUTSIDE,
            mins,
            maxs,
        }
    }

    pub fn alloc_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn alloc_face(&mut self, face: Face) -> usize {
        self.faces.push(face);
        self.faces.len() - 1
    }

    /// Leafs reachable from the head node, in front-first order.
    pub fn leafs(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![self.headnode];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n];
            if node.is_leaf() {
                out.push(n);
            } else {
                stack.push(node.children[1]);
                stack.push(node.children[0]);
            }
        }
        out
    }

    /// Split nodes reachable from the head node.
    pub fn split_nodes(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.headnode];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n];
            if !node.is_leaf() {
                count += 1;
                stack.extend(node.children);
            }
        }
        count
    }

    /// Leaf containing `p`.
    pub fn point_leaf(&self, planes: &PlaneRegistry, p: &Vec3) -> usize {
        let mut n = self.headnode;
        while let Some(planenum) = self.nodes[n].planenum {
            let plane = planes.get(planenum);
            let d = dot_product(p, &plane.normal) - plane.dist;
            n = self.nodes[n].children[usize::from(d < 0.0)];
        }
        n
    }

    fn prune_nodes_r(&mut self, n: usize, stats: &mut Stats) -> Result<()> {
        if self.nodes[n].is_leaf() {
            return Ok(());
        }
        let [c0, c1] = self.nodes[n].children;
        self.prune_nodes_r(c0, stats)?;
        self.prune_nodes_r(c1, stats)?;

        let solid_leaf = |node: &Node| node.is_leaf() && node.contents.contains(ContentFlags::SOLID);
        if !(solid_leaf(&self.nodes[c0]) && solid_leaf(&self.nodes[c1])) {
            return Ok(());
        }
        if !self.nodes[n].faces.is_empty() {
            return Err(CompileError::FacesBetweenSolids { node: n });
        }

        let mut brushes = std::mem::take(&mut self.nodes[c1].brushlist);
        brushes.append(&mut self.nodes[c0].brushlist);

        let node = &mut self.nodes[n];
        node.planenum = None;
        node.contents = ContentFlags::SOLID;
        node.detail_separator = false;
        node.brushlist = brushes;
        stats.pruned += 1;
        Ok(())
    }

    /// Collapse nodes whose children are both solid leafs. A face on such
    /// a node means the face pass went wrong and is fatal.
    pub fn prune_nodes(&mut self, stats: &mut Stats) -> Result<()> {
        info!("--- PruneNodes ---");
        let before = stats.pruned;
        self.prune_nodes_r(self.headnode, stats)?;
        info!("{:5} pruned nodes", stats.pruned - before);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tree: &mut Tree, parent: usize, contents: ContentFlags) -> usize {
        tree.alloc_node(Node { parent: Some(parent), contents, ..Default::default() })
    }

    fn split(tree: &mut Tree, n: usize, planenum: usize, front: usize, back: usize) {
        let node = &mut tree.nodes[n];
        node.planenum = Some(planenum);
        node.children = [front, back];
    }

    // ============================================================
    // Pruning
    // ============================================================

    #[test]
    fn test_prune_collapses_solid_runs() {
        let mut tree = Tree::new();
        let head = tree.headnode;
        let inner = tree.alloc_node(Node { parent: Some(head), ..Default::default() });
        let empty = leaf(&mut tree, head, ContentFlags::empty());
        split(&mut tree, head, 0, empty, inner);
        let a = leaf(&mut tree, inner, ContentFlags::SOLID);
        let b = leaf(&mut tree, inner, ContentFlags::SOLID | ContentFlags::DETAIL);
        split(&mut tree, inner, 2, a, b);

        assert_eq!(tree.split_nodes(), 2);
        let mut stats = Stats::default();
        tree.prune_nodes(&mut stats).unwrap();
        assert_eq!(stats.pruned, 1);
        assert!(tree.nodes[inner].is_leaf());
        assert_eq!(tree.nodes[inner].contents, ContentFlags::SOLID);
        // the head node still separates empty from solid
        assert_eq!(tree.split_nodes(), 1);
        assert_eq!(tree.leafs(), vec![empty, inner]);
    }

    #[test]
    fn test_prune_cascades_upwards() {
        let mut tree = Tree::new();
        let head = tree.headnode;
        let inner = tree.alloc_node(Node { parent: Some(head), ..Default::default() });
        let solid = leaf(&mut tree, head, ContentFlags::SOLID);
        split(&mut tree, head, 0, inner, solid);
        let a = leaf(&mut tree, inner, ContentFlags::SOLID);
        let b = leaf(&mut tree, inner, ContentFlags::SOLID);
        split(&mut tree, inner, 2, a, b);

        let mut stats = Stats::default();
        tree.prune_nodes(&mut stats).unwrap();
        assert_eq!(stats.pruned, 2);
        assert!(tree.nodes[head].is_leaf());
        assert_eq!(tree.leafs(), vec![head]);
    }

    #[test]
    fn test_prune_keeps_mixed_contents() {
        let mut tree = Tree::new();
        let head = tree.headnode;
        let a = leaf(&mut tree, head, ContentFlags::SOLID);
        let b = leaf(&mut tree, head, ContentFlags::WATER);
        split(&mut tree, head, 0, a, b);
        let mut stats = Stats::default();
        tree.prune_nodes(&mut stats).unwrap();
        assert_eq!(stats.pruned, 0);
        assert!(!tree.nodes[head].is_leaf());
    }

    #[test]
    fn test_faces_between_solid_leafs_are_fatal() {
        let mut tree = Tree::new();
        let head = tree.headnode;
        let a = leaf(&mut tree, head, ContentFlags::SOLID);
        let b = leaf(&mut tree, head, ContentFlags::SOLID);
        split(&mut tree, head, 0, a, b);
        tree.nodes[head].faces.push(0);
        let mut stats = Stats::default();
        let err = tree.prune_nodes(&mut stats).unwrap_err();
        assert!(matches!(err, CompileError::FacesBetweenSolids { node } if node == head));
        assert_eq!(stats.pruned, 0);
    }
}
