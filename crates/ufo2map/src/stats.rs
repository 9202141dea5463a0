// stats.rs -- Counters collected while compiling

use log::info;

/// Running totals for one compilation. Each phase takes `&mut Stats`
/// and bumps the counters it owns; the driver logs the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub brushes: usize,
    pub sides: usize,
    pub axial_bevels: usize,
    pub edge_bevels: usize,
    pub planes: usize,
    pub nodes: usize,
    pub leafs: usize,
    pub pruned: usize,
    pub portals: usize,
    pub node_faces: usize,
    pub merged: usize,
    pub subdivided: usize,
    pub total_verts: usize,
    pub unique_verts: usize,
    pub degenerate_edges: usize,
    pub tjunctions: usize,
    pub face_overflows: usize,
    pub collapsed_faces: usize,
    pub bad_start_verts: usize,
    pub edges: usize,
    pub shared_edges: usize,
    pub floor_cells: usize,
    pub open_connections: usize,
}

impl Stats {
    pub fn log(&self) {
        info!("{:>7} brushes", self.brushes);
        info!("{:>7} brush sides", self.sides);
        info!("{:>7} axial bevels", self.axial_bevels);
        info!("{:>7} edge bevels", self.edge_bevels);
        info!("{:>7} planes", self.planes);
        info!("{:>7} nodes", self.nodes);
        info!("{:>7} leafs", self.leafs);
        info!("{:>7} pruned nodes", self.pruned);
        info!("{:>7} portals", self.portals);
        info!("{:>7} node faces", self.node_faces);
        info!("{:>7} merged", self.merged);
        info!("{:>7} subdivided", self.subdivided);
        info!("{:>7} unique verts of {}", self.unique_verts, self.total_verts);
        info!("{:>7} edges degenerated", self.degenerate_edges);
        info!("{:>7} edges added by tjunctions", self.tjunctions);
        info!("{:>7} faces added by tjunctions", self.face_overflows);
        info!("{:>7} faces degenerated", self.collapsed_faces);
        info!("{:>7} bad start verts", self.bad_start_verts);
        info!("{:>7} edges ({} shared)", self.edges, self.shared_edges);
        info!("{:>7} floor cells", self.floor_cells);
        info!("{:>7} open connections", self.open_connections);
    }
}
