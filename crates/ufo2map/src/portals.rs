// portals.rs -- Portals between the leafs of a tree
//
// Every leaf is bounded by portals. A portal separates exactly two leafs
// (or a leaf and the outside node) and is listed in both.

use log::{info, warn};
use ufo2map_common::q_shared::{add_point_to_bounds, clear_bounds, dot_product, vector_negate};

use crate::brush::MapBrush;
use crate::planes::{Plane, PlaneRegistry};
use crate::polylib::{Winding, ON_EPSILON};
use crate::stats::Stats;
use crate::tree::{Portal, SideRef, Tree};

/// Padding around the brush bounds so no leaf has a null volume.
pub const SIDESPACE: f32 = 8.0;
const BASE_WINDING_EPSILON: f32 = 0.001;
const SPLIT_WINDING_EPSILON: f32 = 0.001;

fn add_portal_to_nodes(tree: &mut Tree, p: usize, front: usize, back: usize) {
    tree.portals[p].nodes = [front, back];
    tree.nodes[front].portals.push(p);
    tree.nodes[back].portals.push(p);
}

fn remove_portal_from_node(tree: &mut Tree, p: usize, node: usize) {
    tree.nodes[node].portals.retain(|&x| x != p);
}

fn alloc_portal(tree: &mut Tree, plane: Plane, onnode: Option<usize>, winding: Winding) -> usize {
    tree.portals.push(Portal {
        plane,
        onnode,
        nodes: [0, 0],
        winding,
        sidefound: false,
        side: None,
        face: [None, None],
    });
    tree.portals.len() - 1
}

/// The six portals of the padded bounding box, opening onto the outside node.
fn make_headnode_portals(tree: &mut Tree) {
    let mut bounds = [tree.mins, tree.maxs];
    for i in 0..3 {
        bounds[0][i] -= SIDESPACE;
        bounds[1][i] += SIDESPACE;
    }

    let head = tree.headnode;
    let outside = tree.outside_node;
    let mut bplanes = Vec::with_capacity(6);
    let mut portals = Vec::with_capacity(6);
    for i in 0..3 {
        for j in 0..2 {
            let mut normal = [0.0; 3];
            let dist;
            if j == 1 {
                normal[i] = -1.0;
                dist = -bounds[j][i];
            } else {
                normal[i] = 1.0;
                dist = bounds[j][i];
            }
            let plane = Plane { normal, dist, plane_type: i as i32 };
            let p = alloc_portal(tree, plane, None, Winding::base_for_plane(&normal, dist));
            add_portal_to_nodes(tree, p, head, outside);
            bplanes.push(plane);
            portals.push(p);
        }
    }

    // clip the base windings by all the other planes
    for (i, &p) in portals.iter().enumerate() {
        let mut w = Some(std::mem::take(&mut tree.portals[p].winding));
        for (j, plane) in bplanes.iter().enumerate() {
            if i == j {
                continue;
            }
            let Some(cur) = w.take() else { break };
            w = cur.chop(&plane.normal, plane.dist, ON_EPSILON);
        }
        tree.portals[p].winding = w.unwrap_or_default();
    }
}

/// Polygon on the node plane clipped by all parent planes.
fn base_winding_for_node(tree: &Tree, planes: &PlaneRegistry, node: usize) -> Option<Winding> {
    let planenum = tree.nodes[node].planenum?;
    let plane = planes.get(planenum);
    let mut w = Some(Winding::base_for_plane(&plane.normal, plane.dist));

    let mut child = node;
    let mut parent = tree.nodes[node].parent;
    while let Some(n) = parent {
        let Some(cur) = w.take() else { break };
        let pn = tree.nodes[n].planenum?;
        let plane = planes.get(pn);
        w = if tree.nodes[n].children[0] == child {
            cur.chop(&plane.normal, plane.dist, BASE_WINDING_EPSILON)
        } else {
            cur.chop(&vector_negate(&plane.normal), -plane.dist, BASE_WINDING_EPSILON)
        };
        child = n;
        parent = tree.nodes[n].parent;
    }
    w
}

/// Create the portal on the node's own plane, clipped to the node volume.
fn make_node_portal(tree: &mut Tree, planes: &PlaneRegistry, node: usize) {
    let mut w = base_winding_for_node(tree, planes, node);

    for &p in &tree.nodes[node].portals {
        let Some(cur) = w.take() else { break };
        let portal = &tree.portals[p];
        w = if portal.nodes[0] == node {
            cur.chop(&portal.plane.normal, portal.plane.dist, ON_EPSILON)
        } else {
            cur.chop(&vector_negate(&portal.plane.normal), -portal.plane.dist, ON_EPSILON)
        };
    }

    let Some(w) = w else { return };
    if w.is_tiny() {
        return;
    }
    let (Some(planenum), [front, back]) = (tree.nodes[node].planenum, tree.nodes[node].children) else {
        return;
    };
    let p = alloc_portal(tree, *planes.get(planenum), Some(node), w);
    add_portal_to_nodes(tree, p, front, back);
}

/// Move the node's portals onto its children, cutting those that cross
/// the node plane.
fn split_node_portals(tree: &mut Tree, planes: &PlaneRegistry, node: usize) {
    let Some(planenum) = tree.nodes[node].planenum else { return };
    let plane = *planes.get(planenum);
    let [f, b] = tree.nodes[node].children;

    for p in std::mem::take(&mut tree.nodes[node].portals) {
        let side = tree.portals[p].side_of(node);
        let other = tree.portals[p].nodes[1 - side];
        remove_portal_from_node(tree, p, other);

        let (front, back) =
            tree.portals[p].winding.clip_epsilon(&plane.normal, plane.dist, SPLIT_WINDING_EPSILON);
        let front = front.filter(|w| !w.is_tiny());
        let back = back.filter(|w| !w.is_tiny());

        let attach = |tree: &mut Tree, p: usize, child: usize| {
            if side == 0 {
                add_portal_to_nodes(tree, p, child, other);
            } else {
                add_portal_to_nodes(tree, p, other, child);
            }
        };

        match (front, back) {
            (None, None) => tree.portals[p].winding = Winding::default(),
            (None, Some(_)) => attach(tree, p, b),
            (Some(_), None) => attach(tree, p, f),
            (Some(fw), Some(bw)) => {
                let mut new_portal = tree.portals[p].clone();
                new_portal.winding = bw;
                tree.portals.push(new_portal);
                let np = tree.portals.len() - 1;
                tree.portals[p].winding = fw;
                attach(tree, p, f);
                attach(tree, np, b);
            }
        }
    }
}

fn calc_node_bounds(tree: &mut Tree, node: usize) {
    let (mut mins, mut maxs) = clear_bounds();
    for &p in &tree.nodes[node].portals {
        for pt in &tree.portals[p].winding.p {
            add_point_to_bounds(pt, &mut mins, &mut maxs);
        }
    }
    tree.nodes[node].mins = mins;
    tree.nodes[node].maxs = maxs;
}

fn make_tree_portals_r(tree: &mut Tree, planes: &PlaneRegistry, node: usize) {
    calc_node_bounds(tree, node);
    let (mins, maxs) = (tree.nodes[node].mins, tree.nodes[node].maxs);
    if mins[0] >= maxs[0] {
        warn!("node without a volume");
    }
    if (0..3).any(|i| mins[i] < -8000.0 || maxs[i] > 8000.0) {
        warn!("node with unbounded volume");
    }
    if tree.nodes[node].is_leaf() {
        return;
    }

    make_node_portal(tree, planes, node);
    split_node_portals(tree, planes, node);

    let [front, back] = tree.nodes[node].children;
    make_tree_portals_r(tree, planes, front);
    make_tree_portals_r(tree, planes, back);
}

pub fn make_tree_portals(tree: &mut Tree, planes: &PlaneRegistry, stats: &mut Stats) {
    info!("--- MakeTreePortals ---");
    make_headnode_portals(tree);
    make_tree_portals_r(tree, planes, tree.headnode);
    let live = tree.portals.iter().filter(|p| !p.winding.is_empty()).count();
    stats.portals += live;
    info!("{:5} portals", live);
}

// ============================================================
// Portal sides
// ============================================================

/// The brush side that best explains the content change across a portal:
/// one lying on the portal plane if possible, else the closest facing one.
pub fn find_portal_side(tree: &mut Tree, brushes: &[MapBrush], planes: &PlaneRegistry, p: usize) {
    let portal = &tree.portals[p];
    let [n0, n1] = portal.nodes;
    let viscontents = (tree.nodes[n0].contents ^ tree.nodes[n1].contents).visible();
    if viscontents.is_empty() {
        return;
    }
    let Some(planenum) = portal.onnode.and_then(|n| tree.nodes[n].planenum) else {
        return;
    };
    let p1 = planes.get(planenum);

    let mut bestside = None;
    let mut bestdot = 0.0;
    'search: for n in [n0, n1] {
        for bb in &tree.nodes[n].brushlist {
            let brush = &brushes[bb.original];
            if !brush.contents.intersects(viscontents) {
                continue;
            }
            for (i, side) in brush.sides.iter().enumerate() {
                if side.bevel {
                    continue;
                }
                let sr = SideRef { brush: bb.original, side: i };
                if side.planenum & !1 == planenum {
                    bestside = Some(sr);
                    break 'search;
                }
                let p2 = planes.get(side.planenum & !1);
                let dot = dot_product(&p1.normal, &p2.normal);
                if dot > bestdot {
                    bestdot = dot;
                    bestside = Some(sr);
                }
            }
        }
    }

    if bestside.is_none() {
        warn!("side not found for portal");
    }
    let portal = &mut tree.portals[p];
    portal.sidefound = true;
    portal.side = bestside;
}

fn mark_visible_sides_r(tree: &mut Tree, brushes: &mut [MapBrush], planes: &PlaneRegistry, node: usize) {
    if !tree.nodes[node].is_leaf() {
        let [front, back] = tree.nodes[node].children;
        mark_visible_sides_r(tree, brushes, planes, front);
        mark_visible_sides_r(tree, brushes, planes, back);
        return;
    }

    // empty leafs are never boundary leafs
    if tree.nodes[node].contents.is_empty() {
        return;
    }

    for p in tree.nodes[node].portals.clone() {
        if tree.portals[p].onnode.is_none() {
            continue; // edge of world
        }
        if !tree.portals[p].sidefound {
            find_portal_side(tree, brushes, planes, p);
        }
        if let Some(sr) = tree.portals[p].side {
            brushes[sr.brush].sides[sr.side].visible = true;
        }
    }
}

/// Recompute the visible flags of brushes `start..end` from the portals
/// that actually separate different contents.
pub fn mark_visible_sides(tree: &mut Tree, brushes: &mut [MapBrush], planes: &PlaneRegistry, start: usize, end: usize) {
    info!("--- MarkVisibleSides ---");
    for b in &mut brushes[start..end] {
        for s in &mut b.sides {
            s.visible = false;
        }
    }
    mark_visible_sides_r(tree, brushes, planes, tree.headnode);
}
