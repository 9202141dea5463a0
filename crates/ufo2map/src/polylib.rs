// polylib.rs -- Convex polygons on a plane
//
// A winding is an ordered, clockwise (seen from the front) loop of points.
// Clipping keeps points within `epsilon` of the plane on both sides.

use ufo2map_common::q_shared::{
    add_point_to_bounds, clear_bounds, cross_product, dot_product, vector_add, vector_length,
    vector_ma, vector_normalize, vector_scale, vector_subtract, Vec3, VEC3_ORIGIN,
};

/// Half extent of the polygon created for a bare plane.
pub const BASE_WINDING_SIZE: f32 = 8192.0;
pub const ON_EPSILON: f32 = 0.1;
const EDGE_LENGTH: f32 = 0.2;

pub const SIDE_FRONT: usize = 0;
pub const SIDE_BACK: usize = 1;
pub const SIDE_ON: usize = 2;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Winding {
    pub p: Vec<Vec3>,
}

impl Winding {
    pub fn new(p: Vec<Vec3>) -> Self {
        Self { p }
    }

    pub fn len(&self) -> usize {
        self.p.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p.is_empty()
    }

    /// A square of BASE_WINDING_SIZE half extent lying on the plane.
    pub fn base_for_plane(normal: &Vec3, dist: f32) -> Self {
        // major axis
        let mut max = -1.0;
        let mut x = 0;
        for (i, n) in normal.iter().enumerate() {
            if n.abs() > max {
                x = i;
                max = n.abs();
            }
        }

        let mut vup = VEC3_ORIGIN;
        if x == 2 {
            vup[0] = 1.0;
        } else {
            vup[2] = 1.0;
        }

        let v = dot_product(&vup, normal);
        vup = vector_ma(&vup, -v, normal);
        vector_normalize(&mut vup);

        let org = vector_scale(normal, dist);
        let vright = vector_scale(&cross_product(&vup, normal), BASE_WINDING_SIZE);
        let vup = vector_scale(&vup, BASE_WINDING_SIZE);

        Self {
            p: vec![
                vector_add(&vector_subtract(&org, &vright), &vup),
                vector_add(&vector_add(&org, &vright), &vup),
                vector_subtract(&vector_add(&org, &vright), &vup),
                vector_subtract(&vector_subtract(&org, &vright), &vup),
            ],
        }
    }

    pub fn reversed(&self) -> Self {
        Self { p: self.p.iter().rev().copied().collect() }
    }

    pub fn area(&self) -> f32 {
        let mut total = 0.0;
        for i in 2..self.p.len() {
            let d1 = vector_subtract(&self.p[i - 1], &self.p[0]);
            let d2 = vector_subtract(&self.p[i], &self.p[0]);
            total += 0.5 * vector_length(&cross_product(&d1, &d2));
        }
        total
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        let (mut mins, mut maxs) = clear_bounds();
        for p in &self.p {
            add_point_to_bounds(p, &mut mins, &mut maxs);
        }
        (mins, maxs)
    }

    pub fn center(&self) -> Vec3 {
        let mut center = VEC3_ORIGIN;
        for p in &self.p {
            center = vector_add(&center, p);
        }
        vector_scale(&center, 1.0 / self.p.len() as f32)
    }

    /// Normal and distance of the plane the points lie on.
    pub fn plane(&self) -> (Vec3, f32) {
        let v1 = vector_subtract(&self.p[1], &self.p[0]);
        let v2 = vector_subtract(&self.p[2], &self.p[0]);
        let mut normal = cross_product(&v2, &v1);
        vector_normalize(&mut normal);
        (normal, dot_product(&self.p[0], &normal))
    }

    /// Fewer than three edges longer than EDGE_LENGTH.
    pub fn is_tiny(&self) -> bool {
        let mut edges = 0;
        for i in 0..self.p.len() {
            let j = (i + 1) % self.p.len();
            if vector_length(&vector_subtract(&self.p[j], &self.p[i])) > EDGE_LENGTH {
                edges += 1;
                if edges == 3 {
                    return false;
                }
            }
        }
        true
    }

    /// Some point still sits on the base winding's rim.
    pub fn is_huge(&self) -> bool {
        self.p.iter().any(|p| p.iter().any(|c| c.abs() > BASE_WINDING_SIZE - 1.0))
    }

    /// Drop points lying on the line between their neighbors.
    pub fn remove_colinear_points(&mut self) {
        let n = self.p.len();
        let mut kept = Vec::with_capacity(n);
        for i in 0..n {
            let j = (i + 1) % n;
            let k = (i + n - 1) % n;
            let mut v1 = vector_subtract(&self.p[j], &self.p[i]);
            let mut v2 = vector_subtract(&self.p[i], &self.p[k]);
            vector_normalize(&mut v1);
            vector_normalize(&mut v2);
            if dot_product(&v1, &v2) < 0.999 {
                kept.push(self.p[i]);
            }
        }
        if kept.len() != n {
            self.p = kept;
        }
    }

    fn classify(&self, normal: &Vec3, dist: f32, epsilon: f32) -> (Vec<f32>, Vec<usize>, [usize; 3]) {
        let mut dists = Vec::with_capacity(self.p.len() + 1);
        let mut sides = Vec::with_capacity(self.p.len() + 1);
        let mut counts = [0usize; 3];
        for p in &self.p {
            let d = dot_product(p, normal) - dist;
            let s = if d > epsilon {
                SIDE_FRONT
            } else if d < -epsilon {
                SIDE_BACK
            } else {
                SIDE_ON
            };
            dists.push(d);
            sides.push(s);
            counts[s] += 1;
        }
        if let (Some(&d0), Some(&s0)) = (dists.first(), sides.first()) {
            dists.push(d0);
            sides.push(s0);
        }
        (dists, sides, counts)
    }

    /// Split point between `p1` and `p2`, exact on axial planes.
    fn split_point(p1: &Vec3, p2: &Vec3, d1: f32, d2: f32, normal: &Vec3, dist: f32) -> Vec3 {
        let dot = d1 / (d1 - d2);
        let mut mid = VEC3_ORIGIN;
        for j in 0..3 {
            mid[j] = if normal[j] == 1.0 {
                dist
            } else if normal[j] == -1.0 {
                -dist
            } else {
                p1[j] + dot * (p2[j] - p1[j])
            };
        }
        mid
    }

    /// Front and back pieces. A side is None if nothing of the winding
    /// lies on it; points within `epsilon` go to both pieces.
    pub fn clip_epsilon(
        &self,
        normal: &Vec3,
        dist: f32,
        epsilon: f32,
    ) -> (Option<Winding>, Option<Winding>) {
        let (dists, sides, counts) = self.classify(normal, dist, epsilon);

        if counts[SIDE_FRONT] == 0 {
            return (None, Some(self.clone()));
        }
        if counts[SIDE_BACK] == 0 {
            return (Some(self.clone()), None);
        }

        let n = self.p.len();
        let mut f = Vec::with_capacity(n + 4);
        let mut b = Vec::with_capacity(n + 4);

        for i in 0..n {
            let p1 = &self.p[i];

            if sides[i] == SIDE_ON {
                f.push(*p1);
                b.push(*p1);
                continue;
            }
            if sides[i] == SIDE_FRONT {
                f.push(*p1);
            } else {
                b.push(*p1);
            }

            if sides[i + 1] == SIDE_ON || sides[i + 1] == sides[i] {
                continue;
            }

            let p2 = &self.p[(i + 1) % n];
            let mid = Self::split_point(p1, p2, dists[i], dists[i + 1], normal, dist);
            f.push(mid);
            b.push(mid);
        }

        (Some(Winding::new(f)), Some(Winding::new(b)))
    }

    /// Keep the front part. Returns None when the winding is entirely
    /// behind the plane.
    pub fn chop(self, normal: &Vec3, dist: f32, epsilon: f32) -> Option<Winding> {
        let (dists, sides, counts) = self.classify(normal, dist, epsilon);

        if counts[SIDE_FRONT] == 0 {
            return None;
        }
        if counts[SIDE_BACK] == 0 {
            return Some(self);
        }

        let n = self.p.len();
        let mut f = Vec::with_capacity(n + 4);
        for i in 0..n {
            let p1 = &self.p[i];

            if sides[i] == SIDE_ON {
                f.push(*p1);
                continue;
            }
            if sides[i] == SIDE_FRONT {
                f.push(*p1);
            }
            if sides[i + 1] == SIDE_ON || sides[i + 1] == sides[i] {
                continue;
            }

            let p2 = &self.p[(i + 1) % n];
            f.push(Self::split_point(p1, p2, dists[i], dists[i + 1], normal, dist));
        }
        Some(Winding::new(f))
    }

    /// Which side of the plane the whole winding is on: SIDE_FRONT,
    /// SIDE_BACK, SIDE_ON, or None when it crosses.
    pub fn on_plane_side(&self, normal: &Vec3, dist: f32) -> Option<usize> {
        let (_, _, counts) = self.classify(normal, dist, ON_EPSILON);
        match (counts[SIDE_FRONT] > 0, counts[SIDE_BACK] > 0) {
            (true, true) => None,
            (true, false) => Some(SIDE_FRONT),
            (false, true) => Some(SIDE_BACK),
            (false, false) => Some(SIDE_ON),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn square() -> Winding {
        Winding::new(vec![
            [0.0, 0.0, 0.0],
            [0.0, 64.0, 0.0],
            [64.0, 64.0, 0.0],
            [64.0, 0.0, 0.0],
        ])
    }

    // ============================================================
    // Construction
    // ============================================================

    #[test]
    fn test_base_winding_lies_on_plane() {
        let normal = [0.0, 0.0, 1.0];
        let w = Winding::base_for_plane(&normal, 32.0);
        assert_eq!(w.len(), 4);
        for p in &w.p {
            assert_approx_eq!(p[2], 32.0);
        }
        let (n, d) = w.plane();
        assert_approx_eq!(n[2], 1.0);
        assert_approx_eq!(d, 32.0);
        assert!(w.is_huge());
    }

    #[test]
    fn test_base_winding_faces_normal() {
        let normal = [0.0, -1.0, 0.0];
        let w = Winding::base_for_plane(&normal, 16.0);
        let (n, d) = w.plane();
        assert_approx_eq!(n[1], -1.0);
        assert_approx_eq!(d, 16.0);
    }

    #[test]
    fn test_area_and_center() {
        let w = square();
        assert_approx_eq!(w.area(), 64.0 * 64.0);
        let c = w.center();
        assert_approx_eq!(c[0], 32.0);
        assert_approx_eq!(c[1], 32.0);
        let (mins, maxs) = w.bounds();
        assert_eq!(mins, [0.0, 0.0, 0.0]);
        assert_eq!(maxs, [64.0, 64.0, 0.0]);
    }

    #[test]
    fn test_reversed_flips_plane() {
        let w = square();
        let (n, _) = w.plane();
        let (rn, _) = w.reversed().plane();
        assert_approx_eq!(n[2], -rn[2]);
    }

    // ============================================================
    // Clipping
    // ============================================================

    #[test]
    fn test_clip_splits_in_two() {
        let w = square();
        let (f, b) = w.clip_epsilon(&[1.0, 0.0, 0.0], 16.0, ON_EPSILON);
        let f = f.unwrap();
        let b = b.unwrap();
        assert_approx_eq!(f.area(), 48.0 * 64.0);
        assert_approx_eq!(b.area(), 16.0 * 64.0);
        assert!(f.p.iter().all(|p| p[0] >= 16.0));
        assert!(b.p.iter().all(|p| p[0] <= 16.0));
    }

    #[test]
    fn test_clip_entirely_one_side() {
        let w = square();
        let (f, b) = w.clip_epsilon(&[1.0, 0.0, 0.0], -10.0, ON_EPSILON);
        assert!(b.is_none());
        assert_eq!(f.unwrap(), w);

        let (f, b) = w.clip_epsilon(&[1.0, 0.0, 0.0], 100.0, ON_EPSILON);
        assert!(f.is_none());
        assert!(b.is_some());
    }

    #[test]
    fn test_chop_keeps_front() {
        let w = square();
        let f = w.clone().chop(&[0.0, -1.0, 0.0], -32.0, ON_EPSILON).unwrap();
        assert!(f.p.iter().all(|p| p[1] <= 32.0));
        assert_approx_eq!(f.area(), 64.0 * 32.0);
        assert!(w.chop(&[0.0, 1.0, 0.0], 100.0, ON_EPSILON).is_none());
    }

    #[test]
    fn test_on_plane_side() {
        let w = square();
        assert_eq!(w.on_plane_side(&[0.0, 0.0, 1.0], 0.0), Some(SIDE_ON));
        assert_eq!(w.on_plane_side(&[0.0, 0.0, 1.0], -5.0), Some(SIDE_FRONT));
        assert_eq!(w.on_plane_side(&[1.0, 0.0, 0.0], 32.0), None);
    }

    #[test]
    fn test_tiny_and_colinear() {
        let tiny = Winding::new(vec![[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.1, 0.1, 0.0]]);
        assert!(tiny.is_tiny());
        assert!(!square().is_tiny());

        let mut w = Winding::new(vec![
            [0.0, 0.0, 0.0],
            [0.0, 32.0, 0.0],
            [0.0, 64.0, 0.0],
            [64.0, 64.0, 0.0],
            [64.0, 0.0, 0.0],
        ]);
        w.remove_colinear_points();
        assert_eq!(w.len(), 4);
    }
}
