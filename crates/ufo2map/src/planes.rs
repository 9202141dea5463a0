// planes.rs -- Deduplicated plane table
//
// Planes are always created in pairs: plane `p ^ 1` is plane `p` facing the
// other way. For axial planes the positive facing one gets the even number.

use ufo2map_common::q_shared::{
    cross_product, dot_product, plane_type_for_normal, vector_length, vector_negate,
    vector_normalize, vector_subtract, Vec3, PLANE_ANYX, VEC3_ORIGIN,
};
use ufo2map_common::qfiles::{DPlane, MAX_MAP_PLANES};

use crate::error::{CompileError, Result};

pub const NORMAL_EPSILON: f32 = 0.00001;
pub const DIST_EPSILON: f32 = 0.01;
const PLANE_HASHES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: i32,
}

impl Plane {
    pub fn equals(&self, normal: &Vec3, dist: f32) -> bool {
        (self.normal[0] - normal[0]).abs() < NORMAL_EPSILON
            && (self.normal[1] - normal[1]).abs() < NORMAL_EPSILON
            && (self.normal[2] - normal[2]).abs() < NORMAL_EPSILON
            && (self.dist - dist).abs() < DIST_EPSILON
    }

    pub fn is_axial(&self) -> bool {
        self.plane_type < PLANE_ANYX
    }

    pub fn to_disk(&self) -> DPlane {
        DPlane { normal: self.normal, dist: self.dist, plane_type: self.plane_type }
    }
}

fn plane_hash(dist: f32) -> usize {
    (dist.abs() as usize / 8) & (PLANE_HASHES - 1)
}

/// Snap a nearly axial vector onto the axis.
pub fn snap_vector(normal: &mut Vec3) {
    for i in 0..3 {
        if (normal[i] - 1.0).abs() < NORMAL_EPSILON {
            *normal = VEC3_ORIGIN;
            normal[i] = 1.0;
            break;
        }
        if (normal[i] + 1.0).abs() < NORMAL_EPSILON {
            *normal = VEC3_ORIGIN;
            normal[i] = -1.0;
            break;
        }
    }
}

fn snap_plane(normal: &mut Vec3, dist: &mut f32) {
    snap_vector(normal);
    if (*dist - dist.round()).abs() < DIST_EPSILON {
        *dist = dist.round();
    }
}

#[derive(Debug, Clone)]
pub struct PlaneRegistry {
    planes: Vec<Plane>,
    hash: Vec<Vec<usize>>,
}

impl Default for PlaneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaneRegistry {
    pub fn new() -> Self {
        Self { planes: Vec::new(), hash: vec![Vec::new(); PLANE_HASHES] }
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn get(&self, planenum: usize) -> &Plane {
        &self.planes[planenum]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plane> {
        self.planes.iter()
    }

    fn add_to_hash(&mut self, planenum: usize) {
        let h = plane_hash(self.planes[planenum].dist);
        self.hash[h].push(planenum);
    }

    fn create(&mut self, normal: Vec3, dist: f32) -> Result<usize> {
        if vector_length(&normal) < 0.5 {
            return Err(CompileError::BadNormal);
        }
        if self.planes.len() + 2 > MAX_MAP_PLANES {
            return Err(CompileError::CapacityExceeded { what: "planes", limit: MAX_MAP_PLANES });
        }

        let plane_type = plane_type_for_normal(&normal);
        let front = Plane { normal, dist, plane_type };
        let back = Plane { normal: vector_negate(&normal), dist: -dist, plane_type };

        let first = self.planes.len();
        let flip = front.is_axial() && normal.iter().any(|&c| c < 0.0);
        if flip {
            self.planes.push(back);
            self.planes.push(front);
        } else {
            self.planes.push(front);
            self.planes.push(back);
        }
        self.add_to_hash(first);
        self.add_to_hash(first + 1);

        Ok(if flip { first + 1 } else { first })
    }

    /// Id of the plane matching `normal`/`dist` within epsilon, creating
    /// the pair if none exists. `normal` need not be unit length; the
    /// plane `normal . p = dist` is normalized first.
    pub fn find_float_plane(&mut self, normal: &Vec3, dist: f32) -> Result<usize> {
        let mut normal = *normal;
        let len = vector_normalize(&mut normal);
        if len < NORMAL_EPSILON {
            return Err(CompileError::BadNormal);
        }
        let mut dist = dist / len;
        snap_plane(&mut normal, &mut dist);

        let hash = plane_hash(dist);
        for i in [PLANE_HASHES - 1, 0, 1] {
            let h = (hash + i) & (PLANE_HASHES - 1);
            if let Some(&p) = self.hash[h].iter().find(|&&p| self.planes[p].equals(&normal, dist)) {
                return Ok(p);
            }
        }

        self.create(normal, dist)
    }

    /// Plane through three points, facing the side from which they run
    /// clockwise. None when the points are collinear.
    pub fn plane_from_points(&mut self, p0: &Vec3, p1: &Vec3, p2: &Vec3) -> Result<Option<usize>> {
        let t1 = vector_subtract(p0, p1);
        let t2 = vector_subtract(p2, p1);
        let mut normal = cross_product(&t1, &t2);
        if vector_normalize(&mut normal) == 0.0 {
            return Ok(None);
        }
        let dist = dot_product(p0, &normal);
        self.find_float_plane(&normal, dist).map(Some)
    }

    pub fn to_disk(&self) -> Vec<DPlane> {
        self.planes.iter().map(Plane::to_disk).collect()
    }
}
