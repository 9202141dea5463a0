// q_shared.rs -- Shared math, plane and content definitions

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

/// Half the width of the addressable world on every axis.
pub const MAX_WORLD_WIDTH: f32 = 4096.0;

// ============================================================
// Content flags
// ============================================================

bitflags::bitflags! {
    /// Per-brush and per-leaf content classification.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ContentFlags: i32 {
        const SOLID       = 0x00000001;
        const WINDOW      = 0x00000002;
        const AUX         = 0x00000004;
        const LAVA        = 0x00000008;
        const SLIME       = 0x00000010;
        const WATER       = 0x00000020;
        const MIST        = 0x00000040;

        const ACTORCLIP   = 0x00010000;
        const PASSABLE    = 0x00020000;

        const ORIGIN      = 0x01000000;
        const DETAIL      = 0x08000000;
        const TRANSLUCENT = 0x10000000;
        const LADDER      = 0x20000000;
        const STEPON      = 0x40000000;
    }
}

/// Highest bit that still counts as a visible content.
pub const LAST_VISIBLE_CONTENTS: i32 = 0x80;

impl ContentFlags {
    pub const MASK_WATER: ContentFlags = ContentFlags::WATER
        .union(ContentFlags::SLIME)
        .union(ContentFlags::LAVA);

    /// Everything a walking actor collides with.
    pub const MASK_ROUTING: ContentFlags = ContentFlags::SOLID
        .union(ContentFlags::WINDOW)
        .union(ContentFlags::ACTORCLIP)
        .union(ContentFlags::STEPON);

    /// Keeps only the lowest set visible bit, empty if none is set.
    pub fn visible(self) -> ContentFlags {
        let mut bit = 1;
        while bit <= LAST_VISIBLE_CONTENTS {
            if self.bits() & bit != 0 {
                return ContentFlags::from_bits_retain(bit);
            }
            bit <<= 1;
        }
        ContentFlags::empty()
    }
}

// ============================================================
// Surface flags
// ============================================================

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: i32 {
        const LIGHT     = 0x00000001;
        const SLICK     = 0x00000002;
        const SKY       = 0x00000004;
        const WARP      = 0x00000008;
        const TRANS33   = 0x00000010;
        const TRANS66   = 0x00000020;
        const FLOWING   = 0x00000040;
        const NODRAW    = 0x00000080;
        const HINT      = 0x00000100;
        const SKIP      = 0x00000200;
        const ALPHATEST = 0x02000000;
    }
}

impl SurfaceFlags {
    pub const TRANSLUCENT: SurfaceFlags = SurfaceFlags::TRANS33
        .union(SurfaceFlags::TRANS66)
        .union(SurfaceFlags::ALPHATEST);
}

// ============================================================
// Plane
// ============================================================

// Plane types: 0-2 are axial planes, 3-5 are non-axial planes snapped
// to the nearest axis.
pub const PLANE_X: i32 = 0;
pub const PLANE_Y: i32 = 1;
pub const PLANE_Z: i32 = 2;
pub const PLANE_ANYX: i32 = 3;
pub const PLANE_ANYY: i32 = 4;
pub const PLANE_ANYZ: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: i32,
}

impl Default for CPlane {
    fn default() -> Self {
        Self {
            normal: [0.0; 3],
            dist: 0.0,
            plane_type: PLANE_X,
        }
    }
}

pub fn plane_type_for_normal(normal: &Vec3) -> i32 {
    if normal[0] == 1.0 || normal[0] == -1.0 {
        return PLANE_X;
    }
    if normal[1] == 1.0 || normal[1] == -1.0 {
        return PLANE_Y;
    }
    if normal[2] == 1.0 || normal[2] == -1.0 {
        return PLANE_Z;
    }

    let ax = normal[0].abs();
    let ay = normal[1].abs();
    let az = normal[2].abs();

    if ax >= ay && ax >= az {
        PLANE_ANYX
    } else if ay >= ax && ay >= az {
        PLANE_ANYY
    } else {
        PLANE_ANYZ
    }
}

// ============================================================
// Trace
// ============================================================

#[derive(Debug, Clone)]
pub struct Trace {
    pub allsolid: bool,
    pub startsolid: bool,
    pub fraction: f32,
    pub endpos: Vec3,
    pub plane: CPlane,
    pub contents: ContentFlags,
}

impl Default for Trace {
    fn default() -> Self {
        Self {
            allsolid: false,
            startsolid: false,
            fraction: 1.0,
            endpos: [0.0; 3],
            plane: CPlane::default(),
            contents: ContentFlags::empty(),
        }
    }
}

// ============================================================
// MATHLIB -- Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_negate(v: &Vec3) -> Vec3 {
    [-v[0], -v[1], -v[2]]
}

/// veca + scale * vecb
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

pub fn vector_length(v: &Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

pub fn vector_compare_epsilon(v1: &Vec3, v2: &Vec3, epsilon: f32) -> bool {
    (0..3).all(|i| (v1[i] - v2[i]).abs() <= epsilon)
}

/// Inverted bounds, ready for `add_point_to_bounds`.
pub fn clear_bounds() -> (Vec3, Vec3) {
    ([99999.0; 3], [-99999.0; 3])
}

pub fn add_point_to_bounds(v: &Vec3, mins: &mut Vec3, maxs: &mut Vec3) {
    for i in 0..3 {
        if v[i] < mins[i] {
            mins[i] = v[i];
        }
        if v[i] > maxs[i] {
            maxs[i] = v[i];
        }
    }
}

/// Returns 1 (front), 2 (back), or 3 (crossing) for a box vs. plane test.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    // fast axial cases
    if (0..3).contains(&p.plane_type) {
        let t = p.plane_type as usize;
        if p.dist <= emins[t] {
            return 1;
        }
        if p.dist >= emaxs[t] {
            return 2;
        }
        return 3;
    }

    // general case: pick the box corners nearest and farthest along the normal
    let mut near = [0.0f32; 3];
    let mut far = [0.0f32; 3];
    for i in 0..3 {
        if p.normal[i] < 0.0 {
            near[i] = emaxs[i];
            far[i] = emins[i];
        } else {
            near[i] = emins[i];
            far[i] = emaxs[i];
        }
    }

    let mut sides = 0;
    if dot_product(&p.normal, &far) >= p.dist {
        sides = 1;
    }
    if dot_product(&p.normal, &near) < p.dist {
        sides |= 2;
    }
    sides
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    // =========================================================================
    // Vector math
    // =========================================================================

    #[test]
    fn test_cross_product_axes() {
        assert_eq!(cross_product(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]);
        assert_eq!(cross_product(&[0.0, 1.0, 0.0], &[1.0, 0.0, 0.0]), [0.0, 0.0, -1.0]);
    }

    #[test]
    fn test_vector_normalize_returns_length() {
        let mut v = [3.0, 4.0, 0.0];
        let len = vector_normalize(&mut v);
        assert_approx_eq!(len, 5.0);
        assert_approx_eq!(v[0], 0.6);
        assert_approx_eq!(v[1], 0.8);
    }

    #[test]
    fn test_vector_normalize_zero() {
        let mut v = [0.0; 3];
        assert_eq!(vector_normalize(&mut v), 0.0);
        assert_eq!(v, [0.0; 3]);
    }

    #[test]
    fn test_bounds_accumulate() {
        let (mut mins, mut maxs) = clear_bounds();
        add_point_to_bounds(&[1.0, -2.0, 3.0], &mut mins, &mut maxs);
        add_point_to_bounds(&[-1.0, 2.0, 0.0], &mut mins, &mut maxs);
        assert_eq!(mins, [-1.0, -2.0, 0.0]);
        assert_eq!(maxs, [1.0, 2.0, 3.0]);
    }

    // =========================================================================
    // Planes
    // =========================================================================

    #[test]
    fn test_plane_type_axial() {
        assert_eq!(plane_type_for_normal(&[0.0, 0.0, -1.0]), PLANE_Z);
        assert_eq!(plane_type_for_normal(&[0.0, 1.0, 0.0]), PLANE_Y);
        assert_eq!(plane_type_for_normal(&[0.6, 0.8, 0.0]), PLANE_ANYY);
        assert_eq!(plane_type_for_normal(&[0.8, 0.0, 0.6]), PLANE_ANYX);
    }

    #[test]
    fn test_box_on_plane_side() {
        let p = CPlane { normal: [0.0, 0.0, 1.0], dist: 10.0, plane_type: PLANE_Z };
        assert_eq!(box_on_plane_side(&[0.0, 0.0, 20.0], &[1.0, 1.0, 30.0], &p), 1);
        assert_eq!(box_on_plane_side(&[0.0, 0.0, 0.0], &[1.0, 1.0, 5.0], &p), 2);
        assert_eq!(box_on_plane_side(&[0.0, 0.0, 0.0], &[1.0, 1.0, 15.0], &p), 3);

        let mut n = [1.0, 1.0, 0.0];
        vector_normalize(&mut n);
        let p = CPlane { normal: n, dist: 0.0, plane_type: PLANE_ANYX };
        assert_eq!(box_on_plane_side(&[1.0, 1.0, 0.0], &[2.0, 2.0, 1.0], &p), 1);
        assert_eq!(box_on_plane_side(&[-2.0, -2.0, 0.0], &[-1.0, -1.0, 1.0], &p), 2);
        assert_eq!(box_on_plane_side(&[-1.0, -1.0, 0.0], &[1.0, 1.0, 1.0], &p), 3);
    }

    // =========================================================================
    // Content flags
    // =========================================================================

    #[test]
    fn test_visible_contents_lowest_bit() {
        let c = ContentFlags::WATER | ContentFlags::WINDOW | ContentFlags::DETAIL;
        assert_eq!(c.visible(), ContentFlags::WINDOW);
        assert_eq!(ContentFlags::DETAIL.visible(), ContentFlags::empty());
        assert_eq!(ContentFlags::empty().visible(), ContentFlags::empty());
    }

    #[test]
    fn test_translucent_surface_mask() {
        assert!(SurfaceFlags::TRANSLUCENT.contains(SurfaceFlags::TRANS33));
        assert!(SurfaceFlags::TRANSLUCENT.contains(SurfaceFlags::ALPHATEST));
        assert!(!SurfaceFlags::TRANSLUCENT.contains(SurfaceFlags::NODRAW));
    }
}
