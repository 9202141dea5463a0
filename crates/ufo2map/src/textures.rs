// textures.rs -- Materials and texture projection
//
// Texture files are not read; content and surface flags for a name come
// from the built-in material table unless the map overrides them.

use ufo2map_common::q_shared::{dot_product, ContentFlags, SurfaceFlags, Vec3};
use ufo2map_common::qfiles::{TexInfo, MAX_MAP_TEXINFO};

use crate::error::{check_capacity, Result};
use crate::planes::Plane;

/// Texture placement as written in the map file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrushTexture {
    pub name: String,
    pub shift: [f32; 2],
    pub rotate: f32,
    pub scale: [f32; 2],
    pub surface_flags: SurfaceFlags,
    pub value: i32,
}

/// Default flags for a texture name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    pub contents: ContentFlags,
    pub surface_flags: SurfaceFlags,
    pub value: i32,
}

const MATERIALS: &[(&str, ContentFlags, SurfaceFlags)] = &[
    ("tex_common/nodraw", ContentFlags::empty(), SurfaceFlags::NODRAW),
    ("tex_common/hint", ContentFlags::empty(), SurfaceFlags::HINT),
    ("tex_common/skip", ContentFlags::empty(), SurfaceFlags::SKIP.union(SurfaceFlags::NODRAW)),
    ("tex_common/origin", ContentFlags::ORIGIN, SurfaceFlags::NODRAW),
    ("tex_common/actorclip", ContentFlags::ACTORCLIP, SurfaceFlags::NODRAW),
    ("tex_common/stepon", ContentFlags::STEPON, SurfaceFlags::NODRAW),
    ("tex_common/water", ContentFlags::WATER, SurfaceFlags::WARP.union(SurfaceFlags::TRANS33)),
    ("tex_common/glass", ContentFlags::WINDOW, SurfaceFlags::TRANS33),
];

pub fn find_material(name: &str) -> Material {
    MATERIALS
        .iter()
        .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, contents, surface_flags)| Material { contents, surface_flags, value: 0 })
        .unwrap_or(Material {
            contents: ContentFlags::empty(),
            surface_flags: SurfaceFlags::empty(),
            value: 0,
        })
}

const BASE_AXIS: [[Vec3; 3]; 6] = [
    [[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, -1.0, 0.0]],  // floor
    [[0.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.0, -1.0, 0.0]], // ceiling
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]],  // west wall
    [[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]], // east wall
    [[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]],  // south wall
    [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]], // north wall
];

/// S and T axes of the base projection best aligned with the plane.
pub fn texture_axis_from_plane(plane: &Plane) -> (Vec3, Vec3) {
    let mut best = 0.0;
    let mut bestaxis = 0;
    for (i, axis) in BASE_AXIS.iter().enumerate() {
        let dot = dot_product(&plane.normal, &axis[0]);
        if dot > best {
            best = dot;
            bestaxis = i;
        }
    }
    (BASE_AXIS[bestaxis][1], BASE_AXIS[bestaxis][2])
}

/// (sin, cos), exact for right angles.
fn rotation(degrees: f32) -> (f32, f32) {
    if degrees == 0.0 {
        (0.0, 1.0)
    } else if degrees == 90.0 {
        (1.0, 0.0)
    } else if degrees == 180.0 {
        (0.0, -1.0)
    } else if degrees == 270.0 {
        (-1.0, 0.0)
    } else {
        let ang = degrees.to_radians();
        (ang.sin(), ang.cos())
    }
}

/// Index of the texinfo for a side, adding it if no identical one exists.
/// `origin` compensates the shift for brushes moved by an origin brush.
pub fn texinfo_for_brush_texture(
    texinfo: &mut Vec<TexInfo>,
    plane: &Plane,
    bt: &BrushTexture,
    origin: &Vec3,
) -> Result<usize> {
    let (s, t) = texture_axis_from_plane(plane);
    let mut vecs = [s, t];

    let shift = [dot_product(origin, &vecs[0]), dot_product(origin, &vecs[1])];
    let scale = [
        if bt.scale[0] == 0.0 { 1.0 } else { bt.scale[0] },
        if bt.scale[1] == 0.0 { 1.0 } else { bt.scale[1] },
    ];

    let (sinv, cosv) = rotation(bt.rotate);
    let sv = vecs[0].iter().position(|&c| c != 0.0).unwrap_or(2);
    let tv = vecs[1].iter().position(|&c| c != 0.0).unwrap_or(2);
    for v in vecs.iter_mut() {
        let ns = cosv * v[sv] - sinv * v[tv];
        let nt = sinv * v[sv] + cosv * v[tv];
        v[sv] = ns;
        v[tv] = nt;
    }

    let mut tx = TexInfo::default();
    for i in 0..2 {
        for j in 0..3 {
            tx.vecs[i][j] = vecs[i][j] / scale[i];
        }
        tx.vecs[i][3] = bt.shift[i] + shift[i];
    }
    tx.surface_flags = bt.surface_flags.bits();
    tx.value = bt.value;
    tx.set_texture_name(&bt.name);

    if let Some(i) = texinfo.iter().position(|tc| *tc == tx) {
        return Ok(i);
    }
    check_capacity("texinfo", texinfo.len(), MAX_MAP_TEXINFO)?;
    texinfo.push(tx);
    Ok(texinfo.len() - 1)
}
