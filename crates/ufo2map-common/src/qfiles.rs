// qfiles.rs -- Compiled map file format: limits, lump ids and records
//
// Every record knows its own on-disk size and reads/writes itself in
// little-endian byte order, field by field.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

// ============================================================
// BSP file format
// ============================================================

/// BSP magic: "IBSP" in little-endian
pub const IDBSPHEADER: i32 =
    (b'P' as i32) << 24 | (b'S' as i32) << 16 | (b'B' as i32) << 8 | b'I' as i32;
pub const BSPVERSION: i32 = 72;

// Upper design bounds
pub const MAX_MAP_MODELS: usize = 1024;
pub const MAX_MAP_BRUSHES: usize = 8192;
pub const MAX_MAP_ENTITIES: usize = 2048;
pub const MAX_MAP_ENTSTRING: usize = 0x40000;
pub const MAX_MAP_TEXINFO: usize = 8192;
pub const MAX_MAP_PLANES: usize = 65536;
pub const MAX_MAP_NODES: usize = 65536;
pub const MAX_MAP_BRUSHSIDES: usize = 65536;
pub const MAX_MAP_LEAFS: usize = 65536;
pub const MAX_MAP_VERTS: usize = 65536;
pub const MAX_MAP_FACES: usize = 65536;
pub const MAX_MAP_LEAFFACES: usize = 65536;
pub const MAX_MAP_LEAFBRUSHES: usize = 65536;
pub const MAX_MAP_EDGES: usize = 128000;
pub const MAX_MAP_SURFEDGES: usize = 256000;
pub const MAX_MAP_ROUTING: usize = 0x800000;
pub const MAX_MAP_SIDES: usize = MAX_MAP_BRUSHES * 6;

/// Highest number of edges a single emitted face may carry.
pub const MAXEDGES: usize = 20;
pub const MAX_TEXPATH: usize = 32;

// Lump indices
pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_PLANES: usize = 1;
pub const LUMP_VERTEXES: usize = 2;
pub const LUMP_ROUTING: usize = 3;
pub const LUMP_NODES: usize = 4;
pub const LUMP_TEXINFO: usize = 5;
pub const LUMP_FACES: usize = 6;
pub const LUMP_LIGHTING: usize = 7;
pub const LUMP_LEAFS: usize = 8;
pub const LUMP_LEAFFACES: usize = 9;
pub const LUMP_LEAFBRUSHES: usize = 10;
pub const LUMP_EDGES: usize = 11;
pub const LUMP_SURFEDGES: usize = 12;
pub const LUMP_MODELS: usize = 13;
pub const LUMP_BRUSHES: usize = 14;
pub const LUMP_BRUSHSIDES: usize = 15;
pub const HEADER_LUMPS: usize = 16;

pub const LUMP_NAMES: [&str; HEADER_LUMPS] = [
    "entities", "planes", "vertexes", "routing", "nodes", "texinfo", "faces", "lighting",
    "leafs", "leaffaces", "leafbrushes", "edges", "surfedges", "models", "brushes",
    "brushsides",
];

// ============================================================
// Record trait
// ============================================================

/// A fixed-width on-disk record.
pub trait LumpRecord: Sized {
    const DISK_SIZE: usize;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()>;
    fn read_from<R: Read>(r: &mut R) -> io::Result<Self>;
}

fn write_vec3<W: Write>(w: &mut W, v: &[f32; 3]) -> io::Result<()> {
    for c in v {
        w.write_f32::<LittleEndian>(*c)?;
    }
    Ok(())
}

fn read_vec3<R: Read>(r: &mut R) -> io::Result<[f32; 3]> {
    Ok([
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ])
}

fn write_short3<W: Write>(w: &mut W, v: &[i16; 3]) -> io::Result<()> {
    for c in v {
        w.write_i16::<LittleEndian>(*c)?;
    }
    Ok(())
}

fn read_short3<R: Read>(r: &mut R) -> io::Result<[i16; 3]> {
    Ok([
        r.read_i16::<LittleEndian>()?,
        r.read_i16::<LittleEndian>()?,
        r.read_i16::<LittleEndian>()?,
    ])
}

impl LumpRecord for u16 {
    const DISK_SIZE: usize = 2;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(*self)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        r.read_u16::<LittleEndian>()
    }
}

impl LumpRecord for i32 {
    const DISK_SIZE: usize = 4;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(*self)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        r.read_i32::<LittleEndian>()
    }
}

// ============================================================
// Header
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Lump {
    pub fileofs: i32,
    pub filelen: i32,
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DHeader {
    pub ident: i32,
    pub version: i32,
    pub lumps: [Lump; HEADER_LUMPS],
}

impl Default for DHeader {
    fn default() -> Self {
        Self {
            ident: IDBSPHEADER,
            version: BSPVERSION,
            lumps: [Lump::default(); HEADER_LUMPS],
        }
    }
}

impl LumpRecord for DHeader {
    const DISK_SIZE: usize = 8 + HEADER_LUMPS * 8;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.ident)?;
        w.write_i32::<LittleEndian>(self.version)?;
        for lump in &self.lumps {
            w.write_i32::<LittleEndian>(lump.fileofs)?;
            w.write_i32::<LittleEndian>(lump.filelen)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let ident = r.read_i32::<LittleEndian>()?;
        let version = r.read_i32::<LittleEndian>()?;
        let mut lumps = [Lump::default(); HEADER_LUMPS];
        for lump in lumps.iter_mut() {
            lump.fileofs = r.read_i32::<LittleEndian>()?;
            lump.filelen = r.read_i32::<LittleEndian>()?;
        }
        Ok(Self { ident, version, lumps })
    }
}

// ============================================================
// Geometry records
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct DModel {
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub origin: [f32; 3],
    pub headnode: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

impl LumpRecord for DModel {
    const DISK_SIZE: usize = 48;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_vec3(w, &self.mins)?;
        write_vec3(w, &self.maxs)?;
        write_vec3(w, &self.origin)?;
        w.write_i32::<LittleEndian>(self.headnode)?;
        w.write_i32::<LittleEndian>(self.firstface)?;
        w.write_i32::<LittleEndian>(self.numfaces)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            mins: read_vec3(r)?,
            maxs: read_vec3(r)?,
            origin: read_vec3(r)?,
            headnode: r.read_i32::<LittleEndian>()?,
            firstface: r.read_i32::<LittleEndian>()?,
            numfaces: r.read_i32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct DVertex {
    pub point: [f32; 3],
}

impl LumpRecord for DVertex {
    const DISK_SIZE: usize = 12;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_vec3(w, &self.point)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self { point: read_vec3(r)? })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct DPlane {
    pub normal: [f32; 3],
    pub dist: f32,
    pub plane_type: i32,
}

impl LumpRecord for DPlane {
    const DISK_SIZE: usize = 20;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_vec3(w, &self.normal)?;
        w.write_f32::<LittleEndian>(self.dist)?;
        w.write_i32::<LittleEndian>(self.plane_type)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            normal: read_vec3(r)?,
            dist: r.read_f32::<LittleEndian>()?,
            plane_type: r.read_i32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DNode {
    pub planenum: i32,
    pub children: [i32; 2], // negative numbers are -(leafs+1), not nodes
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstface: u16,
    pub numfaces: u16,
}

impl LumpRecord for DNode {
    const DISK_SIZE: usize = 28;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.planenum)?;
        w.write_i32::<LittleEndian>(self.children[0])?;
        w.write_i32::<LittleEndian>(self.children[1])?;
        write_short3(w, &self.mins)?;
        write_short3(w, &self.maxs)?;
        w.write_u16::<LittleEndian>(self.firstface)?;
        w.write_u16::<LittleEndian>(self.numfaces)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            planenum: r.read_i32::<LittleEndian>()?,
            children: [r.read_i32::<LittleEndian>()?, r.read_i32::<LittleEndian>()?],
            mins: read_short3(r)?,
            maxs: read_short3(r)?,
            firstface: r.read_u16::<LittleEndian>()?,
            numfaces: r.read_u16::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct TexInfo {
    pub vecs: [[f32; 4]; 2], // [s/t][xyz offset]
    pub surface_flags: i32,
    pub value: i32,
    pub texture: [u8; MAX_TEXPATH],
    pub nexttexinfo: i32, // for animations, -1 = end of chain
}

impl Default for TexInfo {
    fn default() -> Self {
        Self {
            vecs: [[0.0; 4]; 2],
            surface_flags: 0,
            value: 0,
            texture: [0; MAX_TEXPATH],
            nexttexinfo: -1,
        }
    }
}

impl TexInfo {
    /// Texture name up to the first NUL.
    pub fn texture_name(&self) -> String {
        let end = self.texture.iter().position(|&b| b == 0).unwrap_or(MAX_TEXPATH);
        String::from_utf8_lossy(&self.texture[..end]).into_owned()
    }

    /// Stores `name`, truncated so a terminating NUL always fits.
    pub fn set_texture_name(&mut self, name: &str) {
        self.texture = [0; MAX_TEXPATH];
        let bytes = name.as_bytes();
        let n = bytes.len().min(MAX_TEXPATH - 1);
        self.texture[..n].copy_from_slice(&bytes[..n]);
    }
}

impl LumpRecord for TexInfo {
    const DISK_SIZE: usize = 76;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for vec in &self.vecs {
            for c in vec {
                w.write_f32::<LittleEndian>(*c)?;
            }
        }
        w.write_i32::<LittleEndian>(self.surface_flags)?;
        w.write_i32::<LittleEndian>(self.value)?;
        w.write_all(&self.texture)?;
        w.write_i32::<LittleEndian>(self.nexttexinfo)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut vecs = [[0.0f32; 4]; 2];
        for vec in vecs.iter_mut() {
            for c in vec.iter_mut() {
                *c = r.read_f32::<LittleEndian>()?;
            }
        }
        let surface_flags = r.read_i32::<LittleEndian>()?;
        let value = r.read_i32::<LittleEndian>()?;
        let mut texture = [0u8; MAX_TEXPATH];
        r.read_exact(&mut texture)?;
        let nexttexinfo = r.read_i32::<LittleEndian>()?;
        Ok(Self { vecs, surface_flags, value, texture, nexttexinfo })
    }
}

/// Slot 0 stays unused so a negative surfedge can mark reversed use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DEdge {
    pub v: [u16; 2], // vertex numbers
}

impl LumpRecord for DEdge {
    const DISK_SIZE: usize = 4;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.v[0])?;
        w.write_u16::<LittleEndian>(self.v[1])
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self { v: [r.read_u16::<LittleEndian>()?, r.read_u16::<LittleEndian>()?] })
    }
}

pub const MAXLIGHTMAPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DFace {
    pub planenum: u16,
    pub side: i16,
    pub firstedge: i32,
    pub numedges: i16,
    pub texinfo: i16,
    pub styles: [u8; MAXLIGHTMAPS],
    pub lightofs: i32, // start of samples in the lighting lump, -1 if none
}

impl Default for DFace {
    fn default() -> Self {
        Self {
            planenum: 0,
            side: 0,
            firstedge: 0,
            numedges: 0,
            texinfo: 0,
            styles: [255; MAXLIGHTMAPS],
            lightofs: -1,
        }
    }
}

impl LumpRecord for DFace {
    const DISK_SIZE: usize = 20;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.planenum)?;
        w.write_i16::<LittleEndian>(self.side)?;
        w.write_i32::<LittleEndian>(self.firstedge)?;
        w.write_i16::<LittleEndian>(self.numedges)?;
        w.write_i16::<LittleEndian>(self.texinfo)?;
        w.write_all(&self.styles)?;
        w.write_i32::<LittleEndian>(self.lightofs)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let planenum = r.read_u16::<LittleEndian>()?;
        let side = r.read_i16::<LittleEndian>()?;
        let firstedge = r.read_i32::<LittleEndian>()?;
        let numedges = r.read_i16::<LittleEndian>()?;
        let texinfo = r.read_i16::<LittleEndian>()?;
        let mut styles = [0u8; MAXLIGHTMAPS];
        r.read_exact(&mut styles)?;
        let lightofs = r.read_i32::<LittleEndian>()?;
        Ok(Self { planenum, side, firstedge, numedges, texinfo, styles, lightofs })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DLeaf {
    pub contents: i32,
    pub cluster: i16,
    pub area: i16,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstleafface: u16,
    pub numleaffaces: u16,
    pub firstleafbrush: u16,
    pub numleafbrushes: u16,
}

impl LumpRecord for DLeaf {
    const DISK_SIZE: usize = 28;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.contents)?;
        w.write_i16::<LittleEndian>(self.cluster)?;
        w.write_i16::<LittleEndian>(self.area)?;
        write_short3(w, &self.mins)?;
        write_short3(w, &self.maxs)?;
        w.write_u16::<LittleEndian>(self.firstleafface)?;
        w.write_u16::<LittleEndian>(self.numleaffaces)?;
        w.write_u16::<LittleEndian>(self.firstleafbrush)?;
        w.write_u16::<LittleEndian>(self.numleafbrushes)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            contents: r.read_i32::<LittleEndian>()?,
            cluster: r.read_i16::<LittleEndian>()?,
            area: r.read_i16::<LittleEndian>()?,
            mins: read_short3(r)?,
            maxs: read_short3(r)?,
            firstleafface: r.read_u16::<LittleEndian>()?,
            numleaffaces: r.read_u16::<LittleEndian>()?,
            firstleafbrush: r.read_u16::<LittleEndian>()?,
            numleafbrushes: r.read_u16::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DBrushSide {
    pub planenum: u16, // facing out of the leaf
    pub texinfo: i16,
}

impl LumpRecord for DBrushSide {
    const DISK_SIZE: usize = 4;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.planenum)?;
        w.write_i16::<LittleEndian>(self.texinfo)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            planenum: r.read_u16::<LittleEndian>()?,
            texinfo: r.read_i16::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DBrush {
    pub firstside: i32,
    pub numsides: i32,
    pub contents: i32,
}

impl LumpRecord for DBrush {
    const DISK_SIZE: usize = 12;

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.firstside)?;
        w.write_i32::<LittleEndian>(self.numsides)?;
        w.write_i32::<LittleEndian>(self.contents)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            firstside: r.read_i32::<LittleEndian>()?,
            numsides: r.read_i32::<LittleEndian>()?,
            contents: r.read_i32::<LittleEndian>()?,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    // =========================================================================
    // Struct size verification -- in-memory layout matches disk layout
    // =========================================================================

    #[test]
    fn size_of_dheader() {
        // ident(4) + version(4) + 16 * Lump(8) = 136
        assert_eq!(size_of::<DHeader>(), DHeader::DISK_SIZE);
        assert_eq!(DHeader::DISK_SIZE, 136);
    }

    #[test]
    fn size_of_records() {
        assert_eq!(size_of::<DModel>(), DModel::DISK_SIZE);
        assert_eq!(size_of::<DVertex>(), DVertex::DISK_SIZE);
        assert_eq!(size_of::<DPlane>(), DPlane::DISK_SIZE);
        assert_eq!(size_of::<DNode>(), DNode::DISK_SIZE);
        assert_eq!(size_of::<TexInfo>(), TexInfo::DISK_SIZE);
        assert_eq!(size_of::<DEdge>(), DEdge::DISK_SIZE);
        assert_eq!(size_of::<DFace>(), DFace::DISK_SIZE);
        assert_eq!(size_of::<DLeaf>(), DLeaf::DISK_SIZE);
        assert_eq!(size_of::<DBrushSide>(), DBrushSide::DISK_SIZE);
        assert_eq!(size_of::<DBrush>(), DBrush::DISK_SIZE);
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    #[test]
    fn ident_is_ibsp() {
        assert_eq!(&IDBSPHEADER.to_le_bytes(), b"IBSP");
    }

    #[test]
    fn node_bytes_are_little_endian() {
        let node = DNode {
            planenum: 2,
            children: [-1, 3],
            mins: [-16, 0, 0],
            maxs: [16, 32, 64],
            firstface: 1,
            numfaces: 0x0102,
        };
        let mut buf = Vec::new();
        node.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), DNode::DISK_SIZE);
        assert_eq!(&buf[0..4], &[2, 0, 0, 0]);
        assert_eq!(&buf[4..8], &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(&buf[26..28], &[0x02, 0x01]);

        let back = DNode::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn texinfo_name_truncates_and_terminates() {
        let mut tex = TexInfo::default();
        tex.set_texture_name("tex_common/nodraw");
        assert_eq!(tex.texture_name(), "tex_common/nodraw");

        let long = "x".repeat(60);
        tex.set_texture_name(&long);
        assert_eq!(tex.texture_name().len(), MAX_TEXPATH - 1);
        assert_eq!(tex.texture[MAX_TEXPATH - 1], 0);
    }

    #[test]
    fn face_defaults_have_no_lightmap() {
        let face = DFace::default();
        assert_eq!(face.lightofs, -1);
        assert_eq!(face.styles, [255; MAXLIGHTMAPS]);
    }

    #[test]
    fn lump_names_cover_every_lump() {
        assert_eq!(LUMP_NAMES[LUMP_ROUTING], "routing");
        assert_eq!(LUMP_NAMES[LUMP_BRUSHSIDES], "brushsides");
    }
}
