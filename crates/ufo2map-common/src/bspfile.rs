// bspfile.rs -- In-memory compiled map and its lump reader/writer

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use log::info;
use thiserror::Error;

use crate::crc::bsp_checksum;
use crate::qfiles::*;

#[derive(Debug, Error)]
pub enum BspError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("{0} is not a compiled map (bad ident {1:#x})")]
    BadIdent(String, i32),
    #[error("{0} is version {1}, not {expected}", expected = BSPVERSION)]
    BadVersion(String, i32),
    #[error("lump {lump} ({name}) points outside the file")]
    TruncatedLump { lump: usize, name: &'static str },
    #[error("lump {name} size {len} is not a multiple of {size}")]
    OddLumpSize { name: &'static str, len: usize, size: usize },
}

// ============================================================
// Compiled map data
// ============================================================

/// Every lump of a compiled map, in record form.
#[derive(Debug, Clone, Default)]
pub struct BspData {
    pub models: Vec<DModel>,
    pub vertexes: Vec<DVertex>,
    pub planes: Vec<DPlane>,
    pub nodes: Vec<DNode>,
    pub texinfo: Vec<TexInfo>,
    pub faces: Vec<DFace>,
    pub leafs: Vec<DLeaf>,
    pub leaffaces: Vec<u16>,
    pub leafbrushes: Vec<u16>,
    pub edges: Vec<DEdge>,
    pub surfedges: Vec<i32>,
    pub brushes: Vec<DBrush>,
    pub brushsides: Vec<DBrushSide>,
    pub routedata: Vec<u8>,
    pub lightdata: Vec<u8>,
    pub entdata: Vec<u8>,
}

fn records_to_bytes<T: LumpRecord>(records: &[T]) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(records.len() * T::DISK_SIZE);
    for r in records {
        r.write_to(&mut buf)?;
    }
    Ok(buf)
}

fn records_from_bytes<T: LumpRecord>(
    mut bytes: &[u8],
    name: &'static str,
) -> Result<Vec<T>, BspError> {
    if bytes.len() % T::DISK_SIZE != 0 {
        return Err(BspError::OddLumpSize { name, len: bytes.len(), size: T::DISK_SIZE });
    }
    let count = bytes.len() / T::DISK_SIZE;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(T::read_from(&mut bytes)?);
    }
    Ok(out)
}

impl BspData {
    /// Serialize to the on-disk layout: header first, then each lump
    /// padded to a 4-byte boundary.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut lumps: Vec<(usize, Vec<u8>)> = Vec::with_capacity(HEADER_LUMPS);
        lumps.push((LUMP_PLANES, records_to_bytes(&self.planes)?));
        lumps.push((LUMP_LEAFS, records_to_bytes(&self.leafs)?));
        lumps.push((LUMP_VERTEXES, records_to_bytes(&self.vertexes)?));
        lumps.push((LUMP_NODES, records_to_bytes(&self.nodes)?));
        lumps.push((LUMP_TEXINFO, records_to_bytes(&self.texinfo)?));
        lumps.push((LUMP_FACES, records_to_bytes(&self.faces)?));
        lumps.push((LUMP_BRUSHES, records_to_bytes(&self.brushes)?));
        lumps.push((LUMP_BRUSHSIDES, records_to_bytes(&self.brushsides)?));
        lumps.push((LUMP_LEAFFACES, records_to_bytes(&self.leaffaces)?));
        lumps.push((LUMP_LEAFBRUSHES, records_to_bytes(&self.leafbrushes)?));
        lumps.push((LUMP_SURFEDGES, records_to_bytes(&self.surfedges)?));
        lumps.push((LUMP_EDGES, records_to_bytes(&self.edges)?));
        lumps.push((LUMP_MODELS, records_to_bytes(&self.models)?));
        lumps.push((LUMP_LIGHTING, self.lightdata.clone()));
        lumps.push((LUMP_ROUTING, self.routedata.clone()));
        lumps.push((LUMP_ENTITIES, self.entdata.clone()));

        let mut header = DHeader::default();
        let mut body = Vec::new();
        for (lumpnum, data) in lumps {
            header.lumps[lumpnum] = Lump {
                fileofs: (DHeader::DISK_SIZE + body.len()) as i32,
                filelen: data.len() as i32,
            };
            body.extend_from_slice(&data);
            while body.len() % 4 != 0 {
                body.push(0);
            }
        }

        let mut out = Vec::with_capacity(DHeader::DISK_SIZE + body.len());
        header.write_to(&mut out)?;
        out.write_all(&body)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8], filename: &str) -> Result<Self, BspError> {
        let header = DHeader::read_from(&mut &bytes[..])?;
        if header.ident != IDBSPHEADER {
            return Err(BspError::BadIdent(filename.to_string(), header.ident));
        }
        if header.version != BSPVERSION {
            return Err(BspError::BadVersion(filename.to_string(), header.version));
        }

        let lump = |lumpnum: usize| -> Result<&[u8], BspError> {
            let l = header.lumps[lumpnum];
            let ofs = l.fileofs as usize;
            let len = l.filelen as usize;
            if l.fileofs < 0 || l.filelen < 0 || ofs + len > bytes.len() {
                return Err(BspError::TruncatedLump { lump: lumpnum, name: LUMP_NAMES[lumpnum] });
            }
            Ok(&bytes[ofs..ofs + len])
        };
        let name = |lumpnum: usize| LUMP_NAMES[lumpnum];

        Ok(Self {
            models: records_from_bytes(lump(LUMP_MODELS)?, name(LUMP_MODELS))?,
            vertexes: records_from_bytes(lump(LUMP_VERTEXES)?, name(LUMP_VERTEXES))?,
            planes: records_from_bytes(lump(LUMP_PLANES)?, name(LUMP_PLANES))?,
            nodes: records_from_bytes(lump(LUMP_NODES)?, name(LUMP_NODES))?,
            texinfo: records_from_bytes(lump(LUMP_TEXINFO)?, name(LUMP_TEXINFO))?,
            faces: records_from_bytes(lump(LUMP_FACES)?, name(LUMP_FACES))?,
            leafs: records_from_bytes(lump(LUMP_LEAFS)?, name(LUMP_LEAFS))?,
            leaffaces: records_from_bytes(lump(LUMP_LEAFFACES)?, name(LUMP_LEAFFACES))?,
            leafbrushes: records_from_bytes(lump(LUMP_LEAFBRUSHES)?, name(LUMP_LEAFBRUSHES))?,
            edges: records_from_bytes(lump(LUMP_EDGES)?, name(LUMP_EDGES))?,
            surfedges: records_from_bytes(lump(LUMP_SURFEDGES)?, name(LUMP_SURFEDGES))?,
            brushes: records_from_bytes(lump(LUMP_BRUSHES)?, name(LUMP_BRUSHES))?,
            brushsides: records_from_bytes(lump(LUMP_BRUSHSIDES)?, name(LUMP_BRUSHSIDES))?,
            routedata: lump(LUMP_ROUTING)?.to_vec(),
            lightdata: lump(LUMP_LIGHTING)?.to_vec(),
            entdata: lump(LUMP_ENTITIES)?.to_vec(),
        })
    }

    /// Write the compiled map and return its checksum.
    pub fn write_bsp_file(&self, path: &Path) -> Result<u16, BspError> {
        let bytes = self.to_bytes()?;
        fs::write(path, &bytes)?;
        let checksum = bsp_checksum(&bytes);
        info!("Writing {} ({} bytes, checksum {:#06x})", path.display(), bytes.len(), checksum);
        Ok(checksum)
    }

    pub fn load_bsp_file(path: &Path) -> Result<(Self, u16), BspError> {
        let bytes = fs::read(path)?;
        let data = Self::from_bytes(&bytes, &path.display().to_string())?;
        Ok((data, bsp_checksum(&bytes)))
    }

    /// One line per lump: record count and byte size.
    pub fn file_sizes(&self) -> Vec<String> {
        fn line(name: &str, count: usize, size: usize) -> String {
            format!("{:>6} {:<12} {:>8}", count, name, count * size)
        }
        vec![
            line("models", self.models.len(), DModel::DISK_SIZE),
            line("brushes", self.brushes.len(), DBrush::DISK_SIZE),
            line("brushsides", self.brushsides.len(), DBrushSide::DISK_SIZE),
            line("planes", self.planes.len(), DPlane::DISK_SIZE),
            line("texinfo", self.texinfo.len(), TexInfo::DISK_SIZE),
            line("vertexes", self.vertexes.len(), DVertex::DISK_SIZE),
            line("nodes", self.nodes.len(), DNode::DISK_SIZE),
            line("faces", self.faces.len(), DFace::DISK_SIZE),
            line("leafs", self.leafs.len(), DLeaf::DISK_SIZE),
            line("leaffaces", self.leaffaces.len(), 2),
            line("leafbrushes", self.leafbrushes.len(), 2),
            line("surfedges", self.surfedges.len(), 4),
            line("edges", self.edges.len(), DEdge::DISK_SIZE),
            format!("       {:<12} {:>8}", "routing", self.routedata.len()),
            format!("       {:<12} {:>8}", "entdata", self.entdata.len()),
        ]
    }

    /// Entity text without the trailing NUL.
    pub fn entity_string(&self) -> String {
        let end = self.entdata.iter().position(|&b| b == 0).unwrap_or(self.entdata.len());
        String::from_utf8_lossy(&self.entdata[..end]).into_owned()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BspData {
        let mut bsp = BspData::default();
        bsp.planes.push(DPlane { normal: [0.0, 0.0, 1.0], dist: 10.0, plane_type: 2 });
        bsp.planes.push(DPlane { normal: [0.0, 0.0, -1.0], dist: -10.0, plane_type: 2 });
        bsp.leafs.push(DLeaf { contents: 1, ..Default::default() });
        bsp.leafs.push(DLeaf::default());
        bsp.nodes.push(DNode { planenum: 0, children: [-2, -1], ..Default::default() });
        bsp.edges.push(DEdge::default());
        bsp.leafbrushes.push(0);
        bsp.routedata = vec![1, 2, 3];
        bsp.entdata = b"{\n\"classname\" \"worldspawn\"\n}\n\0".to_vec();
        bsp
    }

    #[test]
    fn test_lumps_are_aligned() {
        let bytes = sample().to_bytes().unwrap();
        let header = DHeader::read_from(&mut &bytes[..]).unwrap();
        for lump in &header.lumps {
            assert_eq!(lump.fileofs % 4, 0);
        }
        assert_eq!(header.lumps[LUMP_ROUTING].filelen, 3);
        assert_eq!(header.lumps[LUMP_NODES].filelen as usize, DNode::DISK_SIZE);
    }

    #[test]
    fn test_bytes_round_trip() {
        let bsp = sample();
        let bytes = bsp.to_bytes().unwrap();
        let back = BspData::from_bytes(&bytes, "sample").unwrap();
        assert_eq!(back.planes, bsp.planes);
        assert_eq!(back.nodes, bsp.nodes);
        assert_eq!(back.leafs, bsp.leafs);
        assert_eq!(back.leafbrushes, bsp.leafbrushes);
        assert_eq!(back.routedata, bsp.routedata);
        assert_eq!(back.entity_string(), "{\n\"classname\" \"worldspawn\"\n}\n");
    }

    #[test]
    fn test_rejects_bad_ident_and_version() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(BspData::from_bytes(&bytes, "x"), Err(BspError::BadIdent(..))));

        let mut bytes = sample().to_bytes().unwrap();
        bytes[4] = 38;
        assert!(matches!(BspData::from_bytes(&bytes, "x"), Err(BspError::BadVersion(..))));
    }

    #[test]
    fn test_rejects_truncated_file() {
        let bytes = sample().to_bytes().unwrap();
        let cut = &bytes[..bytes.len() - 40];
        assert!(matches!(
            BspData::from_bytes(cut, "x"),
            Err(BspError::TruncatedLump { .. })
        ));
    }

    #[test]
    fn test_file_write_and_load() {
        let dir = std::env::temp_dir().join(format!("ufo2map-bspfile-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.bsp");

        let written = sample().write_bsp_file(&path).unwrap();
        let (loaded, checksum) = BspData::load_bsp_file(&path).unwrap();
        assert_eq!(written, checksum);
        assert_eq!(loaded.nodes.len(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }
}
