// error.rs -- Compilation errors
//
// Anything returned from here aborts the compilation of the current map.
// Recoverable geometry problems are logged with `warn!` at the point where
// they are found and never reach this type.

use std::io;

use thiserror::Error;
use ufo2map_common::bspfile::BspError;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{what} table full (limit {limit})")]
    CapacityExceeded { what: &'static str, limit: usize },
    #[error("line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error("plane normal has zero length")]
    BadNormal,
    #[error("entity {entity}, brush {brush}: origin brushes are not allowed in the world")]
    OriginBrushInWorld { entity: usize, brush: usize },
    #[error("no head node for inline model {classname}")]
    NoHeadNode { classname: String },
    #[error("inline model bounds exceed the world ({0:?})")]
    SubmodelBounds([f32; 3]),
    #[error("node {node}: faces between two solid leafs")]
    FacesBetweenSolids { node: usize },
    #[error("subdivision did not split the face")]
    SubdivisionFailed,
    #[error("vertex {0:?} is outside the world")]
    VertexOutOfRange([f32; 3]),
    #[error("routing workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Bsp(#[from] BspError),
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Fails with `CapacityExceeded` when `len` already reached `limit`.
pub fn check_capacity(what: &'static str, len: usize, limit: usize) -> Result<()> {
    if len >= limit {
        return Err(CompileError::CapacityExceeded { what, limit });
    }
    Ok(())
}

/// Push `item`, failing instead of growing past `limit`.
pub fn push_checked<T>(v: &mut Vec<T>, item: T, what: &'static str, limit: usize) -> Result<usize> {
    check_capacity(what, v.len(), limit)?;
    v.push(item);
    Ok(v.len() - 1)
}
