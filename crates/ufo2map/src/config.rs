// config.rs -- Compiler switches

/// Faces larger than this along a texture axis get subdivided.
pub const DEFAULT_SUBDIVIDE_SIZE: f32 = 2048.0;

/// Every knob the pipeline reads. Filled from the command line by the
/// binary; tests build it with struct update syntax over `default()`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileConfig {
    pub subdivide_size: f32,
    pub noprune: bool,
    /// Drop detail brushes entirely.
    pub nodetail: bool,
    /// Treat detail brushes as structural.
    pub fulldetail: bool,
    pub nomerge: bool,
    pub nowater: bool,
    /// Emit every face vertex without snapping to shared vertices.
    pub noweld: bool,
    pub nosubdiv: bool,
    pub notjunc: bool,
    /// Keep downward facing faces.
    pub nobackclip: bool,
    /// Never reuse an edge between two faces.
    pub noshare: bool,
    /// Skip compilation when the output is newer than the source.
    pub onlynewer: bool,
    pub debugtrace: bool,
    pub noroute: bool,
    /// Routing worker threads, 0 for one per core.
    pub threads: usize,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            subdivide_size: DEFAULT_SUBDIVIDE_SIZE,
            noprune: false,
            nodetail: false,
            fulldetail: false,
            nomerge: false,
            nowater: false,
            noweld: false,
            nosubdiv: false,
            notjunc: false,
            nobackclip: false,
            noshare: false,
            onlynewer: false,
            debugtrace: false,
            noroute: false,
            threads: 0,
        }
    }
}
