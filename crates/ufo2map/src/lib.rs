#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::float_cmp,
         clippy::comparison_chain, clippy::manual_range_contains)]

pub mod error;
pub mod config;
pub mod stats;
pub mod polylib;
pub mod planes;
pub mod scriplib;
pub mod textures;
pub mod brush;
pub mod map;
pub mod tree;
pub mod brushbsp;
pub mod portals;
pub mod faces;
pub mod writebsp;
pub mod routing;
pub mod qbsp;
