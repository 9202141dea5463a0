#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::float_cmp,
         clippy::comparison_chain, clippy::manual_range_contains)]

pub mod q_shared;
pub mod qfiles;
pub mod crc;
pub mod compression;
pub mod bspfile;
pub mod routing;
pub mod cmodel;
