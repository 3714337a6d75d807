//! tis-emu library
//!
//! Deterministic emulation core for TIS-100-style tessellated processor
//! grids.

pub mod config;
pub mod machine;
pub mod parser;
pub mod puzzle;
pub mod stream;
pub mod testing;
