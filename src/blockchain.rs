// Thin re-export module: implementation lives in `blockchain/core.rs`, split
// into block sealing inputs, chain maintenance and validation.

pub mod core;
pub use core::*;
