// Thin re-export module: implementation is in `blockchain/core.rs` to allow
// progressive decomposition of chain responsibilities (blocks, validation,
// balance state, chain management).

pub mod core;
pub use core::*;
