//! Workspace placeholder crate.
//!
//! This crate exists so host applications can depend on `fpc-workspace` and
//! pull in the folder player core crates (`core-runtime`, `core-playback`)
//! without wiring each member individually.

pub use core_playback;
pub use core_runtime;
