// crates/feed/src/lib.rs
//! I/O collaborators for the pure session core: a process feed that wires a
//! generator tool's stdout into decoded events, and offline replay of
//! recorded logs through the same decoder.

pub mod replay;
pub mod spawn;

pub use replay::*;
pub use spawn::*;
