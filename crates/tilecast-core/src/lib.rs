//! tilecast-core: frames, tile geometry, codec settings, and errors.
//!
//! This crate is the foundational dependency for the other tilecast crates.
//! It knows nothing about bitstreams; it only describes the pictures that
//! get cut into tiles and the geometry both sides of a stream agree on.

pub mod error;
pub mod frame;
pub mod geometry;
pub mod settings;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, ErrorScope, Result};
pub use frame::{Frame, Plane, PlaneBuffer};
pub use geometry::{GeometryRecord, TileGrid};
pub use settings::*;
