//! Common types and utilities shared across the rezoning crates.

pub mod bbox;
pub mod error;
pub mod geometry;
pub mod tile;

pub use bbox::BoundingBox;
pub use error::{LcoeError, LcoeResult};
pub use geometry::{Geometry, Polygon};
pub use tile::TileCoord;
