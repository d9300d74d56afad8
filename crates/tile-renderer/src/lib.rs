//! Rendering of filter results into map tiles.
//!
//! - Color compositing of a value plane and a mask into RGBA
//! - PNG encoding (indexed when the tile has few colors, RGBA otherwise)

pub mod compositor;
pub mod png;

pub use compositor::{composite, render_tile, Rgba};
pub use png::{create_png, create_png_auto, create_png_indexed};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("invalid color '{0}': expected four integers 0-255 as R,G,B,A")]
    InvalidColor(String),

    #[error("buffer has {actual} values, {width}x{height} tile needs {expected}")]
    SizeMismatch {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("PNG encoding failed: {0}")]
    Encoding(String),
}

pub type RenderResult<T> = Result<T, RenderError>;
