//! Pixel buffers and their compressed cache representation.

pub mod compress;
pub mod pixmap;

pub use compress::{CompressedRender, DEFAULT_COMPRESSION_LEVEL};
pub use pixmap::{PixelFormat, Pixmap};

pub type Result<T> = crate::Result<T>;
