//! Lossless zlib compression of rendered pages.
//!
//! Renders are kept compressed in the cache: slide pages are mostly flat colour and shrink by an
//! order of magnitude, so a few megabytes of budget hold dozens of full-screen renders. The
//! compressed form carries its own layout so it can be turned back into an identical
//! [`Pixmap`] without consulting the document again.

use std::io::{Read, Write};
use std::mem;

use anyhow::Context;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::RenderError;
use crate::types::ImageDimensions;

use super::Result;
use super::pixmap::{PixelFormat, Pixmap};

/// Compression level used when none is configured. Favors speed; renders are produced on the
/// critical path of page changes.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 1;

/// Immutable compressed copy of a [`Pixmap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedRender {
    data: Vec<u8>,
    dimensions: ImageDimensions,
    bytes_per_row: usize,
    format: PixelFormat,
}

impl CompressedRender {
    /// Compress `pixmap` with the given zlib level (0-9).
    pub fn compress(pixmap: &Pixmap, level: u32) -> Result<Self> {
        pixmap.validate()?;

        let capacity = pixmap.pixels.len() / 8;
        let level = Compression::new(level.min(9));
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(capacity), level);
        encoder.write_all(&pixmap.pixels).context("compressing pixel data")?;
        let data = encoder.finish().context("finishing zlib stream")?;

        Ok(Self {
            data,
            dimensions: pixmap.dimensions,
            bytes_per_row: pixmap.bytes_per_row,
            format: pixmap.format,
        })
    }

    /// Rebuild the original pixel buffer.
    pub fn decompress(&self) -> std::result::Result<Pixmap, RenderError> {
        let expected = self.expected_len();
        let mut pixels = Vec::with_capacity(expected);
        ZlibDecoder::new(self.data.as_slice())
            .read_to_end(&mut pixels)
            .map_err(|source| RenderError::Decompress { source })?;

        if pixels.len() != expected {
            return Err(RenderError::LengthMismatch { expected, actual: pixels.len() });
        }

        Ok(Pixmap {
            dimensions: self.dimensions,
            bytes_per_row: self.bytes_per_row,
            format: self.format,
            pixels,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Size of the decompressed pixel buffer.
    pub fn expected_len(&self) -> usize {
        self.bytes_per_row * self.dimensions.height as usize
    }

    /// Bytes charged against the cache budget: payload plus fixed metadata.
    pub fn cost(&self) -> usize {
        self.data.len() + mem::size_of::<Self>()
    }
}
