//! Raw pixel buffers exchanged between backends, workers, and subscribers.

use anyhow::{anyhow, ensure};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::types::ImageDimensions;

use super::Result;

/// Memory layout of a single pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Straight-alpha RGBA, one byte per channel.
    Rgba8,
    /// Premultiplied BGRA as produced by most native rasterizers.
    Bgra8,
    Rgb8,
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Row-major pixel buffer. Rows may be padded: `bytes_per_row` can exceed the packed width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    pub dimensions: ImageDimensions,
    pub bytes_per_row: usize,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl Pixmap {
    /// Wrap a tightly packed buffer.
    pub fn packed(dimensions: ImageDimensions, format: PixelFormat, pixels: Vec<u8>) -> Self {
        let bytes_per_row = dimensions.width as usize * format.bytes_per_pixel();
        Self { dimensions, bytes_per_row, format, pixels }
    }

    /// Buffer where every byte has `value`.
    ///
    /// A layout too large to address gets an empty buffer, which [`Pixmap::validate`] rejects.
    pub fn filled(dimensions: ImageDimensions, format: PixelFormat, value: u8) -> Self {
        let bytes_per_row = dimensions.width as usize * format.bytes_per_pixel();
        let len = bytes_per_row.checked_mul(dimensions.height as usize).unwrap_or(0);
        Self { dimensions, bytes_per_row, format, pixels: vec![value; len] }
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Number of bytes the layout requires, or `None` if that overflows `usize`.
    pub fn expected_len(&self) -> Option<usize> {
        self.bytes_per_row.checked_mul(self.dimensions.height as usize)
    }

    /// Check the buffer is non-empty and consistent with its declared layout.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.dimensions.is_empty(), "pixmap has zero dimensions ({})", self.dimensions);
        let min_row = self.dimensions.width as usize * self.format.bytes_per_pixel();
        ensure!(
            self.bytes_per_row >= min_row,
            "row stride {} is smaller than {} bytes of pixel data",
            self.bytes_per_row,
            min_row
        );
        let expected = self.expected_len().ok_or_else(|| {
            anyhow!("row stride {} overflows {} rows", self.bytes_per_row, self.dimensions.height)
        })?;
        ensure!(
            self.pixels.len() == expected,
            "pixel buffer holds {} bytes but layout requires {}",
            self.pixels.len(),
            expected
        );
        Ok(())
    }

    /// Convert into an `image` buffer, dropping row padding.
    ///
    /// This is how subscribers turn a broadcast render into something they can display or encode.
    ///
    /// Returns `None` for premultiplied BGRA, which has no lossless `image` counterpart.
    pub fn to_image(&self) -> Option<DynamicImage> {
        let packed = self.packed_rows();
        let (width, height) = (self.width(), self.height());
        match self.format {
            PixelFormat::Rgba8 => {
                RgbaImage::from_raw(width, height, packed).map(DynamicImage::from)
            }
            PixelFormat::Rgb8 => RgbImage::from_raw(width, height, packed).map(DynamicImage::from),
            PixelFormat::Gray8 => {
                GrayImage::from_raw(width, height, packed).map(DynamicImage::from)
            }
            PixelFormat::Bgra8 => None,
        }
    }

    fn packed_rows(&self) -> Vec<u8> {
        let row_len = self.dimensions.width as usize * self.format.bytes_per_pixel();
        if row_len == self.bytes_per_row {
            return self.pixels.clone();
        }
        self.pixels
            .chunks(self.bytes_per_row.max(1))
            .take(self.dimensions.height as usize)
            .flat_map(|row| &row[..row_len.min(row.len())])
            .copied()
            .collect()
    }
}
