//! Decoded RGBA8 images.
//!
//! The renderer only consumes tightly packed 8-bit RGBA pixels. Anything the
//! `image` crate can decode (PNG and JPEG are enabled) is converted on load.

use std::path::Path;

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Bytes per RGBA8 texel.
pub const RGBA8_TEXEL_SIZE: usize = 4;

/// A tightly packed RGBA8 image in host memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ImageData {
    /// Wraps raw RGBA8 pixels.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::EmptyImage`] for a zero dimension, or
    /// [`ResourceError::PixelCountMismatch`] if `pixels` is not exactly
    /// `width * height * 4` bytes.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> ResourceResult<Self> {
        if width == 0 || height == 0 {
            return Err(ResourceError::EmptyImage { width, height });
        }
        let expected = width as usize * height as usize * RGBA8_TEXEL_SIZE;
        if pixels.len() != expected {
            return Err(ResourceError::PixelCountMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A 1x1 image of a single color.
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: color.to_vec(),
        }
    }

    /// Decodes an encoded image (PNG, JPEG) from memory.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Image`] if the bytes cannot be decoded.
    pub fn decode(bytes: &[u8]) -> ResourceResult<Self> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba8(width, height, rgba.into_raw())
    }

    /// Loads and decodes an image file.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::FileNotFound`] if the path does not exist,
    /// otherwise any IO or decoding error.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let data = Self::decode(&bytes)?;
        debug!(
            "Loaded image {}: {}x{}",
            path.display(),
            data.width,
            data.height
        );
        Ok(data)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGBA8 pixels, `width * height * 4` bytes.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_is_one_texel() {
        let white = ImageData::solid([255; 4]);
        assert_eq!((white.width(), white.height()), (1, 1));
        assert_eq!(white.pixels(), &[255, 255, 255, 255]);
    }

    #[test]
    fn test_from_rgba8_checks_length() {
        assert!(ImageData::from_rgba8(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            ImageData::from_rgba8(2, 2, vec![0; 12]),
            Err(ResourceError::PixelCountMismatch {
                expected: 16,
                actual: 12,
                ..
            })
        ));
        assert!(matches!(
            ImageData::from_rgba8(0, 2, Vec::new()),
            Err(ResourceError::EmptyImage { .. })
        ));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            ImageData::decode(b"not an image"),
            Err(ResourceError::Image(_))
        ));
    }
}
