//! Frame container shared by every pipeline stage.
//!
//! A `Frame` is an RGB24 pixel buffer plus its geometry and the 1-based index at
//! which it was read within the current run. Frames are owned by the controller
//! for a single loop iteration and are never retained beyond it.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Bytes per pixel for the RGB24 layout used throughout the crate.
pub const RGB_CHANNELS: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    index: u64,
}

impl Frame {
    /// Build a frame, validating that the buffer matches the geometry.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            index,
        })
    }

    /// Solid-colour frame, mostly useful for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, index: u64, rgb: [u8; 3]) -> Result<Self> {
        let len = expected_len(width, height)?;
        let mut pixels = Vec::with_capacity(len);
        for _ in 0..len / RGB_CHANNELS {
            pixels.extend_from_slice(&rgb);
        }
        Self::new(pixels, width, height, index)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
        Some([
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        ])
    }

    /// Check that geometry and buffer still agree.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("frame has empty geometry {}x{}", self.width, self.height));
        }
        let expected = expected_len(self.width, self.height)?;
        if self.pixels.len() != expected {
            return Err(anyhow!(
                "frame buffer holds {} bytes, geometry {}x{} needs {}",
                self.pixels.len(),
                self.width,
                self.height,
                expected
            ));
        }
        Ok(())
    }

    pub(crate) fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", self.width, self.height))
    }

    pub(crate) fn from_image(image: RgbImage, index: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            pixels: image.into_raw(),
            width,
            height,
            index,
        }
    }
}

fn expected_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 2, 2, 1).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2, 1).is_ok());
    }

    #[test]
    fn pixel_lookup_is_bounds_checked() -> Result<()> {
        let frame = Frame::filled(4, 3, 7, [10, 20, 30])?;
        assert_eq!(frame.pixel(3, 2), Some([10, 20, 30]));
        assert_eq!(frame.pixel(4, 0), None);
        assert_eq!(frame.index(), 7);
        Ok(())
    }

    #[test]
    fn empty_geometry_fails_validation() -> Result<()> {
        let frame = Frame::new(Vec::new(), 0, 0, 1)?;
        assert!(frame.validate().is_err());
        Ok(())
    }
}
