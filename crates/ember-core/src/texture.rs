//! Decoded texture rasters.

use std::path::Path;

use crate::error::{Error, Result};

/// An 8-bit RGBA raster, `width * height * 4` bytes, rows top to bottom.
#[derive(Clone, Debug)]
pub struct TextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureData {
    /// Wrap raw RGBA bytes, checking the size against the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidData(format!(
                "texture dimensions must be non-zero, got {width}x{height}"
            )));
        }

        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::InvalidData(format!(
                "{width}x{height} RGBA texture needs {expected} bytes, got {}",
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decode an image file into RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| Error::asset_load(path, e))?
            .to_rgba8();

        let (width, height) = image.dimensions();
        tracing::info!("Loaded {}: {}x{}", path.display(), width, height);

        Self::from_rgba(width, height, image.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}
