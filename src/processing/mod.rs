//! Video processing module
//!
//! - Border crop of raw emulator frames
//! - Pixel format conversion into the encoder's layout

mod convert;

pub use convert::{from_ffmpeg_pixel, to_ffmpeg_pixel, SwsConverter};

use crate::error::{Error, Result};
use crate::types::{Picture, PixelFormat};

/// Pixel format conversion between two fixed layouts
pub trait PixelConverter {
    /// Convert `src` into `dst`; both must match the layouts given at creation
    fn convert(&mut self, src: &Picture, dst: &mut Picture) -> Result<()>;
}

/// Layout of a raw emulator frame, border included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrameGeometry {
    pub format: PixelFormat,
    /// Visible width in pixels
    pub width: u32,
    /// Visible height in pixels
    pub height: u32,
    /// Rows of border above the picture
    pub top_border: u32,
    /// Columns of border right of each row
    pub right_border: u32,
}

impl RawFrameGeometry {
    pub fn new(
        format: PixelFormat,
        width: u32,
        height: u32,
        top_border: u32,
        right_border: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput(format!(
                "frame geometry {}x{} is empty",
                width, height
            )));
        }
        if format.packed_bytes_per_pixel().is_none() {
            return Err(Error::InvalidInput(format!(
                "raw frames must be packed RGB, not {}",
                format
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            top_border,
            right_border,
        })
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.packed_bytes_per_pixel().unwrap_or(4)
    }

    /// Bytes per raw row, right border included
    pub fn stride(&self) -> usize {
        self.bytes_per_pixel() * (self.width + self.right_border) as usize
    }

    /// Minimum length of a raw frame buffer
    pub fn frame_len(&self) -> usize {
        self.stride() * (self.top_border + self.height) as usize
    }
}

/// Copy the visible region of `raw` into the packed picture `dst`
pub fn crop_border(raw: &[u8], geometry: &RawFrameGeometry, dst: &mut Picture) -> Result<()> {
    if raw.len() < geometry.frame_len() {
        return Err(Error::InvalidInput(format!(
            "raw frame is {} bytes, {}x{} {} with border needs {}",
            raw.len(),
            geometry.width,
            geometry.height,
            geometry.format,
            geometry.frame_len()
        )));
    }
    if dst.format() != geometry.format
        || dst.width() != geometry.width
        || dst.height() != geometry.height
    {
        return Err(Error::InvalidInput(format!(
            "crop target is {}x{} {}",
            dst.width(),
            dst.height(),
            dst.format()
        )));
    }

    let stride = geometry.stride();
    let row_bytes = geometry.bytes_per_pixel() * geometry.width as usize;
    let plane = &mut dst.planes[0];

    for y in 0..geometry.height as usize {
        let start = (y + geometry.top_border as usize) * stride;
        plane
            .row_mut(y)
            .copy_from_slice(&raw[start..start + row_bytes]);
    }

    Ok(())
}
