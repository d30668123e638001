//! Common types used throughout avrecord

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Game Boy Advance screen
    pub const GBA: Self = Self::new(240, 160);
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Stream time base (seconds per tick = num / den)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Convert a tick count to seconds
    pub fn seconds(&self, ticks: i64) -> f64 {
        ticks as f64 * self.num as f64 / self.den as f64
    }

    /// Convert a tick count to a duration
    pub fn duration(&self, ticks: i64) -> Duration {
        Duration::from_secs_f64(self.seconds(ticks.max(0)))
    }
}

impl std::fmt::Display for TimeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Framerate representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framerate {
    pub num: u32,
    pub den: u32,
}

impl Framerate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Emulated consoles present one frame every 1/60 s
    pub const FPS_60: Self = Self::new(60, 1);

    /// Get framerate as f64
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Time base where one tick is exactly one frame
    pub fn time_base(&self) -> TimeBase {
        TimeBase::new(self.den as i32, self.num as i32)
    }

    /// Per-channel samples in one frame at `sample_rate`, rounded up
    pub fn samples_per_frame(&self, sample_rate: u32) -> usize {
        let num = sample_rate as u64 * self.den as u64;
        num.div_ceil(self.num as u64) as usize
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::FPS_60
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{} fps", self.num)
        } else {
            write!(f, "{:.2} fps", self.as_f64())
        }
    }
}

/// Pixel format / memory layout of a picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 16-bit RGB 5:6:5, little endian
    Rgb565,
    /// 24-bit packed RGB
    Rgb24,
    /// 32-bit RGBA
    Rgba,
    /// 32-bit BGRA
    Bgra,
    /// Planar YUV 4:2:0
    Yuv420p,
    /// Planar YUV 4:2:2
    Yuv422p,
    /// Planar YUV 4:4:4
    Yuv444p,
    /// Y plane + interleaved UV
    Nv12,
}

impl PixelFormat {
    /// Source format for an emulator color depth in bits
    pub fn from_color_depth(depth: u32) -> Result<Self> {
        match depth {
            16 => Ok(PixelFormat::Rgb565),
            24 => Ok(PixelFormat::Rgb24),
            32 => Ok(PixelFormat::Rgba),
            other => Err(Error::InvalidInput(format!(
                "unsupported color depth {}",
                other
            ))),
        }
    }

    /// Bytes per pixel for packed formats
    pub fn packed_bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Rgb565 => Some(2),
            PixelFormat::Rgb24 => Some(3),
            PixelFormat::Rgba | PixelFormat::Bgra => Some(4),
            _ => None,
        }
    }

    /// (row bytes, rows) for each plane of a `width` x `height` picture
    pub fn plane_sizes(&self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let w = width as usize;
        let h = height as usize;
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);

        match self {
            PixelFormat::Rgb565 | PixelFormat::Rgb24 | PixelFormat::Rgba | PixelFormat::Bgra => {
                let bpp = self.packed_bytes_per_pixel().unwrap_or(4);
                vec![(w * bpp, h)]
            }
            PixelFormat::Yuv420p => vec![(w, h), (cw, ch), (cw, ch)],
            PixelFormat::Yuv422p => vec![(w, h), (cw, h), (cw, h)],
            PixelFormat::Yuv444p => vec![(w, h), (w, h), (w, h)],
            PixelFormat::Nv12 => vec![(w, h), (cw * 2, ch)],
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PixelFormat::Rgb565 => "rgb565le",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Nv12 => "nv12",
        };
        f.write_str(name)
    }
}

/// Format and geometry of a picture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureLayout {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

impl PictureLayout {
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
        }
    }
}

/// One plane of picture data
#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Row stride in bytes
    pub stride: usize,
    /// Visible bytes per row (<= stride)
    pub row_bytes: usize,
    pub rows: usize,
}

impl Plane {
    /// Visible part of row `y`
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.row_bytes]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.stride;
        &mut self.data[start..start + self.row_bytes]
    }
}

/// An owned, planar or packed picture
#[derive(Debug, Clone)]
pub struct Picture {
    pub layout: PictureLayout,
    pub planes: Vec<Plane>,
}

impl Picture {
    /// Allocate a zeroed picture, failing with `NoMemory` instead of aborting
    pub fn alloc(layout: PictureLayout) -> Result<Self> {
        let planes = layout
            .format
            .plane_sizes(layout.width, layout.height)
            .into_iter()
            .map(|(row_bytes, rows)| {
                let data = zeroed_bytes(row_bytes * rows)?;
                Ok(Plane {
                    data,
                    stride: row_bytes,
                    row_bytes,
                    rows,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { layout, planes })
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    pub fn format(&self) -> PixelFormat {
        self.layout.format
    }

    /// Total bytes held by all planes
    pub fn size_bytes(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }
}

/// Allocate `len` zero bytes, reporting allocation failure as an error
pub fn zeroed_bytes(len: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|e| Error::NoMemory(format!("{} byte buffer: {}", len, e)))?;
    data.resize(len, 0);
    Ok(data)
}

/// Which container stream a packet belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

/// Encoded packet (output from an encoder)
#[derive(Debug, Clone)]
pub struct Packet {
    /// Destination stream
    pub stream: StreamKind,
    /// Encoded data
    pub data: Vec<u8>,
    /// Presentation timestamp, in the encoder time base
    pub pts: Option<i64>,
    /// Decode timestamp, in the encoder time base
    pub dts: Option<i64>,
    /// Duration
    pub duration: i64,
    /// Is this a keyframe?
    pub is_keyframe: bool,
}

impl Packet {
    pub fn new(stream: StreamKind, data: Vec<u8>, pts: i64) -> Self {
        Self {
            stream,
            data,
            pts: Some(pts),
            dts: Some(pts),
            duration: 0,
            is_keyframe: false,
        }
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
