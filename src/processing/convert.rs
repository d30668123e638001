//! Pixel format conversion using FFmpeg swscale

use crate::error::{Error, Result};
use crate::types::{Picture, PictureLayout, PixelFormat};

use super::PixelConverter;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as SwsContext, Flags as SwsFlags};

/// Map PixelFormat to FFmpeg Pixel format
pub fn to_ffmpeg_pixel(format: PixelFormat) -> Pixel {
    match format {
        PixelFormat::Rgb565 => Pixel::RGB565LE,
        PixelFormat::Rgb24 => Pixel::RGB24,
        PixelFormat::Rgba => Pixel::RGBA,
        PixelFormat::Bgra => Pixel::BGRA,
        PixelFormat::Yuv420p => Pixel::YUV420P,
        PixelFormat::Yuv422p => Pixel::YUV422P,
        PixelFormat::Yuv444p => Pixel::YUV444P,
        PixelFormat::Nv12 => Pixel::NV12,
    }
}

/// Map an FFmpeg Pixel format back, if we model it
pub fn from_ffmpeg_pixel(pixel: Pixel) -> Option<PixelFormat> {
    match pixel {
        Pixel::RGB565LE => Some(PixelFormat::Rgb565),
        Pixel::RGB24 => Some(PixelFormat::Rgb24),
        Pixel::RGBA => Some(PixelFormat::Rgba),
        Pixel::BGRA => Some(PixelFormat::Bgra),
        Pixel::YUV420P => Some(PixelFormat::Yuv420p),
        Pixel::YUV422P => Some(PixelFormat::Yuv422p),
        Pixel::YUV444P => Some(PixelFormat::Yuv444p),
        Pixel::NV12 => Some(PixelFormat::Nv12),
        _ => None,
    }
}

/// Colorspace converter with a cached swscale context and frames
pub struct SwsConverter {
    scaler: SwsContext,
    src_layout: PictureLayout,
    dst_layout: PictureLayout,
    src_frame: ffmpeg::frame::Video,
    dst_frame: ffmpeg::frame::Video,
}

impl SwsConverter {
    pub fn new(src: PictureLayout, dst: PictureLayout) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::NoMemory(format!("FFmpeg init failed: {}", e)))?;

        let src_pixel = to_ffmpeg_pixel(src.format);
        let dst_pixel = to_ffmpeg_pixel(dst.format);

        let scaler = SwsContext::get(
            src_pixel,
            src.width,
            src.height,
            dst_pixel,
            dst.width,
            dst.height,
            SwsFlags::BILINEAR,
        )
        .map_err(|e| Error::NoMemory(format!("Failed to create scaler: {}", e)))?;

        let src_frame = ffmpeg::frame::Video::new(src_pixel, src.width, src.height);
        let dst_frame = ffmpeg::frame::Video::new(dst_pixel, dst.width, dst.height);
        if src_frame.is_empty() || dst_frame.is_empty() {
            return Err(Error::NoMemory("conversion frames".into()));
        }

        tracing::debug!(
            "Pixel converter {} {}x{} -> {} {}x{}",
            src.format,
            src.width,
            src.height,
            dst.format,
            dst.width,
            dst.height
        );

        Ok(Self {
            scaler,
            src_layout: src,
            dst_layout: dst,
            src_frame,
            dst_frame,
        })
    }
}

/// Copy picture planes into an FFmpeg frame, honouring both strides
fn copy_to_frame(picture: &Picture, frame: &mut ffmpeg::frame::Video) {
    for (index, plane) in picture.planes.iter().enumerate() {
        let stride = frame.stride(index);
        let data = frame.data_mut(index);
        for y in 0..plane.rows {
            let row = plane.row(y);
            let start = y * stride;
            data[start..start + row.len()].copy_from_slice(row);
        }
    }
}

/// Copy FFmpeg frame planes out into a picture
fn copy_from_frame(frame: &ffmpeg::frame::Video, picture: &mut Picture) {
    for (index, plane) in picture.planes.iter_mut().enumerate() {
        let stride = frame.stride(index);
        let data = frame.data(index);
        for y in 0..plane.rows {
            let start = y * stride;
            let row = plane.row_mut(y);
            let len = row.len();
            row.copy_from_slice(&data[start..start + len]);
        }
    }
}

impl PixelConverter for SwsConverter {
    fn convert(&mut self, src: &Picture, dst: &mut Picture) -> Result<()> {
        if src.layout != self.src_layout || dst.layout != self.dst_layout {
            return Err(Error::InvalidInput(format!(
                "converter built for {:?} -> {:?}",
                self.src_layout, self.dst_layout
            )));
        }

        copy_to_frame(src, &mut self.src_frame);

        self.scaler
            .run(&self.src_frame, &mut self.dst_frame)
            .map_err(|e| Error::NoMemory(format!("Conversion failed: {}", e)))?;

        copy_from_frame(&self.dst_frame, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_mapping_roundtrip() {
        for format in [
            PixelFormat::Rgb565,
            PixelFormat::Rgb24,
            PixelFormat::Rgba,
            PixelFormat::Yuv420p,
            PixelFormat::Nv12,
        ] {
            assert_eq!(from_ffmpeg_pixel(to_ffmpeg_pixel(format)), Some(format));
        }
        assert_eq!(from_ffmpeg_pixel(Pixel::P010LE), None);
    }

    #[test]
    fn test_black_rgb_to_yuv() {
        let src_layout = PictureLayout::new(PixelFormat::Rgb24, 16, 16);
        let dst_layout = PictureLayout::new(PixelFormat::Yuv420p, 16, 16);
        let mut converter = SwsConverter::new(src_layout, dst_layout).unwrap();

        let src = Picture::alloc(src_layout).unwrap();
        let mut dst = Picture::alloc(dst_layout).unwrap();
        converter.convert(&src, &mut dst).unwrap();

        // Black: limited-range luma 16, neutral chroma 128
        assert!(dst.planes[0].data.iter().all(|&y| y == 16));
        assert!(dst.planes[1].data.iter().all(|&u| u == 128));
    }
}
