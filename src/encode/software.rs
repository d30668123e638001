//! Software (CPU) video encoder via FFmpeg
//!
//! Opens whichever encoder the container pairs with its default video codec
//! (libx264, mpeg4, libvpx, ...). Frames arrive already converted to the
//! encoder's pixel format.

use crate::error::{Error, Result};
use crate::processing::{from_ffmpeg_pixel, to_ffmpeg_pixel};
use crate::types::{Packet, Picture, PixelFormat, StreamKind, TimeBase};

use super::{drain_encoder, receive_packets, VideoEncoder, VideoEncoderParams, VideoStreamParams};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::Dictionary;

/// Software encoder using FFmpeg CPU codecs
pub struct SoftwareEncoder {
    params: VideoEncoderParams,
    encoder: ffmpeg::encoder::Video,
    frame: ffmpeg::frame::Video,
    pixel_format: PixelFormat,
    frames_encoded: u64,
    bytes_output: u64,
}

impl SoftwareEncoder {
    /// Open the encoder named in `params`
    pub fn open(params: &VideoEncoderParams) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::NoCodec(format!("FFmpeg init failed: {}", e)))?;

        let codec = ffmpeg::encoder::find_by_name(&params.encoder)
            .ok_or_else(|| Error::NoCodec(format!("Encoder {} not found", params.encoder)))?;

        // First advertised format we can produce, else the common default
        let pixel_format = codec
            .video()
            .ok()
            .and_then(|v| v.formats())
            .and_then(|mut formats| formats.find_map(from_ffmpeg_pixel))
            .unwrap_or(PixelFormat::Yuv420p);

        let context = ffmpeg::codec::context::Context::new_with_codec(codec);
        let mut encoder = context
            .encoder()
            .video()
            .map_err(|e| Error::NoCodec(format!("{} is not a video encoder: {}", params.encoder, e)))?;

        encoder.set_width(params.width);
        encoder.set_height(params.height);
        encoder.set_format(to_ffmpeg_pixel(pixel_format));
        encoder.set_time_base(ffmpeg::Rational::new(
            params.time_base.num,
            params.time_base.den,
        ));
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(
            params.time_base.den,
            params.time_base.num,
        )));
        encoder.set_gop(params.gop_size);
        encoder.set_max_b_frames(params.max_b_frames as usize);
        encoder.set_bit_rate(params.bitrate_kbps as usize * 1000);

        if params.global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        if params.encoder.starts_with("libx26") {
            // Recording runs in lockstep with emulation
            opts.set("preset", "veryfast");
        }

        let encoder = encoder
            .open_with(opts)
            .map_err(|e| Error::NoCodec(format!("Failed to open {}: {}", params.encoder, e)))?;

        let frame = ffmpeg::frame::Video::new(
            to_ffmpeg_pixel(pixel_format),
            params.width,
            params.height,
        );
        if frame.is_empty() {
            return Err(Error::NoMemory("video encoder frame".into()));
        }

        tracing::info!(
            "Video encoder initialized: {} {}x{} {} @ {}kbps (gop {})",
            params.encoder,
            params.width,
            params.height,
            pixel_format,
            params.bitrate_kbps,
            params.gop_size
        );

        Ok(Self {
            params: params.clone(),
            encoder,
            frame,
            pixel_format,
            frames_encoded: 0,
            bytes_output: 0,
        })
    }

    /// Copy picture planes into the reusable FFmpeg frame
    fn fill_frame(&mut self, picture: &Picture) -> Result<()> {
        // The encoder may still reference the previous frame's buffers
        let ret = unsafe { ffmpeg::ffi::av_frame_make_writable(self.frame.as_mut_ptr()) };
        if ret < 0 {
            return Err(Error::NoMemory("video frame not writable".into()));
        }

        for (index, plane) in picture.planes.iter().enumerate() {
            let stride = self.frame.stride(index);
            let data = self.frame.data_mut(index);
            for y in 0..plane.rows {
                let row = plane.row(y);
                let start = y * stride;
                data[start..start + row.len()].copy_from_slice(row);
            }
        }
        Ok(())
    }

    fn account(&mut self, packets: &[Packet]) {
        self.bytes_output += packets.iter().map(|p| p.size() as u64).sum::<u64>();
    }
}

impl VideoEncoder for SoftwareEncoder {
    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn time_base(&self) -> TimeBase {
        self.params.time_base
    }

    fn stream_params(&self) -> VideoStreamParams {
        let extradata = unsafe {
            let ptr = (*self.encoder.as_ptr()).extradata;
            let size = (*self.encoder.as_ptr()).extradata_size as usize;
            if !ptr.is_null() && size > 0 {
                std::slice::from_raw_parts(ptr, size).to_vec()
            } else {
                Vec::new()
            }
        };

        VideoStreamParams {
            encoder: self.params.encoder.clone(),
            width: self.params.width,
            height: self.params.height,
            pixel_format: self.pixel_format,
            time_base: self.params.time_base,
            bitrate: self.params.bitrate_kbps as i64 * 1000,
            extradata,
        }
    }

    fn encode(&mut self, picture: &Picture, pts: i64) -> Result<Vec<Packet>> {
        if picture.format() != self.pixel_format
            || picture.width() != self.params.width
            || picture.height() != self.params.height
        {
            return Err(Error::NoCodec(format!(
                "{} expects {}x{} {}, got {}x{} {}",
                self.params.encoder,
                self.params.width,
                self.params.height,
                self.pixel_format,
                picture.width(),
                picture.height(),
                picture.format()
            )));
        }

        self.fill_frame(picture)?;
        self.frame.set_pts(Some(pts));

        self.encoder
            .send_frame(&self.frame)
            .map_err(|e| Error::NoCodec(format!("Failed to send frame: {}", e)))?;

        self.frames_encoded += 1;
        let packets = receive_packets(&mut self.encoder, StreamKind::Video)?;
        self.account(&packets);
        Ok(packets)
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        let packets = drain_encoder(&mut self.encoder, StreamKind::Video)?;
        self.account(&packets);

        tracing::info!(
            "Video encoder flushed: {} frames, {} bytes",
            self.frames_encoded,
            self.bytes_output
        );

        Ok(packets)
    }
}

impl Drop for SoftwareEncoder {
    fn drop(&mut self) {
        tracing::debug!("Dropping video encoder {}", self.params.encoder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(encoder: &str) -> VideoEncoderParams {
        VideoEncoderParams {
            encoder: encoder.into(),
            width: 240,
            height: 160,
            time_base: TimeBase::new(1, 60),
            bitrate_kbps: 2000,
            gop_size: 60,
            max_b_frames: 0,
            global_header: false,
        }
    }

    #[test]
    fn test_unknown_encoder() {
        let result = SoftwareEncoder::open(&params("no-such-encoder"));
        assert!(matches!(result, Err(Error::NoCodec(_))));
    }

    #[test]
    fn test_mpeg4_encodes() {
        if ffmpeg::encoder::find_by_name("mpeg4").is_none() {
            println!("mpeg4 not available, skipping test");
            return;
        }

        let mut encoder = SoftwareEncoder::open(&params("mpeg4")).unwrap();
        let layout = crate::types::PictureLayout::new(encoder.pixel_format(), 240, 160);
        let picture = Picture::alloc(layout).unwrap();

        let mut packets = Vec::new();
        for pts in 0..10 {
            packets.extend(encoder.encode(&picture, pts).unwrap());
        }
        packets.extend(encoder.flush().unwrap());

        assert_eq!(packets.len(), 10);
        assert!(packets.iter().all(|p| p.stream == StreamKind::Video));
    }
}
