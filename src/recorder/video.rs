//! Video pipeline: crop, convert, stamp, encode

use std::time::Duration;

use crate::backend::MediaBackend;
use crate::encode::{VideoEncoder, VideoEncoderParams, VideoStreamParams};
use crate::error::Result;
use crate::processing::{crop_border, PixelConverter, RawFrameGeometry};
use crate::types::{Packet, Picture, PictureLayout, TimeBase};

/// Per-session video state
pub(crate) struct VideoStream {
    geometry: RawFrameGeometry,
    encoder: Box<dyn VideoEncoder>,
    converter: Box<dyn PixelConverter>,
    cropped: Picture,
    converted: Picture,
    time_base: TimeBase,
    /// Presentation time of the next frame, in `time_base` ticks
    npts: i64,
    frames: u64,
}

impl VideoStream {
    /// Open the encoder and conversion path for `geometry`
    pub(crate) fn open<B: MediaBackend + ?Sized>(
        backend: &B,
        geometry: RawFrameGeometry,
        params: &VideoEncoderParams,
    ) -> Result<Self> {
        let encoder = backend.open_video_encoder(params)?;

        let src = PictureLayout::new(geometry.format, geometry.width, geometry.height);
        let dst = PictureLayout::new(encoder.pixel_format(), geometry.width, geometry.height);
        let converter = backend.pixel_converter(src, dst)?;

        let cropped = Picture::alloc(src)?;
        let converted = Picture::alloc(dst)?;

        Ok(Self {
            geometry,
            time_base: encoder.time_base(),
            encoder,
            converter,
            cropped,
            converted,
            npts: 0,
            frames: 0,
        })
    }

    pub(crate) fn stream_params(&self) -> VideoStreamParams {
        self.encoder.stream_params()
    }

    /// Encode one raw frame; each call advances presentation time by one frame
    pub(crate) fn push(&mut self, raw: &[u8]) -> Result<Vec<Packet>> {
        crop_border(raw, &self.geometry, &mut self.cropped)?;
        self.converter.convert(&self.cropped, &mut self.converted)?;

        let pts = self.npts;
        let packets = self.encoder.encode(&self.converted, pts)?;

        self.npts += 1;
        self.frames += 1;
        tracing::trace!("Video frame {} (pts {})", self.frames, pts);
        Ok(packets)
    }

    pub(crate) fn flush(&mut self) -> Result<Vec<Packet>> {
        self.encoder.flush()
    }

    /// Presentation time of the next frame
    pub(crate) fn npts(&self) -> i64 {
        self.npts
    }

    pub(crate) fn frames(&self) -> u64 {
        self.frames
    }

    /// Video time presented so far
    pub(crate) fn elapsed(&self) -> Duration {
        self.time_base.duration(self.npts)
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        tracing::debug!("Released video stream after {} frames", self.frames);
    }
}
