//! Media backend
//!
//! Everything the recorder needs from the encoding library goes through
//! [`MediaBackend`]. [`FfmpegBackend`] is the production implementation.

use std::path::Path;

use crate::audio::{
    AudioEncoder, AudioEncoderParams, AudioLayout, FfmpegAudioEncoder, FfmpegResampler, Resampler,
};
use crate::encode::{SoftwareEncoder, VideoEncoder, VideoEncoderParams};
use crate::error::Result;
use crate::output::{self, ContainerFormat, FfmpegMuxer, Muxer};
use crate::processing::{PixelConverter, SwsConverter};
use crate::types::PictureLayout;

/// Encoding/muxing library consumed by the recorder
pub trait MediaBackend {
    /// Pick a container from the destination's extension
    fn guess_format(&self, destination: &Path) -> Result<ContainerFormat>;

    /// Open `destination` for writing as `format`
    fn open_container(&self, destination: &Path, format: &ContainerFormat)
        -> Result<Box<dyn Muxer>>;

    fn open_video_encoder(&self, params: &VideoEncoderParams) -> Result<Box<dyn VideoEncoder>>;

    fn open_audio_encoder(&self, params: &AudioEncoderParams) -> Result<Box<dyn AudioEncoder>>;

    fn pixel_converter(
        &self,
        src: PictureLayout,
        dst: PictureLayout,
    ) -> Result<Box<dyn PixelConverter>>;

    fn resampler(&self, src: AudioLayout, dst: AudioLayout) -> Result<Box<dyn Resampler>>;

    /// Snapshot of every registered output format, in registry order
    fn output_formats(&self) -> Vec<ContainerFormat>;
}

/// FFmpeg implementation of [`MediaBackend`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    fn guess_format(&self, destination: &Path) -> Result<ContainerFormat> {
        output::guess_format(destination)
    }

    fn open_container(
        &self,
        destination: &Path,
        format: &ContainerFormat,
    ) -> Result<Box<dyn Muxer>> {
        Ok(Box::new(FfmpegMuxer::open(destination, format)?))
    }

    fn open_video_encoder(&self, params: &VideoEncoderParams) -> Result<Box<dyn VideoEncoder>> {
        Ok(Box::new(SoftwareEncoder::open(params)?))
    }

    fn open_audio_encoder(&self, params: &AudioEncoderParams) -> Result<Box<dyn AudioEncoder>> {
        Ok(Box::new(FfmpegAudioEncoder::open(params)?))
    }

    fn pixel_converter(
        &self,
        src: PictureLayout,
        dst: PictureLayout,
    ) -> Result<Box<dyn PixelConverter>> {
        Ok(Box::new(SwsConverter::new(src, dst)?))
    }

    fn resampler(&self, src: AudioLayout, dst: AudioLayout) -> Result<Box<dyn Resampler>> {
        Ok(Box::new(FfmpegResampler::new(src, dst)?))
    }

    fn output_formats(&self) -> Vec<ContainerFormat> {
        output::registered_formats()
    }
}
