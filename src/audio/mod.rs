//! Audio module
//!
//! Provides:
//! - Sample accumulation between emulator chunks and encoder frames
//! - Sample format and rate conversion into the encoder's layout
//! - FFmpeg audio encoding

mod buffer;
mod encode;
mod resample;
mod types;

pub use buffer::SampleAccumulator;
pub use encode::{
    from_ffmpeg_sample, pick_sample_rate, to_ffmpeg_layout, to_ffmpeg_sample, AudioEncoder,
    AudioEncoderParams, AudioStreamParams, FfmpegAudioEncoder,
};
pub use resample::{FfmpegResampler, PlaneQueue, Resampler};
pub use types::{AudioBlock, AudioLayout, ChannelLayout, SampleFormat};
