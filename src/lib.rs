//! avrecord: emulator A/V recorder
//!
//! Turns the raw frames and samples an emulator produces at a fixed 60 Hz
//! cadence into a muxed media file through FFmpeg.
//!
//! # Features
//!
//! - **Video**: border crop, pixel format conversion, exact 1/60 s timestamps
//! - **Audio**: variable-size chunks regrouped into encoder-sized frames
//! - **Output**: any container FFmpeg can guess from the file extension
//! - **Catalog**: which containers the host can record video or audio into
//!
//! # Example
//!
//! ```rust,no_run
//! use avrecord::{Recorder, RecorderConfig};
//!
//! fn main() -> avrecord::Result<()> {
//!     let mut recorder = Recorder::new(RecorderConfig::default());
//!     recorder.start_audio_only("capture.wav")?;
//!
//!     let chunk = vec![0i16; 2 * 735];
//!     for _ in 0..600 {
//!         recorder.add_audio_frame(&chunk, 735)?;
//!     }
//!
//!     if let Some(stats) = recorder.stop(true) {
//!         println!("{} audio frames", stats.audio_frames);
//!     }
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod encode;
pub mod error;
pub mod output;
pub mod processing;
pub mod recorder;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use backend::{FfmpegBackend, MediaBackend};
pub use catalog::{
    list_supported_audio_codec_names, list_supported_audio_extensions,
    list_supported_video_codec_names, list_supported_video_extensions, Catalog,
};
pub use config::RecorderConfig;
pub use error::{Error, Result, ResultCode};
pub use output::ContainerFormat;
pub use recorder::{Recorder, SessionStats, SetupStage};
pub use types::{Framerate, PixelFormat, Resolution, TimeBase};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
