//! Recorder
//!
//! Drives one recording at a time. The emulator calls
//! [`Recorder::add_video_frame`] and [`Recorder::add_audio_frame`] once per
//! emulated frame from its own loop; nothing here spawns threads or reads a
//! clock. Video time advances exactly one frame per call and audio time
//! exactly by the samples encoded.
//!
//! # Example
//!
//! ```rust,no_run
//! use avrecord::{Recorder, RecorderConfig};
//!
//! fn main() -> avrecord::Result<()> {
//!     let mut recorder = Recorder::new(RecorderConfig::default());
//!     recorder.start_audio_video("capture.mp4", 240, 160, 16)?;
//!
//!     let frame = vec![0u8; 2 * 241 * 161];
//!     let chunk = vec![0i16; 2 * 735];
//!     for _ in 0..60 {
//!         recorder.add_video_frame(&frame)?;
//!         recorder.add_audio_frame(&chunk, 735)?;
//!     }
//!
//!     recorder.stop(true);
//!     Ok(())
//! }
//! ```

mod audio;
mod setup;
mod video;

pub use setup::SetupStage;

use std::path::Path;
use std::time::Duration;

use crate::backend::{FfmpegBackend, MediaBackend};
use crate::config::RecorderConfig;
use crate::error::{Error, Result};

use setup::{Session, VideoRequest};

/// Counters for the active recording
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Video frames encoded
    pub video_frames: u64,
    /// Video time presented (frames × frame duration)
    pub video_time: Duration,
    /// Encoder-sized audio frames encoded
    pub audio_frames: u64,
    /// Per-channel samples received from the caller
    pub samples_pushed: u64,
    /// Per-channel samples handed to the encoder at its own rate, padding
    /// included
    pub samples_submitted: u64,
    /// Silence appended to the final audio frame
    pub padding_samples: u64,
    pub packets_written: u64,
    pub bytes_written: u64,
}

/// Emulator A/V recorder
pub struct Recorder<B: MediaBackend = FfmpegBackend> {
    backend: B,
    config: RecorderConfig,
    session: Option<Session>,
}

impl Recorder<FfmpegBackend> {
    /// Recorder writing through FFmpeg
    pub fn new(config: RecorderConfig) -> Self {
        Self::with_backend(FfmpegBackend, config)
    }
}

impl Default for Recorder<FfmpegBackend> {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}

impl<B: MediaBackend> Recorder<B> {
    pub fn with_backend(backend: B, config: RecorderConfig) -> Self {
        Self {
            backend,
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Start recording video and, if the container has an audio codec, audio
    ///
    /// `color_depth` is bits per pixel of the raw frames (16, 24 or 32).
    pub fn start_audio_video(
        &mut self,
        destination: impl AsRef<Path>,
        width: u32,
        height: u32,
        color_depth: u32,
    ) -> Result<()> {
        let request = VideoRequest {
            width,
            height,
            color_depth,
        };
        self.start(destination.as_ref(), Some(request))
    }

    /// Start recording audio only
    pub fn start_audio_only(&mut self, destination: impl AsRef<Path>) -> Result<()> {
        self.start(destination.as_ref(), None)
    }

    fn start(&mut self, destination: &Path, video: Option<VideoRequest>) -> Result<()> {
        if self.session.is_some() {
            tracing::warn!("Start of {} refused: already recording", destination.display());
            return Err(Error::AlreadyRecording);
        }

        let session = Session::establish(&self.backend, &self.config, destination, video)?;
        self.session = Some(session);
        Ok(())
    }

    /// Finish the recording and release everything
    ///
    /// With `assume_successful_setup` false, buffered audio and delayed
    /// encoder output are discarded instead of flushed. Without an active
    /// session this does nothing and returns `None`.
    pub fn stop(&mut self, assume_successful_setup: bool) -> Option<SessionStats> {
        let mut session = self.session.take()?;
        Some(session.finish(assume_successful_setup))
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the active session records audio only
    pub fn is_audio_only(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_audio_only())
    }

    /// Encode one raw frame, border included
    ///
    /// Without an active session, or in an audio-only one, the frame is
    /// ignored and `Ok(())` returned.
    pub fn add_video_frame(&mut self, pixels: &[u8]) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => session.add_video_frame(pixels),
            None => {
                tracing::trace!("Not recording, video frame ignored");
                Ok(())
            }
        }
    }

    /// Buffer `sample_count` interleaved samples per channel
    ///
    /// Without an active session the samples are ignored and `Ok(())`
    /// returned.
    pub fn add_audio_frame(&mut self, samples: &[i16], sample_count: usize) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => session.add_audio_frame(samples, sample_count),
            None => {
                tracing::trace!("Not recording, audio samples ignored");
                Ok(())
            }
        }
    }

    /// Set the input sample rate for the next recording
    pub fn set_sample_rate(&mut self, rate: u32) {
        if self.session.is_some() {
            tracing::warn!("Sample rate change to {}Hz ignored while recording", rate);
            return;
        }
        if rate == 0 {
            tracing::warn!("Sample rate 0 ignored");
            return;
        }
        self.config.sample_rate = rate;
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Counters of the active session
    pub fn stats(&self) -> Option<SessionStats> {
        self.session.as_ref().map(|s| s.stats())
    }

    /// Setup stage of the active session (`HeaderWritten` once started)
    pub fn stage(&self) -> SetupStage {
        self.session.as_ref().map_or(SetupStage::Idle, |s| s.stage())
    }

    /// Presentation time of the next video frame, in 1/60 s ticks
    pub fn video_pts(&self) -> Option<i64> {
        self.session.as_ref()?.video().map(|v| v.npts())
    }

    /// Per-channel samples waiting for a complete encoder frame
    pub fn buffered_audio_samples(&self) -> Option<usize> {
        self.session.as_ref()?.audio().map(|a| a.buffered())
    }
}

impl<B: MediaBackend> Drop for Recorder<B> {
    fn drop(&mut self) {
        if self.session.is_some() {
            tracing::debug!("Recorder dropped while recording, stopping");
            self.stop(true);
        }
    }
}
