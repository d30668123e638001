//! Stream setup and session teardown
//!
//! A [`Session`] owns every resource acquired for one recording. Setup
//! fills it step by step; [`Session::release`] empties it in reverse order
//! and also runs on drop, so an early return from any step leaves nothing
//! behind.

use std::path::{Path, PathBuf};

use crate::audio::{AudioEncoderParams, ChannelLayout};
use crate::backend::MediaBackend;
use crate::config::RecorderConfig;
use crate::encode::VideoEncoderParams;
use crate::error::{Error, Result};
use crate::output::{ContainerFormat, Muxer};
use crate::processing::RawFrameGeometry;
use crate::types::{Packet, PixelFormat};

use super::audio::{AudioSizing, AudioStream};
use super::video::VideoStream;
use super::SessionStats;

/// Steps of stream setup, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SetupStage {
    Idle,
    /// Container format guessed and output opened
    CommonSetup,
    /// Raw frame geometry and pixel format fixed
    VideoStreamInfo,
    /// Video encoder, converter and pictures ready
    VideoStreamEncoder,
    /// Audio encoder, resampler and accumulation buffer ready
    AudioStreamEncoder,
    /// Container header written; session is active
    HeaderWritten,
}

impl std::fmt::Display for SetupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SetupStage::Idle => "idle",
            SetupStage::CommonSetup => "common setup",
            SetupStage::VideoStreamInfo => "video stream info",
            SetupStage::VideoStreamEncoder => "video stream encoder",
            SetupStage::AudioStreamEncoder => "audio stream encoder",
            SetupStage::HeaderWritten => "header written",
        };
        f.write_str(name)
    }
}

/// Video half of a start request
#[derive(Debug, Clone, Copy)]
pub(crate) struct VideoRequest {
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
}

/// Resources of one recording
pub(crate) struct Session {
    destination: PathBuf,
    stage: SetupStage,
    muxer: Option<Box<dyn Muxer>>,
    geometry: Option<RawFrameGeometry>,
    video: Option<VideoStream>,
    audio: Option<AudioStream>,
    audio_only: bool,
    packets_written: u64,
    /// First fatal error; the session only accepts `stop` afterwards
    failure: Option<Error>,
}

impl Session {
    /// Run every setup step. On failure everything acquired so far is
    /// released before the error is returned.
    pub(crate) fn establish<B: MediaBackend + ?Sized>(
        backend: &B,
        config: &RecorderConfig,
        destination: &Path,
        video: Option<VideoRequest>,
    ) -> Result<Self> {
        let mut session = Session {
            destination: destination.to_path_buf(),
            stage: SetupStage::Idle,
            muxer: None,
            geometry: None,
            video: None,
            audio: None,
            audio_only: video.is_none(),
            packets_written: 0,
            failure: None,
        };

        match session.run_setup(backend, config, video) {
            Ok(()) => Ok(session),
            Err(e) => {
                tracing::warn!(
                    "Recording setup for {} failed after {}: {}",
                    destination.display(),
                    session.stage,
                    e
                );
                session.release();
                Err(e)
            }
        }
    }

    fn run_setup<B: MediaBackend + ?Sized>(
        &mut self,
        backend: &B,
        config: &RecorderConfig,
        video: Option<VideoRequest>,
    ) -> Result<()> {
        config.validate()?;

        let format = backend.guess_format(&self.destination)?;
        let video_encoder = match video {
            Some(_) => Some(
                format
                    .video_encoder()
                    .ok_or_else(|| Error::NoCodec(format!("{} has no video encoder", format.name)))?
                    .to_string(),
            ),
            None => None,
        };
        let audio_encoder = match (format.audio_encoder(), video) {
            (Some(name), _) => Some(name.to_string()),
            (None, Some(_)) => None,
            (None, None) => {
                return Err(Error::NoCodec(format!("{} has no audio encoder", format.name)))
            }
        };
        self.muxer = Some(backend.open_container(&self.destination, &format)?);
        self.advance(SetupStage::CommonSetup);

        if let (Some(request), Some(encoder)) = (video, video_encoder) {
            let source = PixelFormat::from_color_depth(request.color_depth)?;
            let geometry = RawFrameGeometry::new(
                source,
                request.width,
                request.height,
                config.border.top,
                config.border.right,
            )?;
            self.geometry = Some(geometry);
            self.advance(SetupStage::VideoStreamInfo);

            let params = VideoEncoderParams {
                encoder,
                width: request.width,
                height: request.height,
                time_base: config.framerate.time_base(),
                bitrate_kbps: config.video.bitrate_kbps,
                gop_size: config.video.gop_size,
                max_b_frames: config.video.max_b_frames,
                global_header: format.global_header,
            };
            let stream = VideoStream::open(backend, geometry, &params)?;
            let stream_params = stream.stream_params();
            self.video = Some(stream);
            self.muxer_mut()?.add_video_stream(&stream_params)?;
            self.advance(SetupStage::VideoStreamEncoder);
        }

        if let Some(encoder) = audio_encoder {
            let params = AudioEncoderParams {
                encoder,
                sample_rate: config.sample_rate,
                channels: ChannelLayout::from_channels(config.channels)?,
                bitrate_kbps: config.audio.bitrate_kbps,
                global_header: format.global_header,
            };
            let sizing = AudioSizing {
                chunk_samples: config.framerate.samples_per_frame(config.sample_rate),
                slack_chunks: config.buffer_slack_chunks,
                fallback_frame_size: config.fallback_frame_size,
            };
            let stream = AudioStream::open(backend, &params, sizing)?;
            let stream_params = stream.stream_params();
            self.audio = Some(stream);
            self.muxer_mut()?.add_audio_stream(&stream_params)?;
            self.advance(SetupStage::AudioStreamEncoder);
        }

        self.muxer_mut()?.write_header()?;
        self.advance(SetupStage::HeaderWritten);

        self.log_started(&format);
        Ok(())
    }

    fn advance(&mut self, stage: SetupStage) {
        tracing::debug!("Setup stage: {}", stage);
        self.stage = stage;
    }

    fn log_started(&self, format: &ContainerFormat) {
        let video = match (&self.geometry, &self.video) {
            (Some(g), Some(_)) => format!("{}x{} {}", g.width, g.height, g.format),
            _ => "none".to_string(),
        };
        let audio = match &self.audio {
            Some(a) => format!("frame_size={}", a.frame_size()),
            None => "none".to_string(),
        };
        tracing::info!(
            "Recording to {} ({}): video {}, audio {}",
            self.destination.display(),
            format.name,
            video,
            audio
        );
    }

    fn muxer_mut(&mut self) -> Result<&mut Box<dyn Muxer>> {
        self.muxer
            .as_mut()
            .ok_or_else(|| Error::FileWrite(format!("{} is closed", self.destination.display())))
    }

    pub(crate) fn is_audio_only(&self) -> bool {
        self.audio_only
    }

    pub(crate) fn stage(&self) -> SetupStage {
        self.stage
    }

    pub(crate) fn video(&self) -> Option<&VideoStream> {
        self.video.as_ref()
    }

    pub(crate) fn audio(&self) -> Option<&AudioStream> {
        self.audio.as_ref()
    }

    /// Encode one raw video frame
    pub(crate) fn add_video_frame(&mut self, pixels: &[u8]) -> Result<()> {
        self.check_usable()?;
        let Session {
            destination,
            muxer,
            video,
            packets_written,
            ..
        } = self;
        let Some(video) = video.as_mut() else {
            tracing::trace!("Audio-only session, video frame ignored");
            return Ok(());
        };

        let result = video.push(pixels).and_then(|packets| {
            PacketSink::open(muxer, packets_written, destination)?.write(packets)
        });
        self.note(result)
    }

    /// Buffer one audio chunk and encode what fills complete frames
    pub(crate) fn add_audio_frame(&mut self, samples: &[i16], sample_count: usize) -> Result<()> {
        self.check_usable()?;
        let Session {
            destination,
            muxer,
            audio,
            packets_written,
            ..
        } = self;
        let Some(audio) = audio.as_mut() else {
            tracing::trace!("Session has no audio stream, samples ignored");
            return Ok(());
        };
        if sample_count == 0 {
            return Ok(());
        }

        let result = PacketSink::open(muxer, packets_written, destination)
            .and_then(|mut sink| audio.push(samples, sample_count, &mut sink));
        self.note(result)
    }

    fn check_usable(&self) -> Result<()> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Remember fatal errors so later frames are refused
    fn note(&mut self, result: Result<()>) -> Result<()> {
        if let Err(e) = &result {
            if e.is_fatal() && self.failure.is_none() {
                tracing::error!("Recording to {} failed: {}", self.destination.display(), e);
                self.failure = Some(e.clone());
            }
        }
        result
    }

    pub(crate) fn stats(&self) -> SessionStats {
        let mut stats = SessionStats {
            packets_written: self.packets_written,
            bytes_written: self.muxer.as_ref().map_or(0, |m| m.bytes_written()),
            ..SessionStats::default()
        };
        if let Some(video) = &self.video {
            stats.video_frames = video.frames();
            stats.video_time = video.elapsed();
        }
        if let Some(audio) = &self.audio {
            stats.audio_frames = audio.frames();
            stats.samples_pushed = audio.samples_pushed();
            stats.samples_submitted = audio.samples_submitted();
            stats.padding_samples = audio.padding_samples();
        }
        stats
    }

    /// Flush buffered audio and delayed packets, finalize the container,
    /// then release everything. With `flush` false only the trailer is
    /// written, and only if the header was.
    pub(crate) fn finish(&mut self, flush: bool) -> SessionStats {
        if flush && self.failure.is_none() {
            self.flush_streams();
        }

        if self.stage == SetupStage::HeaderWritten {
            if let Some(muxer) = self.muxer.as_mut() {
                if let Err(e) = muxer.write_trailer() {
                    tracing::warn!("Finalizing {} failed: {}", self.destination.display(), e);
                }
            }
        }

        let stats = self.stats();
        tracing::info!(
            "Recording stopped: {} ({} video frames, {} audio frames, {} packets, {:.2} MB)",
            self.destination.display(),
            stats.video_frames,
            stats.audio_frames,
            stats.packets_written,
            stats.bytes_written as f64 / 1_000_000.0
        );

        self.release();
        stats
    }

    /// Drain each stream on its own; a failure in one does not stop the other
    fn flush_streams(&mut self) {
        let Session {
            destination,
            muxer,
            video,
            audio,
            packets_written,
            ..
        } = self;

        if let Some(audio) = audio.as_mut() {
            let result = PacketSink::open(muxer, packets_written, destination)
                .and_then(|mut sink| audio.finish(&mut sink));
            if let Err(e) = result {
                tracing::warn!("Flushing audio of {} failed: {}", destination.display(), e);
            }
        }
        if let Some(video) = video.as_mut() {
            let result = video.flush().and_then(|packets| {
                PacketSink::open(muxer, packets_written, destination)?.write(packets)
            });
            if let Err(e) = result {
                tracing::warn!("Flushing video of {} failed: {}", destination.display(), e);
            }
        }
    }

    /// Drop owned resources in reverse acquisition order. Safe to repeat.
    pub(crate) fn release(&mut self) {
        if let Some(audio) = self.audio.take() {
            drop(audio);
        }
        if let Some(video) = self.video.take() {
            drop(video);
        }
        self.geometry = None;
        if let Some(muxer) = self.muxer.take() {
            drop(muxer);
            tracing::debug!("Released container {}", self.destination.display());
        }
        self.stage = SetupStage::Idle;
    }
}

/// Hands encoded packets to the container as soon as an encoder emits them
pub(crate) struct PacketSink<'a> {
    muxer: &'a mut dyn Muxer,
    written: &'a mut u64,
}

impl<'a> PacketSink<'a> {
    fn open(
        muxer: &'a mut Option<Box<dyn Muxer>>,
        written: &'a mut u64,
        destination: &Path,
    ) -> Result<Self> {
        let muxer = muxer
            .as_deref_mut()
            .ok_or_else(|| Error::FileWrite(format!("{} is closed", destination.display())))?;
        Ok(Self { muxer, written })
    }

    pub(crate) fn write(&mut self, packets: Vec<Packet>) -> Result<()> {
        for packet in packets {
            self.muxer.write_packet(packet)?;
            *self.written += 1;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
