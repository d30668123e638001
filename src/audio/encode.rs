//! Audio encoding via FFmpeg
//!
//! Opens whichever encoder the container pairs with its default audio codec
//! (aac, libmp3lame, pcm_s16le, flac, ...).

use super::types::{AudioBlock, AudioLayout, ChannelLayout, SampleFormat};
use crate::encode::{drain_encoder, receive_packets};
use crate::error::{Error, Result};
use crate::types::{Packet, StreamKind, TimeBase};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::Sample;

/// Parameters for opening an audio encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEncoderParams {
    /// Encoder name (e.g. "aac", "libmp3lame")
    pub encoder: String,
    /// Requested rate; the encoder may settle on the nearest one it supports
    pub sample_rate: u32,
    pub channels: ChannelLayout,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// Container wants codec headers out of band
    pub global_header: bool,
}

/// Codec parameters for the container's audio stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStreamParams {
    pub encoder: String,
    pub layout: AudioLayout,
    /// Bitrate in bits/sec
    pub bitrate: u32,
    /// Samples per encoded frame, 0 if variable
    pub frame_size: usize,
    pub extradata: Vec<u8>,
    pub time_base: TimeBase,
}

/// Trait for audio encoders
pub trait AudioEncoder {
    /// Layout of the blocks `encode` accepts
    fn layout(&self) -> AudioLayout;

    /// Fixed samples per frame, `None` if the encoder takes any size
    fn frame_size(&self) -> Option<usize>;

    /// Time base of block timestamps (1/sample_rate)
    fn time_base(&self) -> TimeBase;

    /// Codec parameters for muxing
    fn stream_params(&self) -> AudioStreamParams;

    /// Encode one block; returns any packets that became ready
    fn encode(&mut self, block: &AudioBlock) -> Result<Vec<Packet>>;

    /// Drain delayed packets at end of stream
    fn flush(&mut self) -> Result<Vec<Packet>>;
}

/// `requested` if listed, else the nearest listed rate (the higher on a tie)
pub fn pick_sample_rate(requested: u32, supported: impl IntoIterator<Item = u32>) -> Option<u32> {
    supported
        .into_iter()
        .filter(|&rate| rate > 0)
        .min_by_key(|&rate| (rate.abs_diff(requested), std::cmp::Reverse(rate)))
}

/// Map SampleFormat to FFmpeg Sample format
pub fn to_ffmpeg_sample(format: SampleFormat) -> Sample {
    match format {
        SampleFormat::S16 => Sample::I16(SampleType::Packed),
        SampleFormat::S32 => Sample::I32(SampleType::Packed),
        SampleFormat::F32 => Sample::F32(SampleType::Packed),
        SampleFormat::S16P => Sample::I16(SampleType::Planar),
        SampleFormat::S32P => Sample::I32(SampleType::Planar),
        SampleFormat::F32P => Sample::F32(SampleType::Planar),
    }
}

/// Map an FFmpeg Sample format back, if we model it
pub fn from_ffmpeg_sample(sample: Sample) -> Option<SampleFormat> {
    match sample {
        Sample::I16(SampleType::Packed) => Some(SampleFormat::S16),
        Sample::I32(SampleType::Packed) => Some(SampleFormat::S32),
        Sample::F32(SampleType::Packed) => Some(SampleFormat::F32),
        Sample::I16(SampleType::Planar) => Some(SampleFormat::S16P),
        Sample::I32(SampleType::Planar) => Some(SampleFormat::S32P),
        Sample::F32(SampleType::Planar) => Some(SampleFormat::F32P),
        _ => None,
    }
}

/// Map ChannelLayout to FFmpeg's channel layout
pub fn to_ffmpeg_layout(layout: ChannelLayout) -> ffmpeg::channel_layout::ChannelLayout {
    match layout {
        ChannelLayout::Mono => ffmpeg::channel_layout::ChannelLayout::MONO,
        ChannelLayout::Stereo => ffmpeg::channel_layout::ChannelLayout::STEREO,
    }
}

/// FFmpeg-based audio encoder
pub struct FfmpegAudioEncoder {
    params: AudioEncoderParams,
    encoder: ffmpeg::encoder::Audio,
    layout: AudioLayout,
    frame_size: Option<usize>,
    /// Reused while the block size stays the same
    frame: Option<ffmpeg::frame::Audio>,
    frames_encoded: u64,
    bytes_output: u64,
}

impl FfmpegAudioEncoder {
    /// Open the encoder named in `params`
    pub fn open(params: &AudioEncoderParams) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::NoCodec(format!("FFmpeg init failed: {}", e)))?;

        let codec = ffmpeg::encoder::find_by_name(&params.encoder)
            .ok_or_else(|| Error::NoCodec(format!("Encoder {} not found", params.encoder)))?;
        let audio = codec
            .audio()
            .map_err(|e| Error::NoCodec(format!("{} is not an audio encoder: {}", params.encoder, e)))?;

        let sample_rate = match audio.rates() {
            Some(rates) => pick_sample_rate(
                params.sample_rate,
                rates.filter_map(|rate| u32::try_from(rate).ok()),
            )
            .ok_or_else(|| Error::NoCodec(format!("{} lists no sample rates", params.encoder)))?,
            None => params.sample_rate,
        };
        if sample_rate != params.sample_rate {
            tracing::info!(
                "{} does not take {}Hz, encoding at {}Hz",
                params.encoder,
                params.sample_rate,
                sample_rate
            );
        }

        let format = match audio.formats() {
            Some(mut formats) => formats.find_map(from_ffmpeg_sample).ok_or_else(|| {
                Error::NoCodec(format!("{} has no usable sample format", params.encoder))
            })?,
            None => SampleFormat::S16,
        };

        let context = ffmpeg::codec::context::Context::new_with_codec(codec);
        let mut encoder = context
            .encoder()
            .audio()
            .map_err(|e| Error::NoCodec(format!("{} is not an audio encoder: {}", params.encoder, e)))?;

        if params.global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }

        // Configure encoder via unsafe
        unsafe {
            let ctx = encoder.as_mut_ptr();
            (*ctx).sample_rate = sample_rate as i32;
            (*ctx).sample_fmt = ffmpeg::ffi::AVSampleFormat::from(to_ffmpeg_sample(format));
            (*ctx).bit_rate = params.bitrate_kbps as i64 * 1000;
            (*ctx).time_base = ffmpeg::ffi::AVRational {
                num: 1,
                den: sample_rate as i32,
            };

            let ch_layout = &mut (*ctx).ch_layout;
            ffmpeg::ffi::av_channel_layout_default(ch_layout, params.channels.channels() as i32);
        }

        let encoder = encoder
            .open()
            .map_err(|e| Error::NoCodec(format!("Failed to open {}: {}", params.encoder, e)))?;

        let frame_size = match unsafe { (*encoder.as_ptr()).frame_size } {
            n if n > 0 => Some(n as usize),
            _ => None,
        };

        let layout = AudioLayout::new(format, params.channels, sample_rate);

        tracing::info!(
            "Audio encoder initialized: {} @ {}Hz, {} channels, {:?}, {} kbps, frame_size={:?}",
            params.encoder,
            sample_rate,
            params.channels.channels(),
            format,
            params.bitrate_kbps,
            frame_size
        );

        Ok(Self {
            params: params.clone(),
            encoder,
            layout,
            frame_size,
            frame: None,
            frames_encoded: 0,
            bytes_output: 0,
        })
    }
}

impl FfmpegAudioEncoder {
    fn prepare_frame(&mut self, samples: usize) -> Result<()> {
        if self.frame.as_ref().is_some_and(|f| f.samples() == samples) {
            return Ok(());
        }

        let mut frame = ffmpeg::frame::Audio::new(
            to_ffmpeg_sample(self.layout.format),
            samples,
            to_ffmpeg_layout(self.layout.channels),
        );
        if frame.is_empty() {
            return Err(Error::NoMemory("audio encoder frame".into()));
        }
        frame.set_rate(self.layout.sample_rate);
        self.frame = Some(frame);
        Ok(())
    }
}

impl AudioEncoder for FfmpegAudioEncoder {
    fn layout(&self) -> AudioLayout {
        self.layout
    }

    fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    fn time_base(&self) -> TimeBase {
        TimeBase::new(1, self.layout.sample_rate as i32)
    }

    fn stream_params(&self) -> AudioStreamParams {
        let extradata = unsafe {
            let ptr = (*self.encoder.as_ptr()).extradata;
            let size = (*self.encoder.as_ptr()).extradata_size as usize;
            if !ptr.is_null() && size > 0 {
                std::slice::from_raw_parts(ptr, size).to_vec()
            } else {
                Vec::new()
            }
        };

        AudioStreamParams {
            encoder: self.params.encoder.clone(),
            layout: self.layout,
            bitrate: self.params.bitrate_kbps * 1000,
            frame_size: self.frame_size.unwrap_or(0),
            extradata,
            time_base: self.time_base(),
        }
    }

    fn encode(&mut self, block: &AudioBlock) -> Result<Vec<Packet>> {
        if block.layout != self.layout {
            return Err(Error::NoCodec(format!(
                "{} expects {:?}, got {:?}",
                self.params.encoder, self.layout, block.layout
            )));
        }

        self.prepare_frame(block.samples)?;
        let Some(frame) = self.frame.as_mut() else {
            return Err(Error::NoMemory("audio encoder frame".into()));
        };

        // The encoder may still reference the previous block's buffers
        let ret = unsafe { ffmpeg::ffi::av_frame_make_writable(frame.as_mut_ptr()) };
        if ret < 0 {
            return Err(Error::NoMemory("audio frame not writable".into()));
        }
        frame.set_pts(Some(block.pts));

        for (index, plane) in block.planes.iter().enumerate() {
            let data = frame.data_mut(index);
            let len = plane.len().min(data.len());
            data[..len].copy_from_slice(&plane[..len]);
        }

        self.encoder
            .send_frame(frame)
            .map_err(|e| Error::NoCodec(format!("Send frame failed: {}", e)))?;

        self.frames_encoded += 1;
        let packets = receive_packets(&mut self.encoder, StreamKind::Audio)?;
        self.bytes_output += packets.iter().map(|p| p.size() as u64).sum::<u64>();
        Ok(packets)
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        let packets = drain_encoder(&mut self.encoder, StreamKind::Audio)?;
        self.bytes_output += packets.iter().map(|p| p.size() as u64).sum::<u64>();

        tracing::info!(
            "Audio encoder flushed: {} frames, {} bytes",
            self.frames_encoded,
            self.bytes_output
        );

        Ok(packets)
    }
}

impl Drop for FfmpegAudioEncoder {
    fn drop(&mut self) {
        tracing::debug!("Dropping audio encoder {}", self.params.encoder);
    }
}
