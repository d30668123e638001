//! FFmpeg container muxer
//!
//! Interleaves encoded video and audio packets into one container file,
//! and answers format questions from the FFmpeg muxer registry.

use crate::audio::AudioStreamParams;
use crate::encode::VideoStreamParams;
use crate::error::{Error, Result};
use crate::types::{Packet, StreamKind, TimeBase};

use super::{CodecSlot, ContainerFormat, Muxer};

use ffmpeg_next as ffmpeg;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

/// Index and encoder time base of one output stream
#[derive(Debug, Clone, Copy)]
struct StreamSlot {
    index: usize,
    time_base: ffmpeg::Rational,
}

/// FFmpeg-backed container writer
pub struct FfmpegMuxer {
    output_ctx: ffmpeg::format::context::Output,
    path: PathBuf,
    video: Option<StreamSlot>,
    audio: Option<StreamSlot>,
    header_written: bool,
    trailer_written: bool,
    bytes_written: u64,
    video_packets: u64,
    audio_packets: u64,
}

impl FfmpegMuxer {
    /// Open `path` for writing as `format`
    pub fn open(path: impl AsRef<Path>, format: &ContainerFormat) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::FileWrite(format!("FFmpeg init failed: {}", e)))?;

        let path = path.as_ref().to_path_buf();
        let output_ctx = ffmpeg::format::output_as(&path, &format.name).map_err(|e| {
            Error::FileWrite(format!("Failed to open {}: {}", path.display(), e))
        })?;

        tracing::debug!("Opened {} as {}", path.display(), format.name);

        Ok(Self {
            output_ctx,
            path,
            video: None,
            audio: None,
            header_written: false,
            trailer_written: false,
            bytes_written: 0,
            video_packets: 0,
            audio_packets: 0,
        })
    }

    fn find_codec(name: &str) -> Result<ffmpeg::Codec> {
        ffmpeg::encoder::find_by_name(name)
            .ok_or_else(|| Error::NoCodec(format!("Encoder {} not found", name)))
    }

    /// Copy extradata into an av_malloc'd buffer owned by `par`
    ///
    /// # Safety
    /// `par` must point to valid codec parameters without extradata.
    unsafe fn set_extradata(par: *mut ffmpeg::ffi::AVCodecParameters, extradata: &[u8]) -> Result<()> {
        if extradata.is_empty() {
            return Ok(());
        }

        let padding = ffmpeg::ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
        let ptr = ffmpeg::ffi::av_mallocz(extradata.len() + padding) as *mut u8;
        if ptr.is_null() {
            return Err(Error::NoMemory("stream extradata".into()));
        }
        std::ptr::copy_nonoverlapping(extradata.as_ptr(), ptr, extradata.len());
        (*par).extradata = ptr;
        (*par).extradata_size = extradata.len() as i32;
        Ok(())
    }

    fn slot(&self, kind: StreamKind) -> Result<StreamSlot> {
        match kind {
            StreamKind::Video => self.video,
            StreamKind::Audio => self.audio,
        }
        .ok_or_else(|| Error::FileWrite(format!("No {:?} stream configured", kind)))
    }
}

fn to_rational(tb: TimeBase) -> ffmpeg::Rational {
    ffmpeg::Rational::new(tb.num, tb.den)
}

impl Muxer for FfmpegMuxer {
    fn add_video_stream(&mut self, params: &VideoStreamParams) -> Result<usize> {
        let codec = Self::find_codec(&params.encoder)?;

        let mut stream = self
            .output_ctx
            .add_stream(codec)
            .map_err(|e| Error::NoMemory(format!("Failed to add video stream: {}", e)))?;

        let index = stream.index();

        unsafe {
            let mut stream_params = stream.parameters();
            let par = stream_params.as_mut_ptr();

            (*par).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
            (*par).codec_id = codec.id().into();
            (*par).width = params.width as i32;
            (*par).height = params.height as i32;
            (*par).format =
                ffmpeg::ffi::AVPixelFormat::from(crate::processing::to_ffmpeg_pixel(params.pixel_format))
                    as i32;
            (*par).bit_rate = params.bitrate;
            Self::set_extradata(par, &params.extradata)?;
        }

        let time_base = to_rational(params.time_base);
        stream.set_time_base(time_base);
        stream.set_rate(to_rational(TimeBase::new(params.time_base.den, params.time_base.num)));

        self.video = Some(StreamSlot { index, time_base });

        tracing::info!(
            "Added video stream: {} {}x{} {} (tb {})",
            params.encoder,
            params.width,
            params.height,
            params.pixel_format,
            params.time_base
        );

        Ok(index)
    }

    fn add_audio_stream(&mut self, params: &AudioStreamParams) -> Result<usize> {
        let codec = Self::find_codec(&params.encoder)?;

        let mut stream = self
            .output_ctx
            .add_stream(codec)
            .map_err(|e| Error::NoMemory(format!("Failed to add audio stream: {}", e)))?;

        let index = stream.index();

        unsafe {
            let mut stream_params = stream.parameters();
            let par = stream_params.as_mut_ptr();

            (*par).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
            (*par).codec_id = codec.id().into();
            (*par).sample_rate = params.layout.sample_rate as i32;
            (*par).format = ffmpeg::ffi::AVSampleFormat::from(crate::audio::to_ffmpeg_sample(
                params.layout.format,
            )) as i32;
            (*par).bit_rate = params.bitrate as i64;
            (*par).frame_size = params.frame_size as i32;

            let ch_layout = &mut (*par).ch_layout;
            ffmpeg::ffi::av_channel_layout_default(
                ch_layout,
                params.layout.channels.channels() as i32,
            );

            Self::set_extradata(par, &params.extradata)?;
        }

        let time_base = to_rational(params.time_base);
        stream.set_time_base(time_base);

        self.audio = Some(StreamSlot { index, time_base });

        tracing::info!(
            "Added audio stream: {} {}Hz {}ch @ {}kbps, frame_size={}",
            params.encoder,
            params.layout.sample_rate,
            params.layout.channels.channels(),
            params.bitrate / 1000,
            params.frame_size
        );

        Ok(index)
    }

    fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }

        self.output_ctx
            .write_header()
            .map_err(|e| Error::FileWrite(format!("Failed to write header: {}", e)))?;

        self.header_written = true;
        tracing::debug!("Header written to {}", self.path.display());

        Ok(())
    }

    fn write_packet(&mut self, packet: Packet) -> Result<()> {
        if !self.header_written {
            return Err(Error::FileWrite("Header not written".into()));
        }

        let slot = self.slot(packet.stream)?;

        let mut pkt = ffmpeg::Packet::copy(&packet.data);
        pkt.set_pts(packet.pts);
        pkt.set_dts(packet.dts);
        pkt.set_duration(packet.duration);
        pkt.set_stream(slot.index);

        if packet.is_keyframe {
            pkt.set_flags(ffmpeg::codec::packet::Flags::KEY);
        }

        // The container may have changed the stream time base in write_header
        let stream = self
            .output_ctx
            .stream(slot.index)
            .ok_or_else(|| Error::FileWrite("Stream not found".into()))?;
        pkt.rescale_ts(slot.time_base, stream.time_base());

        pkt.write_interleaved(&mut self.output_ctx)
            .map_err(|e| Error::FileWrite(format!("Failed to write packet: {}", e)))?;

        match packet.stream {
            StreamKind::Video => self.video_packets += 1,
            StreamKind::Audio => self.audio_packets += 1,
        }
        self.bytes_written += packet.data.len() as u64;

        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        if !self.header_written || self.trailer_written {
            return Ok(());
        }

        self.trailer_written = true;
        self.output_ctx
            .write_trailer()
            .map_err(|e| Error::FileWrite(format!("Failed to write trailer: {}", e)))?;

        tracing::info!(
            "Muxer finished {}: {} video packets, {} audio packets, {:.2} MB",
            self.path.display(),
            self.video_packets,
            self.audio_packets,
            self.bytes_written as f64 / 1_000_000.0
        );

        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Drop for FfmpegMuxer {
    fn drop(&mut self) {
        if self.header_written && !self.trailer_written {
            let _ = self.output_ctx.write_trailer();
        }
        tracing::debug!("Closed {}", self.path.display());
    }
}

// ============================================================================
// Format registry
// ============================================================================

unsafe fn c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

fn codec_slot(id: ffmpeg::ffi::AVCodecID) -> Option<CodecSlot> {
    if id == ffmpeg::ffi::AVCodecID::AV_CODEC_ID_NONE {
        return None;
    }
    let id = ffmpeg::codec::Id::from(id);
    Some(CodecSlot {
        codec: id.name().to_string(),
        encoder: ffmpeg::encoder::find(id).map(|c| c.name().to_string()),
    })
}

/// Owned snapshot of one registered output format
///
/// # Safety
/// `fmt` must be a non-null pointer returned by the muxer registry.
unsafe fn describe(fmt: *const ffmpeg::ffi::AVOutputFormat) -> ContainerFormat {
    let f = &*fmt;
    let name = c_string(f.name).unwrap_or_default();
    let long_name = c_string(f.long_name).unwrap_or_else(|| name.clone());
    let extensions = c_string(f.extensions)
        .map(|exts| {
            exts.split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect()
        })
        .unwrap_or_default();

    ContainerFormat {
        name,
        long_name,
        extensions,
        video: codec_slot(f.video_codec),
        audio: codec_slot(f.audio_codec),
        no_file: (f.flags & ffmpeg::ffi::AVFMT_NOFILE as i32) != 0,
        global_header: (f.flags & ffmpeg::ffi::AVFMT_GLOBALHEADER as i32) != 0,
    }
}

/// Guess the container for a destination from its file name
pub fn guess_format(destination: &Path) -> Result<ContainerFormat> {
    let display = destination.display().to_string();
    ffmpeg::init().map_err(|e| Error::NoCodec(format!("FFmpeg init failed: {}", e)))?;

    let file_name = CString::new(destination.to_string_lossy().as_bytes())
        .map_err(|_| Error::FormatGuess(display.clone()))?;

    let fmt = unsafe {
        ffmpeg::ffi::av_guess_format(std::ptr::null(), file_name.as_ptr(), std::ptr::null())
    };
    if fmt.is_null() {
        return Err(Error::FormatGuess(display));
    }

    let format = unsafe { describe(fmt) };
    tracing::debug!("Guessed {} for {}", format.name, display);
    Ok(format)
}

/// Every output format the library registers, in registry order
pub fn registered_formats() -> Vec<ContainerFormat> {
    if let Err(e) = ffmpeg::init() {
        tracing::warn!("FFmpeg unavailable: {}", e);
        return Vec::new();
    }

    let mut formats = Vec::new();
    let mut opaque = std::ptr::null_mut();
    loop {
        let fmt = unsafe { ffmpeg::ffi::av_muxer_iterate(&mut opaque) };
        if fmt.is_null() {
            break;
        }
        formats.push(unsafe { describe(fmt) });
    }
    formats
}
