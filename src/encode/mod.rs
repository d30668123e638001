//! Video encoding module
//!
//! The recorder talks to video encoders through the [`VideoEncoder`] trait;
//! [`SoftwareEncoder`] is the FFmpeg implementation.

pub mod software;

use crate::error::{Error, Result};
use crate::types::{Packet, Picture, PixelFormat, StreamKind, TimeBase};

use ffmpeg_next as ffmpeg;

pub use software::SoftwareEncoder;

/// Parameters for opening a video encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEncoderParams {
    /// Encoder name (e.g. "libx264", "mpeg4")
    pub encoder: String,
    pub width: u32,
    pub height: u32,
    /// Encoder time base; one frame lasts `frame_ticks` of these
    pub time_base: TimeBase,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// GOP size (keyframe interval in frames)
    pub gop_size: u32,
    pub max_b_frames: u32,
    /// Container wants codec headers out of band
    pub global_header: bool,
}

/// Codec parameters for the container's video stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStreamParams {
    pub encoder: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub time_base: TimeBase,
    /// Bitrate in bits/sec
    pub bitrate: i64,
    /// Extradata (SPS/PPS for H.264 etc.)
    pub extradata: Vec<u8>,
}

/// Trait for video encoders
pub trait VideoEncoder {
    /// Pixel format the encoder consumes
    fn pixel_format(&self) -> PixelFormat;

    /// Time base of the timestamps passed to `encode`
    fn time_base(&self) -> TimeBase;

    /// Codec parameters for muxing
    fn stream_params(&self) -> VideoStreamParams;

    /// Encode one picture; returns any packets that became ready
    fn encode(&mut self, picture: &Picture, pts: i64) -> Result<Vec<Packet>>;

    /// Drain delayed packets at end of stream
    fn flush(&mut self) -> Result<Vec<Packet>>;
}

/// Convert an FFmpeg packet into an owned [`Packet`]
pub(crate) fn packet_from_ffmpeg(packet: &ffmpeg::Packet, stream: StreamKind) -> Packet {
    Packet {
        stream,
        data: packet.data().map(|d| d.to_vec()).unwrap_or_default(),
        pts: packet.pts(),
        dts: packet.dts(),
        duration: packet.duration(),
        is_keyframe: packet.is_key(),
    }
}

/// Receive every packet the encoder has ready
pub(crate) fn receive_packets(
    encoder: &mut ffmpeg::encoder::Encoder,
    stream: StreamKind,
) -> Result<Vec<Packet>> {
    let mut packets = Vec::new();
    loop {
        let mut packet = ffmpeg::Packet::empty();
        match encoder.receive_packet(&mut packet) {
            Ok(()) => packets.push(packet_from_ffmpeg(&packet, stream)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
            Err(ffmpeg::Error::Eof) => break,
            Err(e) => {
                return Err(Error::NoCodec(format!(
                    "Failed to receive {:?} packet: {}",
                    stream, e
                )))
            }
        }
    }
    Ok(packets)
}

/// Signal end of stream and collect the remaining packets
pub(crate) fn drain_encoder(
    encoder: &mut ffmpeg::encoder::Encoder,
    stream: StreamKind,
) -> Result<Vec<Packet>> {
    encoder
        .send_eof()
        .map_err(|e| Error::NoCodec(format!("Failed to send EOF: {}", e)))?;
    receive_packets(encoder, stream)
}
