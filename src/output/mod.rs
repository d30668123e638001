//! Output module
//!
//! Container formats and the muxer that writes encoded packets to disk.

mod muxer;

pub use muxer::{guess_format, registered_formats, FfmpegMuxer};

use crate::audio::AudioStreamParams;
use crate::encode::VideoStreamParams;
use crate::error::Result;
use crate::types::Packet;

/// Default codec a container format pairs with one of its streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecSlot {
    /// Codec name (e.g. "h264", "aac")
    pub codec: String,
    /// Name of an available encoder for it, if any
    pub encoder: Option<String>,
}

impl CodecSlot {
    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }
}

/// Container format descriptor, as registered with the muxing library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFormat {
    /// Short muxer name (e.g. "mp4")
    pub name: String,
    /// Display name (e.g. "MP4 (MPEG-4 Part 14)")
    pub long_name: String,
    /// File extensions without dots
    pub extensions: Vec<String>,
    /// Default video codec
    pub video: Option<CodecSlot>,
    /// Default audio codec
    pub audio: Option<CodecSlot>,
    /// Format does not write to a file (devices, network sinks)
    pub no_file: bool,
    /// Codec headers go in the container header, not in-band
    pub global_header: bool,
}

impl ContainerFormat {
    /// Comma-joined extension list
    pub fn extension_list(&self) -> String {
        self.extensions.join(",")
    }

    /// Encoder for the default video codec
    pub fn video_encoder(&self) -> Option<&str> {
        self.video.as_ref().and_then(|v| v.encoder.as_deref())
    }

    /// Encoder for the default audio codec
    pub fn audio_encoder(&self) -> Option<&str> {
        self.audio.as_ref().and_then(|a| a.encoder.as_deref())
    }
}

/// Container writer consumed by the recorder
pub trait Muxer {
    /// Add the video stream; returns its index
    fn add_video_stream(&mut self, params: &VideoStreamParams) -> Result<usize>;

    /// Add the audio stream; returns its index
    fn add_audio_stream(&mut self, params: &AudioStreamParams) -> Result<usize>;

    /// Write the container header. Streams must all be added first.
    fn write_header(&mut self) -> Result<()>;

    /// Write one encoded packet (timestamps in the encoder's time base)
    fn write_packet(&mut self, packet: Packet) -> Result<()>;

    /// Write the trailing index/metadata
    fn write_trailer(&mut self) -> Result<()>;

    /// Bytes of packet payload written so far
    fn bytes_written(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp4() -> ContainerFormat {
        ContainerFormat {
            name: "mp4".into(),
            long_name: "MP4 (MPEG-4 Part 14)".into(),
            extensions: vec!["mp4".into()],
            video: Some(CodecSlot {
                codec: "mpeg4".into(),
                encoder: Some("mpeg4".into()),
            }),
            audio: Some(CodecSlot {
                codec: "aac".into(),
                encoder: None,
            }),
            no_file: false,
            global_header: true,
        }
    }

    #[test]
    fn test_encoder_lookup() {
        let format = mp4();
        assert_eq!(format.video_encoder(), Some("mpeg4"));
        assert_eq!(format.audio_encoder(), None);
        assert!(!format.audio.as_ref().unwrap().has_encoder());
    }

    #[test]
    fn test_extension_list() {
        let mut format = mp4();
        format.extensions = vec!["mpg".into(), "mpeg".into()];
        assert_eq!(format.extension_list(), "mpg,mpeg");
    }
}
