//! Capability catalog
//!
//! Which containers the host library can record video or audio into.
//! Every query snapshots the registry at call time.

use crate::backend::{FfmpegBackend, MediaBackend};
use crate::output::ContainerFormat;

/// Supported formats split into video and audio-only containers
///
/// Names and extensions are parallel lists: `video_extensions[i]` holds the
/// comma-joined extensions of the format named `video_names[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub video_names: Vec<String>,
    pub video_extensions: Vec<String>,
    pub audio_names: Vec<String>,
    pub audio_extensions: Vec<String>,
}

impl Catalog {
    /// Build from a snapshot of the backend's registry
    pub fn from_backend<B: MediaBackend + ?Sized>(backend: &B) -> Self {
        Self::from_formats(&backend.output_formats())
    }

    /// Build from an explicit format list, keeping its order
    pub fn from_formats(formats: &[ContainerFormat]) -> Self {
        let mut catalog = Self::default();

        for format in formats.iter().filter(|f| !f.no_file) {
            if is_video_container(format) {
                catalog.video_names.push(format.long_name.clone());
                catalog.video_extensions.push(format.extension_list());
            } else if is_audio_container(format) {
                catalog.audio_names.push(format.long_name.clone());
                catalog.audio_extensions.push(format.extension_list());
            }
        }

        tracing::debug!(
            "Catalog: {} video formats, {} audio formats",
            catalog.video_names.len(),
            catalog.audio_names.len()
        );
        catalog
    }
}

fn is_video_container(format: &ContainerFormat) -> bool {
    format.video_encoder().is_some()
}

fn is_audio_container(format: &ContainerFormat) -> bool {
    format.video.is_none() && format.audio_encoder().is_some()
}

fn ffmpeg_catalog() -> Catalog {
    Catalog::from_backend(&FfmpegBackend)
}

/// Display names of containers that can record video
pub fn list_supported_video_codec_names() -> Vec<String> {
    ffmpeg_catalog().video_names
}

/// Extension lists of containers that can record video
pub fn list_supported_video_extensions() -> Vec<String> {
    ffmpeg_catalog().video_extensions
}

/// Display names of audio-only containers
pub fn list_supported_audio_codec_names() -> Vec<String> {
    ffmpeg_catalog().audio_names
}

/// Extension lists of audio-only containers
pub fn list_supported_audio_extensions() -> Vec<String> {
    ffmpeg_catalog().audio_extensions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CodecSlot;

    fn slot(codec: &str, encoder: Option<&str>) -> Option<CodecSlot> {
        Some(CodecSlot {
            codec: codec.into(),
            encoder: encoder.map(Into::into),
        })
    }

    fn format(
        name: &str,
        exts: &[&str],
        video: Option<CodecSlot>,
        audio: Option<CodecSlot>,
    ) -> ContainerFormat {
        ContainerFormat {
            name: name.into(),
            long_name: format!("{} container", name),
            extensions: exts.iter().map(|e| e.to_string()).collect(),
            video,
            audio,
            no_file: false,
            global_header: false,
        }
    }

    #[test]
    fn test_split_video_and_audio() {
        let mut null = format("null", &[], slot("rawvideo", Some("rawvideo")), None);
        null.no_file = true;

        let formats = vec![
            format("mp4", &["mp4"], slot("h264", Some("libx264")), slot("aac", Some("aac"))),
            format("wav", &["wav"], None, slot("pcm_s16le", Some("pcm_s16le"))),
            format("hevcraw", &["hevc", "h265"], slot("hevc", None), None),
            format("matroska", &["mkv"], slot("h264", Some("libx264")), None),
            null,
            format("opusonly", &["opus"], None, slot("opus", None)),
        ];

        let catalog = Catalog::from_formats(&formats);
        assert_eq!(catalog.video_names, vec!["mp4 container", "matroska container"]);
        assert_eq!(catalog.video_extensions, vec!["mp4", "mkv"]);
        assert_eq!(catalog.audio_names, vec!["wav container"]);
        assert_eq!(catalog.audio_extensions, vec!["wav"]);
    }

    #[test]
    fn test_ffmpeg_lists_are_parallel() {
        let catalog = ffmpeg_catalog();
        assert_eq!(catalog.video_names.len(), catalog.video_extensions.len());
        assert_eq!(catalog.audio_names.len(), catalog.audio_extensions.len());
        assert!(catalog
            .audio_extensions
            .iter()
            .any(|exts| exts.split(',').any(|e| e == "wav")));
    }
}
