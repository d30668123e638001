//! Configuration types for avrecord

use crate::error::{Error, Result};
use crate::types::Framerate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Input sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channels per input sample
    pub channels: u32,
    /// Emulated frame cadence (one video frame and one audio chunk per tick)
    pub framerate: Framerate,
    /// Border present in every raw video frame
    pub border: BorderConfig,
    /// Video encoder settings
    pub video: VideoConfig,
    /// Audio encoder settings
    pub audio: AudioConfig,
    /// Encoder frame size used when the encoder accepts any size
    pub fallback_frame_size: usize,
    /// Input chunks of headroom in the audio accumulation buffer
    pub buffer_slack_chunks: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            framerate: Framerate::FPS_60,
            border: BorderConfig::default(),
            video: VideoConfig::default(),
            audio: AudioConfig::default(),
            fallback_frame_size: 1024,
            buffer_slack_chunks: 2,
        }
    }
}

impl RecorderConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)
            .map_err(|e| Error::InvalidInput(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidInput(format!("config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values the recorder cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidInput("sample_rate must be positive".into()));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(Error::InvalidInput(format!(
                "{} channels not supported (mono or stereo only)",
                self.channels
            )));
        }
        if self.framerate.num == 0 || self.framerate.den == 0 {
            return Err(Error::InvalidInput("framerate must be positive".into()));
        }
        if self.fallback_frame_size == 0 {
            return Err(Error::InvalidInput(
                "fallback_frame_size must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_video_bitrate_kbps(mut self, bitrate: u32) -> Self {
        self.video.bitrate_kbps = bitrate;
        self
    }

    pub fn with_audio_bitrate_kbps(mut self, bitrate: u32) -> Self {
        self.audio.bitrate_kbps = bitrate;
        self
    }

    pub fn with_border(mut self, top: u32, right: u32) -> Self {
        self.border = BorderConfig { top, right };
        self
    }
}

/// Rows/columns of border around each raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderConfig {
    /// Rows above the picture
    pub top: u32,
    /// Columns right of the picture
    pub right: u32,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self { top: 1, right: 1 }
    }
}

/// Video encoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// GOP size (keyframe interval in frames)
    pub gop_size: u32,
    /// B-frames count
    pub max_b_frames: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            bitrate_kbps: 4000,
            gop_size: 60,
            max_b_frames: 0,
        }
    }
}

/// Audio encoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { bitrate_kbps: 128 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.channels, 2);
        assert_eq!(config.framerate, Framerate::FPS_60);
        assert_eq!(config.border, BorderConfig { top: 1, right: 1 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = RecorderConfig::from_toml_str(
            r#"
            sample_rate = 48000

            [video]
            bitrate_kbps = 8000
            "#,
        )
        .unwrap();

        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.video.bitrate_kbps, 8000);
        assert_eq!(config.video.gop_size, 60);
        assert_eq!(config.audio.bitrate_kbps, 128);
    }

    #[test]
    fn test_rejects_surround() {
        let result = RecorderConfig::from_toml_str("channels = 6");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sample_rate = 32768").unwrap();
        writeln!(file, "[border]").unwrap();
        writeln!(file, "top = 0").unwrap();

        let config = RecorderConfig::load(file.path()).unwrap();
        assert_eq!(config.sample_rate, 32768);
        assert_eq!(config.border.top, 0);
        assert_eq!(config.border.right, 1);
    }
}
