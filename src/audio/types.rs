//! Audio types

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Audio sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleFormat {
    /// 16-bit signed integer
    #[default]
    S16,
    /// 32-bit signed integer
    S32,
    /// 32-bit float
    F32,
    /// Planar 16-bit signed integer
    S16P,
    /// Planar 32-bit signed integer
    S32P,
    /// Planar 32-bit float
    F32P,
}

impl SampleFormat {
    /// Bytes per sample
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::S16 | SampleFormat::S16P => 2,
            SampleFormat::S32 | SampleFormat::F32 | SampleFormat::S32P | SampleFormat::F32P => 4,
        }
    }

    /// Is this a planar format?
    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            SampleFormat::S16P | SampleFormat::S32P | SampleFormat::F32P
        )
    }
}

/// Audio channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChannelLayout {
    /// Mono (1 channel)
    Mono,
    /// Stereo (2 channels)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Layout for a channel count
    pub fn from_channels(channels: u32) -> Result<Self> {
        match channels {
            1 => Ok(ChannelLayout::Mono),
            2 => Ok(ChannelLayout::Stereo),
            n => Err(Error::InvalidInput(format!("{} channels not supported", n))),
        }
    }

    /// Number of channels
    pub fn channels(&self) -> u32 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Sample format, layout and rate of an audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioLayout {
    pub format: SampleFormat,
    pub channels: ChannelLayout,
    pub sample_rate: u32,
}

impl AudioLayout {
    pub fn new(format: SampleFormat, channels: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            format,
            channels,
            sample_rate,
        }
    }

    /// Number of data planes
    pub fn planes(&self) -> usize {
        if self.format.is_planar() {
            self.channels.channels() as usize
        } else {
            1
        }
    }

    /// Bytes per plane for `samples` per-channel samples
    pub fn plane_bytes(&self, samples: usize) -> usize {
        let per_plane_channels = if self.format.is_planar() {
            1
        } else {
            self.channels.channels() as usize
        };
        samples * per_plane_channels * self.format.bytes_per_sample()
    }
}

/// One encoder-sized block of audio in the encoder's layout
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub layout: AudioLayout,
    /// Per-channel samples held
    pub samples: usize,
    /// One buffer per plane
    pub planes: Vec<Vec<u8>>,
    /// Presentation timestamp in samples (1/sample_rate)
    pub pts: i64,
}

impl AudioBlock {
    /// Allocate a silent block holding `samples` per-channel samples
    pub fn alloc(layout: AudioLayout, samples: usize) -> Result<Self> {
        let planes = (0..layout.planes())
            .map(|_| crate::types::zeroed_bytes(layout.plane_bytes(samples)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            layout,
            samples,
            planes,
            pts: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_block_layout() {
        let layout = AudioLayout::new(SampleFormat::F32P, ChannelLayout::Stereo, 48000);
        let block = AudioBlock::alloc(layout, 1024).unwrap();
        assert_eq!(block.planes.len(), 2);
        assert_eq!(block.planes[0].len(), 4096);
    }

    #[test]
    fn test_packed_block_layout() {
        let layout = AudioLayout::new(SampleFormat::S16, ChannelLayout::Stereo, 44100);
        let block = AudioBlock::alloc(layout, 1152).unwrap();
        assert_eq!(block.planes.len(), 1);
        assert_eq!(block.planes[0].len(), 1152 * 2 * 2);
        assert!(block.planes[0].iter().all(|&b| b == 0));
    }
}
