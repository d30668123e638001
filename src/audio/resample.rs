//! Sample format and rate conversion via FFmpeg swresample
//!
//! Converted audio lands in a [`PlaneQueue`] because a rate change means
//! the number of samples coming out differs from the number going in.
//! Encoder-sized blocks are taken from the queue.

use super::encode::{to_ffmpeg_layout, to_ffmpeg_sample};
use super::types::{AudioBlock, AudioLayout, SampleFormat};
use crate::error::{Error, Result};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling::Context as SwrContext;

/// Extra output room per conversion for samples the converter held back
const DELAY_HEADROOM: usize = 256;

/// Converts interleaved S16 input into an encoder's audio layout
pub trait Resampler {
    /// Convert `samples` per-channel samples from `input` and queue the result
    fn push(&mut self, input: &[i16], samples: usize) -> Result<()>;

    /// Queue whatever the rate converter still holds back
    fn flush(&mut self) -> Result<()>;

    /// Converted samples waiting for the encoder
    fn queue(&self) -> &PlaneQueue;

    fn queue_mut(&mut self) -> &mut PlaneQueue;
}

/// FIFO of converted samples in one audio layout, one byte buffer per plane
#[derive(Debug)]
pub struct PlaneQueue {
    layout: AudioLayout,
    planes: Vec<Vec<u8>>,
    samples: usize,
}

impl PlaneQueue {
    pub fn new(layout: AudioLayout) -> Self {
        Self {
            layout,
            planes: vec![Vec::new(); layout.planes()],
            samples: 0,
        }
    }

    pub fn layout(&self) -> AudioLayout {
        self.layout
    }

    /// Queued per-channel samples
    pub fn len(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Append `samples` per-channel samples, one slice per plane
    pub fn extend(&mut self, samples: usize, planes: &[&[u8]]) -> Result<()> {
        let bytes = self.layout.plane_bytes(samples);
        if planes.len() != self.planes.len() || planes.iter().any(|p| p.len() < bytes) {
            return Err(Error::InvalidInput(format!(
                "{} planes of {:?} cannot hold {} samples",
                planes.len(),
                self.layout,
                samples
            )));
        }

        for (queued, data) in self.planes.iter_mut().zip(planes) {
            queued
                .try_reserve(bytes)
                .map_err(|e| Error::NoMemory(format!("audio queue: {}", e)))?;
            queued.extend_from_slice(&data[..bytes]);
        }
        self.samples += samples;
        Ok(())
    }

    /// Fill `out` completely; false if fewer than `out.samples` are queued
    pub fn pop_exact(&mut self, out: &mut AudioBlock) -> bool {
        debug_assert_eq!(out.layout, self.layout);
        if self.samples < out.samples {
            return false;
        }
        self.move_into(out, out.samples);
        true
    }

    /// Move what is left into `out` and zero the rest of it. Returns the
    /// samples moved.
    pub fn drain_padded(&mut self, out: &mut AudioBlock) -> usize {
        debug_assert_eq!(out.layout, self.layout);
        let samples = self.samples.min(out.samples);
        self.move_into(out, samples);

        let filled = self.layout.plane_bytes(samples);
        for plane in &mut out.planes {
            plane[filled..].fill(0);
        }
        samples
    }

    fn move_into(&mut self, out: &mut AudioBlock, samples: usize) {
        let bytes = self.layout.plane_bytes(samples);
        for (queued, plane) in self.planes.iter_mut().zip(&mut out.planes) {
            plane[..bytes].copy_from_slice(&queued[..bytes]);
            queued.drain(..bytes);
        }
        self.samples -= samples;
    }
}

/// swresample-backed converter
pub struct FfmpegResampler {
    context: SwrContext,
    src: AudioLayout,
    dst: AudioLayout,
    input: Option<ffmpeg::frame::Audio>,
    output: Option<ffmpeg::frame::Audio>,
    /// Samples the output frame was allocated for
    output_capacity: usize,
    queue: PlaneQueue,
}

impl FfmpegResampler {
    pub fn new(src: AudioLayout, dst: AudioLayout) -> Result<Self> {
        if src.format != SampleFormat::S16 {
            return Err(Error::InvalidInput(format!(
                "resampler input must be interleaved S16, not {:?}",
                src.format
            )));
        }

        ffmpeg::init().map_err(|e| Error::NoMemory(format!("FFmpeg init failed: {}", e)))?;

        let context = SwrContext::get(
            to_ffmpeg_sample(src.format),
            to_ffmpeg_layout(src.channels),
            src.sample_rate,
            to_ffmpeg_sample(dst.format),
            to_ffmpeg_layout(dst.channels),
            dst.sample_rate,
        )
        .map_err(|e| Error::NoMemory(format!("Failed to create resampler: {}", e)))?;

        tracing::debug!("Resampler {:?} -> {:?}", src, dst);

        Ok(Self {
            context,
            src,
            dst,
            input: None,
            output: None,
            output_capacity: 0,
            queue: PlaneQueue::new(dst),
        })
    }

    /// Output samples `samples` input samples can produce, plus held-back ones
    fn output_room(&self, samples: usize) -> usize {
        let scaled = (samples as u64 * self.dst.sample_rate as u64)
            .div_ceil(self.src.sample_rate as u64) as usize;
        scaled + DELAY_HEADROOM
    }

    /// Frames are reused while the input size stays the same
    fn prepare_frames(&mut self, samples: usize) -> Result<()> {
        let stale = self
            .input
            .as_ref()
            .map_or(true, |frame| frame.samples() != samples);

        if stale {
            let mut input = ffmpeg::frame::Audio::new(
                to_ffmpeg_sample(self.src.format),
                samples,
                to_ffmpeg_layout(self.src.channels),
            );
            if input.is_empty() {
                return Err(Error::NoMemory("resampler input frame".into()));
            }
            input.set_rate(self.src.sample_rate);
            self.input = Some(input);
        }

        let room = self.output_room(samples);
        if self.output.is_none() || self.output_capacity < room {
            let mut output = ffmpeg::frame::Audio::new(
                to_ffmpeg_sample(self.dst.format),
                room,
                to_ffmpeg_layout(self.dst.channels),
            );
            if output.is_empty() {
                return Err(Error::NoMemory("resampler output frame".into()));
            }
            output.set_rate(self.dst.sample_rate);
            self.output = Some(output);
            self.output_capacity = room;
        }
        Ok(())
    }

    /// Queue what the last conversion wrote into the output frame
    fn collect(queue: &mut PlaneQueue, frame: &ffmpeg::frame::Audio) -> Result<usize> {
        let samples = frame.samples();
        if samples > 0 {
            let planes: Vec<&[u8]> = (0..queue.layout().planes()).map(|i| frame.data(i)).collect();
            queue.extend(samples, &planes)?;
        }
        Ok(samples)
    }
}

impl Resampler for FfmpegResampler {
    fn push(&mut self, input: &[i16], samples: usize) -> Result<()> {
        let channels = self.src.channels.channels() as usize;
        if samples == 0 {
            return Ok(());
        }
        if input.len() < samples * channels {
            return Err(Error::InvalidInput(format!(
                "resampler got {} values for {} samples x{}",
                input.len(),
                samples,
                channels
            )));
        }

        self.prepare_frames(samples)?;
        let (Some(src_frame), Some(dst_frame)) = (self.input.as_mut(), self.output.as_mut()) else {
            return Err(Error::NoMemory("resampler frames".into()));
        };

        let data = src_frame.data_mut(0);
        for (chunk, sample) in data.chunks_exact_mut(2).zip(&input[..samples * channels]) {
            chunk.copy_from_slice(&sample.to_le_bytes());
        }

        // The converter shrinks nb_samples to what it wrote
        dst_frame.set_samples(self.output_capacity);
        self.context
            .run(src_frame, dst_frame)
            .map_err(|e| Error::NoMemory(format!("Resample failed: {}", e)))?;

        Self::collect(&mut self.queue, dst_frame)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let Some(dst_frame) = self.output.as_mut() else {
            return Ok(());
        };

        loop {
            dst_frame.set_samples(self.output_capacity);
            self.context
                .flush(dst_frame)
                .map_err(|e| Error::NoMemory(format!("Resampler flush failed: {}", e)))?;
            if Self::collect(&mut self.queue, dst_frame)? == 0 {
                return Ok(());
            }
        }
    }

    fn queue(&self) -> &PlaneQueue {
        &self.queue
    }

    fn queue_mut(&mut self) -> &mut PlaneQueue {
        &mut self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ChannelLayout;

    fn sample_f32(plane: &[u8], index: usize) -> f32 {
        let at = index * 4;
        f32::from_ne_bytes([plane[at], plane[at + 1], plane[at + 2], plane[at + 3]])
    }

    #[test]
    fn test_s16_to_planar_float() {
        let src = AudioLayout::new(SampleFormat::S16, ChannelLayout::Stereo, 44100);
        let dst = AudioLayout::new(SampleFormat::F32P, ChannelLayout::Stereo, 44100);
        let mut resampler = FfmpegResampler::new(src, dst).unwrap();

        // Left at half scale, right silent
        let input: Vec<i16> = (0..256).flat_map(|_| [16384i16, 0]).collect();
        resampler.push(&input, 256).unwrap();
        resampler.flush().unwrap();
        assert_eq!(resampler.queue().len(), 256);

        let mut block = AudioBlock::alloc(dst, 256).unwrap();
        assert!(resampler.queue_mut().pop_exact(&mut block));
        assert!((sample_f32(&block.planes[0], 100) - 0.5).abs() < 1e-3);
        assert_eq!(sample_f32(&block.planes[1], 100), 0.0);
        assert!(resampler.queue().is_empty());
    }

    #[test]
    fn test_rate_change_scales_sample_count() {
        let src = AudioLayout::new(SampleFormat::S16, ChannelLayout::Stereo, 44100);
        let dst = AudioLayout::new(SampleFormat::F32P, ChannelLayout::Stereo, 48000);
        let mut resampler = FfmpegResampler::new(src, dst).unwrap();

        // One second in 1/60 s chunks
        let chunk = vec![1000i16; 2 * 735];
        for _ in 0..60 {
            resampler.push(&chunk, 735).unwrap();
        }
        resampler.flush().unwrap();

        let out = resampler.queue().len();
        assert!((47900..=48100).contains(&out), "{} samples out", out);
    }

    #[test]
    fn test_rejects_short_input() {
        let src = AudioLayout::new(SampleFormat::S16, ChannelLayout::Mono, 44100);
        let dst = AudioLayout::new(SampleFormat::S16, ChannelLayout::Mono, 44100);
        let mut resampler = FfmpegResampler::new(src, dst).unwrap();

        assert!(resampler.push(&[0; 10], 64).is_err());
        assert!(resampler.queue().is_empty());
    }

    #[test]
    fn test_queue_pops_whole_blocks_and_pads_the_rest() {
        let layout = AudioLayout::new(SampleFormat::S16, ChannelLayout::Mono, 8000);
        let mut queue = PlaneQueue::new(layout);
        let bytes: Vec<u8> = (1..=6i16).flat_map(|s| s.to_le_bytes()).collect();
        queue.extend(6, &[&bytes]).unwrap();

        let mut block = AudioBlock::alloc(layout, 4).unwrap();
        assert!(queue.pop_exact(&mut block));
        assert_eq!(&block.planes[0][..2], &1i16.to_le_bytes());
        assert!(!queue.pop_exact(&mut block));

        assert_eq!(queue.drain_padded(&mut block), 2);
        assert_eq!(&block.planes[0][..4], &[5, 0, 6, 0]);
        assert!(block.planes[0][4..].iter().all(|&b| b == 0));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_rejects_short_plane() {
        let layout = AudioLayout::new(SampleFormat::F32P, ChannelLayout::Stereo, 48000);
        let mut queue = PlaneQueue::new(layout);
        let left = vec![0u8; 64];
        let right = vec![0u8; 32];

        assert!(queue.extend(16, &[&left, &right]).is_err());
        assert!(queue.is_empty());
    }
}
