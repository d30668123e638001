//! Audio pipeline: accumulate, convert, slice into encoder frames, stamp, encode

use crate::audio::{
    AudioBlock, AudioEncoder, AudioEncoderParams, AudioLayout, AudioStreamParams, Resampler,
    SampleAccumulator, SampleFormat,
};
use crate::backend::MediaBackend;
use crate::error::{Error, Result};
use crate::types::Packet;

use super::setup::PacketSink;

/// Sizing inputs for the audio stream
#[derive(Debug, Clone, Copy)]
pub(crate) struct AudioSizing {
    /// Per-channel samples in one input chunk (rounded up)
    pub chunk_samples: usize,
    /// Chunks of headroom beyond one encoder frame
    pub slack_chunks: usize,
    /// Frame size when the encoder takes any size
    pub fallback_frame_size: usize,
}

/// Per-session audio state
pub(crate) struct AudioStream {
    encoder: Box<dyn AudioEncoder>,
    resampler: Box<dyn Resampler>,
    accumulator: SampleAccumulator,
    /// Interleaved input samples on their way to the resampler
    scratch: Vec<i16>,
    block: AudioBlock,
    frame_size: usize,
    /// Input samples converted at a time, enough for one encoder frame
    input_chunk: usize,
    /// Samples handed to the encoder so far; also the next frame's pts
    samples_count: i64,
    frames: u64,
    samples_pushed: u64,
    padding_samples: u64,
}

impl AudioStream {
    pub(crate) fn open<B: MediaBackend + ?Sized>(
        backend: &B,
        params: &AudioEncoderParams,
        sizing: AudioSizing,
    ) -> Result<Self> {
        let encoder = backend.open_audio_encoder(params)?;
        let frame_size = encoder.frame_size().unwrap_or(sizing.fallback_frame_size);

        let input = AudioLayout::new(SampleFormat::S16, params.channels, params.sample_rate);
        let output = encoder.layout();
        let resampler = backend.resampler(input, output)?;
        let input_chunk = input_samples_for(frame_size, input.sample_rate, output.sample_rate);

        let capacity = input_chunk + sizing.slack_chunks * sizing.chunk_samples;
        let channels = params.channels.channels() as usize;
        let accumulator = SampleAccumulator::new(capacity, channels)?;

        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(capacity * channels)
            .map_err(|e| Error::NoMemory(format!("audio scratch buffer: {}", e)))?;
        let block = AudioBlock::alloc(output, frame_size)?;

        if input.sample_rate != output.sample_rate {
            tracing::info!(
                "Resampling audio {}Hz -> {}Hz",
                input.sample_rate,
                output.sample_rate
            );
        }
        tracing::debug!(
            "Audio stream: frame_size={}, buffer capacity={} samples",
            frame_size,
            capacity
        );

        Ok(Self {
            encoder,
            resampler,
            accumulator,
            scratch,
            block,
            frame_size,
            input_chunk,
            samples_count: 0,
            frames: 0,
            samples_pushed: 0,
            padding_samples: 0,
        })
    }

    pub(crate) fn stream_params(&self) -> AudioStreamParams {
        self.encoder.stream_params()
    }

    /// Buffer one chunk and encode every complete frame now available.
    /// Packets go to `sink` frame by frame.
    pub(crate) fn push(
        &mut self,
        samples: &[i16],
        sample_count: usize,
        sink: &mut PacketSink<'_>,
    ) -> Result<()> {
        let channels = self.accumulator.channels();
        let values = sample_count.checked_mul(channels).ok_or_else(|| {
            Error::InvalidInput(format!("{} samples per channel is out of range", sample_count))
        })?;
        if samples.len() < values {
            return Err(Error::InvalidInput(format!(
                "audio chunk holds {} values, {} samples x {} channels expected",
                samples.len(),
                sample_count,
                channels
            )));
        }

        self.accumulator.push(&samples[..values])?;
        self.samples_pushed += sample_count as u64;

        while self.accumulator.pop_exact(self.input_chunk, &mut self.scratch) {
            self.resampler.push(&self.scratch, self.input_chunk)?;
            self.encode_queued(sink)?;
        }
        Ok(())
    }

    /// Convert the remainder, pad the last frame with silence, then drain
    /// the encoder
    pub(crate) fn finish(&mut self, sink: &mut PacketSink<'_>) -> Result<()> {
        let remainder = self.accumulator.drain_into(&mut self.scratch);
        self.resampler.push(&self.scratch, remainder)?;
        self.resampler.flush()?;
        self.encode_queued(sink)?;

        let real = self.resampler.queue_mut().drain_padded(&mut self.block);
        if real > 0 {
            let padding = self.frame_size - real;
            self.padding_samples += padding as u64;
            tracing::debug!("Padded final audio frame with {} samples", padding);
            let packets = self.encode_block()?;
            sink.write(packets)?;
        }

        sink.write(self.encoder.flush()?)
    }

    fn encode_queued(&mut self, sink: &mut PacketSink<'_>) -> Result<()> {
        while self.resampler.queue_mut().pop_exact(&mut self.block) {
            let packets = self.encode_block()?;
            sink.write(packets)?;
        }
        Ok(())
    }

    fn encode_block(&mut self) -> Result<Vec<Packet>> {
        self.block.pts = self.samples_count;
        let packets = self.encoder.encode(&self.block)?;

        self.samples_count += self.frame_size as i64;
        self.frames += 1;
        tracing::trace!("Audio frame {} (pts {})", self.frames, self.block.pts);
        Ok(packets)
    }

    pub(crate) fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Input samples waiting in the accumulation buffer
    pub(crate) fn buffered(&self) -> usize {
        self.accumulator.len()
    }

    pub(crate) fn frames(&self) -> u64 {
        self.frames
    }

    pub(crate) fn samples_pushed(&self) -> u64 {
        self.samples_pushed
    }

    /// Samples handed to the encoder, at the encoder's rate
    pub(crate) fn samples_submitted(&self) -> u64 {
        self.samples_count as u64
    }

    pub(crate) fn padding_samples(&self) -> u64 {
        self.padding_samples
    }
}

/// Input samples that convert into at least `frame_size` output samples
fn input_samples_for(frame_size: usize, input_rate: u32, output_rate: u32) -> usize {
    (frame_size as u64 * input_rate as u64).div_ceil(output_rate as u64) as usize
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        tracing::debug!(
            "Released audio stream after {} frames ({} samples buffered)",
            self.frames,
            self.accumulator.len()
        );
    }
}
