//! Audio accumulation buffer
//!
//! Reconciles per-tick input chunks with the fixed frame size the encoder
//! wants. Samples are stored interleaved; all counts below are per-channel
//! samples unless noted. Capacity is fixed at construction.

use crate::error::{Error, Result};

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

/// Fixed-capacity ring of interleaved i16 samples
pub struct SampleAccumulator {
    ring: HeapRb<i16>,
    channels: usize,
}

impl SampleAccumulator {
    /// Create a buffer holding `capacity` per-channel samples
    pub fn new(capacity: usize, channels: usize) -> Result<Self> {
        if capacity == 0 || channels == 0 {
            return Err(Error::InvalidInput(format!(
                "accumulator needs a positive size ({} samples x {} channels)",
                capacity, channels
            )));
        }
        let slots = capacity
            .checked_mul(channels)
            .ok_or_else(|| Error::NoMemory(format!("{} sample accumulator", capacity)))?;

        Ok(Self {
            ring: HeapRb::new(slots),
            channels,
        })
    }

    /// Capacity in per-channel samples
    pub fn capacity(&self) -> usize {
        self.ring.capacity().get() / self.channels
    }

    /// Buffered per-channel samples
    pub fn len(&self) -> usize {
        self.ring.occupied_len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Free space in per-channel samples
    pub fn available(&self) -> usize {
        self.ring.vacant_len() / self.channels
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Append interleaved samples. Nothing is written if they do not all fit.
    pub fn push(&mut self, interleaved: &[i16]) -> Result<()> {
        if interleaved.len() % self.channels != 0 {
            return Err(Error::InvalidInput(format!(
                "{} values is not a whole number of {}-channel samples",
                interleaved.len(),
                self.channels
            )));
        }

        let needed = interleaved.len() / self.channels;
        let available = self.available();
        if needed > available {
            return Err(Error::BufferOverflow { needed, available });
        }

        let written = self.ring.push_slice(interleaved);
        debug_assert_eq!(written, interleaved.len());
        Ok(())
    }

    /// Remove exactly `samples` per-channel samples into `out` if that many
    /// are buffered. `out` is resized to hold them.
    pub fn pop_exact(&mut self, samples: usize, out: &mut Vec<i16>) -> bool {
        if self.len() < samples {
            return false;
        }
        out.clear();
        out.resize(samples * self.channels, 0);
        let read = self.ring.pop_slice(out);
        debug_assert_eq!(read, out.len());
        true
    }

    /// Remove everything buffered into `out`; returns per-channel samples read
    pub fn drain_into(&mut self, out: &mut Vec<i16>) -> usize {
        let samples = self.len();
        out.clear();
        out.resize(samples * self.channels, 0);
        self.ring.pop_slice(out);
        samples
    }

    /// Drop buffered samples
    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

impl std::fmt::Debug for SampleAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleAccumulator")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("channels", &self.channels)
            .finish()
    }
}
