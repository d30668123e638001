//! In-memory media backend for tests
//!
//! Records everything the recorder submits, counts live handles so leaks
//! show up, and fails on request at any setup or write step.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::audio::{
    pick_sample_rate, AudioBlock, AudioEncoder, AudioEncoderParams, AudioLayout,
    AudioStreamParams, PlaneQueue, Resampler, SampleFormat,
};
use crate::backend::MediaBackend;
use crate::encode::{VideoEncoder, VideoEncoderParams, VideoStreamParams};
use crate::error::{Error, Result};
use crate::output::{CodecSlot, ContainerFormat, Muxer};
use crate::processing::PixelConverter;
use crate::types::{Packet, Picture, PictureLayout, PixelFormat, StreamKind, TimeBase};

/// Where an injected failure fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailPoint {
    GuessFormat,
    OpenContainer,
    VideoEncoder,
    PixelConverter,
    AddVideoStream,
    AudioEncoder,
    Resampler,
    AddAudioStream,
    WriteHeader,
    WritePacket,
    WriteTrailer,
}

/// Handles currently alive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Live {
    pub containers: usize,
    pub video_encoders: usize,
    pub audio_encoders: usize,
    pub converters: usize,
    pub resamplers: usize,
}

impl Live {
    pub fn total(&self) -> usize {
        self.containers + self.video_encoders + self.audio_encoders + self.converters + self.resamplers
    }
}

/// Shared record of what the recorder did
#[derive(Debug, Default)]
pub(crate) struct Journal {
    pub fail: Option<(FailPoint, Error)>,
    /// Frame size the audio encoder reports; `None` for variable
    pub audio_frame_size: Option<usize>,
    /// Rates the audio encoder accepts; `None` for any
    pub audio_rates: Option<Vec<u32>>,
    /// Zero-based audio encode call that is rejected
    pub reject_audio_encode: Option<usize>,
    pub audio_encodes: usize,
    pub live: Live,
    pub opened_audio_encoders: usize,
    pub audio_params: Option<AudioEncoderParams>,
    /// Audio stream as added to the container
    pub audio_stream: Option<AudioStreamParams>,
    pub video_pts: Vec<i64>,
    pub audio_pts: Vec<i64>,
    /// Interleaved samples exactly as handed to the audio encoder
    pub audio_samples: Vec<i16>,
    /// Last picture the converter was given
    pub cropped: Option<Picture>,
    pub packets: Vec<Packet>,
    pub headers: usize,
    pub trailers: usize,
}

impl Journal {
    fn check(&self, point: FailPoint) -> Result<()> {
        match &self.fail {
            Some((at, e)) if *at == point => Err(e.clone()),
            _ => Ok(()),
        }
    }

    pub fn packets_of(&self, kind: StreamKind) -> usize {
        self.packets.iter().filter(|p| p.stream == kind).count()
    }
}

type SharedJournal = Rc<RefCell<Journal>>;

/// Backend whose containers are picked by extension:
/// `mp4` video+audio, `gif` video only, `wav` audio only, `txt` neither
#[derive(Debug, Clone)]
pub(crate) struct FakeBackend {
    journal: SharedJournal,
}

impl FakeBackend {
    pub fn new() -> Self {
        let journal = Journal {
            audio_frame_size: Some(1024),
            ..Journal::default()
        };
        Self {
            journal: Rc::new(RefCell::new(journal)),
        }
    }

    pub fn failing_at(self, point: FailPoint, error: Error) -> Self {
        self.journal.borrow_mut().fail = Some((point, error));
        self
    }

    pub fn with_audio_frame_size(self, frame_size: Option<usize>) -> Self {
        self.journal.borrow_mut().audio_frame_size = frame_size;
        self
    }

    pub fn with_audio_rates(self, rates: &[u32]) -> Self {
        self.journal.borrow_mut().audio_rates = Some(rates.to_vec());
        self
    }

    pub fn rejecting_audio_encode(self, call: usize) -> Self {
        self.journal.borrow_mut().reject_audio_encode = Some(call);
        self
    }

    pub fn journal(&self) -> SharedJournal {
        self.journal.clone()
    }

    fn check(&self, point: FailPoint) -> Result<()> {
        self.journal.borrow().check(point)
    }
}

fn slot(codec: &str) -> Option<CodecSlot> {
    Some(CodecSlot {
        codec: codec.into(),
        encoder: Some(codec.into()),
    })
}

impl MediaBackend for FakeBackend {
    fn guess_format(&self, destination: &Path) -> Result<ContainerFormat> {
        self.check(FailPoint::GuessFormat)?;

        let ext = destination
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let (video, audio) = match ext {
            "mp4" => (slot("mpeg4"), slot("aac")),
            "gif" => (slot("gif"), None),
            "wav" => (None, slot("pcm_s16le")),
            "txt" => (None, None),
            _ => return Err(Error::FormatGuess(destination.display().to_string())),
        };

        Ok(ContainerFormat {
            name: ext.into(),
            long_name: format!("fake {}", ext),
            extensions: vec![ext.into()],
            video,
            audio,
            no_file: false,
            global_header: ext == "mp4",
        })
    }

    fn open_container(&self, _: &Path, _: &ContainerFormat) -> Result<Box<dyn Muxer>> {
        self.check(FailPoint::OpenContainer)?;
        self.journal.borrow_mut().live.containers += 1;
        Ok(Box::new(FakeMuxer {
            journal: self.journal(),
            bytes: 0,
        }))
    }

    fn open_video_encoder(&self, params: &VideoEncoderParams) -> Result<Box<dyn VideoEncoder>> {
        self.check(FailPoint::VideoEncoder)?;
        self.journal.borrow_mut().live.video_encoders += 1;
        Ok(Box::new(FakeVideoEncoder {
            journal: self.journal(),
            params: params.clone(),
            pending: None,
        }))
    }

    fn open_audio_encoder(&self, params: &AudioEncoderParams) -> Result<Box<dyn AudioEncoder>> {
        self.check(FailPoint::AudioEncoder)?;
        let mut journal = self.journal.borrow_mut();
        let rate = match &journal.audio_rates {
            Some(rates) => pick_sample_rate(params.sample_rate, rates.iter().copied())
                .ok_or_else(|| Error::NoCodec("no sample rates".into()))?,
            None => params.sample_rate,
        };
        journal.live.audio_encoders += 1;
        journal.opened_audio_encoders += 1;
        journal.audio_params = Some(params.clone());
        Ok(Box::new(FakeAudioEncoder {
            journal: self.journal(),
            layout: AudioLayout::new(SampleFormat::S16, params.channels, rate),
            frame_size: journal.audio_frame_size,
        }))
    }

    fn pixel_converter(
        &self,
        _: PictureLayout,
        _: PictureLayout,
    ) -> Result<Box<dyn PixelConverter>> {
        self.check(FailPoint::PixelConverter)?;
        self.journal.borrow_mut().live.converters += 1;
        Ok(Box::new(FakeConverter {
            journal: self.journal(),
        }))
    }

    fn resampler(&self, src: AudioLayout, dst: AudioLayout) -> Result<Box<dyn Resampler>> {
        self.check(FailPoint::Resampler)?;
        self.journal.borrow_mut().live.resamplers += 1;
        Ok(Box::new(FakeResampler {
            journal: self.journal(),
            src,
            dst,
            consumed: 0,
            produced: 0,
            queue: PlaneQueue::new(dst),
        }))
    }

    fn output_formats(&self) -> Vec<ContainerFormat> {
        ["mp4", "gif", "wav", "txt"]
            .iter()
            .filter_map(|ext| self.guess_format(Path::new(&format!("out.{}", ext))).ok())
            .collect()
    }
}

struct FakeMuxer {
    journal: SharedJournal,
    bytes: u64,
}

impl Muxer for FakeMuxer {
    fn add_video_stream(&mut self, _: &VideoStreamParams) -> Result<usize> {
        self.journal.borrow().check(FailPoint::AddVideoStream)?;
        Ok(0)
    }

    fn add_audio_stream(&mut self, params: &AudioStreamParams) -> Result<usize> {
        self.journal.borrow().check(FailPoint::AddAudioStream)?;
        self.journal.borrow_mut().audio_stream = Some(params.clone());
        Ok(1)
    }

    fn write_header(&mut self) -> Result<()> {
        self.journal.borrow().check(FailPoint::WriteHeader)?;
        self.journal.borrow_mut().headers += 1;
        Ok(())
    }

    fn write_packet(&mut self, packet: Packet) -> Result<()> {
        self.journal.borrow().check(FailPoint::WritePacket)?;
        self.bytes += packet.size() as u64;
        self.journal.borrow_mut().packets.push(packet);
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.journal.borrow().check(FailPoint::WriteTrailer)?;
        self.journal.borrow_mut().trailers += 1;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl Drop for FakeMuxer {
    fn drop(&mut self) {
        self.journal.borrow_mut().live.containers -= 1;
    }
}

/// Emits each frame's packet one call late, like an encoder with delay
struct FakeVideoEncoder {
    journal: SharedJournal,
    params: VideoEncoderParams,
    pending: Option<i64>,
}

impl VideoEncoder for FakeVideoEncoder {
    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Yuv420p
    }

    fn time_base(&self) -> TimeBase {
        self.params.time_base
    }

    fn stream_params(&self) -> VideoStreamParams {
        VideoStreamParams {
            encoder: self.params.encoder.clone(),
            width: self.params.width,
            height: self.params.height,
            pixel_format: PixelFormat::Yuv420p,
            time_base: self.params.time_base,
            bitrate: self.params.bitrate_kbps as i64 * 1000,
            extradata: Vec::new(),
        }
    }

    fn encode(&mut self, _: &Picture, pts: i64) -> Result<Vec<Packet>> {
        self.journal.borrow_mut().video_pts.push(pts);
        let ready = self.pending.replace(pts);
        Ok(ready
            .map(|pts| Packet::new(StreamKind::Video, vec![0; 4], pts))
            .into_iter()
            .collect())
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        Ok(self
            .pending
            .take()
            .map(|pts| Packet::new(StreamKind::Video, vec![0; 4], pts))
            .into_iter()
            .collect())
    }
}

impl Drop for FakeVideoEncoder {
    fn drop(&mut self) {
        self.journal.borrow_mut().live.video_encoders -= 1;
    }
}

struct FakeAudioEncoder {
    journal: SharedJournal,
    layout: AudioLayout,
    frame_size: Option<usize>,
}

impl AudioEncoder for FakeAudioEncoder {
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
        AudioStreamParams {
            encoder: "fake".into(),
            layout: self.layout,
            bitrate: 0,
            frame_size: self.frame_size.unwrap_or(0),
            extradata: Vec::new(),
            time_base: self.time_base(),
        }
    }

    fn encode(&mut self, block: &AudioBlock) -> Result<Vec<Packet>> {
        let mut journal = self.journal.borrow_mut();
        let call = journal.audio_encodes;
        journal.audio_encodes += 1;
        if journal.reject_audio_encode == Some(call) {
            return Err(Error::NoCodec(format!("audio frame {} rejected", call)));
        }

        journal.audio_pts.push(block.pts);
        journal.audio_samples.extend(
            block.planes[0]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );
        Ok(vec![Packet::new(StreamKind::Audio, vec![0; 2], block.pts)])
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        Ok(Vec::new())
    }
}

impl Drop for FakeAudioEncoder {
    fn drop(&mut self) {
        self.journal.borrow_mut().live.audio_encoders -= 1;
    }
}

struct FakeConverter {
    journal: SharedJournal,
}

impl PixelConverter for FakeConverter {
    fn convert(&mut self, src: &Picture, _: &mut Picture) -> Result<()> {
        self.journal.borrow_mut().cropped = Some(src.clone());
        Ok(())
    }
}

impl Drop for FakeConverter {
    fn drop(&mut self) {
        self.journal.borrow_mut().live.converters -= 1;
    }
}

/// Queues S16 input unchanged at equal rates, nearest-neighbour resampled
/// otherwise. Output sample `j` takes input sample `j * src / dst`.
struct FakeResampler {
    journal: SharedJournal,
    src: AudioLayout,
    dst: AudioLayout,
    /// Input samples seen so far
    consumed: u64,
    /// Output samples queued so far
    produced: u64,
    queue: PlaneQueue,
}

impl Resampler for FakeResampler {
    fn push(&mut self, input: &[i16], samples: usize) -> Result<()> {
        let channels = self.src.channels.channels() as usize;
        let first = self.consumed;
        self.consumed += samples as u64;

        let mut bytes = Vec::new();
        let mut count = 0;
        loop {
            let source = self.produced * self.src.sample_rate as u64 / self.dst.sample_rate as u64;
            if source >= self.consumed {
                break;
            }
            let at = (source - first) as usize * channels;
            for sample in &input[at..at + channels] {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
            self.produced += 1;
            count += 1;
        }
        self.queue.extend(count, &[&bytes])
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn queue(&self) -> &PlaneQueue {
        &self.queue
    }

    fn queue_mut(&mut self) -> &mut PlaneQueue {
        &mut self.queue
    }
}

impl Drop for FakeResampler {
    fn drop(&mut self) {
        self.journal.borrow_mut().live.resamplers -= 1;
    }
}
