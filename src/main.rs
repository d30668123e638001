//! avrecord CLI
//!
//! Lists what the host can record and writes synthetic test recordings.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use avrecord::{Catalog, FfmpegBackend, Recorder, RecorderConfig, Resolution};

#[derive(Parser)]
#[command(name = "avrecord")]
#[command(about = "Emulator A/V recorder - fixed-cadence video and audio into a media file")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List containers that can record video or audio
    Formats,

    /// Record a synthetic test pattern and tone
    Record {
        /// Output file; the extension picks the container
        #[arg(short, long)]
        output: PathBuf,

        /// Length in seconds of emulated time
        #[arg(short, long, default_value = "5")]
        seconds: u32,

        /// Screen width
        #[arg(long, default_value_t = Resolution::GBA.width)]
        width: u32,

        /// Screen height
        #[arg(long, default_value_t = Resolution::GBA.height)]
        height: u32,

        /// Color depth in bits (16, 24 or 32)
        #[arg(short, long, default_value = "16")]
        depth: u32,

        /// Record audio only
        #[arg(long)]
        audio_only: bool,

        /// Sample rate in Hz (overrides the config file)
        #[arg(long)]
        sample_rate: Option<u32>,

        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("avrecord=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Formats => cmd_formats(),
        Commands::Record {
            output,
            seconds,
            width,
            height,
            depth,
            audio_only,
            sample_rate,
            config,
        } => {
            let video = (!audio_only).then_some(VideoArgs {
                width,
                height,
                depth,
            });
            cmd_record(output, seconds, video, sample_rate, config)
        }
    }
}

fn cmd_formats() -> anyhow::Result<()> {
    let catalog = Catalog::from_backend(&FfmpegBackend);

    println!("Video formats");
    println!("=============\n");
    for (name, exts) in catalog.video_names.iter().zip(&catalog.video_extensions) {
        println!("  {:<40} {}", name, exts);
    }

    println!("\nAudio formats");
    println!("=============\n");
    for (name, exts) in catalog.audio_names.iter().zip(&catalog.audio_extensions) {
        println!("  {:<40} {}", name, exts);
    }

    Ok(())
}

struct VideoArgs {
    width: u32,
    height: u32,
    depth: u32,
}

fn cmd_record(
    output: PathBuf,
    seconds: u32,
    video: Option<VideoArgs>,
    sample_rate: Option<u32>,
    config: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => RecorderConfig::load(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RecorderConfig::default(),
    };

    let mut recorder = Recorder::new(config);
    if let Some(rate) = sample_rate {
        recorder.set_sample_rate(rate);
    }

    let config = recorder.config().clone();
    let channels = config.channels as usize;
    let fps = config.framerate.num / config.framerate.den.max(1);
    let ticks = seconds * fps;

    match &video {
        Some(v) => recorder
            .start_audio_video(&output, v.width, v.height, v.depth)
            .with_context(|| format!("starting {}", output.display()))?,
        None => recorder
            .start_audio_only(&output)
            .with_context(|| format!("starting {}", output.display()))?,
    }

    println!("Recording {} ({}s)...", output.display(), seconds);

    let mut tone = Tone::new(440.0, recorder.sample_rate(), channels);
    let mut emitted = 0u64;

    for tick in 0..ticks {
        if let Some(v) = &video {
            let frame = test_pattern(v, &config, tick);
            recorder.add_video_frame(&frame)?;
        }

        // Spread the rate over the ticks so every second carries exactly
        // `sample_rate` samples
        let due = (tick as u64 + 1) * recorder.sample_rate() as u64 / fps as u64;
        let count = (due - emitted) as usize;
        emitted = due;
        recorder.add_audio_frame(&tone.next_chunk(count), count)?;
    }

    let stats = recorder
        .stop(true)
        .context("recorder stopped before the end of the recording")?;

    println!("\nStatistics:");
    println!("  Video frames: {}", stats.video_frames);
    println!("  Video time: {:.3}s", stats.video_time.as_secs_f64());
    println!("  Audio frames: {}", stats.audio_frames);
    println!("  Samples pushed: {}", stats.samples_pushed);
    println!("  Padding samples: {}", stats.padding_samples);
    println!("  Packets written: {}", stats.packets_written);
    println!("  Bytes written: {}", stats.bytes_written);

    Ok(())
}

/// Moving color bars, border included
fn test_pattern(video: &VideoArgs, config: &RecorderConfig, tick: u32) -> Vec<u8> {
    let bpp = (video.depth / 8) as usize;
    let stride = bpp * (video.width + config.border.right) as usize;
    let rows = (video.height + config.border.top) as usize;
    let mut frame = vec![0u8; stride * rows];

    for (y, row) in frame.chunks_exact_mut(stride).enumerate() {
        for (x, pixel) in row.chunks_exact_mut(bpp).enumerate() {
            let bar = ((x as u32 + tick) / 30 % 8) as u8;
            let shade = bar.wrapping_mul(32).wrapping_add(y as u8);
            pixel.fill(shade);
        }
    }
    frame
}

/// Sine tone generator
struct Tone {
    phase: f64,
    step: f64,
    channels: usize,
}

impl Tone {
    fn new(freq: f64, sample_rate: u32, channels: usize) -> Self {
        Self {
            phase: 0.0,
            step: freq * std::f64::consts::TAU / sample_rate as f64,
            channels,
        }
    }

    fn next_chunk(&mut self, samples: usize) -> Vec<i16> {
        let mut chunk = Vec::with_capacity(samples * self.channels);
        for _ in 0..samples {
            let value = (self.phase.sin() * 8000.0) as i16;
            chunk.extend(std::iter::repeat(value).take(self.channels));
            self.phase = (self.phase + self.step) % std::f64::consts::TAU;
        }
        chunk
    }
}
