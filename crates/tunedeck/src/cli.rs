use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tunedeck_player::PlaybackConfig;
use tunedeck_player::resample::ResampleQuality;

#[derive(Parser, Debug)]
#[command(name = "tunedeck", version, about = "Browse and play a local music directory")]
pub struct Args {
    /// Music directory to index (defaults to your home directory)
    pub root: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Play into a silent, real-time paced sink instead of the sound card
    #[arg(long)]
    pub null_output: bool,

    /// Sample rate requested from the output device
    #[arg(long, default_value_t = 48_000)]
    pub output_rate: u32,

    /// Resampler quality, 1 (fastest) to 4 (best)
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub quality: u8,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Decoded-audio buffer in seconds
    #[arg(long, default_value_t = 2.0)]
    pub buffer_seconds: f32,

    /// Volume change per key press, in doublings (0.5 = about 3 dB)
    #[arg(long, default_value_t = 0.5)]
    pub volume_step: f64,

    /// Session control poll interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_ms: u64,
}

impl Args {
    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            output_rate: self.output_rate,
            quality: ResampleQuality::new(self.quality),
            chunk_frames: self.chunk_frames.max(1),
            buffer_seconds: self.buffer_seconds,
            poll_interval: Duration::from_millis(self.poll_ms.max(1)),
            volume_step: self.volume_step.abs(),
            device: self
                .device
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            null_output: self.null_output,
            ..PlaybackConfig::default()
        }
    }
}
