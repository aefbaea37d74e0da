use std::time::Duration;

use crate::gain::VOLUME_STEP;
use crate::resample::ResampleQuality;

/// Playback tuning parameters shared by the session pipeline and the transport.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Output rate requested from the device.
    pub output_rate: u32,
    /// Resampler quality level.
    pub quality: ResampleQuality,
    /// Decode/resample chunk size in frames.
    pub chunk_frames: usize,
    /// Decoded-sample queue capacity, in seconds of native-rate audio.
    pub buffer_seconds: f32,
    /// Session control loop poll granularity.
    pub poll_interval: Duration,
    /// Volume up/down delta, log2 units.
    pub volume_step: f64,
    /// Volume for the first `play`.
    pub initial_volume: f64,
    /// Output device substring match; `None` uses the host default.
    pub device: Option<String>,
    /// Play into a silent, real-time paced sink instead of a sound card.
    pub null_output: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            output_rate: 48_000,
            quality: ResampleQuality::default(),
            chunk_frames: 1024,
            buffer_seconds: 2.0,
            poll_interval: Duration::from_secs(1),
            volume_step: VOLUME_STEP,
            initial_volume: 0.0,
            device: None,
            null_output: false,
        }
    }
}
