//! Silent output paced in real time.
//!
//! Pulls one period from the render callback every period duration, like a sound card
//! would, and discards the samples. Records how many streams are open and the peak of the
//! last period so headless runs and tests can observe what the device would have heard.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{ActiveOutput, OutputBackend, OutputFormat, PreparedOutput, RenderFn};
use crate::error::DeviceError;

const PERIOD: Duration = Duration::from_millis(10);

/// Counters shared between a [`NullBackend`] and its running streams.
#[derive(Debug, Default)]
pub struct NullStats {
    open: AtomicUsize,
    max_open: AtomicUsize,
    opened_total: AtomicUsize,
    rendered_frames: AtomicU64,
    last_peak: AtomicU32,
}

impl NullStats {
    /// Streams currently running.
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running streams ever observed.
    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn opened_total(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }

    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames.load(Ordering::Relaxed)
    }

    /// Absolute peak of the most recent period.
    pub fn last_peak(&self) -> f32 {
        f32::from_bits(self.last_peak.load(Ordering::Relaxed))
    }
}

pub struct NullBackend {
    channels: usize,
    stats: Arc<NullStats>,
}

impl NullBackend {
    /// Stereo sink.
    pub fn new() -> Self {
        Self::with_channels(2)
    }

    pub fn with_channels(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            stats: Arc::new(NullStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<NullStats> {
        self.stats.clone()
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for NullBackend {
    fn probe(&self) -> Result<String, DeviceError> {
        Ok(format!("null output ({} ch)", self.channels))
    }

    fn prepare(&self, target_rate: u32) -> Result<Box<dyn PreparedOutput>, DeviceError> {
        if target_rate == 0 {
            return Err(DeviceError::Config("sample rate must be non-zero".to_string()));
        }
        Ok(Box::new(NullPrepared {
            format: OutputFormat {
                sample_rate: target_rate,
                channels: self.channels,
            },
            stats: self.stats.clone(),
        }))
    }
}

struct NullPrepared {
    format: OutputFormat,
    stats: Arc<NullStats>,
}

impl PreparedOutput for NullPrepared {
    fn format(&self) -> OutputFormat {
        self.format
    }

    fn start(self: Box<Self>, mut render: RenderFn) -> Result<Box<dyn ActiveOutput>, DeviceError> {
        let period_frames =
            (self.format.sample_rate as u128 * PERIOD.as_millis() / 1000).max(1) as usize;
        let samples = period_frames * self.format.channels;
        let stop = Arc::new(AtomicBool::new(false));
        let stats = self.stats.clone();

        let now_open = stats.open.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_open.fetch_max(now_open, Ordering::SeqCst);
        stats.opened_total.fetch_add(1, Ordering::SeqCst);

        let stop_thread = stop.clone();
        let stats_thread = stats.clone();
        let spawned = thread::Builder::new()
            .name("null-output".to_string())
            .spawn(move || {
                let mut buf = vec![0.0f32; samples];
                let mut next = Instant::now();
                while !stop_thread.load(Ordering::Acquire) {
                    render(&mut buf);
                    let peak = buf.iter().fold(0.0f32, |p, s| p.max(s.abs()));
                    stats_thread
                        .last_peak
                        .store(peak.to_bits(), Ordering::Relaxed);
                    stats_thread
                        .rendered_frames
                        .fetch_add(period_frames as u64, Ordering::Relaxed);

                    next += PERIOD;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
            });

        match spawned {
            Ok(join) => Ok(Box::new(NullActive {
                stop,
                join: Some(join),
                stats,
            })),
            Err(e) => {
                stats.open.fetch_sub(1, Ordering::SeqCst);
                Err(DeviceError::Stream(format!("spawn null output thread: {e}")))
            }
        }
    }
}

struct NullActive {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    stats: Arc<NullStats>,
}

impl ActiveOutput for NullActive {}

impl Drop for NullActive {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        self.stats.open.fetch_sub(1, Ordering::SeqCst);
    }
}
