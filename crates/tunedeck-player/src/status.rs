use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::output::SessionId;
use crate::track::Track;

const UNKNOWN: u64 = u64::MAX;

/// Live progress counters for one session, shared by the render chain and the UI.
#[derive(Debug)]
pub struct SessionProgress {
    /// Output frames handed to the device (silence from pause/underrun excluded).
    played_frames: AtomicU64,
    /// Frames emitted as silence because the queue was empty.
    underrun_frames: AtomicU64,
    /// Number of underrun incidents.
    underrun_events: AtomicU64,
    output_rate: AtomicU32,
    duration_ms: AtomicU64,
}

impl Default for SessionProgress {
    fn default() -> Self {
        Self {
            played_frames: AtomicU64::new(0),
            underrun_frames: AtomicU64::new(0),
            underrun_events: AtomicU64::new(0),
            output_rate: AtomicU32::new(0),
            duration_ms: AtomicU64::new(UNKNOWN),
        }
    }
}

impl SessionProgress {
    pub fn add_played(&self, frames: u64) {
        if frames > 0 {
            self.played_frames.fetch_add(frames, Ordering::Relaxed);
        }
    }

    pub fn add_underrun(&self, frames: u64) {
        self.underrun_events.fetch_add(1, Ordering::Relaxed);
        self.underrun_frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn set_output_rate(&self, rate_hz: u32) {
        self.output_rate.store(rate_hz, Ordering::Relaxed);
    }

    pub fn set_duration_ms(&self, duration_ms: Option<u64>) {
        self.duration_ms
            .store(duration_ms.unwrap_or(UNKNOWN), Ordering::Relaxed);
    }

    pub fn played_frames(&self) -> u64 {
        self.played_frames.load(Ordering::Relaxed)
    }

    pub fn underrun_frames(&self) -> u64 {
        self.underrun_frames.load(Ordering::Relaxed)
    }

    pub fn underrun_events(&self) -> u64 {
        self.underrun_events.load(Ordering::Relaxed)
    }

    /// Elapsed playback time, once the output rate is known.
    pub fn elapsed_ms(&self) -> Option<u64> {
        let rate = self.output_rate.load(Ordering::Relaxed);
        if rate == 0 {
            return None;
        }
        Some(self.played_frames().saturating_mul(1000) / rate as u64)
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match self.duration_ms.load(Ordering::Relaxed) {
            UNKNOWN => None,
            ms => Some(ms),
        }
    }
}

/// Read-only view of the transport for rendering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransportSnapshot {
    pub session: Option<SessionId>,
    pub active_track: Option<Track>,
    pub playing: bool,
    pub paused: bool,
    pub muted: bool,
    pub looping: bool,
    /// Volume in log2 units.
    pub volume: f64,
    pub elapsed_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub underrun_events: u64,
    /// Transient message, e.g. the last failed `play`.
    pub status: Option<String>,
}

impl TransportSnapshot {
    /// Fraction of the track played, in `[0, 1]`, when the duration is known.
    pub fn progress_ratio(&self) -> Option<f64> {
        let elapsed = self.elapsed_ms?;
        let duration = self.duration_ms.filter(|&d| d > 0)?;
        Some((elapsed as f64 / duration as f64).min(1.0))
    }
}
