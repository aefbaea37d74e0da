//! Bounded queue of interleaved audio samples between the decode pump and the render chain.
//!
//! One producer (the session's decode pump) blocks when the queue is full. One consumer
//! (the output callback) never blocks. Shutdown is deterministic: [`SharedAudio::close`]
//! wakes a blocked producer, and the consumer sees [`SharedAudio::is_drained`] once the
//! remaining samples are gone.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Thread-safe bounded queue for interleaved `f32` audio samples.
///
/// Samples are stored interleaved (`frame0[ch0], frame0[ch1], frame1[ch0], ...`) and the
/// channel count is fixed for the lifetime of the queue. The `done` flag lives under the
/// same mutex as the samples so close and drain checks never race.
pub struct SharedAudio {
    channels: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
    max_buffered_samples: usize,
    created: Instant,
    low_watermark_ms: AtomicU64,
}

struct SharedInner {
    queue: VecDeque<f32>,
    done: bool,
}

/// Strategy for popping interleaved frames from the queue. Neither variant blocks.
#[derive(Clone, Copy, Debug)]
pub enum PopStrategy {
    /// Up to `max_frames`, or `None` if currently empty.
    NonBlocking { max_frames: usize },
    /// Exactly `frames`, or `None` if fewer are buffered. Once the queue is closed the
    /// remaining tail is returned even if it is shorter.
    NonBlockingExact { frames: usize },
}

/// Queue capacity in samples for `(rate, channels, seconds)`.
///
/// Non-finite or non-positive `buffer_seconds` falls back to 2 seconds.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels).max(channels)
}

impl SharedAudio {
    /// `max_buffered_samples` is a cap in samples, not frames; see [`calc_max_buffered_samples`].
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(SharedInner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
            created: Instant::now(),
            low_watermark_ms: AtomicU64::new(0),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Current buffered frames. Best effort; may change right after the call.
    pub fn len_frames(&self) -> usize {
        self.lock().queue.len() / self.channels
    }

    /// Whether the producer (or a stopping session) has closed the queue.
    pub fn is_closed(&self) -> bool {
        self.lock().done
    }

    /// Closed and empty: nothing more will ever come out.
    pub fn is_drained(&self) -> bool {
        let g = self.lock();
        g.done && g.queue.is_empty()
    }

    /// Mark the queue as finished and wake all waiters. Idempotent.
    pub fn close(&self) {
        self.lock().done = true;
        self.cv.notify_all();
    }

    /// Push interleaved samples, blocking while the queue is full.
    ///
    /// Returns `false` if the queue was closed before every sample was accepted; the
    /// remainder is dropped.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.lock();
            while g.queue.len() >= self.max_buffered_samples && !g.done {
                g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
            }
            if g.done {
                return false;
            }

            let room = self.max_buffered_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(&samples[offset..offset + take]);
            offset += take;

            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Pop interleaved frames using the requested strategy.
    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let available_frames = g.queue.len() / self.channels;

        let take_frames = match strategy {
            PopStrategy::NonBlocking { max_frames } => available_frames.min(max_frames),
            PopStrategy::NonBlockingExact { frames } => {
                if available_frames >= frames {
                    frames
                } else if g.done {
                    available_frames
                } else {
                    0
                }
            }
        };
        if take_frames == 0 {
            return None;
        }

        let out: Vec<f32> = g.queue.drain(..take_frames * self.channels).collect();
        let remaining = g.queue.len();
        let done = g.done;
        drop(g);

        self.cv.notify_all();
        if !done {
            self.log_low_watermark(remaining);
        }
        Some(out)
    }

    fn log_low_watermark(&self, queued: usize) {
        let threshold = (self.max_buffered_samples / 8).max(self.channels * 16);
        if queued == 0 || queued >= threshold {
            return;
        }
        let now = self.created.elapsed().as_millis() as u64;
        let last = self.low_watermark_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) > 1000 {
            self.low_watermark_ms.store(now, Ordering::Relaxed);
            tracing::debug!(
                queued_samples = queued,
                threshold_samples = threshold,
                "audio queue low watermark"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
