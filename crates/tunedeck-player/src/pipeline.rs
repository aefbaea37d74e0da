//! Render chain: the per-session stage the output device pulls samples through.
//!
//! Stage order is fixed: pause gate → gain → resample → channel mapping. The chain sits
//! behind one mutex shared by the device callback and the session control loop, so pause,
//! mute, and volume changes never interleave with a render call.
//!
//! Decoded samples arrive at the native rate through a [`SharedAudio`] queue filled by the
//! session's decode pump. On underrun the chain emits silence and counts it. When the queue
//! is closed and empty the chain signals completion once on its done channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::Sender;

use crate::config::PlaybackConfig;
use crate::decode::StreamSpec;
use crate::error::ResampleError;
use crate::gain::Gain;
use crate::output::OutputFormat;
use crate::queue::{PopStrategy, SharedAudio};
use crate::resample::StreamResampler;
use crate::status::SessionProgress;

enum Refill {
    Data,
    Empty,
    Drained,
}

pub struct RenderChain {
    source: Arc<SharedAudio>,
    src_channels: usize,
    out_channels: usize,
    chunk_frames: usize,
    gain: Gain,
    paused: bool,
    resampler: Option<StreamResampler>,
    /// Output-rate samples at the source channel count, consumed from `pos`.
    pending: Vec<f32>,
    pos: usize,
    drained: bool,
    progress: Arc<SessionProgress>,
    done_tx: Sender<()>,
}

impl RenderChain {
    pub fn new(
        source: Arc<SharedAudio>,
        native: StreamSpec,
        output: OutputFormat,
        config: &PlaybackConfig,
        gain: Gain,
        progress: Arc<SessionProgress>,
        done_tx: Sender<()>,
    ) -> Result<Self, ResampleError> {
        let chunk_frames = config.chunk_frames.max(1);
        let resampler = if native.sample_rate == output.sample_rate {
            tracing::info!(rate_hz = output.sample_rate, "resample skipped");
            None
        } else {
            tracing::info!(
                from_hz = native.sample_rate,
                to_hz = output.sample_rate,
                quality = config.quality.level(),
                "resampling"
            );
            Some(StreamResampler::new(
                native.sample_rate,
                output.sample_rate,
                native.channels,
                chunk_frames,
                config.quality,
            )?)
        };

        Ok(Self {
            src_channels: source.channels(),
            source,
            out_channels: output.channels.max(1),
            chunk_frames,
            gain,
            paused: false,
            resampler,
            pending: Vec::new(),
            pos: 0,
            drained: false,
            progress,
            done_tx,
        })
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.gain.set_muted(muted);
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.gain.set_volume(volume);
    }

    /// All decoded audio has been rendered.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    /// Fill `out` (interleaved, output channel count) with the next samples.
    pub fn render(&mut self, out: &mut [f32]) {
        if self.paused || self.drained {
            out.fill(0.0);
            return;
        }

        let frames = out.len() / self.out_channels;
        let mut filled = 0usize;

        while filled < frames {
            if self.pos >= self.pending.len() {
                match self.refill() {
                    Refill::Data => {}
                    Refill::Empty => {
                        self.progress.add_underrun((frames - filled) as u64);
                        break;
                    }
                    Refill::Drained => {
                        self.finish();
                        break;
                    }
                }
            }

            let end = (self.pos + self.src_channels).min(self.pending.len());
            let frame = &self.pending[self.pos..end];
            let dst = &mut out[filled * self.out_channels..(filled + 1) * self.out_channels];
            for (ch, sample) in dst.iter_mut().enumerate() {
                *sample = map_channel(frame, self.out_channels, ch);
            }
            self.pos += self.src_channels;
            filled += 1;
        }

        out[filled * self.out_channels..].fill(0.0);
        self.progress.add_played(filled as u64);
    }

    fn refill(&mut self) -> Refill {
        loop {
            let strategy = if self.resampler.is_some() {
                PopStrategy::NonBlockingExact {
                    frames: self.chunk_frames,
                }
            } else {
                PopStrategy::NonBlocking {
                    max_frames: self.chunk_frames,
                }
            };
            let Some(mut input) = self.source.pop(strategy) else {
                return if self.source.is_drained() {
                    Refill::Drained
                } else {
                    Refill::Empty
                };
            };

            self.gain.apply(&mut input);
            self.pos = 0;

            let Some(resampler) = self.resampler.as_mut() else {
                self.pending = input;
                return Refill::Data;
            };
            match resampler.process(&input) {
                Ok([]) => continue,
                Ok(resampled) => {
                    self.pending.clear();
                    self.pending.extend_from_slice(resampled);
                    return Refill::Data;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "resampler failed; ending stream");
                    self.source.close();
                    self.pending.clear();
                    return Refill::Drained;
                }
            }
        }
    }

    fn finish(&mut self) {
        self.drained = true;
        self.pending.clear();
        self.pos = 0;
        let _ = self.done_tx.try_send(());
    }
}

/// Lock the chain, recovering from a poisoned mutex.
pub(crate) fn lock_chain(chain: &Mutex<RenderChain>) -> MutexGuard<'_, RenderChain> {
    chain.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Output sample for `dst_ch` from one source frame.
///
/// - mono → any: duplicate channel 0
/// - stereo → mono: average L/R
/// - otherwise: same channel, clamped to what the source has
fn map_channel(frame: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    let get = |ch: usize| frame.get(ch).copied().unwrap_or(0.0);
    match (frame.len(), dst_channels) {
        (0, _) => 0.0,
        (1, _) => get(0),
        (2, 1) => 0.5 * (get(0) + get(1)),
        (n, _) => get(dst_ch.min(n - 1)),
    }
}
