//! Sample-rate conversion for the render chain.
//!
//! Wraps Rubato's asynchronous sinc resampler in a synchronous, chunk-at-a-time stage.
//! It runs inside the output callback, after the gain stage, so volume changes reach the
//! device within one chunk instead of one queue's worth of audio.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::error::ResampleError;

/// Resampler quality level, 1 (cheapest) to 4 (best).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResampleQuality(u8);

impl ResampleQuality {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    /// Out-of-range levels are clamped.
    pub fn new(level: u8) -> Self {
        Self(level.clamp(Self::MIN, Self::MAX))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    fn sinc_params(self) -> SincInterpolationParameters {
        let (sinc_len, oversampling_factor, interpolation) = match self.0 {
            1 => (32, 64, SincInterpolationType::Linear),
            2 => (64, 128, SincInterpolationType::Linear),
            3 => (128, 256, SincInterpolationType::Cubic),
            _ => (256, 256, SincInterpolationType::Cubic),
        };
        let window = WindowFunction::BlackmanHarris2;
        SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation,
            oversampling_factor,
            window,
        }
    }
}

impl Default for ResampleQuality {
    fn default() -> Self {
        Self(3)
    }
}

/// Fixed-input-size streaming resampler over interleaved `f32` frames.
pub struct StreamResampler {
    inner: Box<dyn Resampler<f32> + Send>,
    channels: usize,
    chunk_frames: usize,
    out: Vec<f32>,
    indexing: Indexing,
}

impl StreamResampler {
    pub fn new(
        from_hz: u32,
        to_hz: u32,
        channels: usize,
        chunk_frames: usize,
        quality: ResampleQuality,
    ) -> Result<Self, ResampleError> {
        if from_hz == 0 || to_hz == 0 || channels == 0 {
            return Err(ResampleError(format!(
                "invalid stream: {from_hz} Hz -> {to_hz} Hz, {channels} channels"
            )));
        }
        let chunk_frames = chunk_frames.max(1);
        let f_ratio = to_hz as f64 / from_hz as f64;

        let inner = Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &quality.sinc_params(),
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| ResampleError(e.to_string()))?;

        let out_capacity_frames = (chunk_frames as f64 * f_ratio * 1.1).ceil() as usize + 256;

        Ok(Self {
            inner: Box::new(inner),
            channels,
            chunk_frames,
            out: vec![0.0; out_capacity_frames * channels],
            indexing: Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            },
        })
    }

    /// Resample one chunk of interleaved input. Inputs shorter than
    /// the configured chunk size are treated as a partial final chunk.
    ///
    /// The returned slice borrows an internal buffer and is valid until the next call.
    pub fn process(&mut self, input: &[f32]) -> Result<&[f32], ResampleError> {
        let in_frames = (input.len() / self.channels).min(self.chunk_frames);
        if in_frames == 0 {
            return Ok(&[]);
        }
        let input = &input[..in_frames * self.channels];

        let input_adapter = InterleavedSlice::new(input, self.channels, in_frames)
            .map_err(|e| ResampleError(format!("input buffer: {e}")))?;
        let out_capacity_frames = self.out.len() / self.channels;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut self.out, self.channels, out_capacity_frames)
                .map_err(|e| ResampleError(format!("output buffer: {e}")))?;

        self.indexing.input_offset = 0;
        self.indexing.output_offset = 0;
        self.indexing.partial_len = (in_frames < self.chunk_frames).then_some(in_frames);

        let (_nbr_in, nbr_out) = self
            .inner
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&self.indexing))
            .map_err(|e| ResampleError(e.to_string()))?;

        Ok(&self.out[..nbr_out * self.channels])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, channels: usize, rate: u32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let v = (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin() * 0.5;
                std::iter::repeat_n(v, channels)
            })
            .collect()
    }

    #[test]
    fn quality_levels_are_clamped() {
        assert_eq!(ResampleQuality::new(0).level(), 1);
        assert_eq!(ResampleQuality::new(9).level(), 4);
        assert_eq!(ResampleQuality::default().level(), 3);
    }

    #[test]
    fn rejects_zero_rates() {
        assert!(StreamResampler::new(0, 48_000, 2, 1024, ResampleQuality::default()).is_err());
        assert!(StreamResampler::new(44_100, 48_000, 0, 1024, ResampleQuality::default()).is_err());
    }

    #[test]
    fn output_length_tracks_rate_ratio() {
        let chunk = 1024;
        let mut r =
            StreamResampler::new(44_100, 48_000, 2, chunk, ResampleQuality::default()).unwrap();
        let input = sine(chunk * 20, 2, 44_100);

        let mut out_frames = 0usize;
        for block in input.chunks(chunk * 2) {
            out_frames += r.process(block).unwrap().len() / 2;
        }

        let expected = (chunk * 20) as f64 * 48_000.0 / 44_100.0;
        let diff = (out_frames as f64 - expected).abs();
        assert!(diff < expected * 0.02, "got {out_frames}, expected ~{expected}");
    }

    #[test]
    fn partial_final_chunk_is_accepted() {
        let mut r =
            StreamResampler::new(48_000, 44_100, 1, 512, ResampleQuality::new(1)).unwrap();
        for block in sine(512 * 4, 1, 48_000).chunks(512) {
            r.process(block).unwrap();
        }
        let tail = sine(100, 1, 48_000);
        assert!(r.process(&tail).is_ok());
        assert!(r.process(&[]).unwrap().is_empty());
    }
}
