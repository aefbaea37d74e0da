//! CPAL output stream construction.
//!
//! The stream callback hands the device buffer to a [`RenderFn`] that produces interleaved
//! `f32` at the device channel count, then converts to the device sample format when the
//! device does not take `f32` directly.

use cpal::traits::DeviceTrait;

use crate::error::DeviceError;
use crate::output::RenderFn;

/// Build (but do not start) an output stream driven by `render`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    render: RenderFn,
) -> Result<cpal::Stream, DeviceError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_f32_stream(device, config, render),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, render),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, render),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, render),
        other => Err(DeviceError::Config(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

fn build_f32_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut render: RenderFn,
) -> Result<cpal::Stream, DeviceError> {
    let err_fn = |err| tracing::warn!("stream error: {err}");
    device
        .build_output_stream(config, move |data: &mut [f32], _| render(data), err_fn, None)
        .map_err(|e| DeviceError::Stream(e.to_string()))
}

/// Render into an `f32` scratch buffer, then convert sample-by-sample.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut render: RenderFn,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    let err_fn = |err| tracing::warn!("stream error: {err}");

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                if scratch.len() != data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                render(&mut scratch);
                for (dst, src) in data.iter_mut().zip(&scratch) {
                    *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))
}
