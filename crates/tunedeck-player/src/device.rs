//! CPAL output device discovery and configuration.
//!
//! - selecting the default device or one by case-insensitive substring match
//! - choosing a stream config nearest the requested output rate
//! - sizing the device buffer

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::DeviceError;

/// Largest fixed buffer we ask for, in frames.
const MAX_BUFFER_FRAMES: u32 = 16_384;

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device, DeviceError> {
    if let Some(needle) = needle {
        let mut devices = host
            .output_devices()
            .map_err(|e| DeviceError::NoDevice(e.to_string()))?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| DeviceError::NoDevice(format!("no output device matched {needle:?}")));
    }

    host.default_output_device()
        .ok_or_else(|| DeviceError::NoDevice("no default output device".to_string()))
}

/// Human-readable device name, falling back to a placeholder.
pub fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.to_string())
        .unwrap_or_else(|_| "<unnamed device>".to_string())
}

/// Choose the supported config closest to `target_rate`.
///
/// Prefers an exact match; otherwise the highest rate below the target, then the lowest
/// rate above it. Ties are broken by sample format (float first).
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig, DeviceError> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(|e| DeviceError::Config(e.to_string()))?
        .collect();

    let mut best: Option<(bool, u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let below = rate <= target_rate;
        let format_rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_below, b_rate, b_rank, _)) => is_better_candidate(
                below,
                rate,
                format_rank,
                *b_below,
                *b_rate,
                *b_rank,
            ),
        };
        if replace {
            best = Some((below, rate, format_rank, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, _, _, cfg)| cfg)
        .ok_or_else(|| DeviceError::Config("no supported output configs".to_string()))
}

/// Fixed buffer of roughly 1/5 second, clamped to what the device supports.
///
/// Returns `None` when the device does not report a range, leaving the default in place.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => Some(cpal::BufferSize::Fixed(
            buffer_frames_for(config.sample_rate(), *min, *max),
        )),
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Names of all output devices on `host`.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<String>, DeviceError> {
    let devices = host
        .output_devices()
        .map_err(|e| DeviceError::NoDevice(e.to_string()))?;
    Ok(devices.map(|d| device_name(&d)).collect())
}

fn buffer_frames_for(rate: u32, min: u32, max: u32) -> u32 {
    let upper = max.min(MAX_BUFFER_FRAMES).max(min);
    (rate / 5).clamp(min, upper)
}

fn pick_rate_for_range(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn is_better_candidate(
    below: bool,
    rate: u32,
    format_rank: u8,
    best_below: bool,
    best_rate: u32,
    best_rank: u8,
) -> bool {
    if below != best_below {
        below
    } else if rate != best_rate {
        if below { rate > best_rate } else { rate < best_rate }
    } else {
        format_rank < best_rank
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
