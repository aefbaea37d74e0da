//! Sound-card output through CPAL.

use cpal::traits::StreamTrait;

use super::{ActiveOutput, OutputBackend, OutputFormat, PreparedOutput, RenderFn};
use crate::device::{device_name, list_devices, pick_buffer_size, pick_device, pick_output_config};
use crate::error::DeviceError;
use crate::playback::build_output_stream;

/// Host default output device, or the first one whose name contains `needle`.
///
/// The device is looked up again on every `prepare`, so a device that disappears and comes
/// back is picked up by the next session.
pub struct CpalBackend {
    needle: Option<String>,
}

impl CpalBackend {
    pub fn new(needle: Option<String>) -> Self {
        Self { needle }
    }
}

impl OutputBackend for CpalBackend {
    fn probe(&self) -> Result<String, DeviceError> {
        let host = cpal::default_host();
        let device = pick_device(&host, self.needle.as_deref())?;
        let config = pick_output_config(&device, 48_000)?;
        Ok(format!(
            "{} ({} Hz, {} ch, {:?})",
            device_name(&device),
            config.sample_rate(),
            config.channels(),
            config.sample_format()
        ))
    }

    fn prepare(&self, target_rate: u32) -> Result<Box<dyn PreparedOutput>, DeviceError> {
        let host = cpal::default_host();
        let device = pick_device(&host, self.needle.as_deref())?;
        let supported = pick_output_config(&device, target_rate)?;
        let mut config: cpal::StreamConfig = supported.config();
        if let Some(buffer_size) = pick_buffer_size(&supported) {
            config.buffer_size = buffer_size;
        }
        if config.sample_rate != target_rate {
            tracing::info!(
                requested_hz = target_rate,
                device_hz = config.sample_rate,
                "output rate not supported; using nearest"
            );
        }
        tracing::debug!(
            device = %device_name(&device),
            rate_hz = config.sample_rate,
            channels = config.channels,
            format = ?supported.sample_format(),
            buffer = ?config.buffer_size,
            "output prepared"
        );
        Ok(Box::new(CpalPrepared {
            device,
            sample_format: supported.sample_format(),
            config,
        }))
    }
}

struct CpalPrepared {
    device: cpal::Device,
    sample_format: cpal::SampleFormat,
    config: cpal::StreamConfig,
}

impl PreparedOutput for CpalPrepared {
    fn format(&self) -> OutputFormat {
        OutputFormat {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels as usize,
        }
    }

    fn start(self: Box<Self>, render: RenderFn) -> Result<Box<dyn ActiveOutput>, DeviceError> {
        let stream = build_output_stream(&self.device, &self.config, self.sample_format, render)?;
        stream
            .play()
            .map_err(|e| DeviceError::Stream(e.to_string()))?;
        Ok(Box::new(CpalActive { _stream: stream }))
    }
}

/// Holds the stream; CPAL stops it on drop.
struct CpalActive {
    _stream: cpal::Stream,
}

impl ActiveOutput for CpalActive {}

/// Output device names on the default host.
pub fn list_output_devices() -> Result<Vec<String>, DeviceError> {
    list_devices(&cpal::default_host())
}
