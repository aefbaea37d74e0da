//! The process-wide output device and its backends.
//!
//! A backend knows how to open a sink ([`OutputBackend::prepare`]) and drive it with a
//! render callback ([`PreparedOutput::start`]). [`OutputDevice`] wraps one backend and
//! enforces exclusive ownership: a session must hold a [`DeviceLease`] to open it, and at
//! most one lease exists at a time. Dropping the lease releases the device and wakes
//! anyone waiting in [`OutputDevice::wait_released`].

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::PlaybackConfig;
use crate::error::DeviceError;

mod cpal_backend;
mod null;

pub use cpal_backend::{CpalBackend, list_output_devices};
pub use null::{NullBackend, NullStats};

/// Identity of one playback session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Negotiated output stream shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

/// Fills an interleaved `f32` buffer at the output format. Runs on the device thread.
pub type RenderFn = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

pub trait OutputBackend: Send + Sync {
    /// Check that the sink can be opened at all; returns a human-readable description.
    fn probe(&self) -> Result<String, DeviceError>;

    /// Open the sink, requesting `target_rate`. The backend may settle on a nearby rate.
    fn prepare(&self, target_rate: u32) -> Result<Box<dyn PreparedOutput>, DeviceError>;
}

/// An opened but silent sink.
pub trait PreparedOutput {
    fn format(&self) -> OutputFormat;

    /// Start pulling samples through `render`.
    fn start(self: Box<Self>, render: RenderFn) -> Result<Box<dyn ActiveOutput>, DeviceError>;
}

/// A running sink. Dropping it stops the device callback; no `render` call is in flight
/// after the drop returns.
pub trait ActiveOutput {}

/// Pick the backend described by `config`.
pub fn backend_for(config: &PlaybackConfig) -> Arc<dyn OutputBackend> {
    if config.null_output {
        Arc::new(NullBackend::new())
    } else {
        Arc::new(CpalBackend::new(config.device.clone()))
    }
}

/// Shared handle to the single output device.
#[derive(Clone)]
pub struct OutputDevice {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    backend: Arc<dyn OutputBackend>,
    holder: Mutex<Option<SessionId>>,
    released: Condvar,
}

impl OutputDevice {
    pub fn new(backend: Arc<dyn OutputBackend>) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                backend,
                holder: Mutex::new(None),
                released: Condvar::new(),
            }),
        }
    }

    pub fn probe(&self) -> Result<String, DeviceError> {
        self.inner.backend.probe()
    }

    /// Take exclusive ownership for `session`. Fails with [`DeviceError::Busy`] while
    /// another lease is alive; never waits.
    pub fn acquire(&self, session: SessionId) -> Result<DeviceLease, DeviceError> {
        let mut holder = self.lock_holder();
        if let Some(current) = *holder {
            return Err(DeviceError::Busy {
                holder: current,
                requested: session,
            });
        }
        *holder = Some(session);
        tracing::debug!(session = %session, "output device acquired");
        Ok(DeviceLease {
            device: self.clone(),
            session,
        })
    }

    /// Session currently holding the device, if any.
    pub fn holder(&self) -> Option<SessionId> {
        *self.lock_holder()
    }

    /// Block until nobody holds the device or `timeout` elapses. Returns whether it is free.
    pub fn wait_released(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut holder = self.lock_holder();
        while holder.is_some() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            holder = self
                .inner
                .released
                .wait_timeout(holder, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn lock_holder(&self) -> MutexGuard<'_, Option<SessionId>> {
        self.inner
            .holder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of exclusive device ownership. Released on drop.
pub struct DeviceLease {
    device: OutputDevice,
    session: SessionId,
}

impl DeviceLease {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn prepare(&self, target_rate: u32) -> Result<Box<dyn PreparedOutput>, DeviceError> {
        self.device.inner.backend.prepare(target_rate)
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        let mut holder = self.device.lock_holder();
        if *holder == Some(self.session) {
            *holder = None;
        }
        drop(holder);
        self.device.inner.released.notify_all();
        tracing::debug!(session = %self.session, "output device released");
    }
}
