//! Playback core for tunedeck: catalog scanning, per-format decoding, the per-session
//! decode → gain → resample pipeline, exclusive output device ownership, and the transport
//! controller that ties them together.

pub mod catalog;
pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod gain;
pub mod output;
pub mod pipeline;
pub mod playback;
pub mod queue;
pub mod resample;
pub mod session;
pub mod status;
pub mod track;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::{Catalog, scan_directory};
pub use config::PlaybackConfig;
pub use error::{CatalogError, DecodeError, DeviceError, PlayError, ResampleError};
pub use output::{OutputDevice, SessionId};
pub use session::{EndReason, SessionEvent};
pub use status::TransportSnapshot;
pub use track::{Track, TrackFormat, TrackKey};
pub use transport::{TransportController, TransportState};
