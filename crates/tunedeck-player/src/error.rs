//! Error types for catalog scanning, decoding, output, and playback sessions.
//!
//! Only [`CatalogError`] is fatal to the caller (at startup). Everything reachable from
//! `Play` is recoverable and aborts at most the session being started.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::output::SessionId;
use crate::track::TrackFormat;

/// Failure to build a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The root directory is missing, not a directory, or unreadable.
    #[error("music directory {} not found or unreadable: {source}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure to open or decode a track's content.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unrecognized {format} content: {source}")]
    Probe {
        format: TrackFormat,
        #[source]
        source: symphonia::core::errors::Error,
    },
    #[error("no audio track in {format} file")]
    NoAudioTrack { format: TrackFormat },
    #[error("{format} stream does not declare its {parameter}")]
    MissingParameter {
        format: TrackFormat,
        parameter: &'static str,
    },
    #[error("expected {expected} content, found {found}")]
    FormatMismatch {
        expected: TrackFormat,
        found: String,
    },
    #[error("cannot create {format} decoder: {source}")]
    Codec {
        format: TrackFormat,
        #[source]
        source: symphonia::core::errors::Error,
    },
}

/// Failure to acquire or drive the output device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no output device: {0}")]
    NoDevice(String),
    #[error("output device is held by session {holder} (requested by {requested})")]
    Busy {
        holder: SessionId,
        requested: SessionId,
    },
    #[error("output config: {0}")]
    Config(String),
    #[error("output stream: {0}")]
    Stream(String),
}

/// Failure to construct or run the resampler stage.
#[derive(Debug, Error)]
#[error("resampler: {0}")]
pub struct ResampleError(pub String);

/// Failure to start a playback session.
#[derive(Debug, Error)]
pub enum PlayError {
    #[error("cannot play {track}: {source}")]
    Decode {
        track: String,
        #[source]
        source: DecodeError,
    },
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error("session setup: {0}")]
    Setup(String),
}
