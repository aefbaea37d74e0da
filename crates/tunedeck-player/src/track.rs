//! Track identity and container format.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::decode::{FLAC, FormatDecoder, MP3, WAV};

/// Supported container formats, inferred from the file extension only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackFormat {
    Flac,
    Wav,
    Mp3,
}

impl TrackFormat {
    pub const ALL: [TrackFormat; 3] = [TrackFormat::Flac, TrackFormat::Wav, TrackFormat::Mp3];

    /// Match an extension case-insensitively; `None` for anything unsupported.
    pub fn from_extension(ext: &OsStr) -> Option<Self> {
        let ext = ext.to_str()?;
        Self::ALL
            .into_iter()
            .find(|format| ext.eq_ignore_ascii_case(format.extension()))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(Self::from_extension)
    }

    /// Canonical lowercase extension, also used as the probe hint.
    pub fn extension(self) -> &'static str {
        match self {
            TrackFormat::Flac => "flac",
            TrackFormat::Wav => "wav",
            TrackFormat::Mp3 => "mp3",
        }
    }

    /// Short label for list display.
    pub fn label(self) -> &'static str {
        match self {
            TrackFormat::Flac => "FLAC",
            TrackFormat::Wav => "WAV",
            TrackFormat::Mp3 => "MP3",
        }
    }

    /// Decoder capability for this format.
    pub fn decoder(self) -> &'static dyn FormatDecoder {
        match self {
            TrackFormat::Flac => &FLAC,
            TrackFormat::Wav => &WAV,
            TrackFormat::Mp3 => &MP3,
        }
    }
}

impl fmt::Display for TrackFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Catalog identity of a track: file name plus containing directory.
///
/// Ordered by display title first; the raw file name keeps names that only differ in
/// non-UTF-8 bytes apart.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackKey {
    pub title: String,
    pub directory: PathBuf,
    pub file_name: OsString,
}

/// A discovered playable file. `format` is fixed at scan time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    /// Display name (lossy for non-UTF-8 file names).
    pub title: String,
    pub directory: PathBuf,
    /// File name exactly as found on disk.
    pub file_name: OsString,
    pub format: TrackFormat,
}

impl Track {
    /// Build a track from a file path; `None` if the extension is unsupported
    /// or the path has no file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let format = TrackFormat::from_path(path)?;
        let file_name = path.file_name()?.to_os_string();
        let title = file_name.to_string_lossy().into_owned();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Some(Self {
            title,
            directory,
            file_name,
            format,
        })
    }

    pub fn key(&self) -> TrackKey {
        TrackKey {
            title: self.title.clone(),
            directory: self.directory.clone(),
            file_name: self.file_name.clone(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}
