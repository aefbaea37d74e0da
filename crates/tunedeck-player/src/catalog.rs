//! Catalog builder.
//!
//! Walks a root directory recursively and indexes every regular file whose extension is
//! one of the supported formats. Other files are skipped silently; they are never errors.
//!
//! ## Dedup policy
//! Tracks are keyed by `(title, directory)`. When two discovered files map to the same
//! key, the later one replaces the earlier one ([`Catalog::insert`] is the only place this
//! happens). The replaced entry is logged at debug level.
//!
//! ## Limitations
//! Symlinks are not followed, so symlinked directories are not indexed and there is no
//! cycle detection to worry about.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::CatalogError;
use crate::track::{Track, TrackKey};

/// Index of playable tracks under a root directory. Immutable until rescanned.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    root: PathBuf,
    tracks: BTreeMap<TrackKey, Track>,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tracks: BTreeMap::new(),
        }
    }

    /// Directory this catalog was built from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Insert a track, replacing any existing track with the same key.
    ///
    /// Returns the replaced track, if any.
    pub fn insert(&mut self, track: Track) -> Option<Track> {
        self.tracks.insert(track.key(), track)
    }

    pub fn get(&self, key: &TrackKey) -> Option<&Track> {
        self.tracks.get(key)
    }

    /// Tracks ordered by title, then directory.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// Ordered `(title, format label)` pairs for display.
    pub fn listing(&self) -> Vec<(&str, &'static str)> {
        self.tracks
            .values()
            .map(|t| (t.title.as_str(), t.format.label()))
            .collect()
    }

    /// Tracks whose title contains `query` (case-insensitive), in catalog order.
    ///
    /// An empty or whitespace-only query matches everything.
    pub fn filter(&self, query: &str) -> Vec<&Track> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.tracks.values().collect();
        }
        self.tracks
            .values()
            .filter(|t| t.title.to_lowercase().contains(&needle))
            .collect()
    }
}

/// Scan `root` recursively and build a fresh catalog.
///
/// A missing, unreadable, or non-directory root is a [`CatalogError::NotFound`].
/// Unreadable entries below the root are skipped with a warning.
pub fn scan_directory(root: &Path) -> Result<Catalog, CatalogError> {
    let not_found = |source: io::Error| CatalogError::NotFound {
        path: root.to_path_buf(),
        source,
    };

    let meta = fs::metadata(root).map_err(not_found)?;
    if !meta.is_dir() {
        return Err(not_found(io::Error::other("not a directory")));
    }
    fs::read_dir(root).map_err(not_found)?;

    let mut catalog = Catalog::new(root);
    let mut skipped = 0usize;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(track) = Track::from_path(entry.path()) else {
            skipped += 1;
            tracing::trace!(path = %entry.path().display(), "unsupported extension");
            continue;
        };

        if let Some(previous) = catalog.insert(track) {
            tracing::debug!(
                title = %previous.title,
                directory = %previous.directory.display(),
                "duplicate track key; keeping the later file"
            );
        }
    }

    tracing::info!(
        root = %root.display(),
        tracks = catalog.len(),
        skipped,
        "catalog scan complete"
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackFormat;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn scan_keeps_only_supported_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.flac"));
        touch(&dir.path().join("b.mp3"));
        touch(&dir.path().join("c.txt"));

        let catalog = scan_directory(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.listing(), vec![("a.flac", "FLAC"), ("b.mp3", "MP3")]);
        assert!(catalog.tracks().all(|t| t.title != "c.txt"));
    }

    #[test]
    fn scan_recurses_and_matches_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("x/y/Deep.WAV"));
        touch(&dir.path().join("x/Loud.Mp3"));
        touch(&dir.path().join("x/y/cover.jpg"));
        touch(&dir.path().join("noext"));

        let catalog = scan_directory(dir.path()).unwrap();
        let formats: Vec<_> = catalog.tracks().map(|t| (t.title.clone(), t.format)).collect();
        assert_eq!(
            formats,
            vec![
                ("Deep.WAV".to_string(), TrackFormat::Wav),
                ("Loud.Mp3".to_string(), TrackFormat::Mp3),
            ]
        );
        let deep = catalog.tracks().next().unwrap();
        assert_eq!(deep.directory, dir.path().join("x/y"));
    }

    #[test]
    fn scan_does_not_index_directories_with_audio_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("album.flac")).unwrap();
        touch(&dir.path().join("album.flac/track.flac"));

        let catalog = scan_directory(dir.path()).unwrap();
        assert_eq!(catalog.listing(), vec![("track.flac", "FLAC")]);
    }

    #[test]
    fn same_title_in_different_directories_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("one/song.mp3"));
        touch(&dir.path().join("two/song.mp3"));

        let catalog = scan_directory(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn names_differing_only_in_non_utf8_bytes_are_distinct() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join(OsStr::from_bytes(b"a\xe9.mp3"));
        let b = dir.path().join(OsStr::from_bytes(b"a\xe8.mp3"));
        touch(&a);
        touch(&b);

        let catalog = scan_directory(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        let mut paths: Vec<_> = catalog.tracks().map(Track::path).collect();
        paths.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(paths, expected);
        assert!(catalog.tracks().all(|t| t.title == "a\u{fffd}.mp3"));
    }

    #[test]
    fn missing_root_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = scan_directory(&missing).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn file_root_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.flac");
        touch(&file);
        assert!(matches!(
            scan_directory(&file),
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[test]
    fn insert_replaces_same_key_last_write_wins() {
        let mut catalog = Catalog::new("/music");
        let first = Track {
            title: "song".to_string(),
            directory: PathBuf::from("/music"),
            file_name: "song".into(),
            format: TrackFormat::Flac,
        };
        let second = Track {
            format: TrackFormat::Mp3,
            ..first.clone()
        };

        assert!(catalog.insert(first.clone()).is_none());
        assert_eq!(catalog.insert(second.clone()), Some(first));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(&second.key()), Some(&second));
    }

    #[test]
    fn filter_is_case_insensitive_and_empty_matches_all() {
        let mut catalog = Catalog::new("/m");
        for name in ["Blue.flac", "red.mp3", "BLUEST.wav"] {
            catalog.insert(Track::from_path(&Path::new("/m").join(name)).unwrap());
        }
        let hits: Vec<_> = catalog.filter("blue").iter().map(|t| t.title.as_str()).collect();
        assert_eq!(hits, vec!["BLUEST.wav", "Blue.flac"]);
        assert_eq!(catalog.filter("  ").len(), 3);
    }
}
