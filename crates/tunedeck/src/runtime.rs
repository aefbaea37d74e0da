//! Startup: device listing, catalog scan, output probe, then the UI.
//!
//! Anything that fails here is fatal and surfaces as the process error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::unbounded;
use tunedeck_player::output::{backend_for, list_output_devices};
use tunedeck_player::{Catalog, OutputDevice, PlaybackConfig, TransportController, scan_directory};

use crate::cli::Args;
use crate::{logging, ui};

pub fn run(args: Args) -> Result<()> {
    if args.list_devices {
        logging::init_stderr();
        return list_devices();
    }

    let config = args.playback_config();
    let root = resolve_root(args.root)?;

    let (log_tx, log_rx) = unbounded();
    logging::init_ui(log_tx);

    let catalog = load_catalog(&root)?;
    let controller = open_player(config)?;
    ui::run_tui(catalog, controller, log_rx)
}

/// Print output device names to stdout.
pub fn list_devices() -> Result<()> {
    let names = list_output_devices().context("enumerate output devices")?;
    if names.is_empty() {
        println!("no output devices");
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// The explicit root, or the user's home directory.
pub fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    match root {
        Some(root) => Ok(root),
        None => dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory")),
    }
}

pub fn load_catalog(root: &Path) -> Result<Catalog> {
    let catalog = scan_directory(root)?;
    tracing::info!(root = %root.display(), tracks = catalog.len(), "catalog ready");
    Ok(catalog)
}

/// Probe the configured output and hand it to a fresh controller.
pub fn open_player(config: PlaybackConfig) -> Result<TransportController> {
    let device = OutputDevice::new(backend_for(&config));
    let description = device.probe().context("output device unavailable")?;
    tracing::info!(device = %description, "output device");
    Ok(TransportController::new(device, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_root_wins() {
        let root = resolve_root(Some(PathBuf::from("/srv/music"))).unwrap();
        assert_eq!(root, PathBuf::from("/srv/music"));
    }

    #[test]
    fn missing_root_is_fatal_and_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = load_catalog(&missing).unwrap_err();
        assert!(format!("{err:#}").contains("nope"), "{err:#}");
    }

    #[test]
    fn empty_root_gives_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = load_catalog(dir.path()).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn null_output_player_starts_idle() {
        let config = PlaybackConfig {
            null_output: true,
            ..PlaybackConfig::default()
        };
        let controller = open_player(config).unwrap();
        assert!(controller.active_session().is_none());
        assert!(controller.device().holder().is_none());
    }
}
