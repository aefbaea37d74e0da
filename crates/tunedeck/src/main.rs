//! `tunedeck`: index a music directory and play it from the terminal.
//!
//! Startup scans the root (default: home directory) for FLAC, WAV and MP3 files, probes the
//! output device, then hands control to the terminal UI. A missing root or an unusable
//! output device ends the process with a non-zero status.

mod cli;
mod logging;
mod runtime;
mod ui;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    runtime::run(args)
}
