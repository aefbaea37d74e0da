//! Ratatui UI loop.
//!
//! Keys:
//! - Up/Down (j/k), PgUp/PgDn, Home/End: move selection
//! - Enter: play selected
//! - u / Space: pause/resume
//! - m: mute, r/e: volume up/down, n: loop, s: stop
//! - /: filter by title (Enter keeps it, Esc clears it)
//! - R: rescan the music directory
//! - T / S: hide or show the now-playing panel / status line
//! - H: help
//! - q: quit

mod app;
mod render;

pub(crate) use app::run_tui;
