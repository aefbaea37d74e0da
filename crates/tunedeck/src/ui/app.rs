use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend, widgets::ListState};
use tunedeck_player::{Catalog, Track, TransportController, scan_directory};

use super::render;

const LOG_CAP: usize = 500;

pub(crate) fn run_tui(
    catalog: Catalog,
    controller: TransportController,
    log_rx: Receiver<String>,
) -> Result<()> {
    let mut app = App::new(catalog, controller, log_rx);

    let mut term = init_terminal()?;
    let result = ui_loop(&mut term, &mut app);
    restore_terminal(&mut term)?;

    app.controller.stop();
    result
}

/// In-memory UI state for rendering + interaction.
pub(crate) struct App {
    pub(crate) catalog: Catalog,
    /// Tracks matching the current filter, in catalog order.
    pub(crate) visible: Vec<Track>,
    pub(crate) list_state: ListState,
    pub(crate) list_view_height: usize,
    pub(crate) filter: String,
    pub(crate) filter_mode: bool,
    pub(crate) help_open: bool,
    /// Now-playing panel and progress gauge.
    pub(crate) show_header: bool,
    pub(crate) show_status: bool,
    pub(crate) logs: VecDeque<String>,
    /// UI-local status line; the controller's own status takes precedence.
    pub(crate) status: String,
    pub(crate) controller: TransportController,
    log_rx: Receiver<String>,
}

impl App {
    pub(crate) fn new(
        catalog: Catalog,
        controller: TransportController,
        log_rx: Receiver<String>,
    ) -> Self {
        let status = format!("{} tracks in {}", catalog.len(), catalog.root().display());
        let mut app = Self {
            catalog,
            visible: Vec::new(),
            list_state: ListState::default(),
            list_view_height: 0,
            filter: String::new(),
            filter_mode: false,
            help_open: false,
            show_header: true,
            show_status: true,
            logs: VecDeque::new(),
            status,
            controller,
            log_rx,
        };
        app.apply_filter();
        app
    }

    pub(crate) fn selected_index(&self) -> Option<usize> {
        self.list_state.selected()
    }

    pub(crate) fn selected_track(&self) -> Option<&Track> {
        self.selected_index().and_then(|i| self.visible.get(i))
    }

    fn select_index(&mut self, idx: usize) {
        if self.visible.is_empty() {
            self.list_state.select(None);
        } else {
            self.list_state.select(Some(idx.min(self.visible.len() - 1)));
        }
    }

    fn select_next(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        let i = self.selected_index().unwrap_or(0);
        self.select_index(i + 1);
    }

    fn select_prev(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        let i = self.selected_index().unwrap_or(0);
        self.select_index(i.saturating_sub(1));
    }

    fn select_first(&mut self) {
        self.select_index(0);
    }

    fn select_last(&mut self) {
        self.select_index(self.visible.len().saturating_sub(1));
    }

    fn page_step(&self) -> usize {
        self.list_view_height.max(1)
    }

    fn page_down(&mut self) {
        let i = self.selected_index().unwrap_or(0);
        self.select_index(i + self.page_step());
    }

    fn page_up(&mut self) {
        let i = self.selected_index().unwrap_or(0);
        self.select_index(i.saturating_sub(self.page_step()));
    }

    /// Rebuild `visible` from the filter, keeping the selected track selected if it is
    /// still listed.
    fn apply_filter(&mut self) {
        let previous = self.selected_track().map(Track::key);
        self.visible = self
            .catalog
            .filter(&self.filter)
            .into_iter()
            .cloned()
            .collect();
        let idx = previous
            .and_then(|key| self.visible.iter().position(|t| t.key() == key))
            .unwrap_or(0);
        self.select_index(idx);
    }

    fn push_filter_char(&mut self, c: char) {
        self.filter.push(c);
        self.apply_filter();
    }

    fn pop_filter_char(&mut self) {
        self.filter.pop();
        self.apply_filter();
    }

    fn clear_filter(&mut self) {
        self.filter.clear();
        self.filter_mode = false;
        self.apply_filter();
    }

    fn play_selected(&mut self) {
        let Some(track) = self.selected_track().cloned() else {
            return;
        };
        // A failure is recorded in the controller's status line.
        if self.controller.play(&track).is_ok() {
            self.status = format!("Playing {}", track.title);
        }
    }

    fn stop(&mut self) {
        self.controller.stop();
        self.status = "Stopped".into();
    }

    fn toggle_loop(&mut self) {
        let looping = self.controller.toggle_loop();
        self.status = if looping { "Loop on" } else { "Loop off" }.into();
    }

    fn rescan(&mut self) {
        let root = self.catalog.root().to_path_buf();
        match scan_directory(&root) {
            Ok(catalog) => {
                tracing::info!(root = %root.display(), tracks = catalog.len(), "rescanned");
                self.catalog = catalog;
                self.apply_filter();
                self.controller.clear_status();
                self.status = format!("Rescanned: {} tracks", self.catalog.len());
            }
            Err(e) => {
                tracing::warn!(error = %e, "rescan failed");
                self.controller.set_status(format!("Rescan failed: {e}"));
            }
        }
    }

    fn toggle_help(&mut self) {
        self.help_open = !self.help_open;
    }

    pub(crate) fn push_log_line(&mut self, line: String) {
        if self.logs.len() >= LOG_CAP {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    fn drain_logs(&mut self) {
        while let Ok(line) = self.log_rx.try_recv() {
            self.push_log_line(line);
        }
    }

    /// Per-frame housekeeping: session completions and new log lines.
    pub(crate) fn tick(&mut self) {
        self.controller.poll_events();
        self.drain_logs();
    }

    /// Apply one key press. Returns `true` when the user asked to quit.
    pub(crate) fn handle_key(&mut self, code: KeyCode) -> bool {
        if self.help_open {
            match code {
                KeyCode::Char('q') => return true,
                KeyCode::Esc | KeyCode::Char('H') => self.toggle_help(),
                _ => {}
            }
            return false;
        }

        if self.filter_mode {
            match code {
                KeyCode::Esc => self.clear_filter(),
                KeyCode::Enter => self.filter_mode = false,
                KeyCode::Backspace => self.pop_filter_char(),
                KeyCode::Up => self.select_prev(),
                KeyCode::Down => self.select_next(),
                KeyCode::Char(c) => self.push_filter_char(c),
                _ => {}
            }
            return false;
        }

        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Up | KeyCode::Char('k') => self.select_prev(),
            KeyCode::Down | KeyCode::Char('j') => self.select_next(),
            KeyCode::PageUp => self.page_up(),
            KeyCode::PageDown => self.page_down(),
            KeyCode::Home => self.select_first(),
            KeyCode::End => self.select_last(),
            KeyCode::Enter => self.play_selected(),
            KeyCode::Char('u') | KeyCode::Char(' ') => self.controller.toggle_play(),
            KeyCode::Char('m') => self.controller.toggle_mute(),
            KeyCode::Char('r') => {
                self.controller.volume_up();
            }
            KeyCode::Char('e') => {
                self.controller.volume_down();
            }
            KeyCode::Char('n') => self.toggle_loop(),
            KeyCode::Char('s') => self.stop(),
            KeyCode::Char('/') => self.filter_mode = true,
            KeyCode::Esc if !self.filter.is_empty() => self.clear_filter(),
            KeyCode::Char('R') => self.rescan(),
            KeyCode::Char('H') => self.toggle_help(),
            KeyCode::Char('T') => self.show_header = !self.show_header,
            KeyCode::Char('S') => self.show_status = !self.show_status,
            _ => {}
        }
        false
    }
}

fn ui_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let tick = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        app.tick();
        terminal.draw(|f| render::draw(f, app))?;

        let timeout = tick.saturating_sub(last_tick.elapsed());
        if event::poll(timeout).context("poll terminal events")? {
            if let CEvent::Key(k) = event::read().context("read terminal event")? {
                if k.kind == KeyEventKind::Press && app.handle_key(k.code) {
                    return Ok(());
                }
            }
        }

        if last_tick.elapsed() >= tick {
            last_tick = Instant::now();
        }
    }
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("create terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use crossbeam_channel::{Sender, unbounded};
    use tunedeck_player::output::NullBackend;
    use tunedeck_player::{OutputDevice, PlaybackConfig};

    use super::*;

    pub(crate) fn app_for(root: &Path) -> (App, Sender<String>) {
        let catalog = scan_directory(root).unwrap();
        let device = OutputDevice::new(Arc::new(NullBackend::new()));
        let controller = TransportController::new(device, PlaybackConfig::default());
        let (log_tx, log_rx) = unbounded();
        (App::new(catalog, controller, log_rx), log_tx)
    }

    fn library(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs::write(dir.path().join(name), b"not audio").unwrap();
        }
        dir
    }

    fn titles(app: &App) -> Vec<&str> {
        app.visible.iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn lists_supported_files_in_order() {
        let dir = library(&["b.wav", "a.flac", "notes.txt", "c.mp3"]);
        let (app, _log_tx) = app_for(dir.path());
        assert_eq!(titles(&app), ["a.flac", "b.wav", "c.mp3"]);
        assert_eq!(app.selected_index(), Some(0));
    }

    #[test]
    fn navigation_is_clamped() {
        let dir = library(&["a.flac", "b.flac", "c.flac"]);
        let (mut app, _log_tx) = app_for(dir.path());
        app.handle_key(KeyCode::Up);
        assert_eq!(app.selected_index(), Some(0));
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Char('j'));
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected_index(), Some(2));
        app.list_view_height = 2;
        app.handle_key(KeyCode::PageUp);
        assert_eq!(app.selected_index(), Some(0));
        app.handle_key(KeyCode::End);
        assert_eq!(app.selected_index(), Some(2));
    }

    #[test]
    fn empty_library_has_no_selection() {
        let dir = library(&[]);
        let (mut app, _log_tx) = app_for(dir.path());
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::PageDown);
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.selected_index(), None);
        assert!(app.controller.active_session().is_none());
    }

    #[test]
    fn filter_narrows_and_esc_restores() {
        let dir = library(&["Blue Train.flac", "Giant Steps.mp3", "blues.wav"]);
        let (mut app, _log_tx) = app_for(dir.path());

        app.handle_key(KeyCode::Char('/'));
        assert!(app.filter_mode);
        for c in "BLUE".chars() {
            app.handle_key(KeyCode::Char(c));
        }
        assert_eq!(titles(&app), ["Blue Train.flac", "blues.wav"]);

        // Keys are text while filtering.
        app.handle_key(KeyCode::Char('q'));
        assert!(app.visible.is_empty());
        assert_eq!(app.selected_index(), None);
        app.handle_key(KeyCode::Backspace);
        assert_eq!(app.visible.len(), 2);

        app.handle_key(KeyCode::Enter);
        assert!(!app.filter_mode);
        assert_eq!(app.filter, "BLUE");

        app.handle_key(KeyCode::Esc);
        assert!(app.filter.is_empty());
        assert_eq!(app.visible.len(), 3);
    }

    #[test]
    fn filter_keeps_selected_track() {
        let dir = library(&["alpha.flac", "beta.flac", "gamma.flac"]);
        let (mut app, _log_tx) = app_for(dir.path());
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Char('/'));
        app.handle_key(KeyCode::Char('a'));
        assert_eq!(app.selected_track().unwrap().title, "beta.flac");
    }

    #[test]
    fn failed_play_surfaces_status_and_keeps_running() {
        let dir = library(&["broken.mp3"]);
        let (mut app, _log_tx) = app_for(dir.path());
        let quit = app.handle_key(KeyCode::Enter);
        assert!(!quit);
        let snapshot = app.controller.snapshot();
        assert!(snapshot.active_track.is_none());
        assert!(snapshot.status.is_some());
        assert!(app.controller.device().holder().is_none());
    }

    #[test]
    fn transport_keys_without_session_only_touch_flags() {
        let dir = library(&["a.flac"]);
        let (mut app, _log_tx) = app_for(dir.path());
        let start = app.controller.state().volume;

        app.handle_key(KeyCode::Char(' '));
        app.handle_key(KeyCode::Char('m'));
        assert!(!app.controller.state().paused);
        assert!(!app.controller.state().muted);

        app.handle_key(KeyCode::Char('r'));
        assert!(app.controller.state().volume > start);
        app.handle_key(KeyCode::Char('e'));
        app.handle_key(KeyCode::Char('e'));
        assert!(app.controller.state().volume < start);

        app.handle_key(KeyCode::Char('n'));
        assert!(app.controller.state().looping);
        assert_eq!(app.status, "Loop on");
    }

    #[test]
    fn rescan_picks_up_new_files() {
        let dir = library(&["a.flac"]);
        let (mut app, _log_tx) = app_for(dir.path());
        fs::write(dir.path().join("b.flac"), b"x").unwrap();
        app.handle_key(KeyCode::Char('R'));
        assert_eq!(app.visible.len(), 2);
        assert_eq!(app.status, "Rescanned: 2 tracks");
    }

    #[test]
    fn rescan_of_vanished_root_is_not_fatal() {
        let dir = library(&["a.flac"]);
        let root = dir.path().join("music");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("x.wav"), b"x").unwrap();
        let (mut app, _log_tx) = app_for(&root);
        fs::remove_dir_all(&root).unwrap();

        app.handle_key(KeyCode::Char('R'));
        assert_eq!(app.visible.len(), 1);
        assert!(app.controller.snapshot().status.unwrap().contains("Rescan failed"));
    }

    #[test]
    fn help_swallows_keys_until_closed() {
        let dir = library(&["a.flac", "b.flac"]);
        let (mut app, _log_tx) = app_for(dir.path());
        app.handle_key(KeyCode::Char('H'));
        assert!(app.help_open);
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected_index(), Some(0));
        app.handle_key(KeyCode::Esc);
        assert!(!app.help_open);
        assert!(app.handle_key(KeyCode::Char('q')));
    }

    #[test]
    fn logs_are_drained_and_capped() {
        let dir = library(&[]);
        let (mut app, log_tx) = app_for(dir.path());
        for i in 0..LOG_CAP + 10 {
            log_tx.send(format!("line {i}")).unwrap();
        }
        app.tick();
        assert_eq!(app.logs.len(), LOG_CAP);
        assert_eq!(app.logs.front().map(String::as_str), Some("line 10"));
    }
}
