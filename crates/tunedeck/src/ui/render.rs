use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph},
};
use tunedeck_player::TransportSnapshot;
use tunedeck_player::gain::VOLUME_MIN;

use super::app::App;

pub(crate) fn draw(f: &mut ratatui::Frame, app: &mut App) {
    let snapshot = app.controller.snapshot();

    // The filter prompt lives in the status line, so it stays up while typing.
    let show_footer = app.show_status || app.filter_mode;
    let (header_h, gauge_h) = if app.show_header { (4, 3) } else { (0, 0) };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(header_h),
            Constraint::Length(gauge_h),
            Constraint::Min(5),
            Constraint::Length(8),
            Constraint::Length(u16::from(show_footer)),
        ])
        .split(f.area());

    if app.show_header {
        draw_header(f, &snapshot, chunks[0], chunks[1]);
    }

    let list_title = if app.filter.is_empty() {
        format!("Tracks ({})", app.catalog.len())
    } else {
        format!(
            "Tracks ({}/{})  filter: {}",
            app.visible.len(),
            app.catalog.len(),
            app.filter
        )
    };
    let active_key = snapshot.active_track.as_ref().map(|t| t.key());
    let label_width = chunks[2].width.saturating_sub(12) as usize;
    let mut items = Vec::with_capacity(app.visible.len());
    for track in &app.visible {
        let marker = if active_key.as_ref() == Some(&track.key()) {
            "* "
        } else {
            "  "
        };
        let label = format!(
            "{marker}{}  [{}]",
            truncate_label(&track.title, label_width),
            track.format.label()
        );
        let mut item = ListItem::new(label);
        if marker == "* " {
            item = item.style(Style::default().fg(Color::Green));
        }
        items.push(item);
    }
    if items.is_empty() {
        items.push(ListItem::new("<no tracks>"));
    }
    let block = Block::default().borders(Borders::ALL).title(list_title);
    app.list_view_height = block.inner(chunks[2]).height as usize;
    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD))
        .highlight_symbol("▶ ");
    f.render_stateful_widget(list, chunks[2], &mut app.list_state);

    let log_block = Block::default().borders(Borders::ALL).title("Log");
    let height = log_block.inner(chunks[3]).height as usize;
    let start = app.logs.len().saturating_sub(height);
    let lines: Vec<Line> = app
        .logs
        .iter()
        .skip(start)
        .map(|l| Line::from(l.as_str()))
        .collect();
    f.render_widget(Paragraph::new(lines).block(log_block), chunks[3]);

    let footer = if app.filter_mode {
        format!("/{}_", app.filter)
    } else {
        snapshot
            .status
            .clone()
            .unwrap_or_else(|| format!("{}  |  H help  q quit", app.status))
    };
    let footer_style = if snapshot.status.is_some() && !app.filter_mode {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    if show_footer {
        f.render_widget(Paragraph::new(footer).style(footer_style), chunks[4]);
    }

    if app.help_open {
        let area = centered_rect(60, 70, f.area());
        f.render_widget(Clear, area);
        let help = [
            "Keys",
            "  ↑/↓ j/k      move selection",
            "  PgUp/PgDn    page",
            "  Home/End     first / last",
            "  Enter        play selected",
            "  u / Space    pause / resume",
            "  m            mute",
            "  r / e        volume up / down",
            "  n            loop current track",
            "  s            stop",
            "  /            filter (Enter keep, Esc clear)",
            "  R            rescan directory",
            "  T / S        toggle now-playing / status bar",
            "  H / Esc      close help",
            "  q            quit",
        ]
        .join("\n");
        let block = Block::default().title("Help").borders(Borders::ALL);
        f.render_widget(Paragraph::new(help).block(block), area);
    }
}

fn draw_header(f: &mut ratatui::Frame, snapshot: &TransportSnapshot, top: Rect, bar: Rect) {
    let title = snapshot
        .active_track
        .as_ref()
        .map(|t| format!("{}  [{}]", t.title, t.format.label()))
        .unwrap_or_else(|| "-".into());
    let now_playing = Paragraph::new(vec![
        Line::from(format!("track: {title}")),
        Line::from(transport_line(snapshot)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Now Playing"));
    f.render_widget(now_playing, top);

    let (ratio, label) = progress(snapshot);
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(ratio)
        .label(label);
    f.render_widget(gauge, bar);
}

fn transport_line(snapshot: &TransportSnapshot) -> String {
    let state = if snapshot.paused {
        "paused"
    } else if snapshot.playing {
        "playing"
    } else {
        "stopped"
    };
    let mut parts = vec![state.to_string(), format!("vol {}", volume_label(snapshot.volume))];
    if snapshot.muted {
        parts.push("muted".into());
    }
    if snapshot.looping {
        parts.push("loop".into());
    }
    if snapshot.underrun_events > 0 {
        parts.push(format!("underruns {}", snapshot.underrun_events));
    }
    parts.join(" | ")
}

/// Volume in dB (one log2 step is about 6 dB).
fn volume_label(volume: f64) -> String {
    if volume <= VOLUME_MIN {
        return "off".into();
    }
    let db = volume * 20.0 * std::f64::consts::LOG10_2;
    format!("{db:+.1} dB")
}

fn progress(snapshot: &TransportSnapshot) -> (f64, String) {
    let Some(elapsed_ms) = snapshot.elapsed_ms else {
        return (0.0, "-".into());
    };
    let elapsed = format_duration_ms(elapsed_ms);
    match (snapshot.progress_ratio(), snapshot.duration_ms) {
        (Some(ratio), Some(total_ms)) => {
            let remaining = format_duration_ms(total_ms.saturating_sub(elapsed_ms));
            (
                ratio.clamp(0.0, 1.0),
                format!("{elapsed} / {} (left {remaining})", format_duration_ms(total_ms)),
            )
        }
        _ => (0.0, elapsed),
    }
}

fn truncate_label(label: &str, max: usize) -> String {
    if max == 0 || label.chars().count() <= max {
        return label.to_string();
    }
    if max <= 3 {
        return label.chars().take(max).collect();
    }
    let cut: String = label.chars().take(max - 3).collect();
    format!("{cut}...")
}

fn format_duration_ms(ms: u64) -> String {
    let total_secs = ms / 1000;
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    format!("{mins}:{secs:02}")
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1]);
    horizontal[1]
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crossterm::event::KeyCode;
    use ratatui::{Terminal, backend::TestBackend};

    use super::*;
    use crate::ui::app::tests::app_for;

    fn screen(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 30)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn durations_format_as_minutes_and_seconds() {
        assert_eq!(format_duration_ms(0), "0:00");
        assert_eq!(format_duration_ms(61_999), "1:01");
        assert_eq!(format_duration_ms(3_600_000), "60:00");
    }

    #[test]
    fn labels_truncate_on_char_boundaries() {
        assert_eq!(truncate_label("short", 10), "short");
        assert_eq!(truncate_label("Ωmega track", 8), "Ωmega...");
        assert_eq!(truncate_label("abcdef", 2), "ab");
    }

    #[test]
    fn volume_label_reports_db_and_off() {
        assert_eq!(volume_label(0.0), "+0.0 dB");
        assert_eq!(volume_label(-1.0), "-6.0 dB");
        assert_eq!(volume_label(VOLUME_MIN), "off");
    }

    #[test]
    fn progress_without_session_is_empty() {
        let (ratio, label) = progress(&TransportSnapshot::default());
        assert_eq!(ratio, 0.0);
        assert_eq!(label, "-");
    }

    #[test]
    fn progress_with_duration_fills_gauge() {
        let snapshot = TransportSnapshot {
            elapsed_ms: Some(30_000),
            duration_ms: Some(120_000),
            ..TransportSnapshot::default()
        };
        let (ratio, label) = progress(&snapshot);
        assert!((ratio - 0.25).abs() < 1e-9);
        assert_eq!(label, "0:30 / 2:00 (left 1:30)");
    }

    #[test]
    fn draws_listing_and_sets_page_height() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Naima.flac"), b"x").unwrap();
        fs::write(dir.path().join("Alabama.mp3"), b"x").unwrap();
        let (mut app, _log_tx) = app_for(dir.path());

        let text = screen(&mut app);
        assert!(text.contains("Alabama.mp3  [MP3]"), "{text}");
        assert!(text.contains("Naima.flac  [FLAC]"), "{text}");
        assert!(text.contains("Tracks (2)"));
        assert!(app.list_view_height > 0);
    }

    #[test]
    fn bars_can_be_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _log_tx) = app_for(dir.path());
        let text = screen(&mut app);
        assert!(text.contains("Now Playing"));
        assert!(text.contains("q quit"));
        let tall = app.list_view_height;

        app.handle_key(KeyCode::Char('T'));
        app.handle_key(KeyCode::Char('S'));
        let text = screen(&mut app);
        assert!(!text.contains("Now Playing"));
        assert!(!text.contains("Progress"));
        assert!(!text.contains("q quit"));
        assert_eq!(app.list_view_height, tall + 8);

        app.handle_key(KeyCode::Char('/'));
        assert!(screen(&mut app).contains("/_"));
    }

    #[test]
    fn draws_help_overlay_and_filter_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _log_tx) = app_for(dir.path());
        app.handle_key(KeyCode::Char('H'));
        assert!(screen(&mut app).contains("rescan directory"));

        app.handle_key(KeyCode::Esc);
        app.handle_key(KeyCode::Char('/'));
        app.handle_key(KeyCode::Char('x'));
        let text = screen(&mut app);
        assert!(text.contains("/x_"));
        assert!(text.contains("<no tracks>"));
    }
}
