//! Transport controller: the single owner of playback.
//!
//! All operations run on the caller's (UI) thread. At most one [`SessionHandle`] is held at
//! a time, and `play` stops and joins the previous session before the next one acquires
//! the device. Session completions arrive on a channel and are applied by
//! [`TransportController::poll_events`]. Completions from sessions that are no longer
//! active are ignored.

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::config::PlaybackConfig;
use crate::error::PlayError;
use crate::gain::{Gain, clamp_volume};
use crate::output::{OutputDevice, SessionId};
use crate::session::{EndReason, PlaybackSession, SessionEvent, SessionHandle};
use crate::status::TransportSnapshot;
use crate::track::Track;

/// Transport flags. Mutated only through [`TransportController`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransportState {
    pub active_track: Option<Track>,
    /// A session is running and not paused.
    pub playing: bool,
    pub paused: bool,
    pub muted: bool,
    /// Log2 units, within `[VOLUME_MIN, VOLUME_MAX]`.
    pub volume: f64,
    pub looping: bool,
}

pub struct TransportController {
    device: OutputDevice,
    config: PlaybackConfig,
    state: TransportState,
    active: Option<SessionHandle>,
    next_id: u64,
    status: Option<String>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl TransportController {
    pub fn new(device: OutputDevice, config: PlaybackConfig) -> Self {
        let (events_tx, events_rx) = unbounded();
        let state = TransportState {
            volume: clamp_volume(config.initial_volume),
            ..TransportState::default()
        };
        Self {
            device,
            config,
            state,
            active: None,
            next_id: 0,
            status: None,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> &TransportState {
        &self.state
    }

    pub fn device(&self) -> &OutputDevice {
        &self.device
    }

    /// Id of the running session, if any.
    pub fn active_session(&self) -> Option<SessionId> {
        self.active.as_ref().map(SessionHandle::id)
    }

    /// Stop whatever is playing, then start `track`.
    ///
    /// Pause and mute reset for the new session; volume carries over. On failure nothing is
    /// playing and the error is also kept as the transient status message.
    pub fn play(&mut self, track: &Track) -> Result<(), PlayError> {
        if let Some(previous) = self.active.take() {
            let id = previous.id();
            let reason = previous.stop();
            tracing::debug!(session = %id, ?reason, "previous session released");
        }

        self.next_id += 1;
        let id = SessionId(self.next_id);
        let gain = Gain::new(self.state.volume);

        match PlaybackSession::start(
            id,
            track,
            &self.device,
            &self.config,
            gain,
            self.events_tx.clone(),
        ) {
            Ok(handle) => {
                self.active = Some(handle);
                self.state.active_track = Some(track.clone());
                self.state.playing = true;
                self.state.paused = false;
                self.state.muted = false;
                self.status = None;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(track = %track.title, error = %e, "play failed");
                self.clear_playback();
                self.status = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Pause or resume. No-op without an active session.
    pub fn toggle_play(&mut self) {
        let Some(session) = &self.active else {
            return;
        };
        self.state.paused = !self.state.paused;
        self.state.playing = !self.state.paused;
        session.set_paused(self.state.paused);
    }

    /// No-op without an active session.
    pub fn toggle_mute(&mut self) {
        let Some(session) = &self.active else {
            return;
        };
        self.state.muted = !self.state.muted;
        session.set_muted(self.state.muted);
    }

    /// Add `delta` (log2 units) to the volume, clamped. Applies to the active session if
    /// any and becomes the volume for the next `play`. Returns the new volume.
    pub fn adjust_volume(&mut self, delta: f64) -> f64 {
        self.state.volume = clamp_volume(self.state.volume + delta);
        if let Some(session) = &self.active {
            session.set_volume(self.state.volume);
        }
        self.state.volume
    }

    pub fn volume_up(&mut self) -> f64 {
        self.adjust_volume(self.config.volume_step)
    }

    pub fn volume_down(&mut self) -> f64 {
        self.adjust_volume(-self.config.volume_step)
    }

    /// Returns the new looping flag.
    pub fn toggle_loop(&mut self) -> bool {
        self.state.looping = !self.state.looping;
        self.state.looping
    }

    /// Stop the active session, if any, and clear the active track.
    pub fn stop(&mut self) {
        if let Some(session) = self.active.take() {
            let id = session.id();
            let reason = session.stop();
            tracing::info!(session = %id, ?reason, "playback stopped");
        }
        self.clear_playback();
    }

    /// Apply pending session completions. Returns every event received, stale ones included.
    ///
    /// A natural finish clears the active track, or replays it when looping is on.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let events: Vec<SessionEvent> = self.events_rx.try_iter().collect();
        for event in &events {
            let SessionEvent::Completed {
                session,
                track,
                reason,
            } = event;
            if self.active_session() != Some(*session) {
                tracing::debug!(session = %session, "ignoring completion of inactive session");
                continue;
            }
            if let Some(handle) = self.active.take() {
                handle.join();
            }
            self.clear_playback();

            if *reason == EndReason::Finished && self.state.looping {
                tracing::info!(track = %track.title, "looping");
                // A failed replay is already recorded in the status message.
                let _ = self.play(track);
            }
        }
        events
    }

    /// Read-only view for rendering.
    pub fn snapshot(&self) -> TransportSnapshot {
        let progress = self.active.as_ref().map(|s| s.progress());
        TransportSnapshot {
            session: self.active_session(),
            active_track: self.state.active_track.clone(),
            playing: self.state.playing,
            paused: self.state.paused,
            muted: self.state.muted,
            looping: self.state.looping,
            volume: self.state.volume,
            elapsed_ms: progress.and_then(|p| p.elapsed_ms()),
            duration_ms: progress.and_then(|p| p.duration_ms()),
            underrun_events: progress.map(|p| p.underrun_events()).unwrap_or(0),
            status: self.status.clone(),
        }
    }

    /// Set a transient status line (e.g. rescan results).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    fn clear_playback(&mut self) {
        self.state.active_track = None;
        self.state.playing = false;
        self.state.paused = false;
        self.state.muted = false;
    }
}
