//! One live playback of one track.
//!
//! [`PlaybackSession::start`] opens and probes the file, takes the output device lease,
//! and spawns a session thread. That thread:
//! - opens the output (the stream lives and dies on this thread)
//! - builds the render chain
//! - spawns the decode pump
//! - runs the control loop until the track ends or a stop arrives
//!
//! Teardown always runs in the same order: stop the output, close the queue, join the pump
//! (which closes the file), drop the lease. Only then is [`SessionEvent::Completed`] sent,
//! exactly once.
//!
//! Every session gets its own control channel. The [`SessionHandle`] owns the sending side,
//! so a command can only ever reach the session it was created for.

use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};

use crate::config::PlaybackConfig;
use crate::decode::DecodedStream;
use crate::error::{DecodeError, PlayError};
use crate::gain::Gain;
use crate::output::{ActiveOutput, DeviceLease, OutputDevice, OutputFormat, SessionId};
use crate::pipeline::{RenderChain, lock_chain};
use crate::queue::{SharedAudio, calc_max_buffered_samples};
use crate::status::SessionProgress;
use crate::track::Track;

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The decoded stream was played to the end.
    Finished,
    /// Stopped explicitly (stop, or replaced by another play).
    Stopped,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Sent once per started session, after its file and device are released.
    Completed {
        session: SessionId,
        track: Track,
        reason: EndReason,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum SessionCommand {
    SetPaused(bool),
    SetMuted(bool),
    SetVolume(f64),
    Stop,
}

pub struct PlaybackSession;

impl PlaybackSession {
    /// Start playing `track` on `device`.
    ///
    /// Returns once the output is running. Decode and device failures are returned to the
    /// caller; no completion event is sent for a session that failed to start.
    pub fn start(
        id: SessionId,
        track: &Track,
        device: &OutputDevice,
        config: &PlaybackConfig,
        gain: Gain,
        events: Sender<SessionEvent>,
    ) -> Result<SessionHandle, PlayError> {
        let decode_err = |source: DecodeError| PlayError::Decode {
            track: track.title.clone(),
            source,
        };

        let path = track.path();
        let file = File::open(&path).map_err(|source| {
            decode_err(DecodeError::Open {
                path: path.clone(),
                source,
            })
        })?;
        let stream = track.format.decoder().decode(file).map_err(decode_err)?;
        let lease = device.acquire(id)?;

        let progress = Arc::new(SessionProgress::default());
        progress.set_duration_ms(stream.duration_ms());
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (ctl_tx, ctl_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        tracing::debug!(
            session = %id,
            track = %track.title,
            codec = stream.codec(),
            rate_hz = stream.spec().sample_rate,
            channels = stream.spec().channels,
            "track opened"
        );

        let ctx = SessionContext {
            id,
            track: track.clone(),
            stream,
            lease,
            config: config.clone(),
            gain,
            ctl_rx,
            stop_flag: stop_flag.clone(),
            progress: progress.clone(),
            events,
            ready_tx,
        };
        let join = thread::Builder::new()
            .name(format!("session-{}", id.0))
            .spawn(move || run_session(ctx))
            .map_err(|e| PlayError::Setup(format!("spawn session thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(format)) => {
                tracing::info!(
                    session = %id,
                    track = %track.title,
                    rate_hz = format.sample_rate,
                    channels = format.channels,
                    "session started"
                );
                Ok(SessionHandle {
                    id,
                    ctl_tx,
                    stop_flag,
                    progress,
                    join: Some(join),
                })
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(PlayError::Setup(
                    "session thread exited during setup".to_string(),
                ))
            }
        }
    }
}

/// Owner's handle to a running session. Dropping it stops the session.
pub struct SessionHandle {
    id: SessionId,
    ctl_tx: Sender<SessionCommand>,
    stop_flag: Arc<AtomicBool>,
    progress: Arc<SessionProgress>,
    join: Option<JoinHandle<EndReason>>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn progress(&self) -> &Arc<SessionProgress> {
        &self.progress
    }

    pub fn set_paused(&self, paused: bool) {
        self.send(SessionCommand::SetPaused(paused));
    }

    pub fn set_muted(&self, muted: bool) {
        self.send(SessionCommand::SetMuted(muted));
    }

    pub fn set_volume(&self, volume: f64) {
        self.send(SessionCommand::SetVolume(volume));
    }

    /// Stop the session and wait for it to release its file and the output device.
    ///
    /// Returns the actual end reason, which is `Finished` if the track ended on its own
    /// before the stop was seen.
    pub fn stop(mut self) -> EndReason {
        self.shutdown()
    }

    /// Wait for a session that is already ending, without asking it to stop.
    pub fn join(mut self) -> EndReason {
        match self.join.take() {
            Some(join) => join.join().unwrap_or(EndReason::Stopped),
            None => EndReason::Stopped,
        }
    }

    fn shutdown(&mut self) -> EndReason {
        self.stop_flag.store(true, Ordering::Release);
        self.send(SessionCommand::Stop);
        match self.join.take() {
            Some(join) => join.join().unwrap_or_else(|_| {
                tracing::warn!(session = %self.id, "session thread panicked");
                EndReason::Stopped
            }),
            None => EndReason::Stopped,
        }
    }

    fn send(&self, command: SessionCommand) {
        // The session may already be gone; a dead channel just means nothing to control.
        let _ = self.ctl_tx.send(command);
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.shutdown();
        }
    }
}

struct SessionContext {
    id: SessionId,
    track: Track,
    stream: DecodedStream,
    lease: DeviceLease,
    config: PlaybackConfig,
    gain: Gain,
    ctl_rx: Receiver<SessionCommand>,
    stop_flag: Arc<AtomicBool>,
    progress: Arc<SessionProgress>,
    events: Sender<SessionEvent>,
    ready_tx: Sender<Result<OutputFormat, PlayError>>,
}

/// Resources of a running pipeline, dropped in teardown order.
struct Live {
    output: Box<dyn ActiveOutput>,
    queue: Arc<SharedAudio>,
    pump: JoinHandle<()>,
    chain: Arc<Mutex<RenderChain>>,
    done_rx: Receiver<()>,
}

fn run_session(ctx: SessionContext) -> EndReason {
    let SessionContext {
        id,
        track,
        stream,
        lease,
        config,
        gain,
        ctl_rx,
        stop_flag,
        progress,
        events,
        ready_tx,
    } = ctx;

    let live = match open_pipeline(id, stream, &lease, &config, gain, &progress) {
        Ok((live, format)) => {
            let _ = ready_tx.send(Ok(format));
            live
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return EndReason::Stopped;
        }
    };

    let reason = control_loop(
        &live.chain,
        &ctl_rx,
        &live.done_rx,
        &stop_flag,
        config.poll_interval,
    );

    let Live {
        output,
        queue,
        pump,
        chain,
        done_rx,
    } = live;
    drop(output);
    queue.close();
    if pump.join().is_err() {
        tracing::warn!(session = %id, "decode pump panicked");
    }
    drop(done_rx);
    drop(chain);
    drop(lease);

    tracing::info!(
        session = %id,
        track = %track.title,
        reason = ?reason,
        played_frames = progress.played_frames(),
        underruns = progress.underrun_events(),
        "session ended"
    );
    let _ = events.send(SessionEvent::Completed {
        session: id,
        track,
        reason,
    });
    reason
}

fn open_pipeline(
    id: SessionId,
    stream: DecodedStream,
    lease: &DeviceLease,
    config: &PlaybackConfig,
    gain: Gain,
    progress: &Arc<SessionProgress>,
) -> Result<(Live, OutputFormat), PlayError> {
    let prepared = lease.prepare(config.output_rate)?;
    let format = prepared.format();
    progress.set_output_rate(format.sample_rate);

    let spec = stream.spec();
    let capacity = calc_max_buffered_samples(spec.sample_rate, spec.channels, config.buffer_seconds);
    let queue = Arc::new(SharedAudio::new(spec.channels, capacity));
    let (done_tx, done_rx) = bounded(1);
    let chain = Arc::new(Mutex::new(RenderChain::new(
        queue.clone(),
        spec,
        format,
        config,
        gain,
        progress.clone(),
        done_tx,
    )?));

    let pump = spawn_pump(id, stream, queue.clone())?;

    let render_chain = chain.clone();
    let output = match prepared.start(Box::new(move |out: &mut [f32]| {
        lock_chain(&render_chain).render(out)
    })) {
        Ok(output) => output,
        Err(e) => {
            queue.close();
            let _ = pump.join();
            return Err(e.into());
        }
    };

    Ok((
        Live {
            output,
            queue,
            pump,
            chain,
            done_rx,
        },
        format,
    ))
}

/// Feed decoded chunks into the queue until end of stream or the queue is closed.
fn spawn_pump(
    id: SessionId,
    mut stream: DecodedStream,
    queue: Arc<SharedAudio>,
) -> Result<JoinHandle<()>, PlayError> {
    thread::Builder::new()
        .name(format!("decode-{}", id.0))
        .spawn(move || {
            while let Some(chunk) = stream.next_chunk() {
                if !queue.push_interleaved_blocking(&chunk) {
                    tracing::debug!(session = %id, "decode pump cancelled");
                    break;
                }
            }
            queue.close();
            drop(stream);
        })
        .map_err(|e| PlayError::Setup(format!("spawn decode thread: {e}")))
}

fn control_loop(
    chain: &Mutex<RenderChain>,
    ctl_rx: &Receiver<SessionCommand>,
    done_rx: &Receiver<()>,
    stop_flag: &AtomicBool,
    poll_interval: Duration,
) -> EndReason {
    loop {
        if stop_flag.load(Ordering::Acquire) {
            return EndReason::Stopped;
        }
        select! {
            recv(ctl_rx) -> msg => match msg {
                Ok(SessionCommand::SetPaused(paused)) => lock_chain(chain).set_paused(paused),
                Ok(SessionCommand::SetMuted(muted)) => lock_chain(chain).set_muted(muted),
                Ok(SessionCommand::SetVolume(volume)) => lock_chain(chain).set_volume(volume),
                Ok(SessionCommand::Stop) | Err(_) => return EndReason::Stopped,
            },
            recv(done_rx) -> _ => return EndReason::Finished,
            default(poll_interval) => {
                if lock_chain(chain).is_drained() {
                    return EndReason::Finished;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{NullBackend, NullStats};
    use crate::test_support::{WavSpec, write_wav};
    use std::path::Path;
    use std::time::Instant;

    fn setup() -> (OutputDevice, Arc<NullStats>) {
        let backend = NullBackend::new();
        let stats = backend.stats();
        (OutputDevice::new(Arc::new(backend)), stats)
    }

    fn wav_track(dir: &Path, name: &str, spec: WavSpec) -> Track {
        let path = dir.join(name);
        write_wav(&path, spec);
        Track::from_path(&path).unwrap()
    }

    #[test]
    fn plays_to_end_and_completes_once() {
        let dir = tempfile::tempdir().unwrap();
        let track = wav_track(
            dir.path(),
            "short.wav",
            WavSpec {
                seconds: 0.2,
                ..WavSpec::default()
            },
        );
        let (device, stats) = setup();
        let (events_tx, events_rx) = unbounded();

        let handle = PlaybackSession::start(
            SessionId(1),
            &track,
            &device,
            &PlaybackConfig::default(),
            Gain::default(),
            events_tx,
        )
        .unwrap();
        assert_eq!(device.holder(), Some(SessionId(1)));

        let event = events_rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(
            event,
            SessionEvent::Completed {
                session: SessionId(1),
                track: track.clone(),
                reason: EndReason::Finished,
            }
        );
        assert_eq!(device.holder(), None);
        assert_eq!(handle.join(), EndReason::Finished);
        assert_eq!(stats.open(), 0);
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn stop_while_paused_releases_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let track = wav_track(dir.path(), "long.wav", WavSpec::default());
        let (device, stats) = setup();
        let (events_tx, events_rx) = unbounded();

        let handle = PlaybackSession::start(
            SessionId(2),
            &track,
            &device,
            &PlaybackConfig::default(),
            Gain::default(),
            events_tx,
        )
        .unwrap();
        handle.set_paused(true);
        thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        assert_eq!(handle.stop(), EndReason::Stopped);
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(device.holder(), None);
        assert_eq!(stats.open(), 0);

        match events_rx.try_recv().unwrap() {
            SessionEvent::Completed { reason, .. } => assert_eq!(reason, EndReason::Stopped),
        }
    }

    #[test]
    fn mute_twice_restores_output_level() {
        let dir = tempfile::tempdir().unwrap();
        let track = wav_track(dir.path(), "tone.wav", WavSpec::default());
        let (device, stats) = setup();
        let (events_tx, _events_rx) = unbounded();

        let handle = PlaybackSession::start(
            SessionId(3),
            &track,
            &device,
            &PlaybackConfig::default(),
            Gain::default(),
            events_tx,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(150));
        let before = stats.last_peak();
        assert!(before > 0.4, "peak before mute {before}");

        handle.set_muted(true);
        thread::sleep(Duration::from_millis(150));
        assert_eq!(stats.last_peak(), 0.0);

        handle.set_muted(false);
        thread::sleep(Duration::from_millis(150));
        let after = stats.last_peak();
        assert!((after - before).abs() < 0.02, "before {before}, after {after}");

        handle.stop();
    }

    #[test]
    fn busy_device_rejects_second_session() {
        let dir = tempfile::tempdir().unwrap();
        let track = wav_track(dir.path(), "tone.wav", WavSpec::default());
        let (device, _stats) = setup();
        let (events_tx, events_rx) = unbounded();

        let first = PlaybackSession::start(
            SessionId(1),
            &track,
            &device,
            &PlaybackConfig::default(),
            Gain::default(),
            events_tx.clone(),
        )
        .unwrap();
        let second = PlaybackSession::start(
            SessionId(2),
            &track,
            &device,
            &PlaybackConfig::default(),
            Gain::default(),
            events_tx,
        );
        assert!(matches!(
            second,
            Err(PlayError::Device(crate::error::DeviceError::Busy { .. }))
        ));

        first.stop();
        let completed: Vec<_> = events_rx.try_iter().collect();
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn corrupt_file_is_a_recoverable_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();
        let track = Track::from_path(&path).unwrap();
        let (device, _stats) = setup();
        let (events_tx, events_rx) = unbounded();

        let result = PlaybackSession::start(
            SessionId(9),
            &track,
            &device,
            &PlaybackConfig::default(),
            Gain::default(),
            events_tx,
        );
        match result {
            Err(PlayError::Decode { track, .. }) => assert_eq!(track, "broken.mp3"),
            Err(other) => panic!("expected decode error, got {other}"),
            Ok(_) => panic!("expected decode error"),
        }
        assert_eq!(device.holder(), None);
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn resampled_session_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let track = wav_track(
            dir.path(),
            "cd.wav",
            WavSpec {
                sample_rate: 44_100,
                channels: 1,
                seconds: 0.2,
                amplitude: 0.5,
            },
        );
        let (device, _stats) = setup();
        let (events_tx, events_rx) = unbounded();

        let handle = PlaybackSession::start(
            SessionId(4),
            &track,
            &device,
            &PlaybackConfig::default(),
            Gain::default(),
            events_tx,
        )
        .unwrap();
        let progress = handle.progress().clone();

        match events_rx.recv_timeout(Duration::from_secs(3)).unwrap() {
            SessionEvent::Completed { reason, .. } => assert_eq!(reason, EndReason::Finished),
        }
        handle.join();
        let elapsed = progress.elapsed_ms().unwrap();
        assert!((150..=260).contains(&elapsed), "elapsed {elapsed}");
    }
}
