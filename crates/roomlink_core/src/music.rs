//! Music Player Volume Control
//!
//! Speaks the external player's line-delimited JSON protocol through a
//! platform named pipe: one UTF-8 line per command, write-only, of the
//! form `{"command": ["set_property", "volume", V]}`.
//!
//! Ducking transitions are smoothed by a short-lived stepper thread so a
//! VAD edge never produces a volume jump. The audio pipeline itself only
//! ever flips the target; all pipe I/O happens off the mixer thread.
//!
//! Failure policy: a command is retried a few times, then dropped. A
//! missing player is logged once and never blocks audio.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::MpvVadConfig;

/// Pipe write retry policy.
const SEND_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Stepper cadence for volume transitions.
const STEP_INTERVAL: Duration = Duration::from_millis(20);

/// Narrow transport capability: deliver one absolute volume.
///
/// Implementations: [`MpvPipe`] (named pipe) and [`NullSink`] (player
/// control disabled). Picked at construction from configuration.
pub trait VolumeSink: Send + Sync {
    /// Send an absolute volume (0-100). Returns false when dropped.
    fn send_volume(&self, volume: u8) -> bool;
}

/// Named-pipe transport to the external player.
pub struct MpvPipe {
    path: String,
    unavailable_logged: AtomicBool,
}

impl MpvPipe {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            unavailable_logged: AtomicBool::new(false),
        }
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        #[cfg(windows)]
        {
            let mut pipe = std::fs::OpenOptions::new().write(true).open(&self.path)?;
            pipe.write_all(line.as_bytes())?;
            pipe.flush()
        }
        #[cfg(not(windows))]
        {
            let mut stream = std::os::unix::net::UnixStream::connect(&self.path)?;
            stream.write_all(line.as_bytes())
        }
    }
}

impl VolumeSink for MpvPipe {
    fn send_volume(&self, volume: u8) -> bool {
        let line = format!(
            "{}\n",
            serde_json::json!({ "command": ["set_property", "volume", volume] })
        );

        for attempt in 1..=SEND_ATTEMPTS {
            match self.write_line(&line) {
                Ok(()) => {
                    self.unavailable_logged.store(false, Ordering::Relaxed);
                    return true;
                }
                Err(e) if attempt < SEND_ATTEMPTS => {
                    debug!(error = %e, attempt, "music pipe write failed, retrying");
                    thread::sleep(RETRY_DELAY);
                }
                Err(e) => {
                    // Log the outage once, then stay quiet until it heals
                    if !self.unavailable_logged.swap(true, Ordering::Relaxed) {
                        warn!(
                            pipe = %self.path,
                            error = %e,
                            "music player unreachable - volume commands dropped"
                        );
                    }
                }
            }
        }
        false
    }
}

/// Transport used when player control is disabled in the config.
pub struct NullSink;

impl VolumeSink for NullSink {
    fn send_volume(&self, _volume: u8) -> bool {
        true
    }
}

struct VolumeState {
    current: f32,
    target: f32,
    transitioning: bool,
}

struct ControllerInner {
    sink: Arc<dyn VolumeSink>,
    config: MpvVadConfig,
    state: Mutex<VolumeState>,
    stopped: AtomicBool,
}

/// Ducking controller for the external music player.
///
/// `set_ducking` is cheap and non-blocking; a stepper thread interpolates
/// the volume toward the target over the configured transition time and
/// finishes with one exact write.
#[derive(Clone)]
pub struct MusicController {
    inner: Arc<ControllerInner>,
}

impl MusicController {
    pub fn new(sink: Arc<dyn VolumeSink>, config: MpvVadConfig) -> Self {
        let normal = f32::from(config.normal_volume);
        Self {
            inner: Arc::new(ControllerInner {
                sink,
                config,
                state: Mutex::new(VolumeState {
                    current: normal,
                    target: normal,
                    transitioning: false,
                }),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Send an exact volume immediately and settle the state on it.
    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        {
            let mut state = self.inner.state.lock();
            state.current = f32::from(volume);
            state.target = f32::from(volume);
        }
        self.inner.sink.send_volume(volume);
    }

    /// Flip the ducking target. Called once per mixed frame from the
    /// mixer thread; unchanged targets return without any work.
    pub fn set_ducking(&self, should_duck: bool) {
        if !self.inner.config.mpv_ducking_enabled || self.inner.stopped.load(Ordering::Relaxed) {
            return;
        }

        let target = if should_duck {
            f32::from(self.inner.config.ducking_volume)
        } else {
            f32::from(self.inner.config.normal_volume)
        };

        let spawn_stepper = {
            let mut state = self.inner.state.lock();
            if (state.target - target).abs() < f32::EPSILON {
                return;
            }
            state.target = target;
            info!(
                volume = target as u8,
                ducking = should_duck,
                "music volume target changed"
            );

            if state.transitioning {
                false
            } else {
                state.transitioning = true;
                true
            }
        };

        if spawn_stepper {
            let inner = Arc::clone(&self.inner);
            if thread::Builder::new()
                .name("roomlink-music".into())
                .spawn(move || run_transition(&inner))
                .is_err()
            {
                // Could not spawn; fall back to an immediate exact write
                self.inner.state.lock().transitioning = false;
                self.inner.sink.send_volume(target as u8);
            }
        }
    }

    /// Current volume as last commanded (0-100).
    pub fn current_volume(&self) -> u8 {
        self.inner.state.lock().current.round().clamp(0.0, 100.0) as u8
    }

    /// Restore the normal volume and refuse further ducking.
    ///
    /// Called during orderly shutdown, before the streams close.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Relaxed);
        let normal = self.inner.config.normal_volume;
        {
            let mut state = self.inner.state.lock();
            state.current = f32::from(normal);
            state.target = f32::from(normal);
        }
        self.inner.sink.send_volume(normal);
        info!(volume = normal, "music volume restored");
    }
}

/// Stepper body: interpolate toward the target, then write it exactly.
///
/// Re-runs when the target changes mid-transition; exits once the state
/// is steady or the controller stopped.
fn run_transition(inner: &ControllerInner) {
    let steps = ((inner.config.ducking_transition_time / 0.02).round() as u32).max(1);

    loop {
        if inner.stopped.load(Ordering::Relaxed) {
            inner.state.lock().transitioning = false;
            return;
        }

        let (target, start) = {
            let state = inner.state.lock();
            (state.target, state.current)
        };
        let step = (target - start) / steps as f32;

        let mut retargeted = false;
        for _ in 0..steps {
            thread::sleep(STEP_INTERVAL);
            if inner.stopped.load(Ordering::Relaxed) {
                inner.state.lock().transitioning = false;
                return;
            }

            let volume = {
                let mut state = inner.state.lock();
                if (state.target - target).abs() > f32::EPSILON {
                    retargeted = true;
                    break;
                }
                state.current += step;
                state.current.round().clamp(0.0, 100.0) as u8
            };
            inner.sink.send_volume(volume);
        }

        if retargeted {
            continue;
        }

        let done = {
            let mut state = inner.state.lock();
            state.current = target;
            let done = (state.target - target).abs() < f32::EPSILON;
            if done {
                state.transitioning = false;
            }
            done
        };
        inner.sink.send_volume(target.round() as u8);
        if done {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        sent: Mutex<Vec<u8>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<u8> {
            self.sent.lock().clone()
        }
    }

    impl VolumeSink for RecordingSink {
        fn send_volume(&self, volume: u8) -> bool {
            self.sent.lock().push(volume);
            true
        }
    }

    fn controller(sink: Arc<RecordingSink>) -> MusicController {
        MusicController::new(sink, MpvVadConfig::default())
    }

    fn wait_for_transition(controller: &MusicController) {
        // 5 steps × 20 ms plus scheduling slack
        for _ in 0..50 {
            thread::sleep(Duration::from_millis(20));
            if !controller.inner.state.lock().transitioning {
                return;
            }
        }
        panic!("transition did not settle");
    }

    #[test]
    fn test_duck_reaches_ducking_volume() {
        let sink = RecordingSink::new();
        let ctl = controller(Arc::clone(&sink));

        ctl.set_ducking(true);
        wait_for_transition(&ctl);

        let sent = sink.sent();
        assert_eq!(*sent.last().unwrap(), 15, "final exact write");
        assert_eq!(ctl.current_volume(), 15);
    }

    #[test]
    fn test_transition_steps_are_bounded() {
        let sink = RecordingSink::new();
        let ctl = controller(Arc::clone(&sink));

        ctl.set_ducking(true);
        wait_for_transition(&ctl);

        // 100 → 15 over 5 steps: each commanded change ≤ ceil(85/5) + 1
        let sent = sink.sent();
        let mut previous = 100i32;
        for &v in &sent {
            assert!((previous - i32::from(v)).abs() <= 18, "jump too large: {previous} -> {v}");
            previous = i32::from(v);
        }
    }

    #[test]
    fn test_unduck_restores_normal_volume() {
        let sink = RecordingSink::new();
        let ctl = controller(Arc::clone(&sink));

        ctl.set_ducking(true);
        wait_for_transition(&ctl);
        ctl.set_ducking(false);
        wait_for_transition(&ctl);

        assert_eq!(ctl.current_volume(), 100);
        assert_eq!(*sink.sent().last().unwrap(), 100);
    }

    #[test]
    fn test_unchanged_target_sends_nothing() {
        let sink = RecordingSink::new();
        let ctl = controller(Arc::clone(&sink));

        // Already at normal volume: repeated un-duck requests are no-ops
        ctl.set_ducking(false);
        ctl.set_ducking(false);
        thread::sleep(Duration::from_millis(60));

        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_retarget_mid_transition() {
        let sink = RecordingSink::new();
        let ctl = controller(Arc::clone(&sink));

        ctl.set_ducking(true);
        thread::sleep(Duration::from_millis(30));
        ctl.set_ducking(false);
        wait_for_transition(&ctl);

        assert_eq!(ctl.current_volume(), 100);
    }

    #[test]
    fn test_stop_restores_and_blocks_further_ducking() {
        let sink = RecordingSink::new();
        let ctl = controller(Arc::clone(&sink));

        ctl.set_ducking(true);
        wait_for_transition(&ctl);
        ctl.stop();

        assert_eq!(ctl.current_volume(), 100);
        assert_eq!(*sink.sent().last().unwrap(), 100);

        let sends_before = sink.sent().len();
        ctl.set_ducking(true);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(sink.sent().len(), sends_before);
    }

    #[test]
    fn test_ducking_disabled_in_config() {
        let sink = RecordingSink::new();
        let config = MpvVadConfig {
            mpv_ducking_enabled: false,
            ..MpvVadConfig::default()
        };
        let ctl = MusicController::new(Arc::clone(&sink) as Arc<dyn VolumeSink>, config);

        ctl.set_ducking(true);
        thread::sleep(Duration::from_millis(60));
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_set_volume_is_exact() {
        let sink = RecordingSink::new();
        let ctl = controller(Arc::clone(&sink));

        ctl.set_volume(80);
        assert_eq!(sink.sent(), vec![80]);
        assert_eq!(ctl.current_volume(), 80);
    }

    #[test]
    fn test_null_sink_accepts_everything() {
        assert!(NullSink.send_volume(50));
    }

    #[test]
    fn test_mpv_pipe_unreachable_is_dropped() {
        let pipe = MpvPipe::new("/nonexistent/roomlink-test-pipe");
        assert!(!pipe.send_volume(50));
        // Second failure takes the logged-once path
        assert!(!pipe.send_volume(60));
    }
}
