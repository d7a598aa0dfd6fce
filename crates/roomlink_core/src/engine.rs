//! Bridge Engine - Main Entry Point
//!
//! The Bridge owns every long-lived audio resource: the three device
//! streams, the ring buffers and queues, the downlink mixer thread and the
//! music controller.
//!
//! # Architecture
//!
//! ```text
//! Startup (leaves first):
//!   1. Validate config, resolve the three cable endpoints (fail fast)
//!   2. Construct rings and queues
//!   3. Open capture streams (Clubdeck, music), then the playback stream
//!   4. Spawn the downlink mixer thread
//!
//! Shutdown (reverse):
//!   1. running := false
//!   2. Restore music volume
//!   3. Join the mixer (bounded wait)
//!   4. Drop playback first (no further pulls), then captures
//!   5. Clear queues and rings
//! ```
//!
//! The Bridge lives on the thread that created it (CPAL stream handles
//! are not `Send`); everything the server side needs is shared through
//! `Arc` accessors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use tracing::{info, warn};

use roomlink_dsp::{VadConfig, VoiceActivityDetector};

use crate::adapter::{Chunker, FormatAdapter};
use crate::config::BridgeConfig;
use crate::device::{resolve_endpoint, Direction, Endpoint};
use crate::error::{BridgeError, BridgeResult};
use crate::levels::SharedLevels;
use crate::message::BridgeEvent;
use crate::mixer::{self, MixerContext};
use crate::music::{MpvPipe, MusicController, NullSink, VolumeSink};
use crate::queue::FrameQueue;
use crate::ring::RingBuffer;
use crate::stream::{open_capture, open_playback, CaptureStream, PlaybackStream};
use crate::uplink::UplinkSynthesizer;
use crate::{CHUNK_SAMPLES, QUEUE_CAPACITY, RING_CAPACITY, SAMPLE_RATE};

/// How long shutdown waits for the mixer before abandoning it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

struct ResolvedCable {
    device: cpal::Device,
    endpoint: Endpoint,
}

/// Declaration order matters: playback drops first so no pulls can hit
/// the rings after the captures are gone. The handles are held only to
/// keep audio flowing.
#[allow(dead_code)]
struct OpenStreams {
    playback: PlaybackStream,
    capture_clubdeck: CaptureStream,
    capture_music: CaptureStream,
}

/// Saturation counters exposed through `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStats {
    pub queue_drops: u64,
    pub ring_overwrites: u64,
}

/// The audio bridge controller.
pub struct Bridge {
    config: BridgeConfig,

    q_clubdeck: Arc<FrameQueue>,
    q_music: Arc<FrameQueue>,
    q_downlink: Arc<FrameQueue>,
    ring_browser: Arc<RingBuffer>,
    ring_music: Arc<RingBuffer>,
    levels: Arc<SharedLevels>,

    music: MusicController,

    running: Arc<AtomicBool>,

    event_tx: Sender<BridgeEvent>,
    event_rx: Receiver<BridgeEvent>,

    cables: Option<(ResolvedCable, ResolvedCable, ResolvedCable)>,
    streams: Option<OpenStreams>,
    mixer: Option<JoinHandle<()>>,
}

impl Bridge {
    /// Validate the configuration and resolve all three cables.
    ///
    /// Fails fast with the offending config option before any stream is
    /// opened.
    pub fn new(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;

        let cables = Some((
            Self::resolve_cable(
                "cables.clubdeck_input_device_id",
                config.cables.clubdeck_input_device_id,
                Direction::Capture,
            )?,
            Self::resolve_cable(
                "cables.mpv_input_device_id",
                config.cables.mpv_input_device_id,
                Direction::Capture,
            )?,
            Self::resolve_cable(
                "cables.browser_output_device_id",
                config.cables.browser_output_device_id,
                Direction::Playback,
            )?,
        ));

        let sink: Arc<dyn VolumeSink> = if config.mpv.enabled {
            Arc::new(MpvPipe::new(config.mpv.pipe.clone()))
        } else {
            info!("music player control disabled");
            Arc::new(NullSink)
        };
        let music = MusicController::new(sink, config.vad_mpv.clone());

        let (event_tx, event_rx) = unbounded();

        Ok(Self {
            config,
            q_clubdeck: Arc::new(FrameQueue::new(QUEUE_CAPACITY)),
            q_music: Arc::new(FrameQueue::new(QUEUE_CAPACITY)),
            q_downlink: Arc::new(FrameQueue::new(QUEUE_CAPACITY)),
            ring_browser: Arc::new(RingBuffer::new(RING_CAPACITY)),
            ring_music: Arc::new(RingBuffer::new(RING_CAPACITY)),
            levels: Arc::new(SharedLevels::new()),
            music,
            running: Arc::new(AtomicBool::new(false)),
            event_tx,
            event_rx,
            cables,
            streams: None,
            mixer: None,
        })
    }

    fn resolve_cable(
        option: &str,
        index: Option<usize>,
        direction: Direction,
    ) -> BridgeResult<ResolvedCable> {
        let index = index.ok_or_else(|| {
            BridgeError::ConfigError(format!("{option} is not set"))
        })?;
        let (device, endpoint) = resolve_endpoint(option, index, direction)?;
        Ok(ResolvedCable { device, endpoint })
    }

    /// Open streams and start the mixer.
    pub fn start(&mut self) -> BridgeResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(BridgeError::AlreadyRunning);
        }
        let Some((clubdeck, music_in, output)) = self.cables.take() else {
            return Err(BridgeError::NotRunning);
        };

        info!("starting audio bridge");
        self.running.store(true, Ordering::SeqCst);

        let streams = match self.open_streams(&clubdeck, &music_in, &output) {
            Ok(streams) => streams,
            Err(e) => {
                // Partial opens were already rolled back by drop; undo the
                // running flag and keep the cables for a retry
                self.running.store(false, Ordering::SeqCst);
                self.cables = Some((clubdeck, music_in, output));
                return Err(e);
            }
        };

        let ctx = MixerContext {
            q_clubdeck: Arc::clone(&self.q_clubdeck),
            q_music: Arc::clone(&self.q_music),
            q_downlink: Arc::clone(&self.q_downlink),
            vad: VoiceActivityDetector::new(
                VadConfig {
                    min_duration: self.config.vad_mpv.ducking_min_duration,
                    release_time: self.config.vad_mpv.ducking_release_time,
                    ..VadConfig::default()
                },
                SAMPLE_RATE,
                crate::CHUNK_FRAMES as u32,
            ),
            music: self.music.clone(),
            levels: Arc::clone(&self.levels),
            running: Arc::clone(&self.running),
            mix_mode: self.config.audio.mix_mode,
        };
        match mixer::spawn(ctx) {
            Ok(handle) => self.mixer = Some(handle),
            Err(e) => {
                // Streams roll back by drop, in playback-first order
                self.running.store(false, Ordering::SeqCst);
                drop(streams);
                self.cables = Some((clubdeck, music_in, output));
                return Err(BridgeError::StreamBuildError(e.to_string()));
            }
        }
        self.streams = Some(streams);

        // Idempotent initial volume so the player starts from a known state
        self.music.set_volume(self.config.vad_mpv.normal_volume);

        self.cables = Some((clubdeck, music_in, output));
        let _ = self.event_tx.send(BridgeEvent::Started);
        info!("audio bridge started");
        Ok(())
    }

    fn open_streams(
        &self,
        clubdeck: &ResolvedCable,
        music_in: &ResolvedCable,
        output: &ResolvedCable,
    ) -> BridgeResult<OpenStreams> {
        // Clubdeck capture: native → canonical → fixed chunks → Q_cd
        let q_cd = Arc::clone(&self.q_clubdeck);
        let mut cd_adapter =
            FormatAdapter::new(clubdeck.endpoint.sample_rate, clubdeck.endpoint.channels);
        let mut cd_chunker = Chunker::new(CHUNK_SAMPLES);
        let capture_clubdeck = open_capture(
            &clubdeck.device,
            &clubdeck.endpoint,
            move |data| {
                let canonical = cd_adapter.to_canonical(data);
                cd_chunker.push(canonical, |frame| q_cd.put(frame));
            },
            self.event_tx.clone(),
        )?;

        // Music capture: feeds both the mixer queue and the uplink ring
        let q_mu = Arc::clone(&self.q_music);
        let ring_mu = Arc::clone(&self.ring_music);
        let mut mu_adapter =
            FormatAdapter::new(music_in.endpoint.sample_rate, music_in.endpoint.channels);
        let mut mu_chunker = Chunker::new(CHUNK_SAMPLES);
        let capture_music = open_capture(
            &music_in.device,
            &music_in.endpoint,
            move |data| {
                let canonical = mu_adapter.to_canonical(data);
                ring_mu.write(canonical);
                mu_chunker.push(canonical, |frame| q_mu.put(frame));
            },
            self.event_tx.clone(),
        )?;

        // Clubdeck-bound playback: pulled by the output device clock
        let mut uplink = UplinkSynthesizer::new(
            Arc::clone(&self.ring_browser),
            Arc::clone(&self.ring_music),
            &output.endpoint,
            self.config.audio.mix_mode,
        );
        let playback = open_playback(
            &output.device,
            &output.endpoint,
            move |out| uplink.fill(out),
            self.event_tx.clone(),
        )?;

        Ok(OpenStreams {
            playback,
            capture_clubdeck,
            capture_music,
        })
    }

    /// Orderly stop. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping audio bridge");

        // Restore the player volume before anything else goes away
        self.music.stop();

        if let Some(handle) = self.mixer.take() {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("mixer thread refused to exit - abandoning it");
            }
        }

        // Playback drops first (struct field order), then the captures
        self.streams = None;

        self.q_clubdeck.clear();
        self.q_music.clear();
        self.q_downlink.clear();
        self.ring_browser.clear();
        self.ring_music.clear();

        let _ = self.event_tx.send(BridgeEvent::Stopped);
        info!("audio bridge stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Event stream (stream errors, device loss).
    pub fn events(&self) -> Receiver<BridgeEvent> {
        self.event_rx.clone()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The mixed downlink queue, consumed by the WebSocket broadcaster.
    pub fn downlink_queue(&self) -> Arc<FrameQueue> {
        Arc::clone(&self.q_downlink)
    }

    /// The browser microphone ring, fed by the WebSocket intake.
    pub fn browser_ring(&self) -> Arc<RingBuffer> {
        Arc::clone(&self.ring_browser)
    }

    pub fn levels(&self) -> Arc<SharedLevels> {
        Arc::clone(&self.levels)
    }

    pub fn music(&self) -> MusicController {
        self.music.clone()
    }

    /// Saturation counters across all queues and rings.
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            queue_drops: self.q_clubdeck.drops() + self.q_music.drops() + self.q_downlink.drops(),
            ring_overwrites: self.ring_browser.overwrites() + self.ring_music.overwrites(),
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CableConfig;

    fn config_with_bogus_devices() -> BridgeConfig {
        BridgeConfig {
            cables: CableConfig {
                clubdeck_input_device_id: Some(100_000),
                mpv_input_device_id: Some(100_001),
                browser_output_device_id: Some(100_002),
            },
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn test_new_rejects_unset_cables() {
        let err = match Bridge::new(BridgeConfig::default()) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(err.to_string().contains("clubdeck_input_device_id"));
    }

    #[test]
    fn test_new_names_offending_device_option() {
        // Device index 100000 cannot exist; whatever the host answers,
        // the diagnostic must name the option that caused it
        let err = match Bridge::new(config_with_bogus_devices()) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(
            err.to_string().contains("cables.clubdeck_input_device_id"),
            "got: {err}"
        );
    }

    // Hardware-dependent tests - run with: cargo test -- --ignored

    #[test]
    #[ignore = "requires three virtual cable devices"]
    fn test_start_stop_cycle() {
        let config = BridgeConfig {
            cables: CableConfig {
                clubdeck_input_device_id: Some(0),
                mpv_input_device_id: Some(0),
                browser_output_device_id: Some(0),
            },
            ..BridgeConfig::default()
        };

        let mut bridge = Bridge::new(config).unwrap();
        bridge.start().unwrap();
        assert!(bridge.is_running());

        bridge.stop();
        assert!(!bridge.is_running());
    }
}
