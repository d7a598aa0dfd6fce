//! Shared Server State
//!
//! The connection registry plus handles into the audio side. The peer map
//! mutex is held only to mutate or snapshot the set - never across I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::Message;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use uuid::Uuid;

use roomlink_core::{
    BridgeConfig, BrowserVadConfig, CorsConfig, DuplexMode, FrameQueue, RingBuffer,
    ServerConfig, SharedLevels,
};

/// Broadcast frames a browser must stay loud for after its last
/// above-threshold mic frame (~300 ms).
pub const SPEAKING_DECAY_MAX: u32 = 30;

/// Outbound frames buffered per client before frames are dropped.
const PEER_SEND_BUFFER: usize = 32;

/// One connected browser client.
pub struct Peer {
    pub id: Uuid,

    /// Outbound channel drained by the connection's send task.
    pub tx: mpsc::Sender<Message>,

    /// True while this client's microphone is considered active.
    pub speaking: AtomicBool,

    /// Broadcast frames left until `speaking` releases.
    pub decay: AtomicU32,

    pub connected_at: Instant,
    pub last_mic_at: Mutex<Option<Instant>>,
}

impl Peer {
    /// Mark a mic frame from this client; `loud` means above the ducking
    /// threshold.
    pub fn note_mic_frame(&self, loud: bool) {
        *self.last_mic_at.lock() = Some(Instant::now());
        if loud {
            self.speaking.store(true, Ordering::Relaxed);
            self.decay.store(SPEAKING_DECAY_MAX, Ordering::Relaxed);
        }
    }
}

/// State shared between the HTTP surface, the WebSocket connections and
/// the broadcast thread.
pub struct ServerState {
    peers: Mutex<HashMap<Uuid, Arc<Peer>>>,

    pub ring_browser: Arc<RingBuffer>,
    pub q_downlink: Arc<FrameQueue>,
    pub levels: Arc<SharedLevels>,

    /// Raw PCM fan-out for the `/stream` WAV endpoint.
    pub pcm_tx: broadcast::Sender<Vec<u8>>,

    pub duplex_mode: DuplexMode,
    pub browser_vad: BrowserVadConfig,
    pub server_config: ServerConfig,
    pub cors: CorsConfig,

    /// Cleared once at shutdown; the broadcaster exits on its next poll.
    pub running: Arc<AtomicBool>,
}

impl ServerState {
    pub fn new(
        config: &BridgeConfig,
        q_downlink: Arc<FrameQueue>,
        ring_browser: Arc<RingBuffer>,
        levels: Arc<SharedLevels>,
    ) -> Self {
        let (pcm_tx, _) = broadcast::channel(64);
        Self {
            peers: Mutex::new(HashMap::new()),
            ring_browser,
            q_downlink,
            levels,
            pcm_tx,
            duplex_mode: config.audio.duplex_mode,
            browser_vad: config.vad_browser.clone(),
            server_config: config.server.clone(),
            cors: config.cors.clone(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Register a new connection and return its record.
    pub fn register(&self) -> (Arc<Peer>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(PEER_SEND_BUFFER);
        let peer = Arc::new(Peer {
            id: Uuid::new_v4(),
            tx,
            speaking: AtomicBool::new(false),
            decay: AtomicU32::new(0),
            connected_at: Instant::now(),
            last_mic_at: Mutex::new(None),
        });

        self.peers.lock().insert(peer.id, Arc::clone(&peer));
        (peer, rx)
    }

    /// Remove a connection record. Idempotent.
    pub fn unregister(&self, id: Uuid) {
        if self.peers.lock().remove(&id).is_some() {
            info!(client = %id, "browser disconnected");
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    /// Snapshot the connection list. The mutex is released before any
    /// frame dispatch happens.
    pub fn snapshot_peers(&self) -> Vec<Arc<Peer>> {
        self.peers.lock().values().cloned().collect()
    }

    /// Advance per-connection decay counters by one broadcast frame and
    /// report whether anybody is still speaking.
    pub fn tick_speakers(&self) -> bool {
        let peers = self.peers.lock();
        let mut any = false;
        for peer in peers.values() {
            if peer.speaking.load(Ordering::Relaxed) {
                let decay = peer.decay.load(Ordering::Relaxed);
                if decay == 0 {
                    peer.speaking.store(false, Ordering::Relaxed);
                } else {
                    peer.decay.store(decay - 1, Ordering::Relaxed);
                    any = true;
                }
            }
        }
        any
    }
}
