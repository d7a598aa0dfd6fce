//! Roomlink Core - Audio Bridge Engine
//!
//! This crate provides the real-time audio engine for Roomlink, including:
//! - Device I/O over the three virtual cables (via CPAL)
//! - Format adaptation between device-native and canonical audio
//! - Lossy ring buffers and drop-oldest frame queues for thread hand-off
//! - The downlink mixer and the uplink synthesizer
//! - Music-player volume control over a named pipe
//!
//! # Architecture
//!
//! ```text
//! [Clubdeck loopback]──capture──▶ Q_cd ──┐
//!                                        ├──▶ mixer ──▶ Q_down ──▶ (WebSocket layer)
//! [Music loopback]   ──capture──▶ Q_mu ──┤
//!                              └─▶ Ring_mu                │
//!                                        ┌──▶ Ring_br ◀───┘ (browser mic frames)
//! uplink(Ring_br + 0.3×Ring_mu) ──playback──▶ [Clubdeck input cable]
//!
//! VAD on Q_cd ──▶ music controller ──named pipe──▶ external player
//! ```
//!
//! Frames cross thread boundaries through bounded queues and ring buffers
//! only; the audio host callbacks never block on non-realtime code.

mod adapter;
mod config;
mod device;
mod engine;
mod error;
mod levels;
mod message;
mod mixer;
mod music;
mod queue;
mod ring;
mod stream;
mod uplink;

pub use adapter::{Chunker, FormatAdapter};
pub use config::{
    AudioConfig, BridgeConfig, BrowserVadConfig, CableConfig, CorsConfig, DuplexMode,
    MpvConfig, MpvVadConfig, ServerConfig,
};
pub use device::{list_devices, Direction, DeviceInfo, Endpoint};
pub use engine::{Bridge, BridgeStats};
pub use error::{BridgeError, BridgeResult};
pub use levels::SharedLevels;
pub use message::BridgeEvent;
pub use music::{MpvPipe, MusicController, NullSink, VolumeSink};
pub use queue::FrameQueue;
pub use ring::RingBuffer;

/// Canonical sample rate - everything internal runs at 48 kHz.
pub const SAMPLE_RATE: u32 = 48_000;

/// Canonical channel count (interleaved stereo).
pub const CHANNELS: u16 = 2;

/// Frames per audio chunk. One chunk is ~10.7 ms at 48 kHz.
pub const CHUNK_FRAMES: usize = 512;

/// Samples per canonical chunk (frames × channels).
pub const CHUNK_SAMPLES: usize = CHUNK_FRAMES * CHANNELS as usize;

/// Ring buffer capacity: 0.5 s of canonical stereo.
pub const RING_CAPACITY: usize = 48_000;

/// Frame queue capacity: ~2 s of chunks.
pub const QUEUE_CAPACITY: usize = 200;

/// Music attenuation on the uplink - the spoken voice must dominate.
pub const MUSIC_UPLINK_GAIN: f32 = 0.3;

/// A block of canonical interleaved int16 samples. Immutable once enqueued.
pub type Frame = Vec<i16>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_constants() {
        assert_eq!(CHUNK_SAMPLES, 1024);
        // One chunk is 2048 bytes on the wire
        assert_eq!(CHUNK_SAMPLES * 2, 2048);
        // Ring holds half a second of stereo
        assert_eq!(RING_CAPACITY, SAMPLE_RATE as usize * CHANNELS as usize / 2);
    }
}
