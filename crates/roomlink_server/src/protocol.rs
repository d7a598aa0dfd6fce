//! WebSocket Wire Protocol
//!
//! JSON text frames of the form `{"event": "...", "data": {...}}`. Audio
//! payloads are base64 of interleaved int16 LE stereo at 48 kHz.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use roomlink_core::DuplexMode;

/// A client sent something we cannot use. The message is dropped; the
/// connection stays.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid base64 audio payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("audio payload has odd byte count {0}")]
    OddByteCount(usize),
}

/// Server → client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent once on connect.
    Connected {
        client_id: Uuid,
        duplex_mode: DuplexMode,
    },

    /// Reply to `get_config`.
    Config { duplex_mode: DuplexMode },

    /// One mixed downlink chunk.
    AudioFromClubdeck {
        audio: String,
        sample_rate: u32,
        channels: u16,
    },
}

/// Client → server events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    GetConfig,

    /// One microphone chunk. Ignored in half duplex.
    AudioData { audio: String },

    /// Routing hints; accepted but not acted on.
    JoinRoom { room: String },
    LeaveRoom { room: String },
}

/// Encode a canonical frame as base64 of its little-endian bytes.
pub fn encode_frame(samples: &[i16]) -> String {
    BASE64.encode(frame_to_bytes(samples))
}

/// Interleaved int16 → little-endian byte stream.
pub fn frame_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// Decode a base64 audio payload back into int16 samples.
pub fn decode_frame(audio: &str) -> Result<Vec<i16>, ProtocolError> {
    let bytes = BASE64.decode(audio)?;
    if bytes.len() % 2 != 0 {
        return Err(ProtocolError::OddByteCount(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let samples: Vec<i16> = vec![0, 1, -1, i16::MAX, i16::MIN, 12345, -12345];
        let encoded = encode_frame(&samples);
        assert_eq!(decode_frame(&encoded).unwrap(), samples);
    }

    #[test]
    fn test_chunk_wire_size() {
        // One canonical chunk is 1024 samples = 2048 bytes before base64
        let samples = vec![0i16; 1024];
        assert_eq!(frame_to_bytes(&samples).len(), 2048);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_frame("not base64!!!"),
            Err(ProtocolError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_decode_rejects_odd_byte_count() {
        let encoded = BASE64.encode([1u8, 2, 3]);
        assert!(matches!(
            decode_frame(&encoded),
            Err(ProtocolError::OddByteCount(3))
        ));
    }

    #[test]
    fn test_little_endian_layout() {
        let encoded = encode_frame(&[0x0102]);
        let bytes = BASE64.decode(encoded).unwrap();
        assert_eq!(bytes, vec![0x02, 0x01]);
    }

    #[test]
    fn test_server_event_wire_shape() {
        let event = ServerEvent::AudioFromClubdeck {
            audio: "AAAA".to_string(),
            sample_rate: 48_000,
            channels: 2,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"audio_from_clubdeck\""));
        assert!(json.contains("\"sample_rate\":48000"));
    }

    #[test]
    fn test_client_event_parsing() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"audio_data","data":{"audio":"AAAA"}}"#).unwrap();
        assert!(matches!(event, ClientEvent::AudioData { .. }));

        let event: ClientEvent = serde_json::from_str(r#"{"event":"get_config"}"#).unwrap();
        assert!(matches!(event, ClientEvent::GetConfig));

        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"join_room","data":{"room":"main"}}"#).unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { .. }));
    }

    #[test]
    fn test_malformed_client_event_is_an_error() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"no_such_event"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>("not json at all").is_err());
    }
}
