//! Audio Stream Management
//!
//! Low-level CPAL stream setup for the three cables. Capture streams push
//! device-native int16 buffers into a caller-supplied callback; the
//! playback stream pulls via a fill callback.
//!
//! # Real-time contract
//!
//! Callbacks run on audio host threads. They may take the ring-buffer and
//! queue locks (memcpy-sized critical sections) but never wait on I/O or
//! on locks held by non-realtime code. Host errors are reported through
//! the event channel and logged; they never panic the audio thread.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, Stream, StreamConfig as CpalStreamConfig};
use crossbeam_channel::Sender;
use tracing::warn;

use crate::device::Endpoint;
use crate::error::{BridgeError, BridgeResult};
use crate::message::BridgeEvent;
use crate::CHUNK_FRAMES;

/// An open capture stream. Dropping the handle closes the device.
pub struct CaptureStream {
    // Held alive to keep audio flowing; no methods are called on it.
    #[allow(dead_code)]
    stream: Stream,
}

/// An open playback stream. Dropping the handle closes the device.
pub struct PlaybackStream {
    #[allow(dead_code)]
    stream: Stream,
}

fn cpal_config(endpoint: &Endpoint) -> CpalStreamConfig {
    CpalStreamConfig {
        channels: endpoint.channels,
        sample_rate: SampleRate(endpoint.sample_rate),
        buffer_size: BufferSize::Fixed(CHUNK_FRAMES as u32),
    }
}

/// Error callback shared by all three streams.
///
/// Device disappearance is fatal for the whole bridge; anything else is
/// logged and the stream keeps going if the host lets it.
fn error_handler(
    endpoint: &Endpoint,
    events: Sender<BridgeEvent>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    let option = endpoint.option.clone();
    move |err| {
        warn!(endpoint = %option, error = %err, "audio stream error");
        let event = match err {
            cpal::StreamError::DeviceNotAvailable => BridgeEvent::DeviceLost {
                endpoint: option.clone(),
                message: err.to_string(),
            },
            _ => BridgeEvent::StreamError {
                endpoint: option.clone(),
                message: err.to_string(),
            },
        };
        let _ = events.try_send(event);
    }
}

/// Open a capture stream delivering device-native int16 buffers.
pub fn open_capture(
    device: &Device,
    endpoint: &Endpoint,
    mut on_frame: impl FnMut(&[i16]) + Send + 'static,
    events: Sender<BridgeEvent>,
) -> BridgeResult<CaptureStream> {
    let config = cpal_config(endpoint);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                on_frame(data);
            },
            error_handler(endpoint, events),
            None,
        )
        .map_err(|e| BridgeError::DeviceOpenError {
            option: endpoint.option.clone(),
            reason: e.to_string(),
        })?;

    stream
        .play()
        .map_err(|e| BridgeError::StreamPlayError(e.to_string()))?;

    Ok(CaptureStream { stream })
}

/// Open a playback stream pulling device-native int16 buffers.
///
/// `on_fill` must fill the buffer completely; the uplink synthesizer
/// zero-pads internally, so a partial fill cannot happen.
pub fn open_playback(
    device: &Device,
    endpoint: &Endpoint,
    mut on_fill: impl FnMut(&mut [i16]) + Send + 'static,
    events: Sender<BridgeEvent>,
) -> BridgeResult<PlaybackStream> {
    let config = cpal_config(endpoint);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                on_fill(data);
            },
            error_handler(endpoint, events),
            None,
        )
        .map_err(|e| BridgeError::DeviceOpenError {
            option: endpoint.option.clone(),
            reason: e.to_string(),
        })?;

    stream
        .play()
        .map_err(|e| BridgeError::StreamPlayError(e.to_string()))?;

    Ok(PlaybackStream { stream })
}
