//! Audio Device Resolution and Enumeration
//!
//! The three cables are addressed by host device index in the config file.
//! Resolution happens once at startup and fails fast with the offending
//! config option in the diagnostic.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BridgeError, BridgeResult};

/// Stream direction for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Capture,
    Playback,
}

/// Immutable descriptor of one cable endpoint, resolved at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host device index (position in the device enumeration).
    pub device_index: usize,

    /// Device-native sample rate.
    pub sample_rate: u32,

    /// Device-native channel count.
    pub channels: u16,

    pub direction: Direction,

    /// Config option this endpoint came from, for diagnostics.
    pub option: String,
}

/// One row of `--list-devices` output.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub input_channels: u16,
    pub output_channels: u16,
    pub default_sample_rate: u32,
}

/// Resolve a configured device index into a device handle and endpoint.
///
/// `option` is the dotted config key (e.g. `cables.mpv_input_device_id`)
/// and appears verbatim in any error so the operator knows what to fix.
pub fn resolve_endpoint(
    option: &str,
    index: usize,
    direction: Direction,
) -> BridgeResult<(cpal::Device, Endpoint)> {
    let host = cpal::default_host();

    let device = host
        .devices()
        .map_err(|e| BridgeError::DeviceOpenError {
            option: option.to_string(),
            reason: e.to_string(),
        })?
        .nth(index)
        .ok_or_else(|| BridgeError::DeviceNotFound {
            option: option.to_string(),
            index,
        })?;

    let config = match direction {
        Direction::Capture => device.default_input_config(),
        Direction::Playback => device.default_output_config(),
    }
    .map_err(|e| BridgeError::DeviceOpenError {
        option: option.to_string(),
        reason: format!(
            "device {index} has no default {} config: {e}",
            match direction {
                Direction::Capture => "input",
                Direction::Playback => "output",
            }
        ),
    })?;

    let endpoint = Endpoint {
        device_index: index,
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
        direction,
        option: option.to_string(),
    };

    info!(
        option,
        index,
        name = device.name().unwrap_or_else(|_| "<unknown>".into()),
        rate = endpoint.sample_rate,
        channels = endpoint.channels,
        "Resolved audio endpoint"
    );

    Ok((device, endpoint))
}

/// Enumerate all host devices for the `--list-devices` diagnostic.
pub fn list_devices() -> BridgeResult<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let devices = host.devices().map_err(|e| BridgeError::DeviceOpenError {
        option: "host".to_string(),
        reason: e.to_string(),
    })?;

    let mut out = Vec::new();
    for (index, device) in devices.enumerate() {
        let name = device.name().unwrap_or_else(|_| "<unknown>".into());

        let (input_channels, default_rate_in) = device
            .default_input_config()
            .map(|c| (c.channels(), c.sample_rate().0))
            .unwrap_or((0, 0));
        let (output_channels, default_rate_out) = device
            .default_output_config()
            .map(|c| (c.channels(), c.sample_rate().0))
            .unwrap_or((0, 0));

        out.push(DeviceInfo {
            index,
            name,
            input_channels,
            output_channels,
            default_sample_rate: default_rate_in.max(default_rate_out),
        });
    }

    if out.is_empty() {
        return Err(BridgeError::NoDevicesFound);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_serialization() {
        let endpoint = Endpoint {
            device_index: 7,
            sample_rate: 44_100,
            channels: 2,
            direction: Direction::Capture,
            option: "cables.clubdeck_input_device_id".to_string(),
        };

        let json = serde_json::to_string(&endpoint).unwrap();
        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.device_index, 7);
        assert_eq!(back.direction, Direction::Capture);
    }

    // Hardware-dependent tests - run with: cargo test -- --ignored

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_list_devices() {
        let devices = list_devices().unwrap();
        assert!(!devices.is_empty());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_resolve_out_of_range_index_names_option() {
        let err = match resolve_endpoint("cables.browser_output_device_id", 10_000, Direction::Playback) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(err.to_string().contains("cables.browser_output_device_id"));
    }
}
