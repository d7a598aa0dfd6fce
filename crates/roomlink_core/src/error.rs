//! Bridge Error Types

use thiserror::Error;

/// Errors that can occur in the audio bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("No audio devices found on this host")]
    NoDevicesFound,

    #[error("{option}: no audio device with index {index}")]
    DeviceNotFound { option: String, index: usize },

    #[error("{option}: cannot open device ({reason})")]
    DeviceOpenError { option: String, reason: String },

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to play audio stream: {0}")]
    StreamPlayError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Bridge already running")]
    AlreadyRunning,

    #[error("Bridge not running")]
    NotRunning,

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,

    #[error("DSP error: {0}")]
    DspError(#[from] roomlink_dsp::DspError),
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_offending_option() {
        let err = BridgeError::DeviceNotFound {
            option: "cables.browser_output_device_id".into(),
            index: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("cables.browser_output_device_id"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_error_from_dsp() {
        let dsp_err = roomlink_dsp::DspError::InvalidGainStep(0.0);
        let bridge_err: BridgeError = dsp_err.into();
        assert!(matches!(bridge_err, BridgeError::DspError(_)));
    }
}
