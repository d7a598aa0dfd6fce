//! Bridge Event Types
//!
//! Events flow from the audio threads to the process supervisor. There is
//! no command channel: the bridge is controlled through `Bridge` methods
//! from the thread that owns it.

/// Events sent from the audio side to whoever supervises the bridge.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// All streams are open and the mixer is running.
    Started,

    /// Orderly stop completed.
    Stopped,

    /// A stream reported a host error but may keep running.
    StreamError { endpoint: String, message: String },

    /// A device went away at runtime. Fatal: the supervisor should stop
    /// the bridge and exit non-zero so the operator can reconfigure.
    DeviceLost { endpoint: String, message: String },
}

impl BridgeEvent {
    /// Whether this event must terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeEvent::DeviceLost { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(BridgeEvent::DeviceLost {
            endpoint: "cables.clubdeck_input_device_id".into(),
            message: "unplugged".into(),
        }
        .is_fatal());

        assert!(!BridgeEvent::Started.is_fatal());
        assert!(!BridgeEvent::StreamError {
            endpoint: "x".into(),
            message: "y".into(),
        }
        .is_fatal());
    }
}
