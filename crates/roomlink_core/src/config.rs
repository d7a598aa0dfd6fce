//! Bridge Configuration
//!
//! Loaded from `roomlink.json` - either a path given on the command line,
//! `./roomlink.json`, or the platform config directory.
//!
//! # Storage Locations (fallback)
//! - Linux: `~/.config/roomlink/roomlink.json`
//! - Windows: `%APPDATA%\roomlink\roomlink.json`
//! - macOS: `~/Library/Application Support/roomlink/roomlink.json`

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BridgeError, BridgeResult};

/// Whether browsers may talk back into the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplexMode {
    /// Browsers only listen; `audio_data` frames are ignored.
    Half,
    /// Browsers listen and their microphones feed the room.
    Full,
}

/// HTTP/WebSocket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Audio routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub duplex_mode: DuplexMode,

    /// When false the music source is ignored: the downlink equals the
    /// Clubdeck capture and the uplink mixes the browser mic with silence.
    pub mix_mode: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duplex_mode: DuplexMode::Full,
            mix_mode: true,
        }
    }
}

/// The three virtual cable endpoints, as host device indices.
///
/// All three are required; there is no sensible default for a device index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CableConfig {
    /// Loopback carrying the Clubdeck room audio (capture).
    pub clubdeck_input_device_id: Option<usize>,

    /// Loopback carrying the music player output (capture).
    pub mpv_input_device_id: Option<usize>,

    /// Cable feeding the Clubdeck microphone input (playback).
    pub browser_output_device_id: Option<usize>,
}

/// Music ducking driven by room speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MpvVadConfig {
    pub mpv_ducking_enabled: bool,
    pub normal_volume: u8,
    pub ducking_volume: u8,
    pub ducking_min_duration: f32,
    pub ducking_release_time: f32,
    pub ducking_transition_time: f32,
}

impl Default for MpvVadConfig {
    fn default() -> Self {
        Self {
            mpv_ducking_enabled: true,
            normal_volume: 100,
            ducking_volume: 15,
            ducking_min_duration: 0.1,
            ducking_release_time: 0.5,
            ducking_transition_time: 0.1,
        }
    }
}

/// Server-side downlink ducking driven by browser microphones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserVadConfig {
    pub browser_ducking_enabled: bool,

    /// Peak amplitude (int16 units) above which a mic frame counts as speech.
    pub ducking_threshold: f32,

    /// Downlink gain while a browser speaks.
    pub ducking_gain: f32,
}

impl Default for BrowserVadConfig {
    fn default() -> Self {
        Self {
            browser_ducking_enabled: false,
            ducking_threshold: 150.0,
            ducking_gain: 0.15,
        }
    }
}

/// External music player control channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MpvConfig {
    pub enabled: bool,
    pub pipe: String,
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pipe: default_pipe_path(),
        }
    }
}

/// Platform default for the player's IPC pipe.
pub fn default_pipe_path() -> String {
    #[cfg(windows)]
    {
        r"\\.\pipe\mpv-pipe".to_string()
    }
    #[cfg(not(windows))]
    {
        "/tmp/mpv-pipe".to_string()
    }
}

/// Cross-origin policy for the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: Vec::new(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub cables: CableConfig,
    pub vad_mpv: MpvVadConfig,
    pub vad_browser: BrowserVadConfig,
    pub mpv: MpvConfig,
    pub cors: CorsConfig,
}

impl BridgeConfig {
    /// Load configuration from `path`, or from the default locations.
    ///
    /// A missing file is a startup error: the cable device ids cannot be
    /// guessed and running with silent defaults would open the wrong
    /// devices.
    pub fn load(path: Option<&Path>) -> BridgeResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::find_config_file().ok_or_else(|| {
                BridgeError::ConfigError(
                    "no roomlink.json found - pass a path or create one next to the binary"
                        .to_string(),
                )
            })?,
        };

        let file = fs::File::open(&path).map_err(|e| {
            BridgeError::ConfigError(format!("cannot open {}: {e}", path.display()))
        })?;

        let config: BridgeConfig = serde_json::from_reader(file).map_err(|e| {
            BridgeError::ConfigError(format!("cannot parse {}: {e}", path.display()))
        })?;

        info!("Configuration loaded from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Check the parts that would otherwise fail deep inside startup.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.cables.clubdeck_input_device_id.is_none() {
            return Err(BridgeError::ConfigError(
                "cables.clubdeck_input_device_id is not set".to_string(),
            ));
        }
        if self.cables.mpv_input_device_id.is_none() {
            return Err(BridgeError::ConfigError(
                "cables.mpv_input_device_id is not set".to_string(),
            ));
        }
        if self.cables.browser_output_device_id.is_none() {
            return Err(BridgeError::ConfigError(
                "cables.browser_output_device_id is not set".to_string(),
            ));
        }

        if self.vad_mpv.normal_volume > 100 || self.vad_mpv.ducking_volume > 100 {
            return Err(BridgeError::ConfigError(
                "vad_mpv volumes must be in 0-100".to_string(),
            ));
        }
        if self.vad_mpv.ducking_min_duration <= 0.0 || self.vad_mpv.ducking_release_time <= 0.0 {
            return Err(BridgeError::ConfigError(
                "vad_mpv durations must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.vad_browser.ducking_gain) {
            return Err(BridgeError::ConfigError(
                "vad_browser.ducking_gain must be in 0.0-1.0".to_string(),
            ));
        }

        Ok(())
    }

    fn find_config_file() -> Option<PathBuf> {
        let local = PathBuf::from("roomlink.json");
        if local.exists() {
            return Some(local);
        }

        ProjectDirs::from("net", "roomlink", "roomlink")
            .map(|proj| proj.config_dir().join("roomlink.json"))
            .filter(|p| p.exists())
    }
}
