//! Configuration management
//!
//! JSON file at `$XDG_CONFIG_HOME/speak-anywhere/config.json`. Every key is
//! optional; a missing or malformed file yields the defaults. The daemon
//! never writes the file.

use serde::Deserialize;
use speak_anywhere_ipc::paths;
use std::path::Path;
use tracing::warn;

/// Remote speech-to-text backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend family. Only `"lan"` (a network whisper server) is known.
    #[serde(rename = "type")]
    pub backend_type: String,

    /// Base URL of the speech service.
    pub url: String,

    /// Request dialect: `"whisper.cpp"` or `"openai"`.
    pub api_format: String,

    /// Language hint forwarded to the service.
    pub language: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: "lan".to_string(),
            url: "http://localhost:8080".to_string(),
            api_format: "whisper.cpp".to_string(),
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Delivery used when a command carries no `output` field.
    #[serde(rename = "default")]
    pub default_method: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_method: "clipboard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Capture rate in Hz.
    pub sample_rate: u32,

    /// Longest recording the ring buffer can hold.
    pub max_seconds: u32,
}

impl AudioSettings {
    /// Ring buffer capacity: `max_seconds × sample_rate × 2` bytes.
    pub fn ring_buffer_bytes(&self) -> usize {
        self.max_seconds as usize * self.sample_rate as usize * 2
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            max_seconds: 120,
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub output: OutputConfig,
    pub audio: AudioSettings,

    /// CLI agent names recognized under terminal windows.
    pub agents: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            output: OutputConfig::default(),
            audio: AudioSettings::default(),
            agents: vec![
                "claude".to_string(),
                "aider".to_string(),
                "gh".to_string(),
                "cursor".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load from an explicit path; any problem logs a warning and falls back
    /// to defaults.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("config: could not read {}: {e}, using defaults", path.display());
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                warn!("config: parse error in {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Load from the XDG config location, defaults when the file is absent.
    pub fn load_default() -> Self {
        let path = paths::config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Self::default()
        }
    }
}
