//! Configuration types for the voice bridge.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Realtime session settings.
    pub live: LiveConfig,
    /// Admin allow-list settings.
    pub admin: AdminConfig,
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz (the rate the remote session expects).
    pub input_sample_rate: u32,
    /// Playback sample rate in Hz (the rate the remote session synthesizes at).
    pub output_sample_rate: u32,
    /// Samples per outbound frame at the capture rate.
    pub frame_samples: usize,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            frame_samples: 4096,
            input_device: None,
            output_device: None,
        }
    }
}

/// Realtime conversational session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// WebSocket endpoint of the realtime model service.
    pub endpoint: String,
    /// Model identifier sent in the session setup.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Prebuilt synthesized-voice selection token.
    pub voice: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint:
                "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent"
                    .to_owned(),
            model: "gemini-2.5-flash-native-audio-preview-09-2025".to_owned(),
            api_key_env: "GEMINI_API_KEY".to_owned(),
            voice: "Fenrir".to_owned(),
        }
    }
}

/// Admin allow-list configuration.
///
/// Admin capability is a client-side email check only; there is no server-side
/// role enforcement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Emails allowed to open the admin surface.
    pub admin_emails: Vec<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::BridgeError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BridgeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (`~/.config/istakip/config.toml`).
    ///
    /// Override the directory with the `ISTAKIP_CONFIG_DIR` environment variable.
    pub fn default_config_path() -> PathBuf {
        if let Some(dir) = std::env::var_os("ISTAKIP_CONFIG_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        dirs::config_dir()
            .map(|d| d.join("istakip").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("/tmp/istakip-config/config.toml"))
    }

    /// Resolve the API key for the realtime session from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured variable is unset or empty.
    pub fn api_key(&self) -> crate::error::Result<String> {
        match std::env::var(&self.live.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(crate::error::BridgeError::Config(format!(
                "{} is not set",
                self.live.api_key_env
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert_eq!(config.audio.output_sample_rate, 24_000);
        assert_eq!(config.audio.frame_samples, 4096);
        assert_eq!(config.live.voice, "Fenrir");
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let toml_str = r#"
            [audio]
            input_device = "USB Microphone"
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.audio.input_device.as_deref(), Some("USB Microphone"));
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert!(config.admin.admin_emails.is_empty());
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.admin.admin_emails.push("patron@ornek.com".to_owned());
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.admin.admin_emails, vec!["patron@ornek.com"]);
        assert_eq!(loaded.live.model, config.live.model);
    }
}
