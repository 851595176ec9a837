//! Configuration management for the viewer
//!
//! Provides loading, saving and validation of the options a viewer session is
//! started with: which channel to join, what media to send, how to negotiate
//! ICE, and how often to poll connection statistics.

use crate::errors::SessionError;
use crate::types::TrackKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    pub channel: ChannelConfig,
    pub media: MediaConfig,
    pub network: NetworkConfig,
    pub stats: StatsConfig,
}

/// Signaling channel identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Region used to build the default STUN endpoint
    pub region: String,
    /// Name of the signaling channel to join
    pub channel_name: String,
    /// Client id announced to the master
    pub client_id: String,
}

/// Local media options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConfig {
    pub send_video: bool,
    pub send_audio: bool,
    /// 1280x720 when set, 640x480 otherwise
    pub widescreen: bool,
    pub open_data_channel: bool,
}

/// ICE negotiation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Stream candidates as they are generated instead of waiting for gathering to finish
    pub use_trickle_ice: bool,
    /// Restrict transport to relay candidates only
    pub force_turn: bool,
    /// Suppress every STUN/TURN server
    pub nat_traversal_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Statistics poll interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig {
                region: "us-west-2".to_string(),
                channel_name: String::new(),
                client_id: generate_client_id(),
            },
            media: MediaConfig {
                send_video: true,
                send_audio: true,
                widescreen: true,
                open_data_channel: false,
            },
            network: NetworkConfig {
                use_trickle_ice: true,
                force_turn: false,
                nat_traversal_disabled: false,
            },
            stats: StatsConfig {
                poll_interval_ms: 1000,
            },
        }
    }
}

/// Random client id in the same shape the signaling service hands out
pub fn generate_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..10].to_uppercase()
}

/// Ideal capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const WIDESCREEN: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
    pub const STANDARD: Resolution = Resolution {
        width: 640,
        height: 480,
    };
}

/// What the capture capability is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// `None` means no video is requested
    pub video: Option<Resolution>,
    pub audio: bool,
}

impl MediaConstraints {
    pub fn requests_nothing(&self) -> bool {
        self.video.is_none() && !self.audio
    }

    pub fn requests(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio,
            TrackKind::Video => self.video.is_some(),
        }
    }
}

impl ViewerConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            SessionError::InvalidConfig(format!("Failed to read config file: {}", e))
        })?;

        let config: ViewerConfig = toml::from_str(&contents).map_err(|e| {
            SessionError::InvalidConfig(format!("Failed to parse config file: {}", e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SessionError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SessionError::InvalidConfig(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            SessionError::InvalidConfig(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            SessionError::InvalidConfig(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("rtc-viewer.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.channel.region.trim().is_empty() {
            return Err(SessionError::InvalidConfig("Region must not be empty".to_string()));
        }
        if self.channel.channel_name.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "Channel name must not be empty".to_string(),
            ));
        }
        if self.channel.client_id.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "Client id must not be empty".to_string(),
            ));
        }
        if self.stats.poll_interval_ms == 0 {
            return Err(SessionError::InvalidConfig(
                "Stats poll interval must be at least 1 ms".to_string(),
            ));
        }
        if self.network.force_turn && self.network.nat_traversal_disabled {
            log::warn!("force_turn has no relay servers to use while NAT traversal is disabled");
        }
        Ok(())
    }

    pub fn media_constraints(&self) -> MediaConstraints {
        let resolution = if self.media.widescreen {
            Resolution::WIDESCREEN
        } else {
            Resolution::STANDARD
        };
        MediaConstraints {
            video: self.media.send_video.then_some(resolution),
            audio: self.media.send_audio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named() -> ViewerConfig {
        let mut config = ViewerConfig::default();
        config.channel.channel_name = "front-door".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = ViewerConfig::default();
        assert!(config.network.use_trickle_ice);
        assert_eq!(config.stats.poll_interval_ms, 1000);
        assert_eq!(config.channel.client_id.len(), 10);
    }

    #[test]
    fn test_config_validation() {
        assert!(named().validate().is_ok());

        // default has no channel name
        assert!(ViewerConfig::default().validate().is_err());

        let mut bad = named();
        bad.stats.poll_interval_ms = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_media_constraints() {
        let mut config = named();
        assert_eq!(
            config.media_constraints(),
            MediaConstraints {
                video: Some(Resolution::WIDESCREEN),
                audio: true
            }
        );

        config.media.widescreen = false;
        assert_eq!(config.media_constraints().video, Some(Resolution::STANDARD));

        config.media.send_video = false;
        config.media.send_audio = false;
        assert!(config.media_constraints().requests_nothing());
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = toml::to_string_pretty(&named()).unwrap();
        assert!(toml_string.contains("[channel]"));
        assert!(toml_string.contains("[media]"));
        assert!(toml_string.contains("[network]"));
        assert!(toml_string.contains("[stats]"));
        assert!(toml_string.contains("use_trickle_ice"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ViewerConfig::load_from_file("nonexistent_viewer_config.toml");
        assert!(result.is_ok());
        assert_eq!(result.unwrap().stats.poll_interval_ms, 1000);
    }
}
