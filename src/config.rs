//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, RECOGNIZER_API_KEY, ...)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub transcoder: TranscoderConfig,
    pub recognizer: RecognizerConfig,
    pub storage: StorageConfig,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Canonical PCM format and queue sizing for the streaming pipeline.
///
/// ## Fields:
/// - `sample_rate`: output rate of the transcoder and input rate of the
///   recognizer session (16 kHz canonical)
/// - `frame_bytes`: fixed PCM frame size read from the transcoder output;
///   3200 bytes is 100 ms of s16le mono at 16 kHz
/// - `queue_capacity`: bounded frame queue depth between the transcoder
///   reader and the recognizer feeder; 50 frames is about 5 seconds of audio.
///   A full queue blocks the producer; that backpressure is the intended
///   degradation mode, frames are never dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frame_bytes: usize,
    pub queue_capacity: usize,
}

/// External transcoder process configuration.
///
/// ## Fields:
/// - `binary`: executable launched once per session
/// - `args`: argument template; the `{sample_rate}` token is replaced at
///   spawn time
/// - `shutdown_grace_secs`: how long to wait for the process to exit after
///   its input is closed before escalating
/// - `kill_grace_secs`: how long to wait after a kill signal before giving up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    pub binary: String,
    pub args: Vec<String>,
    pub shutdown_grace_secs: u64,
    pub kill_grace_secs: u64,
}

/// Streaming recognizer connection settings.
///
/// The API credential is read from the `RECOGNIZER_API_KEY` environment
/// variable (or `recognizer.api_key` in config.toml). An empty credential is
/// allowed: the recognizer connection will fail at session start and the
/// session degrades to archival-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    pub endpoint: String,
    pub api_key: String,
    pub poll_interval_ms: u64,
    pub shutdown_grace_secs: u64,
}

/// Persistent storage for raw session recordings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub recordings_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            audio: AudioConfig {
                sample_rate: 16_000,
                frame_bytes: 3200,
                queue_capacity: 50,
            },
            transcoder: TranscoderConfig {
                binary: "ffmpeg".to_string(),
                args: default_transcoder_args(),
                shutdown_grace_secs: 5,
                kill_grace_secs: 1,
            },
            recognizer: RecognizerConfig {
                endpoint: "wss://streaming.assemblyai.com/v3/ws".to_string(),
                api_key: String::new(),
                poll_interval_ms: 10,
                shutdown_grace_secs: 5,
            },
            storage: StorageConfig {
                recordings_dir: "recordings".to_string(),
            },
        }
    }
}

/// Low-latency decode to raw PCM s16le mono on stdout, compressed container
/// on stdin. The buffering flags matter: without them ffmpeg batches output
/// and frames arrive seconds after the corresponding input.
fn default_transcoder_args() -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-fflags",
        "nobuffer",
        "-flags",
        "low_delay",
        "-probesize",
        "32",
        "-analyzeduration",
        "0",
        "-i",
        "pipe:0",
        "-f",
        "s16le",
        "-acodec",
        "pcm_s16le",
        "-ac",
        "1",
        "-ar",
        "{sample_rate}",
        "pipe:1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and the environment.
    ///
    /// `HOST`, `PORT`, and `RECOGNIZER_API_KEY` are honored without the
    /// `APP_` prefix because deployment platforms and recognizer SDK
    /// conventions set them that way.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("RECOGNIZER_API_KEY") {
            settings = settings.set_override("recognizer.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.frame_bytes == 0 || self.audio.frame_bytes % 2 != 0 {
            // Frames carry 16-bit samples, so an odd size would split one.
            return Err(anyhow::anyhow!(
                "PCM frame size must be a positive even number of bytes"
            ));
        }

        if self.audio.queue_capacity == 0 {
            return Err(anyhow::anyhow!("Frame queue capacity must be greater than 0"));
        }

        if self.transcoder.binary.is_empty() {
            return Err(anyhow::anyhow!("Transcoder binary must not be empty"));
        }

        if self.recognizer.endpoint.is_empty() {
            return Err(anyhow::anyhow!("Recognizer endpoint must not be empty"));
        }

        if self.storage.recordings_dir.is_empty() {
            return Err(anyhow::anyhow!("Recordings directory must not be empty"));
        }

        Ok(())
    }

    /// Copy of the configuration safe to expose over HTTP: the recognizer
    /// credential is masked.
    pub fn redacted(&self) -> AppConfig {
        let mut copy = self.clone();
        if !copy.recognizer.api_key.is_empty() {
            copy.recognizer.api_key = "***".to_string();
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.audio.frame_bytes, 3200);
        assert_eq!(config.audio.queue_capacity, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_port_zero() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_odd_frame_size() {
        let mut config = AppConfig::default();
        config.audio.frame_bytes = 3201;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_queue() {
        let mut config = AppConfig::default();
        config.audio.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transcoder_args_contain_canonical_format() {
        let config = AppConfig::default();
        let args = config.transcoder.args;
        assert!(args.contains(&"s16le".to_string()));
        assert!(args.contains(&"{sample_rate}".to_string()));
        assert!(args.contains(&"pipe:0".to_string()));
        assert!(args.contains(&"pipe:1".to_string()));
    }

    #[test]
    fn test_redacted_masks_api_key() {
        let mut config = AppConfig::default();
        config.recognizer.api_key = "secret-key".to_string();
        let redacted = config.redacted();
        assert_eq!(redacted.recognizer.api_key, "***");
        // An empty credential stays empty so the health view shows it unset.
        let empty = AppConfig::default().redacted();
        assert_eq!(empty.recognizer.api_key, "");
    }
}
