// Configuration loading and parsing (feed.toml, playback.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub feed: FeedConfig,
    pub playback: PlaybackConfig,
    pub voice: VoiceConfig,
}

// ---------------------------------------------------------------------------
// feed.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[feed]` table in feed.toml.
#[derive(Debug, Clone, Deserialize)]
struct FeedFile {
    feed: FeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// REST base for the match list and commentary history endpoints.
    pub api_base_url: String,
    /// WebSocket base for the live commentary stream.
    pub stream_base_url: String,
    /// Commentary languages offered to the user.
    pub languages: Vec<String>,
    pub default_language: String,
    /// Lines per commentary history page.
    pub page_size: usize,
}

// ---------------------------------------------------------------------------
// playback.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire playback.toml file.
#[derive(Debug, Clone, Deserialize)]
struct PlaybackFile {
    playback: PlaybackConfig,
    voice: VoiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// Seconds between throttle ticks; one pending line is released per tick.
    pub throttle_period_secs: u64,
    /// Bound on the pending-line queue (drop-oldest when full).
    pub pending_queue_capacity: usize,
}

impl PlaybackConfig {
    pub fn throttle_period(&self) -> Duration {
        Duration::from_secs(self.throttle_period_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    /// Whether spoken playback starts enabled (toggleable at runtime).
    pub enabled: bool,
    pub speech_url: String,
    pub voice: String,
    pub tone: String,
    /// Bound on a single speech-synthesis call, in seconds.
    pub timeout_secs: u64,
}

impl VoiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/feed.toml` and
/// `config/playback.toml`, both relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let feed_path = config_dir.join("feed.toml");
    let feed_text = read_file(&feed_path)?;
    let feed_file: FeedFile = toml::from_str(&feed_text).map_err(|e| ConfigError::ParseError {
        path: feed_path.clone(),
        source: e,
    })?;

    let playback_path = config_dir.join("playback.toml");
    let playback_text = read_file(&playback_path)?;
    let playback_file: PlaybackFile =
        toml::from_str(&playback_text).map_err(|e| ConfigError::ParseError {
            path: playback_path.clone(),
            source: e,
        })?;

    let config = Config {
        feed: feed_file.feed,
        playback: playback_file.playback,
        voice: playback_file.voice,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    const FILES: &[&str] = &["feed.toml", "playback.toml"];

    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    for name in FILES {
        let source = defaults_dir.join(name);
        let target = config_dir.join(name);
        if !source.is_file() || target.exists() {
            continue;
        }
        std::fs::copy(&source, &target).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to copy {} to {}: {e}", source.display(), target.display()),
        })?;
        copied.push(target);
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let feed = &config.feed;
    if !feed.api_base_url.starts_with("http://") && !feed.api_base_url.starts_with("https://") {
        return Err(ConfigError::ValidationError {
            field: "feed.api_base_url".into(),
            message: format!("must be an http(s) URL, got `{}`", feed.api_base_url),
        });
    }
    if !feed.stream_base_url.starts_with("ws://") && !feed.stream_base_url.starts_with("wss://") {
        return Err(ConfigError::ValidationError {
            field: "feed.stream_base_url".into(),
            message: format!("must be a ws(s) URL, got `{}`", feed.stream_base_url),
        });
    }
    if feed.languages.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "feed.languages".into(),
            message: "must list at least one language".into(),
        });
    }
    if !feed.languages.contains(&feed.default_language) {
        return Err(ConfigError::ValidationError {
            field: "feed.default_language".into(),
            message: format!(
                "`{}` is not among feed.languages {:?}",
                feed.default_language, feed.languages
            ),
        });
    }
    if feed.page_size == 0 {
        return Err(ConfigError::ValidationError {
            field: "feed.page_size".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.playback.throttle_period_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "playback.throttle_period_secs".into(),
            message: "must be greater than 0".into(),
        });
    }
    if config.playback.pending_queue_capacity == 0 {
        return Err(ConfigError::ValidationError {
            field: "playback.pending_queue_capacity".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.voice.timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "voice.timeout_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
