//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Highest (worst) LAME quality level accepted.
pub const MAX_QUALITY: u8 = 9;

/// Upper bound for an explicit worker count.
pub const MAX_WORKERS: u32 = 1024;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value parsed but is outside its allowed range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkersConfig {
    /// Number of worker threads (0 = detect hardware concurrency)
    #[serde(default)]
    pub count: u32,
}

/// Channel mode handed to the MP3 encoder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// Mono for one input channel, stereo for two.
    #[default]
    Auto,
    Mono,
    Stereo,
    JointStereo,
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::Auto => write!(f, "auto"),
            ChannelMode::Mono => write!(f, "mono"),
            ChannelMode::Stereo => write!(f, "stereo"),
            ChannelMode::JointStereo => write!(f, "joint_stereo"),
        }
    }
}

impl FromStr for ChannelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ChannelMode::Auto),
            "mono" => Ok(ChannelMode::Mono),
            "stereo" => Ok(ChannelMode::Stereo),
            "joint_stereo" | "joint-stereo" | "joint" => Ok(ChannelMode::JointStereo),
            other => Err(format!(
                "unknown channel mode '{}' (expected auto, mono, stereo or joint_stereo)",
                other
            )),
        }
    }
}

/// Encoder-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// LAME quality, 0 (best) to 9 (worst), default 5
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// Channel mode (default auto)
    #[serde(default)]
    pub mode: ChannelMode,
    /// PCM frames read from the source per encode call
    #[serde(default = "default_chunk_frames")]
    pub chunk_frames: usize,
    /// Output sample rate in Hz (0 = same as input)
    #[serde(default)]
    pub output_sample_rate: u32,
    /// Variable bitrate with `quality` as the VBR level; constant bitrate when off
    #[serde(default = "default_vbr")]
    pub vbr: bool,
}

fn default_quality() -> u8 {
    5
}

fn default_chunk_frames() -> usize {
    8192
}

fn default_vbr() -> bool {
    true
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            mode: ChannelMode::default(),
            chunk_frames: default_chunk_frames(),
            output_sample_rate: 0,
            vbr: default_vbr(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - WAV2MP3_WORKERS -> workers.count
    /// - WAV2MP3_QUALITY -> encoder.quality
    /// - WAV2MP3_MODE -> encoder.mode
    /// - WAV2MP3_CHUNK_FRAMES -> encoder.chunk_frames
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("WAV2MP3_WORKERS") {
            if let Ok(count) = val.parse::<u32>() {
                self.workers.count = count;
            }
        }

        if let Ok(val) = env::var("WAV2MP3_QUALITY") {
            if let Ok(quality) = val.parse::<u8>() {
                self.encoder.quality = quality;
            }
        }

        if let Ok(val) = env::var("WAV2MP3_MODE") {
            if let Ok(mode) = val.parse::<ChannelMode>() {
                self.encoder.mode = mode;
            }
        }

        if let Ok(val) = env::var("WAV2MP3_CHUNK_FRAMES") {
            if let Ok(frames) = val.parse::<usize>() {
                self.encoder.chunk_frames = frames;
            }
        }
    }

    /// Check that every value is within its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.count > MAX_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "workers.count must be at most {}, got {}",
                MAX_WORKERS, self.workers.count
            )));
        }
        if self.encoder.quality > MAX_QUALITY {
            return Err(ConfigError::Invalid(format!(
                "encoder.quality must be between 0 and {}, got {}",
                MAX_QUALITY, self.encoder.quality
            )));
        }
        if self.encoder.chunk_frames == 0 {
            return Err(ConfigError::Invalid(
                "encoder.chunk_frames must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults with environment overrides, for runs without a config file
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("WAV2MP3_WORKERS");
        env::remove_var("WAV2MP3_QUALITY");
        env::remove_var("WAV2MP3_MODE");
        env::remove_var("WAV2MP3_CHUNK_FRAMES");
    }

    fn mode_strategy() -> impl Strategy<Value = ChannelMode> {
        prop_oneof![
            Just(ChannelMode::Auto),
            Just(ChannelMode::Mono),
            Just(ChannelMode::Stereo),
            Just(ChannelMode::JointStereo),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            count in 0u32..256,
            quality in 0u8..=9,
            mode in mode_strategy(),
            chunk_frames in 1usize..65536,
            output_rate in prop_oneof![Just(0u32), Just(22050u32), Just(44100u32), Just(48000u32)],
        ) {
            let toml_str = format!(
                r#"
[workers]
count = {}

[encoder]
quality = {}
mode = "{}"
chunk_frames = {}
output_sample_rate = {}
"#,
                count, quality, mode, chunk_frames, output_rate
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.workers.count, count);
            prop_assert_eq!(config.encoder.quality, quality);
            prop_assert_eq!(config.encoder.mode, mode);
            prop_assert_eq!(config.encoder.chunk_frames, chunk_frames);
            prop_assert_eq!(config.encoder.output_sample_rate, output_rate);
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn prop_env_overrides_worker_count(
            initial in 0u32..64,
            override_count in 0u32..256,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[workers]\ncount = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("WAV2MP3_WORKERS", override_count.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.workers.count, override_count);
        }

        #[test]
        fn prop_env_overrides_quality(
            initial in 0u8..=9,
            override_quality in 0u8..=9,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[encoder]\nquality = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("WAV2MP3_QUALITY", override_quality.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.encoder.quality, override_quality);
        }

        #[test]
        fn prop_quality_above_nine_rejected(quality in 10u8..=255) {
            let mut config = Config::default();
            config.encoder.quality = quality;
            prop_assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.workers.count, 0);
        assert_eq!(config.encoder.quality, 5);
        assert_eq!(config.encoder.mode, ChannelMode::Auto);
        assert_eq!(config.encoder.chunk_frames, 8192);
        assert_eq!(config.encoder.output_sample_rate, 0);
        assert!(config.encoder.vbr);
    }

    #[test]
    fn test_cbr_can_be_selected() {
        let config = Config::parse_toml("[encoder]\nvbr = false\n").unwrap();
        assert!(!config.encoder.vbr);
        assert_eq!(config.encoder.quality, 5);
    }

    #[test]
    fn test_worker_count_cap() {
        let mut config = Config::default();
        config.workers.count = MAX_WORKERS;
        assert!(config.validate().is_ok());

        config.workers.count = MAX_WORKERS + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_huge_worker_count_from_env_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        env::set_var("WAV2MP3_WORKERS", u32::MAX.to_string());
        let config = Config::from_env();
        clear_env_vars();

        assert_eq!(config.workers.count, u32::MAX);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[encoder]
mode = "joint_stereo"
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.encoder.mode, ChannelMode::JointStereo);
        assert_eq!(config.encoder.quality, 5); // default
        assert_eq!(config.workers.count, 0); // default
    }

    #[test]
    fn test_unknown_mode_is_parse_error() {
        let result = Config::parse_toml("[encoder]\nmode = \"surround\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_chunk_frames_rejected() {
        let config = Config::parse_toml("[encoder]\nchunk_frames = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        env::set_var("WAV2MP3_WORKERS", "many");
        env::set_var("WAV2MP3_MODE", "quadraphonic");
        let config = Config::from_env();
        clear_env_vars();

        assert_eq!(config.workers.count, 0);
        assert_eq!(config.encoder.mode, ChannelMode::Auto);
    }

    #[test]
    fn test_mode_env_override_accepts_dashed_form() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        env::set_var("WAV2MP3_MODE", "Joint-Stereo");
        let config = Config::from_env();
        clear_env_vars();

        assert_eq!(config.encoder.mode, ChannelMode::JointStereo);
    }

    #[test]
    fn test_load_from_missing_file_is_io_error() {
        let result = Config::load("/definitely/not/here/wav2mp3.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
