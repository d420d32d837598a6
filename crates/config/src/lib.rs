//! wav2mp3 configuration
//!
//! `[workers]` and `[encoder]` tables read from TOML, with `WAV2MP3_*`
//! environment variables layered on top.

pub mod config;

pub use config::{
    ChannelMode, Config, ConfigError, EncoderConfig, WorkersConfig, MAX_QUALITY, MAX_WORKERS,
};
