//! Encoding modules for wav2mp3
//!
//! [`EncoderFactory`] and [`PcmEncoder`] are the seam between the worker and the
//! MP3 library. [`LameFactory`] is the production implementation.

pub mod lame;

pub use lame::{LameEncoder, LameFactory};

use crate::config::{ChannelMode, EncoderConfig};
use crate::jobs::Job;
use thiserror::Error;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Encoder could not be configured
    #[error("Encoder setup failed: {0}")]
    Build(String),

    /// Encoder rejected a PCM buffer
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Final drain failed
    #[error("Flush failed: {0}")]
    Flush(String),

    /// Channel mode does not fit the input channel count
    #[error("Channel mode {mode} cannot encode {channels}-channel input")]
    UnsupportedMode { mode: ChannelMode, channels: u16 },

    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u16),

    #[error("Quality {0} is outside 0-9")]
    UnsupportedQuality(u8),

    /// Resampling is not supported
    #[error("Cannot resample {input} Hz input to {output} Hz")]
    UnsupportedSampleRate { input: u32, output: u32 },
}

/// Channel layout of the encoded stream, after resolving [`ChannelMode::Auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Mono,
    Stereo,
    JointStereo,
}

/// Resolves the configured mode against the input channel count.
///
/// `Auto` picks mono for one channel and stereo for two. Forcing a mode that
/// does not match the channel count is an error.
pub fn resolve_mode(mode: ChannelMode, channels: u16) -> Result<StreamMode, EncodeError> {
    match (mode, channels) {
        (ChannelMode::Auto, 1) | (ChannelMode::Mono, 1) => Ok(StreamMode::Mono),
        (ChannelMode::Auto, 2) | (ChannelMode::Stereo, 2) => Ok(StreamMode::Stereo),
        (ChannelMode::JointStereo, 2) => Ok(StreamMode::JointStereo),
        (_, 1) | (_, 2) => Err(EncodeError::UnsupportedMode { mode, channels }),
        (_, other) => Err(EncodeError::UnsupportedChannels(other)),
    }
}

/// Parameters an encoder is initialised with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderParams {
    /// 1 or 2; PCM passed to [`PcmEncoder::encode`] is interleaved when 2
    pub channels: u16,
    pub input_sample_rate: u32,
    /// Requested output rate; 0 leaves the choice to the library
    pub output_sample_rate: u32,
    /// 0 (best) to 9 (worst); the VBR level when `vbr` is set
    pub quality: u8,
    pub mode: ChannelMode,
    pub vbr: bool,
}

impl EncoderParams {
    /// Build parameters for a job using the configured encoder settings
    pub fn for_job(job: &Job, cfg: &EncoderConfig) -> Self {
        Self {
            channels: job.channel_count,
            input_sample_rate: job.sample_rate,
            output_sample_rate: cfg.output_sample_rate,
            quality: cfg.quality,
            mode: cfg.mode,
            vbr: cfg.vbr,
        }
    }
}

/// A streaming PCM to MP3 encoder. Dropping it releases the library state.
pub trait PcmEncoder {
    /// Encodes interleaved 16-bit samples, appending MP3 bytes to `out`.
    ///
    /// Returns the number of bytes appended, which may be zero while the
    /// encoder buffers internally.
    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) -> Result<usize, EncodeError>;

    /// Drains buffered audio at end of stream, appending to `out`.
    fn flush(&mut self, out: &mut Vec<u8>) -> Result<usize, EncodeError>;
}

/// Creates one encoder per job. Shared by all worker threads.
pub trait EncoderFactory: Sync {
    type Encoder: PcmEncoder;

    fn initialize(&self, params: &EncoderParams) -> Result<Self::Encoder, EncodeError>;
}

/// Encodes a complete in-memory PCM buffer.
pub fn encode_pcm<F: EncoderFactory>(
    factory: &F,
    params: &EncoderParams,
    pcm: &[i16],
) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = factory.initialize(params)?;
    let mut out = Vec::new();
    encoder.encode(pcm, &mut out)?;
    encoder.flush(&mut out)?;
    Ok(out)
}
