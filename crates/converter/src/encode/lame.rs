//! LAME encoder module for wav2mp3
//!
//! Drives libmp3lame through the `mp3lame-encoder` bindings, in VBR mode unless
//! disabled. No ID3 tags are written, so identical input produces identical
//! output.

use super::{resolve_mode, EncodeError, EncoderFactory, EncoderParams, PcmEncoder, StreamMode};
use mp3lame_encoder::{Builder, FlushNoGap, InterleavedPcm, Mode, MonoPcm, Quality, VbrMode};

/// Space LAME needs for a final flush.
const FLUSH_BUFFER_SIZE: usize = 7200;

fn lame_quality(quality: u8) -> Result<Quality, EncodeError> {
    let quality = match quality {
        0 => Quality::Best,
        1 => Quality::SecondBest,
        2 => Quality::NearBest,
        3 => Quality::VeryNice,
        4 => Quality::Nice,
        5 => Quality::Good,
        6 => Quality::Decent,
        7 => Quality::Ok,
        8 => Quality::SecondWorst,
        9 => Quality::Worst,
        other => return Err(EncodeError::UnsupportedQuality(other)),
    };
    Ok(quality)
}

fn lame_mode(mode: StreamMode) -> Mode {
    match mode {
        StreamMode::Mono => Mode::Mono,
        StreamMode::Stereo => Mode::Stereo,
        StreamMode::JointStereo => Mode::JointStereo,
    }
}

/// Builds [`LameEncoder`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LameFactory;

impl EncoderFactory for LameFactory {
    type Encoder = LameEncoder;

    fn initialize(&self, params: &EncoderParams) -> Result<LameEncoder, EncodeError> {
        LameEncoder::new(params)
    }
}

/// One LAME encoding session.
pub struct LameEncoder {
    inner: mp3lame_encoder::Encoder,
    channels: u16,
}

impl LameEncoder {
    pub fn new(params: &EncoderParams) -> Result<Self, EncodeError> {
        let mode = resolve_mode(params.mode, params.channels)?;
        let quality = lame_quality(params.quality)?;

        if params.output_sample_rate != 0 && params.output_sample_rate != params.input_sample_rate
        {
            return Err(EncodeError::UnsupportedSampleRate {
                input: params.input_sample_rate,
                output: params.output_sample_rate,
            });
        }

        let mut builder = Builder::new()
            .ok_or_else(|| EncodeError::Build("lame_init returned null".to_string()))?;
        builder
            .set_num_channels(params.channels as u8)
            .map_err(|e| EncodeError::Build(format!("channels: {:?}", e)))?;
        builder
            .set_sample_rate(params.input_sample_rate)
            .map_err(|e| EncodeError::Build(format!("sample rate: {:?}", e)))?;
        builder
            .set_mode(lame_mode(mode))
            .map_err(|e| EncodeError::Build(format!("mode: {:?}", e)))?;
        builder
            .set_quality(quality)
            .map_err(|e| EncodeError::Build(format!("quality: {:?}", e)))?;

        if params.vbr {
            builder
                .set_vbr_mode(VbrMode::Mtrh)
                .map_err(|e| EncodeError::Build(format!("vbr mode: {:?}", e)))?;
            builder
                .set_vbr_quality(lame_quality(params.quality)?)
                .map_err(|e| EncodeError::Build(format!("vbr quality: {:?}", e)))?;
        }

        let inner = builder
            .build()
            .map_err(|e| EncodeError::Build(format!("{:?}", e)))?;

        Ok(Self {
            inner,
            channels: params.channels,
        })
    }
}

impl PcmEncoder for LameEncoder {
    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if pcm.is_empty() {
            return Ok(0);
        }

        let frames = pcm.len() / usize::from(self.channels);
        out.reserve(mp3lame_encoder::max_required_buffer_size(frames));

        let written = if self.channels == 1 {
            self.inner.encode_to_vec(MonoPcm(pcm), out)
        } else {
            self.inner.encode_to_vec(InterleavedPcm(pcm), out)
        };

        written.map_err(|e| EncodeError::Encode(format!("{:?}", e)))
    }

    fn flush(&mut self, out: &mut Vec<u8>) -> Result<usize, EncodeError> {
        out.reserve(FLUSH_BUFFER_SIZE);
        self.inner
            .flush_to_vec::<FlushNoGap>(out)
            .map_err(|e| EncodeError::Flush(format!("{:?}", e)))
    }
}
