//! Prober module for discovering WAV files in a directory.
//!
//! Scans a single directory level for WAV candidates and validates each one by
//! reading the fixed-offset fields of its RIFF header.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// WAV file extensions recognised by the prober (case-insensitive matching).
pub const WAV_EXTENSIONS: &[&str] = &[".wav", ".wave"];

/// Size of the canonical PCM WAV header. Audio payload starts here.
pub const HEADER_LEN: usize = 44;

/// Container tag expected at bytes 8-11.
const FORMAT_MARKER: &[u8; 4] = b"WAVE";

/// Error type for directory probing
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Path does not exist or cannot be accessed
    #[error("cannot access {path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Path exists but is not a directory
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    /// Directory listing failed part way through
    #[error("failed to read directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Reasons a header is rejected. Files with an invalid header are skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("header is {0} bytes, expected at least 44")]
    TooShort(usize),

    #[error("missing WAVE marker at offset 8")]
    BadMarker,

    #[error("unsupported channel count {0}")]
    UnsupportedChannels(u16),

    #[error("sample rate is zero")]
    ZeroSampleRate,
}

/// Format fields read from a WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    /// 1 (mono) or 2 (stereo)
    pub channels: u16,
    /// Samples per second
    pub sample_rate: u32,
}

/// A validated WAV file discovered during probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavInfo {
    /// Full path to the WAV file.
    pub path: PathBuf,
    /// Directory the file was found in.
    pub directory: PathBuf,
    /// Header fields.
    pub header: WavHeader,
}

/// Checks if a file has a WAV extension (case-insensitive).
pub fn is_wav_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            WAV_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Parses the fixed-offset fields of a WAV header.
///
/// - bytes 8-11: `WAVE`
/// - bytes 22-23: channel count, little-endian
/// - bytes 24-27: sample rate, little-endian
pub fn parse_header(bytes: &[u8]) -> Result<WavHeader, HeaderError> {
    if bytes.len() < HEADER_LEN {
        return Err(HeaderError::TooShort(bytes.len()));
    }

    if &bytes[8..12] != FORMAT_MARKER {
        return Err(HeaderError::BadMarker);
    }

    let channels = u16::from_le_bytes([bytes[22], bytes[23]]);
    if !(1..=2).contains(&channels) {
        return Err(HeaderError::UnsupportedChannels(channels));
    }

    let sample_rate = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
    if sample_rate == 0 {
        return Err(HeaderError::ZeroSampleRate);
    }

    Ok(WavHeader {
        channels,
        sample_rate,
    })
}

/// Reads and parses the header of a single file.
///
/// The outer error is an I/O failure, the inner one an invalid header.
pub fn read_header(path: &Path) -> io::Result<Result<WavHeader, HeaderError>> {
    let mut file = File::open(path)?;
    let mut buf = Vec::with_capacity(HEADER_LEN);
    file.by_ref().take(HEADER_LEN as u64).read_to_end(&mut buf)?;
    Ok(parse_header(&buf))
}

/// Scans `dir` (non-recursively) for valid WAV files.
///
/// Results are ordered by file name. Candidates with an invalid header or
/// that cannot be read are skipped.
pub fn probe_directory(dir: &Path) -> Result<Vec<WavInfo>, ProbeError> {
    use walkdir::WalkDir;

    let metadata = std::fs::metadata(dir).map_err(|source| ProbeError::Path {
        path: dir.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(ProbeError::NotADirectory(dir.to_path_buf()));
    }

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    let mut found = Vec::new();

    for entry in walker {
        let entry = entry.map_err(|source| ProbeError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        if !entry.file_type().is_file() || !is_wav_file(path) {
            continue;
        }

        match read_header(path) {
            Ok(Ok(header)) => found.push(WavInfo {
                path: path.to_path_buf(),
                directory: dir.to_path_buf(),
                header,
            }),
            Ok(Err(reason)) => {
                debug!(path = %path.display(), %reason, "skipping invalid WAV file");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read WAV header, skipping");
            }
        }
    }

    Ok(found)
}
