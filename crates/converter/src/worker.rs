//! Worker module for wav2mp3
//!
//! A worker claims jobs from the [`Dispatcher`] until none are left and runs the
//! single-file pipeline for each: read PCM in fixed-size chunks after the WAV
//! header, encode each chunk, write the MP3 bytes, flush the encoder at end of
//! input. A failing job is marked failed and its partial output removed; the
//! worker then moves on to the next claim.

use crate::config::EncoderConfig;
use crate::dispatcher::Dispatcher;
use crate::encode::{EncodeError, EncoderFactory, EncoderParams, PcmEncoder};
use crate::jobs::{Job, JobIndex, JobList, JobStatus};
use crate::probe::HEADER_LEN;
use crate::report::{JobOutcome, WorkerStats};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Bytes per 16-bit PCM sample.
const SAMPLE_BYTES: usize = 2;

/// Error type for a single job
#[derive(Debug, Error)]
pub enum JobError {
    /// Source WAV could not be opened
    #[error("cannot open source {path}: {source}")]
    OpenSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Destination MP3 could not be created
    #[error("cannot create destination {path}: {source}")]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read PCM data: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write MP3 data: {0}")]
    Write(#[source] io::Error),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Counters for one converted file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvertStats {
    /// PCM frames (one sample per channel) consumed
    pub frames_read: u64,
    /// MP3 bytes written
    pub bytes_written: u64,
}

/// Fills `buf` from `reader`, stopping early only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Streams PCM from `reader` through `encoder` into `writer`.
///
/// `reader` must be positioned at the first sample. Chunks hold
/// `chunk_frames` interleaved frames; a trailing partial frame is dropped.
pub fn encode_stream<R, W, E>(
    reader: &mut R,
    writer: &mut W,
    encoder: &mut E,
    channels: u16,
    chunk_frames: usize,
) -> Result<ConvertStats, JobError>
where
    R: Read,
    W: Write,
    E: PcmEncoder,
{
    let frame_bytes = usize::from(channels) * SAMPLE_BYTES;
    let mut raw = vec![0u8; chunk_frames.max(1) * frame_bytes];
    let mut pcm: Vec<i16> = Vec::with_capacity(raw.len() / SAMPLE_BYTES);
    let mut mp3 = Vec::new();
    let mut stats = ConvertStats::default();

    loop {
        let filled = read_full(reader, &mut raw).map_err(JobError::Read)?;
        let usable = filled - filled % frame_bytes;

        if usable > 0 {
            pcm.clear();
            pcm.extend(
                raw[..usable]
                    .chunks_exact(SAMPLE_BYTES)
                    .map(|b| i16::from_le_bytes([b[0], b[1]])),
            );

            mp3.clear();
            encoder.encode(&pcm, &mut mp3)?;
            writer.write_all(&mp3).map_err(JobError::Write)?;

            stats.frames_read += (usable / frame_bytes) as u64;
            stats.bytes_written += mp3.len() as u64;
        }

        if filled < raw.len() {
            break;
        }
    }

    mp3.clear();
    encoder.flush(&mut mp3)?;
    writer.write_all(&mp3).map_err(JobError::Write)?;
    writer.flush().map_err(JobError::Write)?;
    stats.bytes_written += mp3.len() as u64;

    Ok(stats)
}

/// Converts one WAV file to MP3.
///
/// The destination is created only after the source opened and the encoder
/// initialised. On any later failure the partial destination is removed.
pub fn convert_job<F: EncoderFactory>(
    job: &Job,
    factory: &F,
    cfg: &EncoderConfig,
) -> Result<ConvertStats, JobError> {
    let source = File::open(&job.source_path).map_err(|source| JobError::OpenSource {
        path: job.source_path.clone(),
        source,
    })?;
    let mut reader = BufReader::new(source);

    // Skip the header; a file shorter than the header has no audio to read
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).map_err(JobError::Read)?;

    let mut encoder = factory.initialize(&EncoderParams::for_job(job, cfg))?;

    let destination =
        File::create(&job.destination_path).map_err(|source| JobError::CreateDestination {
            path: job.destination_path.clone(),
            source,
        })?;
    let mut writer = BufWriter::new(destination);

    let result = encode_stream(
        &mut reader,
        &mut writer,
        &mut encoder,
        job.channel_count,
        cfg.chunk_frames,
    );

    if result.is_err() {
        drop(writer);
        if let Err(e) = fs::remove_file(&job.destination_path) {
            debug!(path = %job.destination_path.display(), error = %e, "could not remove partial output");
        }
    }

    result
}

/// Settles a claimed job as failed unless it was settled explicitly, so a
/// panicking conversion cannot leave the job in progress forever.
struct ClaimGuard<'a> {
    dispatcher: &'a Dispatcher,
    index: JobIndex,
    armed: bool,
}

impl<'a> ClaimGuard<'a> {
    fn new(dispatcher: &'a Dispatcher, index: JobIndex) -> Self {
        Self {
            dispatcher,
            index,
            armed: true,
        }
    }

    fn settle(mut self, status: JobStatus) {
        self.armed = false;
        let result = match status {
            JobStatus::Done => self.dispatcher.complete(self.index),
            _ => self.dispatcher.fail(self.index),
        };
        if let Err(e) = result {
            warn!(job = %self.index, error = %e, "could not settle job");
        }
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.dispatcher.fail(self.index) {
                warn!(job = %self.index, error = %e, "could not settle job");
            }
        }
    }
}

/// Cancels the run when a worker unwinds, so the jobs it would have claimed
/// do not keep the coordinating thread waiting.
struct CancelOnPanic<'a> {
    dispatcher: &'a Dispatcher,
    worker: usize,
}

impl Drop for CancelOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(worker = self.worker, "worker panicked, cancelling the run");
            self.dispatcher.cancel();
        }
    }
}

/// A unit of concurrent execution
#[derive(Debug, Clone)]
pub struct Worker {
    pub id: usize,
    encoder: EncoderConfig,
}

impl Worker {
    pub fn new(id: usize, encoder: EncoderConfig) -> Self {
        Self { id, encoder }
    }

    /// Claim and convert jobs until the dispatcher has none left
    pub fn run<F: EncoderFactory>(
        &self,
        jobs: &JobList,
        dispatcher: &Dispatcher,
        factory: &F,
    ) -> WorkerStats {
        let mut stats = WorkerStats::new(self.id);
        let _cancel_on_panic = CancelOnPanic {
            dispatcher,
            worker: self.id,
        };
        debug!(worker = self.id, "worker started");

        while let Some(index) = dispatcher.try_claim() {
            let guard = ClaimGuard::new(dispatcher, index);

            let Some(job) = jobs.get(index) else {
                warn!(worker = self.id, job = %index, "claimed job is not in the job list");
                guard.settle(JobStatus::Failed);
                continue;
            };

            info!(
                worker = self.id,
                job = %index,
                source = %job.source_path.display(),
                destination = %job.destination_path.display(),
                "converting"
            );

            let started = Instant::now();
            let result = convert_job(job, factory, &self.encoder);
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let outcome = match result {
                Ok(converted) => {
                    guard.settle(JobStatus::Done);
                    info!(
                        worker = self.id,
                        job = %index,
                        frames = converted.frames_read,
                        bytes = converted.bytes_written,
                        elapsed_ms,
                        "converted"
                    );
                    JobOutcome {
                        index,
                        worker: self.id,
                        source_path: job.source_path.clone(),
                        destination_path: job.destination_path.clone(),
                        status: JobStatus::Done,
                        frames_read: converted.frames_read,
                        bytes_written: converted.bytes_written,
                        elapsed_ms,
                        error: None,
                    }
                }
                Err(e) => {
                    guard.settle(JobStatus::Failed);
                    warn!(
                        worker = self.id,
                        job = %index,
                        source = %job.source_path.display(),
                        error = %e,
                        "conversion failed"
                    );
                    JobOutcome {
                        index,
                        worker: self.id,
                        source_path: job.source_path.clone(),
                        destination_path: job.destination_path.clone(),
                        status: JobStatus::Failed,
                        frames_read: 0,
                        bytes_written: 0,
                        elapsed_ms,
                        error: Some(e.to_string()),
                    }
                }
            };

            stats.record(outcome);
        }

        if dispatcher.is_cancelled() {
            info!(worker = self.id, "worker stopping, run cancelled");
        } else {
            debug!(worker = self.id, claimed = stats.claimed, "no more work, worker exiting");
        }

        stats
    }
}
