//! Job list module.
//!
//! A job converts one WAV file to one MP3 file. The list is built once from the
//! prober's output and is never resized or reordered afterwards; per-job status
//! is tracked by the [`Dispatcher`](crate::dispatcher::Dispatcher).
//!
//! Destinations are unique within a list: `take.wav` and `take.wave` in one
//! directory would both map to `take.mp3`, so later sources fall back to their
//! full file name (`take.wave.mp3`).

use crate::probe::WavInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Index;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Extension given to converted files.
pub const MP3_EXTENSION: &str = "mp3";

/// Position of a job in the [`JobList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobIndex(pub usize);

impl std::fmt::Display for JobIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Not yet claimed by any worker.
    #[default]
    Pending,
    /// Claimed by a worker and being converted.
    InProgress,
    /// Converted successfully.
    Done,
    /// Conversion failed; the destination was removed.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state (done or failed).
    pub fn is_settled(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One file conversion task. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Path to the input WAV file.
    pub source_path: PathBuf,
    /// Directory the input was discovered in.
    pub source_directory: PathBuf,
    /// 1 (mono) or 2 (stereo).
    pub channel_count: u16,
    /// Input samples per second.
    pub sample_rate: u32,
    /// Path of the MP3 file to write.
    pub destination_path: PathBuf,
}

impl Job {
    /// Creates a job from a probed WAV file.
    pub fn from_wav(info: &WavInfo) -> Self {
        Self {
            source_path: info.path.clone(),
            source_directory: info.directory.clone(),
            channel_count: info.header.channels,
            sample_rate: info.header.sample_rate,
            destination_path: destination_path(&info.path),
        }
    }
}

/// Derives the output path by replacing the source extension with `mp3`.
///
/// `/audio/take.wav` -> `/audio/take.mp3`
pub fn destination_path(source: &Path) -> PathBuf {
    source.with_extension(MP3_EXTENSION)
}

/// Output path that keeps the whole source file name.
///
/// `/audio/take.wave` -> `/audio/take.wave.mp3`
pub fn fallback_destination_path(source: &Path) -> PathBuf {
    let mut name = source.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(MP3_EXTENSION);
    source.with_file_name(name)
}

/// Ordered, fixed-size list of jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobList {
    jobs: Vec<Job>,
}

impl JobList {
    /// Builds the list from probed files, preserving their order.
    ///
    /// A source whose destination is already taken by an earlier job writes
    /// to [`fallback_destination_path`] instead. If that is taken too the
    /// source is left out.
    pub fn from_probe(found: &[WavInfo]) -> Self {
        let mut taken = HashSet::with_capacity(found.len());
        let mut jobs = Vec::with_capacity(found.len());

        for info in found {
            let mut job = Job::from_wav(info);

            if taken.contains(&job.destination_path) {
                let fallback = fallback_destination_path(&info.path);
                if taken.contains(&fallback) {
                    warn!(
                        source = %info.path.display(),
                        "no free destination name, skipping"
                    );
                    continue;
                }
                warn!(
                    source = %info.path.display(),
                    taken = %job.destination_path.display(),
                    destination = %fallback.display(),
                    "destination already used by another source"
                );
                job.destination_path = fallback;
            }

            taken.insert(job.destination_path.clone());
            jobs.push(job);
        }

        Self { jobs }
    }

    /// Builds the list from prepared jobs.
    pub fn new(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, index: JobIndex) -> Option<&Job> {
        self.jobs.get(index.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (JobIndex, &Job)> {
        self.jobs.iter().enumerate().map(|(i, job)| (JobIndex(i), job))
    }
}

impl Index<JobIndex> for JobList {
    type Output = Job;

    fn index(&self, index: JobIndex) -> &Job {
        &self.jobs[index.0]
    }
}
