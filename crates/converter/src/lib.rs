//! wav2mp3
//!
//! Batch converter that turns every WAV file in a directory into an MP3 next to
//! it, spreading the files over a pool of worker threads.

pub mod concurrency;
pub mod dispatcher;
pub mod encode;
pub mod jobs;
pub mod probe;
pub mod report;
pub mod runner;
pub mod worker;

pub use concurrency::{derive_plan, ConcurrencyPlan};
pub use dispatcher::{CancelFlag, DispatchError, DispatchSummary, Dispatcher};
pub use encode::{
    EncodeError, EncoderFactory, EncoderParams, LameEncoder, LameFactory, PcmEncoder,
};
pub use jobs::{Job, JobIndex, JobList, JobStatus};
pub use probe::{probe_directory, HeaderError, ProbeError, WavHeader, WavInfo};
pub use report::{JobOutcome, RunReport, WorkerStats};
pub use runner::{RunError, Runner};
pub use wav2mp3_config as config;
pub use wav2mp3_config::Config;
pub use worker::{convert_job, encode_stream, ConvertStats, JobError, Worker};
