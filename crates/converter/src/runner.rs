//! Run orchestration for wav2mp3
//!
//! Probes the directory, builds the job list, spawns the worker pool, waits for
//! every job to settle and joins the workers before anything shared is dropped.

use crate::concurrency::{derive_plan, ConcurrencyPlan};
use crate::config::{Config, ConfigError};
use crate::dispatcher::{CancelFlag, Dispatcher};
use crate::encode::{EncoderFactory, LameFactory};
use crate::jobs::JobList;
use crate::probe::{probe_directory, ProbeError};
use crate::report::RunReport;
use crate::worker::Worker;
use std::path::Path;
use std::thread;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

/// Error type for run-level failures. Per-job failures never surface here.
#[derive(Debug, Error)]
pub enum RunError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Target path is missing or not a directory
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Not a single worker thread could be started
    #[error("Failed to spawn worker threads: {0}")]
    Spawn(std::io::Error),
}

/// Runs conversions with a fixed worker pool
pub struct Runner<F = LameFactory> {
    /// Configuration loaded from file and environment
    pub config: Config,
    /// Derived concurrency plan
    pub plan: ConcurrencyPlan,
    factory: F,
    cancel: CancelFlag,
}

impl Runner<LameFactory> {
    /// Create a runner that encodes with LAME
    pub fn new(config: Config) -> Result<Self, RunError> {
        Self::with_factory(config, LameFactory)
    }
}

impl<F: EncoderFactory> Runner<F> {
    /// Create a runner with a custom encoder factory
    pub fn with_factory(config: Config, factory: F) -> Result<Self, RunError> {
        config.validate()?;
        let plan = derive_plan(&config);
        Ok(Self {
            config,
            plan,
            factory,
            cancel: CancelFlag::new(),
        })
    }

    /// Handle that stops the run between claims when cancelled
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Convert every valid WAV file in `dir`
    pub fn run(&self, dir: &Path) -> Result<RunReport, RunError> {
        let started = Instant::now();

        info!(directory = %dir.display(), "checking for WAV files");
        let found = probe_directory(dir)?;
        let jobs = JobList::from_probe(&found);
        info!(count = jobs.len(), "found WAV files");

        self.run_jobs(dir, &jobs, started)
    }

    /// Convert a prepared job list
    pub fn run_jobs(
        &self,
        dir: &Path,
        jobs: &JobList,
        started: Instant,
    ) -> Result<RunReport, RunError> {
        let dispatcher = Dispatcher::with_cancel_flag(jobs.len(), self.cancel.clone());
        // Workers beyond the job count would exit on their first claim
        let worker_count = self.plan.workers.min(jobs.len().max(1));
        info!(
            workers = worker_count,
            planned = self.plan.workers,
            detected = self.plan.detected_threads,
            "starting worker threads"
        );

        let workers = thread::scope(|s| {
            let mut handles = Vec::with_capacity(worker_count);
            let mut spawn_error = None;

            for id in 0..worker_count {
                let worker = Worker::new(id, self.config.encoder.clone());
                let dispatcher = &dispatcher;
                let factory = &self.factory;

                let spawned = thread::Builder::new()
                    .name(format!("wav2mp3-worker-{id}"))
                    .spawn_scoped(s, move || worker.run(jobs, dispatcher, factory));

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        error!(worker = id, error = %e, "failed to spawn worker thread");
                        spawn_error = Some(e);
                    }
                }
            }

            if handles.is_empty() {
                // Nobody would ever claim; release the waiters and bail out.
                dispatcher.cancel();
                return Err(spawn_error);
            }

            dispatcher.wait_until_settled();

            let mut stats = Vec::with_capacity(handles.len());
            for handle in handles {
                match handle.join() {
                    Ok(worker_stats) => stats.push(worker_stats),
                    Err(_) => error!("worker thread panicked"),
                }
            }
            Ok(stats)
        });

        let workers = match workers {
            Ok(stats) => stats,
            Err(Some(e)) => return Err(RunError::Spawn(e)),
            // Zero workers configured only happens with an empty plan
            Err(None) => Vec::new(),
        };

        let summary = dispatcher.summary();
        let cancelled = dispatcher.is_cancelled();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            discovered = summary.total,
            converted = summary.done,
            failed = summary.failed,
            not_started = summary.pending,
            elapsed_ms,
            "run finished"
        );

        Ok(RunReport::assemble(
            dir.to_path_buf(),
            summary,
            workers,
            cancelled,
            elapsed_ms,
        ))
    }
}
