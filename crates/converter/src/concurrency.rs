//! Concurrency planning module for wav2mp3
//!
//! Derives the worker thread count from configuration and the host's reported
//! hardware concurrency.

use crate::config::Config;

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyPlan {
    /// Logical cores reported by the host (at least 1)
    pub detected_threads: usize,
    /// Worker threads to spawn
    pub workers: usize,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan from configuration
    ///
    /// Uses the explicit `workers.count` when non-zero, otherwise one worker per
    /// logical core as reported by num_cpus.
    pub fn derive(cfg: &Config) -> Self {
        Self::with_detected(cfg, num_cpus::get())
    }

    /// Derive a plan against a given detected core count
    pub fn with_detected(cfg: &Config, detected: usize) -> Self {
        // A host that reports zero cores still gets one worker
        let detected_threads = detected.max(1);

        let workers = if cfg.workers.count > 0 {
            cfg.workers.count as usize
        } else {
            detected_threads
        };

        Self {
            detected_threads,
            workers,
        }
    }
}

/// Public function to derive a concurrency plan from configuration
pub fn derive_plan(cfg: &Config) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(cfg)
}
