//! Work dispatcher shared by all worker threads.
//!
//! The dispatcher owns the claim cursor and the status flag of every job in a
//! [`JobList`](crate::jobs::JobList). Workers call [`Dispatcher::try_claim`] in a
//! loop until it returns `None`; the coordinating thread blocks in
//! [`Dispatcher::wait_until_settled`] until every job has been settled.
//!
//! All state lives behind one mutex. Claiming advances the cursor and flips the
//! job's status in the same critical section, so a job can never be handed to two
//! workers. Settling a job or requesting cancellation signals a condition
//! variable, so waiting never spins.

use crate::jobs::{JobIndex, JobStatus};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Error type for settling jobs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("job {index} is out of range (job count {len})")]
    OutOfRange { index: JobIndex, len: usize },

    #[error("job {index} is {status}, expected in_progress")]
    NotInProgress { index: JobIndex, status: JobStatus },
}

/// Shared cancellation flag.
///
/// Cloning yields a handle to the same flag. Workers observe it between claims;
/// a job already being converted is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counts of jobs per status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DispatchSummary {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub in_progress: usize,
    /// Jobs never claimed (only non-zero after cancellation).
    pub pending: usize,
}

impl DispatchSummary {
    /// Check if every job reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.done + self.failed == self.total
    }
}

#[derive(Debug)]
struct DispatchState {
    /// Lowest index not yet claimed. Never decreases, never exceeds `statuses.len()`.
    cursor: usize,
    statuses: Vec<JobStatus>,
    in_progress: usize,
    settled: usize,
}

impl DispatchState {
    fn is_idle(&self, cancelled: bool) -> bool {
        self.settled == self.statuses.len() || (cancelled && self.in_progress == 0)
    }

    fn summary(&self) -> DispatchSummary {
        let mut summary = DispatchSummary {
            total: self.statuses.len(),
            ..DispatchSummary::default()
        };
        for status in &self.statuses {
            match status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::InProgress => summary.in_progress += 1,
                JobStatus::Done => summary.done += 1,
                JobStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

/// Hands out job indices to concurrently running workers.
#[derive(Debug)]
pub struct Dispatcher {
    len: usize,
    state: Mutex<DispatchState>,
    settled_signal: Condvar,
    cancel: CancelFlag,
}

impl Dispatcher {
    /// Create a dispatcher for `len` pending jobs
    pub fn new(len: usize) -> Self {
        Self::with_cancel_flag(len, CancelFlag::new())
    }

    /// Create a dispatcher that observes an externally owned cancellation flag
    pub fn with_cancel_flag(len: usize, cancel: CancelFlag) -> Self {
        Self {
            len,
            state: Mutex::new(DispatchState {
                cursor: 0,
                statuses: vec![JobStatus::Pending; len],
                in_progress: 0,
                settled: 0,
            }),
            settled_signal: Condvar::new(),
            cancel,
        }
    }

    /// Number of jobs
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // Critical sections never panic midway, so a poisoned lock still holds
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the next pending job.
    ///
    /// Returns `None` once the cursor reaches the job count or cancellation
    /// has been requested.
    pub fn try_claim(&self) -> Option<JobIndex> {
        let mut state = self.lock();

        if self.cancel.is_cancelled() {
            // A waiter may be blocked on the last in-progress job having
            // finished before the flag was raised.
            self.settled_signal.notify_all();
            return None;
        }

        while state.cursor < state.statuses.len() {
            let index = state.cursor;
            state.cursor += 1;

            if state.statuses[index] == JobStatus::Pending {
                state.statuses[index] = JobStatus::InProgress;
                state.in_progress += 1;
                return Some(JobIndex(index));
            }
        }

        None
    }

    /// Mark a claimed job as converted
    pub fn complete(&self, index: JobIndex) -> Result<(), DispatchError> {
        self.settle(index, JobStatus::Done)
    }

    /// Mark a claimed job as failed
    pub fn fail(&self, index: JobIndex) -> Result<(), DispatchError> {
        self.settle(index, JobStatus::Failed)
    }

    fn settle(&self, index: JobIndex, outcome: JobStatus) -> Result<(), DispatchError> {
        let mut state = self.lock();

        let status = *state
            .statuses
            .get(index.0)
            .ok_or(DispatchError::OutOfRange {
                index,
                len: self.len,
            })?;
        if status != JobStatus::InProgress {
            return Err(DispatchError::NotInProgress { index, status });
        }

        state.statuses[index.0] = outcome;
        state.in_progress -= 1;
        state.settled += 1;
        drop(state);

        self.settled_signal.notify_all();
        Ok(())
    }

    /// Request that no further jobs be claimed
    pub fn cancel(&self) {
        self.cancel.cancel();
        // Take the lock so a waiter between its check and its wait cannot miss this.
        let _state = self.lock();
        self.settled_signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Handle to the flag this dispatcher observes
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Current cursor position
    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    pub fn status(&self, index: JobIndex) -> Option<JobStatus> {
        self.lock().statuses.get(index.0).copied()
    }

    /// Snapshot of every job's status, in job order
    pub fn statuses(&self) -> Vec<JobStatus> {
        self.lock().statuses.clone()
    }

    pub fn summary(&self) -> DispatchSummary {
        self.lock().summary()
    }

    /// Block until every job is settled, or until cancellation was requested
    /// and no job is still in progress.
    ///
    /// With a non-empty job list this only returns if at least one worker is
    /// claiming jobs.
    pub fn wait_until_settled(&self) -> DispatchSummary {
        let state = self.lock();
        let state = self
            .settled_signal
            .wait_while(state, |s| !s.is_idle(self.cancel.is_cancelled()))
            .unwrap_or_else(PoisonError::into_inner);
        state.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_empty_dispatcher() {
        let dispatcher = Dispatcher::new(0);
        assert!(dispatcher.is_empty());
        assert_eq!(dispatcher.try_claim(), None);

        let summary = dispatcher.wait_until_settled();
        assert_eq!(summary, DispatchSummary::default());
        assert!(summary.is_complete());
    }

    #[test]
    fn test_claims_follow_ascending_order() {
        let dispatcher = Dispatcher::new(3);

        assert_eq!(dispatcher.try_claim(), Some(JobIndex(0)));
        assert_eq!(dispatcher.try_claim(), Some(JobIndex(1)));
        assert_eq!(dispatcher.cursor(), 2);
        assert_eq!(dispatcher.try_claim(), Some(JobIndex(2)));
        assert_eq!(dispatcher.try_claim(), None);
        assert_eq!(dispatcher.cursor(), 3);

        assert_eq!(
            dispatcher.statuses(),
            vec![JobStatus::InProgress; 3]
        );
    }

    #[test]
    fn test_complete_and_fail_settle_jobs() {
        let dispatcher = Dispatcher::new(2);
        let a = dispatcher.try_claim().unwrap();
        let b = dispatcher.try_claim().unwrap();

        dispatcher.complete(a).unwrap();
        dispatcher.fail(b).unwrap();

        assert_eq!(dispatcher.status(a), Some(JobStatus::Done));
        assert_eq!(dispatcher.status(b), Some(JobStatus::Failed));

        let summary = dispatcher.wait_until_settled();
        assert_eq!(summary.done, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.is_complete());
    }

    #[test]
    fn test_settling_unclaimed_job_is_rejected() {
        let dispatcher = Dispatcher::new(2);
        assert_eq!(
            dispatcher.complete(JobIndex(1)),
            Err(DispatchError::NotInProgress {
                index: JobIndex(1),
                status: JobStatus::Pending,
            })
        );
    }

    #[test]
    fn test_settling_twice_is_rejected() {
        let dispatcher = Dispatcher::new(1);
        let index = dispatcher.try_claim().unwrap();
        dispatcher.complete(index).unwrap();
        assert_eq!(
            dispatcher.fail(index),
            Err(DispatchError::NotInProgress {
                index,
                status: JobStatus::Done,
            })
        );
    }

    #[test]
    fn test_settling_out_of_range() {
        let dispatcher = Dispatcher::new(1);
        assert_eq!(
            dispatcher.complete(JobIndex(5)),
            Err(DispatchError::OutOfRange {
                index: JobIndex(5),
                len: 1
            })
        );
        assert_eq!(dispatcher.status(JobIndex(5)), None);
    }

    #[test]
    fn test_cancel_stops_claims_and_leaves_pending() {
        let dispatcher = Dispatcher::new(4);
        let first = dispatcher.try_claim().unwrap();

        dispatcher.cancel();
        assert!(dispatcher.is_cancelled());
        assert_eq!(dispatcher.try_claim(), None);

        dispatcher.complete(first).unwrap();
        let summary = dispatcher.wait_until_settled();
        assert_eq!(summary.done, 1);
        assert_eq!(summary.pending, 3);
        assert!(!summary.is_complete());
    }

    #[test]
    fn test_external_cancel_flag_is_observed() {
        let flag = CancelFlag::new();
        let dispatcher = Dispatcher::with_cancel_flag(2, flag.clone());

        flag.cancel();
        assert!(dispatcher.is_cancelled());
        assert_eq!(dispatcher.try_claim(), None);
        assert_eq!(dispatcher.wait_until_settled().pending, 2);
    }

    #[test]
    fn test_cancel_wakes_blocked_waiter() {
        let dispatcher = Dispatcher::new(3);

        thread::scope(|s| {
            let waiter = s.spawn(|| dispatcher.wait_until_settled());
            dispatcher.cancel();
            let summary = waiter.join().unwrap();
            assert_eq!(summary.pending, 3);
        });
    }

    #[test]
    fn test_waiter_blocks_until_last_job_settles() {
        let dispatcher = Dispatcher::new(1);
        let index = dispatcher.try_claim().unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| dispatcher.wait_until_settled());
            thread::sleep(std::time::Duration::from_millis(20));
            assert!(!waiter.is_finished());

            dispatcher.complete(index).unwrap();
            let summary = waiter.join().unwrap();
            assert_eq!(summary.done, 1);
        });
    }

    #[test]
    fn test_concurrent_claims_never_duplicate() {
        const THREADS: usize = 32;
        const JOBS: usize = 5;

        for _ in 0..200 {
            let dispatcher = Dispatcher::new(JOBS);

            let claims: Vec<JobIndex> = thread::scope(|s| {
                let handles: Vec<_> = (0..THREADS)
                    .map(|_| {
                        s.spawn(|| {
                            let mut mine = Vec::new();
                            while let Some(index) = dispatcher.try_claim() {
                                mine.push(index);
                            }
                            mine
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|h| h.join().unwrap())
                    .collect()
            });

            let unique: HashSet<_> = claims.iter().copied().collect();
            assert_eq!(claims.len(), JOBS, "every job claimed exactly once");
            assert_eq!(unique.len(), JOBS);
            assert_eq!(dispatcher.cursor(), JOBS);
        }
    }

    // For any job count and worker count, synthetic workers that claim until
    // exhausted settle every job exactly once.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_every_job_settled_once(
            jobs in 0usize..64,
            workers in 0usize..12,
        ) {
            let dispatcher = Dispatcher::new(jobs);

            let per_worker: Vec<usize> = thread::scope(|s| {
                let handles: Vec<_> = (0..workers)
                    .map(|_| {
                        s.spawn(|| {
                            let mut claimed = 0;
                            while let Some(index) = dispatcher.try_claim() {
                                claimed += 1;
                                if index.0 % 3 == 0 {
                                    dispatcher.fail(index).unwrap();
                                } else {
                                    dispatcher.complete(index).unwrap();
                                }
                            }
                            claimed
                        })
                    })
                    .collect();
                if workers > 0 {
                    dispatcher.wait_until_settled();
                }
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let summary = dispatcher.summary();
            if workers == 0 {
                prop_assert_eq!(summary.pending, jobs);
            } else {
                prop_assert_eq!(per_worker.iter().sum::<usize>(), jobs);
                prop_assert!(summary.is_complete());
                prop_assert_eq!(summary.failed, (jobs + 2) / 3);
                prop_assert!(dispatcher.statuses().iter().all(JobStatus::is_settled));
            }
        }
    }
}
