//! The executor capability promises run on.
//!
//! A [`Pool`] accepts a unit of work and runs it concurrently without
//! blocking the submitter. The core never assumes anything beyond that:
//! queueing and backpressure policy belong to the backend. Two backends are
//! built in: [`SpawnPool`] (one thread per job) and [`WorkerPool`] (a fixed
//! set of workers draining a shared queue). Third-party pools adapt by
//! implementing [`Pool`] on a thin wrapper.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use tracing::warn;

/// A unit of work submitted to a pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The capability of running a job concurrently.
pub trait Pool: Send + Sync {
    /// Runs `job` without blocking the caller. The job must eventually run
    /// to completion; panics inside it are the submitter's concern (promise
    /// tasks arrive already wrapped in a panic guard).
    fn submit(&self, job: Job);
}

/// An unbounded pool: every job gets its own thread.
///
/// This is the default factory a composition root reaches for when it has
/// no reason to bound concurrency.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpawnPool;

impl Pool for SpawnPool {
    fn submit(&self, job: Job) {
        thread::spawn(job);
    }
}

/// A bounded pool: a fixed number of worker threads drain a shared job
/// queue. Submission never blocks; jobs queue until a worker is free.
///
/// Waiting inside a job (as the `all`/`race` combinators do, one waiter job
/// per input) occupies a worker for the duration of the wait; size the pool
/// accordingly when nesting combinators, or use [`SpawnPool`].
///
/// Dropping the pool closes the queue; workers finish the jobs already
/// queued and exit.
#[derive(Debug)]
pub struct WorkerPool {
    jobs: Sender<Job>,
}

impl WorkerPool {
    /// Creates a pool with `workers` threads.
    ///
    /// # Panics
    ///
    /// Panics if `workers` is zero.
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0, "WorkerPool requires at least one worker");
        let (jobs, queue) = unbounded::<Job>();
        for index in 0..workers {
            let queue = queue.clone();
            thread::Builder::new()
                .name(format!("promissum-worker-{index}"))
                .spawn(move || {
                    for job in queue {
                        // A panicking job must not take the worker down with it.
                        if panic::catch_unwind(AssertUnwindSafe(move || job())).is_err() {
                            warn!("worker job panicked");
                        }
                    }
                })
                .expect("failed to spawn worker thread");
        }
        Self { jobs }
    }
}

impl Pool for WorkerPool {
    fn submit(&self, job: Job) {
        // Send only fails once every worker is gone, which cannot happen
        // while the pool (and thus the queue's sender) is alive.
        if self.jobs.send(job).is_err() {
            warn!("job submitted to a pool with no live workers");
        }
    }
}
