//! Side-channel observability for promise execution.
//!
//! A [`TracedPool`] wraps any [`Pool`] and reports task lifecycle events to
//! a [`Tracer`]: one submission per promise created, plus start/finish
//! around each run. It is a pure side channel: settlement semantics are
//! identical with or without it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::pool::{Job, Pool};

/// A collector for task lifecycle signals.
///
/// Implementations must tolerate concurrent calls; every hook defaults to
/// a no-op so collectors implement only what they chart.
pub trait Tracer: Send + Sync {
    /// A job (one per promise or combinator waiter) entered the pool.
    fn task_submitted(&self) {}

    /// A job started running.
    fn task_started(&self) {}

    /// A job finished after running for `elapsed`.
    fn task_finished(&self, elapsed: Duration) {
        let _ = elapsed;
    }
}

/// A [`Pool`] decorator that feeds a [`Tracer`].
pub struct TracedPool<P> {
    inner: P,
    tracer: Arc<dyn Tracer>,
}

impl<P: Pool> TracedPool<P> {
    pub fn new(inner: P, tracer: Arc<dyn Tracer>) -> Self {
        Self { inner, tracer }
    }
}

impl<P: Pool> Pool for TracedPool<P> {
    fn submit(&self, job: Job) {
        self.tracer.task_submitted();
        let tracer = self.tracer.clone();
        self.inner.submit(Box::new(move || {
            tracer.task_started();
            let started = Instant::now();
            job();
            tracer.task_finished(started.elapsed());
        }));
    }
}

/// An atomics-backed [`Tracer`]: total submissions, currently-running
/// gauge, and cumulative run time. Embedders export these to whatever
/// metrics system they use; tests read them directly.
#[derive(Debug, Default)]
pub struct CounterTracer {
    submitted: AtomicU64,
    running: AtomicU64,
    busy_micros: AtomicU64,
}

impl CounterTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total jobs submitted since construction.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Jobs currently running.
    pub fn running(&self) -> u64 {
        self.running.load(Ordering::SeqCst)
    }

    /// Cumulative run time across finished jobs.
    pub fn busy(&self) -> Duration {
        Duration::from_micros(self.busy_micros.load(Ordering::SeqCst))
    }
}

impl Tracer for CounterTracer {
    fn task_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
    }

    fn task_started(&self) {
        self.running.fetch_add(1, Ordering::SeqCst);
    }

    fn task_finished(&self, elapsed: Duration) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.busy_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::SeqCst);
    }
}
