//! The settlement primitive.
//!
//! A [`Promise`] shares its settlement state between every handle clone, the
//! [`Settler`] held by the task, and any registered async waiters. The state
//! is a single-assignment cell plus a "done" channel whose sender is dropped
//! at settlement; receiver clones observing the disconnect is the broadcast
//! that releases blocking waiters.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll, Waker};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::trace;

use crate::cancel::CancelToken;
use crate::pool::Pool;
use crate::Error;

struct Shared<T> {
    /// The single-assignment outcome; `OnceLock::set` is the first-wins gate.
    cell: OnceLock<Result<T, Error>>,
    /// Dropped exactly once at settlement, releasing every blocking waiter.
    done_sender: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    /// Async waiters registered through the `Future` impl.
    wakers: Mutex<Vec<Waker>>,
}

/// The capability to settle one promise, handed by value into its task.
///
/// Both operations are idempotent: the first settlement wins and every
/// later `resolve` or `reject`, from any thread, is a silent no-op.
pub struct Settler<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Settler<T> {
    /// Settles the promise with `value`, unless it is already settled.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Settles the promise with `error`, unless it is already settled.
    pub fn reject(&self, error: Error) {
        self.settle(Err(error));
    }

    fn settle(&self, outcome: Result<T, Error>) {
        let rejected = outcome.is_err();
        if self.shared.cell.set(outcome).is_err() {
            trace!("settlement after the first ignored");
            return;
        }
        trace!(rejected, "promise settled");
        // Publish only after the cell is written: waiters are released by
        // the disconnect below and by the waker drain, both of which happen
        // strictly after `set`.
        self.shared
            .done_sender
            .lock()
            .expect("settlement state poisoned")
            .take();
        let wakers = std::mem::take(
            &mut *self.shared.wakers.lock().expect("settlement state poisoned"),
        );
        for waker in wakers {
            waker.wake();
        }
    }
}

/// A handle to an asynchronous computation that settles exactly once with a
/// value of type `T` or an [`Error`].
///
/// Handles are cheap to clone and every clone observes the same settlement.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Promise<T> {
    /// An unsettled promise and the settler that controls it. Combinators
    /// and gate tests use this split; public construction always goes
    /// through [`Promise::new`], which puts a task in flight immediately.
    pub(crate) fn pending() -> (Self, Settler<T>) {
        let (done_sender, done) = bounded(0);
        let shared = Arc::new(Shared {
            cell: OnceLock::new(),
            done_sender: Mutex::new(Some(done_sender)),
            done,
            wakers: Mutex::new(Vec::new()),
        });
        (
            Self {
                shared: shared.clone(),
            },
            Settler { shared },
        )
    }
}

impl<T: Send + Sync + 'static> Promise<T> {
    /// Creates a promise and immediately submits its task to `pool`.
    ///
    /// The task receives the promise's [`Settler`] and runs under a panic
    /// guard: if it panics instead of settling, the promise is rejected
    /// with the panic payload ([`Error`] payloads verbatim, anything else
    /// as [`Error::Panicked`]). The task is never interrupted once started;
    /// a promise nobody waits on still runs to completion.
    ///
    /// # Examples
    ///
    /// ```
    /// use promissum::{CancelToken, Promise, SpawnPool};
    ///
    /// let pool = SpawnPool;
    /// let p: Promise<&str> = Promise::new(&pool, |settler| settler.resolve("done"));
    /// assert_eq!(p.wait(&CancelToken::never()).unwrap(), "done");
    /// ```
    pub fn new<F>(pool: &dyn Pool, task: F) -> Self
    where
        F: FnOnce(Settler<T>) + Send + 'static,
    {
        let (promise, settler) = Self::pending();
        trace!("promise created");
        pool.submit(Box::new(move || {
            let guard_settler = settler.clone();
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || task(settler))) {
                guard_settler.reject(Error::from_panic(payload));
            }
        }));
        promise
    }
}

impl<T: Clone> Promise<T> {
    /// Blocks until the promise settles or `token` fires, whichever comes
    /// first.
    ///
    /// Cancellation yields [`Error::Cancelled`] and affects only this
    /// waiter: the task keeps running and other waiters are undisturbed.
    /// Waiters observing a settled promise each receive their own clone of
    /// the outcome.
    pub fn wait(&self, token: &CancelToken) -> Result<T, Error> {
        let done = self.shared.done.clone();
        let cancelled = token.receiver().clone();
        select! {
            recv(done) -> _ => self.outcome(),
            recv(cancelled) -> _ => {
                trace!("wait cancelled");
                Err(Error::Cancelled)
            }
        }
    }

    /// The settled outcome, if any, without blocking.
    pub fn try_outcome(&self) -> Option<Result<T, Error>> {
        self.shared.cell.get().cloned()
    }

    fn outcome(&self) -> Result<T, Error> {
        // The done channel only disconnects after the cell is written.
        self.shared
            .cell
            .get()
            .cloned()
            .expect("done signal fired before settlement")
    }
}

impl<T: Clone> Future for Promise<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Holding the waker lock across the cell check closes the race with
        // `settle`, which writes the cell before draining wakers under the
        // same lock.
        let mut wakers = self.shared.wakers.lock().expect("settlement state poisoned");
        if let Some(outcome) = self.shared.cell.get() {
            return Poll::Ready(outcome.clone());
        }
        wakers.push(cx.waker().clone());
        Poll::Pending
    }
}
