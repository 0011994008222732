//! Combinators that derive new promises from existing ones.
//!
//! Every combinator is an ordinary promise whose work awaits other
//! promises; none of them can interrupt a source task. Losing or abandoned
//! sources always run to completion, their outcomes simply unobserved.

use std::time::Duration;

use crossbeam_channel::unbounded;
use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::pool::Pool;
use crate::promise::Promise;
use crate::Error;

/// Aggregates `promises` into a single promise over all their values.
///
/// The output preserves input order: slot `i` holds the result of input
/// `i`, regardless of completion order. The aggregate rejects with the
/// first failure observed (fail-fast, without waiting for the rest) or
/// with [`Error::Cancelled`] if `token` fires before every input resolves.
///
/// One waiter job per input is submitted to `pool`, funnelling outcomes
/// through a channel so the aggregator reacts to whichever input settles
/// first.
///
/// # Panics
///
/// Panics if `promises` is empty: an empty aggregate would be a promise
/// that never settles, which is a programming error.
pub fn all<T>(pool: &dyn Pool, token: &CancelToken, promises: &[Promise<T>]) -> Promise<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    assert!(!promises.is_empty(), "all() requires at least one promise");
    debug!(inputs = promises.len(), "aggregating promises");

    let (outcomes, funnel) = unbounded();
    for (index, promise) in promises.iter().enumerate() {
        let promise = promise.clone();
        let token = token.clone();
        let outcomes = outcomes.clone();
        pool.submit(Box::new(move || {
            // The aggregator hangs up early on failure; delivery failures
            // here just mean nobody is listening any more.
            let _ = outcomes.send((index, promise.wait(&token)));
        }));
    }
    drop(outcomes);

    let count = promises.len();
    Promise::new(pool, move |settler| {
        let mut slots: Vec<Option<T>> = (0..count).map(|_| None).collect();
        let mut remaining = count;
        while remaining > 0 {
            match funnel.recv() {
                Ok((index, Ok(value))) => {
                    slots[index] = Some(value);
                    remaining -= 1;
                }
                Ok((_, Err(error))) => {
                    trace!(%error, "aggregate failing fast");
                    settler.reject(error);
                    return;
                }
                // All waiters gone without filling every slot: every one of
                // them delivered before dropping its sender, so this branch
                // is unreachable while `remaining > 0`.
                Err(_) => return,
            }
        }
        let results = slots
            .into_iter()
            .map(|slot| slot.expect("every input settled exactly once"))
            .collect();
        settler.resolve(results);
    })
}

/// Settles with the outcome of whichever input settles first.
///
/// The first settlement in wall-clock order wins, value or failure alike;
/// the settlement gate discards everything after it. Losing inputs keep
/// running to completion.
///
/// # Panics
///
/// Panics if `promises` is empty.
pub fn race<T>(pool: &dyn Pool, token: &CancelToken, promises: &[Promise<T>]) -> Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    assert!(!promises.is_empty(), "race() requires at least one promise");
    debug!(inputs = promises.len(), "racing promises");

    let (winner, settler) = Promise::pending();
    for promise in promises {
        let promise = promise.clone();
        let token = token.clone();
        let settler = settler.clone();
        pool.submit(Box::new(move || match promise.wait(&token) {
            Ok(value) => settler.resolve(value),
            Err(error) => settler.reject(error),
        }));
    }
    winner
}

impl<T: Clone + Send + Sync + 'static> Promise<T> {
    /// Chains a transform onto this promise's success value.
    ///
    /// A failed source propagates unchanged and the transform never runs.
    /// A successful source feeds the transform, whose `Ok` resolves and
    /// whose `Err` rejects the derived promise. A panicking transform is
    /// handled by the ordinary task panic guard.
    pub fn then<U, F>(&self, pool: &dyn Pool, token: &CancelToken, transform: F) -> Promise<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Result<U, Error> + Send + 'static,
    {
        let source = self.clone();
        let token = token.clone();
        Promise::new(pool, move |settler| match source.wait(&token) {
            Ok(value) => match transform(value) {
                Ok(mapped) => settler.resolve(mapped),
                Err(error) => settler.reject(error),
            },
            Err(error) => settler.reject(error),
        })
    }

    /// Chains a failure handler onto this promise.
    ///
    /// A successful source propagates unchanged and the handler never runs.
    /// A failed source feeds the handler, and the derived promise rejects
    /// with whatever failure the handler returns. A handler can replace a
    /// failure but never turn it into a success.
    pub fn catch<F>(&self, pool: &dyn Pool, token: &CancelToken, handler: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Error + Send + 'static,
    {
        let source = self.clone();
        let token = token.clone();
        Promise::new(pool, move |settler| match source.wait(&token) {
            Ok(value) => settler.resolve(value),
            Err(error) => settler.reject(handler(error)),
        })
    }

    /// Runs `callback` once the source settles, then reproduces the
    /// source's outcome unchanged.
    ///
    /// The callback runs exactly once, for success and failure alike. If
    /// the callback panics, the panic guard rejects the derived promise
    /// with the panic payload instead of the source outcome.
    pub fn finally<F>(&self, pool: &dyn Pool, token: &CancelToken, callback: F) -> Promise<T>
    where
        F: FnOnce() + Send + 'static,
    {
        let source = self.clone();
        let token = token.clone();
        Promise::new(pool, move |settler| {
            let outcome = source.wait(&token);
            callback();
            match outcome {
                Ok(value) => settler.resolve(value),
                Err(error) => settler.reject(error),
            }
        })
    }

    /// Bounds the observation of this promise to `duration`.
    ///
    /// Resolves with the source's value if it settles in time, otherwise
    /// rejects with [`Error::TimedOut`]. The source task itself is not
    /// cancelled; only this observation of it is abandoned.
    pub fn timeout(&self, pool: &dyn Pool, duration: Duration) -> Promise<T> {
        let source = self.clone();
        // The clock starts now, not when the pool gets around to the job.
        let deadline = CancelToken::deadline(duration);
        Promise::new(pool, move |settler| {
            match source.wait(&deadline) {
                Ok(value) => settler.resolve(value),
                // A `Cancelled` from the wait is ambiguous: the source may
                // itself have settled with a cancellation failure. Only an
                // unsettled source means the deadline fired first.
                Err(Error::Cancelled) => match source.try_outcome() {
                    Some(Ok(value)) => settler.resolve(value),
                    Some(Err(error)) => settler.reject(error),
                    None => {
                        trace!(?duration, "timed out waiting for source");
                        settler.reject(Error::TimedOut(duration));
                    }
                },
                Err(error) => settler.reject(error),
            }
        })
    }
}
