//! Single-assignment promises executed on pluggable thread pools.
//!
//! A [`Promise`] is constructed from a task closure and a [`Pool`]. The task
//! is submitted immediately and runs concurrently; it receives a [`Settler`]
//! and settles the promise exactly once, by resolving with a value or
//! rejecting with an [`Error`]. A panicking task is settled on its behalf:
//! the panic payload becomes the rejection. Any number of callers may
//! [`Promise::wait`] on the same promise, each with its own [`CancelToken`];
//! cancellation releases the waiter without disturbing the task.
//!
//! Combinators build derived promises: [`all`] (index-preserving, fail-fast
//! aggregation), [`race`] (first settlement wins), and the chaining methods
//! [`Promise::then`], [`Promise::catch`], [`Promise::finally`] and
//! [`Promise::timeout`].
//!
//! # Examples
//!
//! ```
//! use promissum::{CancelToken, Promise, SpawnPool};
//!
//! let pool = SpawnPool;
//! let token = CancelToken::never();
//! let p: Promise<i32> = Promise::new(&pool, |settler| settler.resolve(21));
//! let doubled = p.then(&pool, &token, |n| Ok(n * 2));
//! assert_eq!(doubled.wait(&token).unwrap(), 42);
//! ```

use std::any::Any;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

pub mod cancel;
pub mod combinator;
pub mod pool;
pub mod promise;
pub mod trace;

pub use cancel::{CancelSource, CancelToken};
pub use combinator::{all, race};
pub use pool::{Job, Pool, SpawnPool, WorkerPool};
pub use promise::{Promise, Settler};
pub use trace::{CounterTracer, TracedPool, Tracer};

/// The failure value a promise settles with.
///
/// Clonable so that every waiter on a rejected promise observes the same
/// failure. Task failures ([`Error::Rejected`]) and task faults
/// ([`Error::Panicked`]) are indistinguishable to combinators: both are
/// "this promise failed".
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The task settled the promise with an application error.
    #[error(transparent)]
    Rejected(#[from] Arc<dyn std::error::Error + Send + Sync>),
    /// The task panicked before settling; the payload's text is kept.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The waiter's cancellation token fired before settlement.
    #[error("wait cancelled")]
    Cancelled,
    /// The deadline of a [`Promise::timeout`] elapsed before settlement.
    #[error("promise timed out after {0:?}")]
    TimedOut(Duration),
}

/// A message-only error, for rejections that carry no structured cause.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

impl Error {
    /// A rejection carrying only a message.
    pub fn msg(message: impl Display) -> Self {
        Error::Rejected(Arc::new(Message(message.to_string())))
    }

    /// A rejection wrapping a structured error.
    pub fn rejected<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Rejected(Arc::new(source))
    }

    /// Converts a panic payload into a rejection. An [`Error`] thrown with
    /// `std::panic::panic_any` is used verbatim; string payloads keep their
    /// text.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<Error>() {
            Ok(error) => *error,
            Err(payload) => {
                let text = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                Error::Panicked(text)
            }
        }
    }
}
