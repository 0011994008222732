//! Cancellation signals for blocking waits.
//!
//! A [`CancelToken`] is a broadcast "closed" signal: it fires for every
//! clone at once and stays fired forever after. Firing a token only
//! releases waiters; it never interrupts a running task.
//!
//! The signal is a crossbeam channel that is never sent on; dropping its
//! sender disconnects every receiver clone simultaneously, which is the
//! select-friendly equivalent of closing a signal channel.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, never, Receiver, Sender, TryRecvError};
use tracing::trace;

/// The owning side of a cancellation signal.
///
/// Dropping the source fires the signal, so a source that should outlive a
/// scope must be kept alive explicitly. Firing is idempotent.
#[derive(Debug)]
pub struct CancelSource {
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    /// Fires the signal, releasing every waiter holding a token from this
    /// source. Subsequent calls are no-ops.
    pub fn cancel(&self) {
        if self.sender.lock().expect("cancel source poisoned").take().is_some() {
            trace!("cancel source fired");
        }
    }

    /// A token observing this source.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.receiver.clone(),
        }
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The observing side of a cancellation signal. Cheap to clone; all clones
/// fire together.
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: Receiver<()>,
}

impl CancelToken {
    /// A token that never fires.
    pub fn never() -> Self {
        Self { receiver: never() }
    }

    /// A token that fires once `deadline` has elapsed, measured from now.
    ///
    /// The deadline is kept by a dedicated timer thread rather than a pool
    /// job so it cannot be delayed behind queued work.
    pub fn deadline(deadline: Duration) -> Self {
        let source = CancelSource::new();
        let token = source.token();
        thread::Builder::new()
            .name("promissum-deadline".to_string())
            .spawn(move || {
                thread::sleep(deadline);
                source.cancel();
            })
            .expect("failed to spawn deadline thread");
        token
    }

    /// Whether the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn never_token_does_not_fire() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent_and_broadcasts() {
        let source = CancelSource::new();
        let first = source.token();
        let second = first.clone();
        assert!(!first.is_cancelled());
        source.cancel();
        source.cancel();
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
    }

    #[test]
    fn dropping_the_source_fires_the_signal() {
        let source = CancelSource::new();
        let token = source.token();
        drop(source);
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_releases_a_blocked_waiter() {
        let source = CancelSource::new();
        let token = source.token();
        let waiter = thread::spawn(move || {
            let _ = token.receiver().recv();
        });
        thread::sleep(Duration::from_millis(20));
        source.cancel();
        waiter.join().expect("waiter panicked");
    }

    #[test]
    fn deadline_token_fires_after_the_deadline() {
        let start = Instant::now();
        let token = CancelToken::deadline(Duration::from_millis(50));
        assert!(!token.is_cancelled());
        let _ = token.receiver().recv();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(token.is_cancelled());
    }
}
