//! Module to signal shutdown in clientsim.
//!
//! clientsim runs a fixed pool of producers that must all stop when the
//! process is interrupted. Producers do not talk to one another, the only
//! state they share is whether a stop has been requested.
//!
//! The mechanism here has two components, a `Broadcaster` and a `Watcher`. The
//! `Broadcaster` is responsible for flipping the stop flag, the `Watcher` polls
//! it between units of work or parks until it flips. The transition is
//! one-shot: once stopping, always stopping.
//!
//! There is only one `Broadcaster` and potentially many `Watcher` instances.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(unused_extern_crates)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::watch;
use tracing::debug;

/// Construct a `Watcher` and `Broadcaster` pair.
#[must_use]
pub fn signal() -> (Watcher, Broadcaster) {
    // The atomic is the source of truth and is all a polling `Watcher` ever
    // touches. The watch channel exists only to wake `Watcher::recv` callers
    // without spinning.
    let stopping = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = watch::channel(false);

    let w = Watcher {
        stopping: Arc::clone(&stopping),
        receiver,
    };

    let b = Broadcaster { stopping, sender };

    (w, b)
}

#[derive(Debug)]
/// Mechanism to notify one or more `Watcher` instances that a stop has been
/// requested.
///
/// Dropping the `Broadcaster` without calling [`Broadcaster::signal`] stops
/// its watchers all the same.
pub struct Broadcaster {
    /// The stop flag, shared with every `Watcher`.
    stopping: Arc<AtomicBool>,
    /// Wakes `Watcher` instances parked in `recv`.
    sender: watch::Sender<bool>,
}

impl Broadcaster {
    /// Request a stop.
    ///
    /// Returns `true` if this call performed the transition from running to
    /// stopping, `false` if a stop had already been requested. Calling this
    /// any number of times has the same effect as calling it once. The call
    /// never blocks.
    pub fn signal(&self) -> bool {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.sender.send_replace(true);
        debug!("stop requested, {} watchers parked", self.sender.receiver_count());
        true
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        self.signal();
    }
}

/// Errors for `Watcher::register`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// A stop was requested and yet `register` was called.
    #[error("signal has been received")]
    SignalReceived,
}

#[derive(Debug)]
/// Mechanism to watch for a stop request, one per producer.
pub struct Watcher {
    /// The stop flag, written only by the `Broadcaster`.
    stopping: Arc<AtomicBool>,
    /// Wake-up point for `recv`.
    receiver: watch::Receiver<bool>,
}

impl Watcher {
    /// Whether the process is still running, that is no stop has been
    /// requested yet.
    ///
    /// This is a single atomic load and is meant to be polled before every
    /// unit of work. A stop requested concurrently with the poll may be missed
    /// once and observed on the next poll.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.stopping.load(Ordering::Acquire)
    }

    /// Receive the stop notice. This function will block if a stop has not
    /// already been requested.
    ///
    /// If `recv` is called multiple times after the stop this function will
    /// return immediately.
    pub async fn recv(&mut self) {
        if !self.is_running() {
            return;
        }

        // An error here means the `Broadcaster` has gone away, which is a stop
        // in its own right.
        let _ = self.receiver.wait_for(|stopping| *stopping).await;
    }

    /// Register a new `Watcher` on the same `Broadcaster`.
    ///
    /// # Errors
    ///
    /// Returns `RegisterError::SignalReceived` if a stop has already been
    /// requested, there is no point starting new work past that point.
    pub fn register(&self) -> Result<Self, RegisterError> {
        if !self.is_running() {
            return Err(RegisterError::SignalReceived);
        }

        Ok(Self {
            stopping: Arc::clone(&self.stopping),
            receiver: self.receiver.clone(),
        })
    }
}
