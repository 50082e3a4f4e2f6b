//! Translation of process signals into a shutdown request.
//!
//! Ctrl-C (SIGINT) and, on unix, SIGTERM stop clientsim. The first delivery
//! requests the stop, later deliveries change nothing.

use std::{fmt, io};

use clientsim_signal::Broadcaster;
use tokio::{signal, task::JoinHandle};
use tracing::{debug, error, info};

/// A process signal that requests shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// SIGINT, usually Ctrl-C at a terminal
    CtrlC,
    /// SIGTERM
    Terminate,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::CtrlC => write!(f, "SIGINT"),
            Interrupt::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Forward one delivered `interrupt` to `broadcaster`.
///
/// Returns `true` if this delivery requested the stop, `false` if a stop had
/// already been requested.
pub fn deliver(broadcaster: &Broadcaster, interrupt: Interrupt) -> bool {
    if broadcaster.signal() {
        info!("{interrupt} received. Stopping all producers...");
        true
    } else {
        debug!("{interrupt} received, shutdown already in progress");
        false
    }
}

#[derive(Debug)]
struct Listener {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: signal::windows::CtrlC,
}

impl Listener {
    /// Register the handlers with the OS. Signals delivered from here on are
    /// recorded even before the first call to `next`.
    fn install() -> Result<Self, io::Error> {
        Ok(Self {
            #[cfg(unix)]
            interrupt: signal::unix::signal(signal::unix::SignalKind::interrupt())?,
            #[cfg(unix)]
            terminate: signal::unix::signal(signal::unix::SignalKind::terminate())?,
            #[cfg(windows)]
            ctrl_c: signal::windows::ctrl_c()?,
        })
    }

    #[cfg(unix)]
    async fn next(&mut self) -> Option<Interrupt> {
        tokio::select! {
            res = self.interrupt.recv() => res.map(|()| Interrupt::CtrlC),
            res = self.terminate.recv() => res.map(|()| Interrupt::Terminate),
        }
    }

    #[cfg(windows)]
    async fn next(&mut self) -> Option<Interrupt> {
        self.ctrl_c.recv().await.map(|()| Interrupt::CtrlC)
    }

    async fn watch(mut self, broadcaster: Broadcaster) {
        while let Some(interrupt) = self.next().await {
            deliver(&broadcaster, interrupt);
        }
        error!("Signal stream closed, no further interrupts will be seen");
        std::future::pending::<()>().await;
    }
}

/// Install the process signal handlers and watch them for the lifetime of the
/// process, requesting a stop through `broadcaster` on each delivery.
///
/// The handlers are registered before this function returns, so call it
/// before starting any work. Must be called from within a tokio runtime.
///
/// If the handlers cannot be installed the error is logged and `broadcaster`
/// is held, never signaled, so the run continues until the process is
/// killed.
pub fn install(broadcaster: Broadcaster) -> JoinHandle<()> {
    match Listener::install() {
        Ok(listener) => tokio::spawn(listener.watch(broadcaster)),
        Err(err) => {
            error!("Unable to install signal handlers: {err}");
            tokio::spawn(async move {
                let _held = broadcaster;
                std::future::pending::<()>().await;
            })
        }
    }
}
