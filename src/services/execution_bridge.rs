//! Deferred-work queue between request handlers and the host's serialized
//! execution context
//!
//! Request handlers run concurrently on tokio workers and must never touch
//! host-owned state directly. Instead they [`BridgeHandle::post`] closures
//! which the host runs later, on its own thread, by calling
//! [`BridgeDrain::drain_once`] from whatever loop it already has.
//!
//! # Ownership
//!
//! [`execution_bridge`] returns two halves:
//!
//! - [`BridgeHandle`] - cheap to clone, handed to every producer
//! - [`BridgeDrain`] - not `Clone`; whoever owns it is the single consumer
//!
//! The bridge never spawns a consumer of its own. Work runs FIFO, at most
//! once, and nothing flows back to the poster. A tool that needs the
//! outcome has to bring its own channel (see `host::HostPlugin`).
//!
//! # Example
//!
//! ```rust
//! use rimbridge::services::execution_bridge;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let (handle, mut drain) = execution_bridge();
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! let c = counter.clone();
//! handle
//!     .post(move || {
//!         c.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let report = drain.drain_once();
//! assert_eq!(report.executed, 1);
//! assert_eq!(counter.load(Ordering::SeqCst), 1);
//! ```

use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::error::panic_message;

/// A single deferred action.
pub type PendingWork = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Execution bridge is closed: the host drain has been dropped")]
    Closed,
}

/// Creates a connected producer/consumer pair.
pub fn execution_bridge() -> (BridgeHandle, BridgeDrain) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (BridgeHandle { sender }, BridgeDrain { receiver })
}

/// Producer side of the bridge; safe to use from any thread.
#[derive(Clone, Debug)]
pub struct BridgeHandle {
    sender: mpsc::UnboundedSender<PendingWork>,
}

impl BridgeHandle {
    /// Enqueues `action` for the host to run on its next drain.
    ///
    /// Never blocks. Fails only when the consumer half is gone, in which
    /// case the action is handed back to nobody and dropped here.
    pub fn post<F>(&self, action: F) -> Result<(), BridgeError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.sender
            .send(Box::new(action))
            .map_err(|_| BridgeError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Outcome of one [`BridgeDrain::drain_once`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions that ran, whether or not they succeeded.
    pub executed: usize,
    /// Actions that returned an error or panicked.
    pub failed: usize,
}

/// Consumer side of the bridge, owned by the host loop.
#[derive(Debug)]
pub struct BridgeDrain {
    receiver: mpsc::UnboundedReceiver<PendingWork>,
}

impl BridgeDrain {
    /// Runs queued actions in FIFO order until the queue is empty.
    ///
    /// A failing or panicking action is logged and counted; the remaining
    /// actions still run in the same pass.
    pub fn drain_once(&mut self) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            let work = match self.receiver.try_recv() {
                Ok(work) => work,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };

            report.executed += 1;
            match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::error!(error = %e, "Execution bridge action failed");
                }
                Err(payload) => {
                    report.failed += 1;
                    tracing::error!(
                        panic = %panic_message(payload.as_ref()),
                        "Execution bridge action panicked"
                    );
                }
            }
        }

        if report.executed > 0 {
            tracing::trace!(
                executed = report.executed,
                failed = report.failed,
                "Drained execution bridge"
            );
        }

        report
    }
}
