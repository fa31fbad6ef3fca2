//! Server lifecycle state machine and termination triggers.
//!
//! ```text
//! Idle ──start()──▶ Serving ──first trigger──▶ Draining ──drained/deadline──▶ Stopped
//! ```
//!
//! Transitions only move right. A request to move to a state at or behind the
//! current one is refused and reported as `false`, which is what makes a
//! second SIGTERM during draining harmless.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::debug;

/// Where the server is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Idle,
    Serving,
    Draining,
    Stopped,
}

/// Shared, monotonic lifecycle cell.
///
/// Backed by a `watch` channel so any task can observe transitions.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    tx: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Idle);
        Self { tx }
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Moves to `next` if it lies ahead of the current state.
    ///
    /// Returns `true` when this call performed the transition.
    pub fn advance(&self, next: LifecycleState) -> bool {
        let moved = self.tx.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(state = ?next, "lifecycle transition");
        }
        moved
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }
}

impl Default for Lifecycle {
    fn default() -> Self { Self::new() }
}

/// The drain budget, fixed the moment shutdown begins.
#[derive(Clone, Copy, Debug)]
pub struct ShutdownContext {
    started: Instant,
    deadline: Instant,
}

impl ShutdownContext {
    pub fn begin(grace: Duration) -> Self {
        let started = Instant::now();
        Self { started, deadline: started + grace }
    }

    pub fn started(&self) -> Instant { self.started }
    pub fn deadline(&self) -> Instant { self.deadline }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

// ── Termination triggers ──────────────────────────────────────────────────────

/// What asked the process to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM, as sent by Kubernetes and `kill`.
    Terminate,
    /// Fired through a [`TriggerHandle`].
    Manual,
}

/// A stream of termination requests.
///
/// Every signal is delivered, not only the first: the controller needs to see
/// (and ignore) repeats while draining.
pub struct TerminationTrigger {
    rx: mpsc::Receiver<Signal>,
}

impl TerminationTrigger {
    /// Forwards SIGINT and SIGTERM (Ctrl-C only on non-Unix platforms).
    ///
    /// Must be called inside a Tokio runtime.
    pub fn os() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(4);

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut terminate = signal(SignalKind::terminate())?;
            let mut interrupt = signal(SignalKind::interrupt())?;
            tokio::spawn(async move {
                loop {
                    let sig = tokio::select! {
                        Some(()) = terminate.recv() => Signal::Terminate,
                        Some(()) = interrupt.recv() => Signal::Interrupt,
                        else => break,
                    };
                    if tx.send(sig).await.is_err() {
                        break;
                    }
                }
            });
        }

        #[cfg(not(unix))]
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(Signal::Interrupt).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self { rx })
    }

    /// A trigger fired by hand, for tests and embedding.
    pub fn manual() -> (TriggerHandle, Self) {
        let (tx, rx) = mpsc::channel(4);
        (TriggerHandle { tx }, Self { rx })
    }

    /// Waits for the next termination request. `None` once every sender is
    /// gone.
    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }
}

/// Sending half of a [`TerminationTrigger::manual`] pair.
#[derive(Clone, Debug)]
pub struct TriggerHandle {
    tx: mpsc::Sender<Signal>,
}

impl TriggerHandle {
    /// Requests termination. Never blocks; extra requests beyond the channel
    /// capacity are dropped since the first one already counts.
    pub fn fire(&self) {
        let _ = self.tx.try_send(Signal::Manual);
    }
}
