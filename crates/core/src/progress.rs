//! Download progress for one in-flight fetch.
//!
//! A [`ProgressChannel`] holds the latest [`ProgressState`] of a flight and
//! publishes every change through a `tokio::sync::watch` channel. Subscribers
//! always see the most recent value; a slow subscriber may skip intermediate
//! updates but never misses the terminal state.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle of a flight as seen by progress subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Registered, waiting for a fetch slot.
    Pending,
    /// Bytes are arriving.
    Downloading,
    /// Payload stored and delivered.
    Cached,
    /// Fetch or write failed; nothing was cached.
    Failed,
}

/// Snapshot of download progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub downloaded_bytes: u64,
    /// None when the server did not announce a length.
    pub total_bytes: Option<u64>,
    pub phase: Phase,
}

impl ProgressState {
    fn pending() -> Self {
        Self { downloaded_bytes: 0, total_bytes: None, phase: Phase::Pending }
    }

    /// Fraction of the payload received.
    ///
    /// None when the total is unknown. A known total of zero counts as
    /// complete.
    pub fn ratio(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some(self.downloaded_bytes as f64 / total as f64),
            None => None,
        }
    }

    pub fn is_downloading(&self) -> bool {
        matches!(self.phase, Phase::Pending | Phase::Downloading)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Cached | Phase::Failed)
    }
}

/// Publishing side of the progress of one flight.
#[derive(Debug)]
pub struct ProgressChannel {
    tx: watch::Sender<ProgressState>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressState::pending());
        Self { tx }
    }

    /// Latest published state.
    pub fn current(&self) -> ProgressState {
        *self.tx.borrow()
    }

    /// Record that `received` bytes out of `total` have arrived.
    ///
    /// `downloaded_bytes` never moves backwards and never exceeds a known
    /// total. Updates after the terminal state are ignored.
    pub fn advance(&self, received: u64, total: Option<u64>) {
        self.tx.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }

            let total = total.or(state.total_bytes);
            let mut downloaded = received.max(state.downloaded_bytes);
            if let Some(total) = total {
                downloaded = downloaded.min(total);
            }

            let next = ProgressState { downloaded_bytes: downloaded, total_bytes: total, phase: Phase::Downloading };
            if next == *state {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Publish the terminal success state.
    pub fn finish_cached(&self) {
        self.finish(Phase::Cached);
    }

    /// Publish the terminal failure state.
    pub fn finish_failed(&self) {
        self.finish(Phase::Failed);
    }

    fn finish(&self, phase: Phase) {
        self.tx.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            state.phase = phase;
            true
        });
    }

    /// Subscribe to this channel; the current value is available immediately.
    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription { rx: self.tx.subscribe(), done: false }
    }
}

/// Receiving side of a flight's progress. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ProgressSubscription {
    rx: watch::Receiver<ProgressState>,
    done: bool,
}

impl ProgressSubscription {
    /// Latest published state.
    pub fn current(&self) -> ProgressState {
        *self.rx.borrow()
    }

    /// Wait for the next state.
    ///
    /// Returns the terminal state exactly once, then None. Also returns None
    /// if the channel goes away without reaching a terminal state.
    pub async fn changed(&mut self) -> Option<ProgressState> {
        if self.done {
            return None;
        }

        let current = *self.rx.borrow();
        if current.is_terminal() {
            self.done = true;
            return Some(current);
        }

        if self.rx.changed().await.is_err() {
            self.done = true;
            return None;
        }

        let next = *self.rx.borrow_and_update();
        self.done = next.is_terminal();
        Some(next)
    }
}
