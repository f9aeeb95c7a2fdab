//! Named single-slot delayed tasks
//!
//! Each `TimerKind` has at most one outstanding instance per session.
//! Scheduling a kind again replaces the previous instance. A fired timer
//! posts `TimerFired` to the owning controller, which checks `accept`
//! before acting so that a firing already in the channel when its instance
//! was replaced or cancelled is ignored.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    InputFallback,
    ParseDebounce,
    LoadingFallback,
    AutoClose,
    SelectionUnlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub seq: u64,
}

pub struct PendingTimers {
    tx: mpsc::UnboundedSender<TimerFired>,
    next_seq: u64,
    pending: HashMap<TimerKind, (u64, JoinHandle<()>)>,
}

impl PendingTimers {
    /// Create the timer set and the receiver its firings arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                next_seq: 0,
                pending: HashMap::new(),
            },
            rx,
        )
    }

    /// Arm `kind` to fire after `delay`, replacing any armed instance
    pub fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.cancel(kind);

        self.next_seq += 1;
        let seq = self.next_seq;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFired { kind, seq });
        });

        trace!(?kind, seq, delay_ms = delay.as_millis() as u64, "Timer armed");
        self.pending.insert(kind, (seq, handle));
    }

    /// Disarm `kind`; returns whether it was armed
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.pending.remove(&kind) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.pending.drain() {
            handle.abort();
        }
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending.contains_key(&kind)
    }

    /// Consume a firing; false if it belongs to a replaced or cancelled instance
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.pending.get(&fired.kind) {
            Some((seq, _)) if *seq == fired.seq => {
                self.pending.remove(&fired.kind);
                true
            }
            _ => false,
        }
    }
}

impl Drop for PendingTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
