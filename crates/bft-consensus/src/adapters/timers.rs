//! Timeout schedulers
//!
//! [`TokioTimeoutScheduler`] spawns one sleeping task per timer that sends
//! the token into the service queue. [`ManualTimeoutScheduler`] only
//! records what was scheduled and fires on demand, for deterministic
//! tests of the core.

use crate::engine::TimeoutToken;
use crate::events::ConsensusEvent;
use crate::ports::{TimeoutScheduler, TimerHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Shared fire/cancel flag. Whichever side moves it out of `PENDING` first
/// wins, so a timer is either delivered or cancelled, never both.
#[derive(Clone, Debug, Default)]
struct TimerFlag(Arc<AtomicU8>);

impl TimerFlag {
    fn try_fire(&self) -> bool {
        self.0
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn try_cancel(&self) -> bool {
        match self
            .0
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(state) => state == CANCELLED,
        }
    }

    fn fired(&self) -> bool {
        self.0.load(Ordering::Acquire) == FIRED
    }
}

pub struct TokioTimerHandle {
    flag: TimerFlag,
    task: JoinHandle<()>,
}

impl TimerHandle for TokioTimerHandle {
    fn cancel(&self) -> bool {
        let cancelled = self.flag.try_cancel();
        if cancelled {
            self.task.abort();
        }
        cancelled
    }

    fn has_fired(&self) -> bool {
        self.flag.fired()
    }
}

/// Delivers fired tokens as [`ConsensusEvent::Timeout`].
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct TokioTimeoutScheduler {
    events: mpsc::Sender<ConsensusEvent>,
}

impl TokioTimeoutScheduler {
    pub fn new(events: mpsc::Sender<ConsensusEvent>) -> Self {
        Self { events }
    }
}

impl TimeoutScheduler for TokioTimeoutScheduler {
    fn schedule(&self, token: TimeoutToken, after: Duration) -> Box<dyn TimerHandle> {
        let flag = TimerFlag::default();
        let task_flag = flag.clone();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if task_flag.try_fire() {
                trace!(%token, "Timer fired");
                if events.send(ConsensusEvent::Timeout(token)).await.is_err() {
                    trace!(%token, "Event queue closed, dropping timeout");
                }
            }
        });
        Box::new(TokioTimerHandle { flag, task })
    }
}

struct ManualTimer {
    token: TimeoutToken,
    after: Duration,
    flag: TimerFlag,
}

struct ManualTimerHandle {
    flag: TimerFlag,
}

impl TimerHandle for ManualTimerHandle {
    fn cancel(&self) -> bool {
        self.flag.try_cancel()
    }

    fn has_fired(&self) -> bool {
        self.flag.fired()
    }
}

/// Scheduler driven by hand: nothing fires until [`fire_next`] or
/// [`fire`] is called.
///
/// [`fire_next`]: ManualTimeoutScheduler::fire_next
/// [`fire`]: ManualTimeoutScheduler::fire
#[derive(Clone, Default)]
pub struct ManualTimeoutScheduler {
    timers: Arc<Mutex<Vec<ManualTimer>>>,
}

impl ManualTimeoutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens still armed, in scheduling order.
    pub fn pending(&self) -> Vec<TimeoutToken> {
        self.timers
            .lock()
            .iter()
            .filter(|t| t.flag.0.load(Ordering::Acquire) == PENDING)
            .map(|t| t.token)
            .collect()
    }

    /// Delay requested for the pending timer with `token`.
    pub fn duration_of(&self, token: &TimeoutToken) -> Option<Duration> {
        self.timers
            .lock()
            .iter()
            .rev()
            .find(|t| t.token == *token)
            .map(|t| t.after)
    }

    /// Fire the oldest armed timer.
    pub fn fire_next(&self) -> Option<TimeoutToken> {
        let timers = self.timers.lock();
        timers
            .iter()
            .find(|t| t.flag.try_fire())
            .map(|t| t.token)
    }

    /// Fire the armed timer with `token`, if any.
    pub fn fire(&self, token: &TimeoutToken) -> bool {
        self.timers
            .lock()
            .iter()
            .any(|t| t.token == *token && t.flag.try_fire())
    }
}

impl TimeoutScheduler for ManualTimeoutScheduler {
    fn schedule(&self, token: TimeoutToken, after: Duration) -> Box<dyn TimerHandle> {
        let flag = TimerFlag::default();
        self.timers.lock().push(ManualTimer {
            token,
            after,
            flag: flag.clone(),
        });
        Box::new(ManualTimerHandle { flag })
    }
}
