//! Per-phase timeouts
//!
//! A [`Timeout`] owns at most one scheduled timer. Firing does not touch
//! core state: the scheduler delivers a [`TimeoutToken`] into the event
//! queue and the core validates it against the current view when it is
//! dequeued.

use crate::domain::TimerError;
use crate::ports::{TimeoutScheduler, TimerHandle};
use bft_types::{Height, Round};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutPhase {
    Propose,
    Prevote,
    Precommit,
}

impl TimeoutPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutPhase::Propose => "propose",
            TimeoutPhase::Prevote => "prevote",
            TimeoutPhase::Precommit => "precommit",
        }
    }
}

/// The view a timer was armed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeoutToken {
    pub height: Height,
    pub round: Round,
    pub phase: TimeoutPhase,
}

impl fmt::Display for TimeoutToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.phase.as_str(), self.height, self.round)
    }
}

pub struct Timeout {
    phase: TimeoutPhase,
    handle: Option<Box<dyn TimerHandle>>,
}

impl Timeout {
    pub fn new(phase: TimeoutPhase) -> Self {
        Self {
            phase,
            handle: None,
        }
    }

    pub fn phase(&self) -> TimeoutPhase {
        self.phase
    }

    /// Arm the timer for `(height, round)`.
    ///
    /// Callers check [`Timeout::timer_started`] first; arming over a live
    /// timer cancels the old one.
    pub fn schedule(
        &mut self,
        scheduler: &dyn TimeoutScheduler,
        after: Duration,
        height: Height,
        round: Round,
    ) -> TimeoutToken {
        let token = TimeoutToken {
            height,
            round,
            phase: self.phase,
        };
        if let Some(old) = self.handle.take() {
            old.cancel();
        }
        self.handle = Some(scheduler.schedule(token, after));
        token
    }

    /// True from scheduling until [`Timeout::stop_timer`] or
    /// [`Timeout::reset`], including after the timer fired.
    pub fn timer_started(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stop_timer(&mut self) -> Result<(), TimerError> {
        let handle = self.handle.take().ok_or(TimerError::NotStarted)?;
        if handle.cancel() {
            Ok(())
        } else {
            Err(TimerError::AlreadyFired)
        }
    }

    /// Stop the timer if armed, ignoring whether it already fired.
    pub fn reset(&mut self) {
        let _ = self.stop_timer();
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("phase", &self.phase)
            .field("started", &self.timer_started())
            .finish()
    }
}
