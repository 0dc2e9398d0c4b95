//! Deadline set for the session actor: at most one pending deadline per
//! `TimerKind`.

use std::collections::HashMap;
use tokio::time::{Duration, Instant, sleep_until};

use super::machine::TimerKind;

#[derive(Debug, Default)]
pub struct Timers {
    deadlines: HashMap<TimerKind, Instant>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `timer` to fire `after` from now, replacing any pending deadline
    /// for the same purpose.
    pub fn schedule(&mut self, timer: TimerKind, after: Duration) {
        self.deadlines.insert(timer, Instant::now() + after);
    }

    pub fn cancel(&mut self, timer: TimerKind) -> bool {
        self.deadlines.remove(&timer).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_pending(&self, timer: TimerKind) -> bool {
        self.deadlines.contains_key(&timer)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Wait for the earliest deadline and disarm it. Pends forever while
    /// nothing is scheduled.
    ///
    /// Cancel-safe: the deadline is only removed once it has passed, so
    /// dropping this future inside `select!` loses nothing.
    pub async fn expired(&mut self) -> TimerKind {
        let next = self
            .deadlines
            .iter()
            .min_by_key(|(_, deadline)| **deadline)
            .map(|(timer, deadline)| (*timer, *deadline));

        match next {
            Some((timer, deadline)) => {
                sleep_until(deadline).await;
                self.deadlines.remove(&timer);
                timer
            }
            None => std::future::pending().await,
        }
    }
}
