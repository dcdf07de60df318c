use std::sync::Mutex;

use chrono::{Local, TimeDelta};

use crate::model::Ts;

/// Source of "now" for lifecycle guards and audit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Ts;
}

/// Local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Ts {
        Local::now().naive_local()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<Ts>,
}

impl FixedClock {
    pub fn new(now: Ts) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: Ts) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = *guard + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Ts {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
