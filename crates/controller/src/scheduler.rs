// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adaptive interval math and timer bookkeeping. The actual
//! spawned tick loop lives in `controller.rs` (it needs the RPC/reducer/
//! panic-manager pieces this module doesn't know about); this module owns
//! the pure, table-testable pieces: `compute_interval`, the single-timer
//! token, staleness detection, and recovery backoff.

use std::time::{Duration, Instant};

use crate::reducer::{Operation, Preferences};

pub const MIN_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(15);
pub const MAX_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(300);
pub const MAX_HEALTH_INTERVAL_HOURS: Duration = Duration::from_secs(3600);

const PANIC_RECOVERY_MULTIPLIER: f64 = 0.3;
const PREHEATING_MULTIPLIER: f64 = 0.5;
const ACTIVE_MULTIPLIER: f64 = 1.0;
const INACTIVE_MULTIPLIER: f64 = 6.0;

/// Recovery attempts allowed before `timer_recovery_failed` is set.
pub const MAX_RECOVERY_ATTEMPTS: u32 = 3;

fn default_refresh_interval() -> Duration {
    Duration::from_secs(30)
}

/// Chooses the next poll interval from current operational state.
pub fn compute_interval(panic: bool, operation: Operation, prefs: &Preferences) -> Duration {
    let base = if prefs.refresh_interval.is_zero() { default_refresh_interval() } else { prefs.refresh_interval };
    let on = matches!(operation, Operation::Preheating | Operation::Heating | Operation::AtTemp);
    let preheating = matches!(operation, Operation::Preheating);

    let multiplier = if panic {
        PANIC_RECOVERY_MULTIPLIER
    } else if on && preheating {
        PREHEATING_MULTIPLIER
    } else if on {
        ACTIVE_MULTIPLIER
    } else {
        INACTIVE_MULTIPLIER
    };

    let scaled = base.mul_f64(multiplier);
    let clamped = scaled.clamp(MIN_HEALTH_CHECK_INTERVAL, MAX_HEALTH_CHECK_INTERVAL);
    clamped.min(MAX_HEALTH_INTERVAL_HOURS)
}

/// The interval used for exactly one tick right after `init`.
pub fn first_tick_interval(prefs: &Preferences) -> Duration {
    let base = if prefs.refresh_interval.is_zero() { default_refresh_interval() } else { prefs.refresh_interval };
    base.max(MIN_HEALTH_CHECK_INTERVAL)
}

/// Opaque handle for one scheduled tick. Creating a new token always
/// replaces any prior one held by the same `Scheduler`, which is what
/// keeps "at most one timer per device" true by construction rather than
/// by an external lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub id: u64,
    pub scheduled_at: Instant,
}

/// Per-device timer bookkeeping. Owned exclusively by the `Controller`
/// for that device.
#[derive(Debug)]
pub struct Scheduler {
    next_id: u64,
    active: Option<TimerToken>,
    first_after_setup: bool,
    timer_recovery_failed: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self { next_id: 1, active: None, first_after_setup: true, timer_recovery_failed: false }
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly armed timer, displacing whatever was active.
    pub fn arm(&mut self, now: Instant) -> TimerToken {
        let token = TimerToken { id: self.next_id, scheduled_at: now };
        self.next_id += 1;
        self.active = Some(token);
        token
    }

    /// Clears the recorded timer before running the tick handler.
    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn active_token(&self) -> Option<TimerToken> {
        self.active
    }

    /// `true` exactly once, for the tick immediately following `init`.
    pub fn take_first_after_setup(&mut self) -> bool {
        std::mem::replace(&mut self.first_after_setup, false)
    }

    pub fn force_first_after_setup(&mut self) {
        self.first_after_setup = true;
    }

    /// A recorded timer older than `MAX_HEALTH_CHECK_INTERVAL *
    /// INACTIVE_MULTIPLIER` is considered dead.
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.active {
            Some(token) => now.saturating_duration_since(token.scheduled_at) > MAX_HEALTH_CHECK_INTERVAL.mul_f64(INACTIVE_MULTIPLIER),
            None => false,
        }
    }

    pub fn timer_recovery_failed(&self) -> bool {
        self.timer_recovery_failed
    }

    pub fn set_timer_recovery_failed(&mut self, failed: bool) {
        self.timer_recovery_failed = failed;
    }
}

/// Backoff delay for the `attempt`-th (1-based) timer-arm recovery
/// attempt, capped at `MAX_HEALTH_CHECK_INTERVAL`.
pub fn recovery_backoff(attempt: u32) -> Duration {
    MIN_HEALTH_CHECK_INTERVAL.mul_f64(attempt as f64).min(MAX_HEALTH_CHECK_INTERVAL)
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
