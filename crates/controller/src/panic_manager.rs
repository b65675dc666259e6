// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Panic-state transition rules and auth-failure arbitration.
//!
//! A consecutive-failure counter gates action on a background-probe loop:
//! enter panic after the auth threshold, or on an offline transition
//! within `PANIC_TIMEOUT` of the device's last known activity.

use std::time::{Duration, Instant};

use crate::reducer::SessionMemory;

/// How long after `last_active_time` a silent device still counts as
/// "recently active" for panic purposes.
pub const PANIC_TIMEOUT: Duration = Duration::from_secs(300);

/// Consecutive auth failures required before the panic manager acts on
/// them: two consecutive auth failures.
pub const AUTH_FAILURE_THRESHOLD: u32 = 2;

/// Resets panic/auth-failure bookkeeping after a fresh successful status
/// marks the device online.
pub fn on_fresh_success(mem: &mut SessionMemory) {
    mem.panic_state = false;
    mem.consecutive_auth_failures = 0;
}

/// Applies the `Offline` transition rules: enters panic when the device
/// was recently active, clears panic once it's been silent long enough
/// that "recently active" no longer applies.
pub fn on_offline(mem: &mut SessionMemory, now: Instant) {
    let recently_active = mem
        .last_active_time
        .map(|t| now.saturating_duration_since(t) <= PANIC_TIMEOUT)
        .unwrap_or(false);

    if !mem.panic_state && recently_active {
        mem.panic_state = true;
    } else if mem.panic_state && !recently_active {
        mem.panic_state = false;
    }

    if mem.first_offline_time.is_none() {
        mem.first_offline_time = Some(now);
    }
}

/// Outcome of [`on_auth_fail`]: whether the device should be considered
/// offline this tick, and whether panic should be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthFailOutcome {
    pub mark_offline: bool,
    pub panic: bool,
}

/// Applies the auth-failure arbitration rule. `grill_on` is the last
/// known switch state (motor/hot/module) before the failure.
pub fn on_auth_fail(mem: &mut SessionMemory, grill_on: bool, now: Instant) -> AuthFailOutcome {
    mem.consecutive_auth_failures = mem.consecutive_auth_failures.saturating_add(1);

    if mem.consecutive_auth_failures < AUTH_FAILURE_THRESHOLD {
        return AuthFailOutcome { mark_offline: false, panic: mem.panic_state };
    }

    if mem.first_offline_time.is_none() {
        mem.first_offline_time = Some(now);
    }

    if grill_on {
        mem.panic_state = true;
        AuthFailOutcome { mark_offline: true, panic: true }
    } else {
        AuthFailOutcome { mark_offline: true, panic: mem.panic_state }
    }
}

#[cfg(test)]
#[path = "panic_manager_tests.rs"]
mod tests;
