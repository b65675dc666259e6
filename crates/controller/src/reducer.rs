// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pure status-to-state fold: `(Status | Offline |
//! AuthFail) + SessionMemory -> DerivedState'`.
//!
//! One data enum plus one update function, not scattered booleans:
//! `is_preheating`/`is_heating`/`is_cooling` collapse into one
//! `Operation` sum type.

use std::time::{Duration, Instant};

use crate::panic_manager;
use crate::status::{Status, Unit};

/// Fraction of target temperature that counts as "reached".
pub const TEMP_TOLERANCE_PERCENT: f64 = 0.95;

/// Window after `grill_start_time` during which a missing main
/// temperature reading is tolerated rather than treated as a failure.
pub const STARTUP_GRACE_PERIOD: Duration = Duration::from_secs(90);

/// Baseline controller electronics draw, present whenever the unit is
/// powered, never double-counted against component wattages.
pub const BASE_CONTROLLER: f64 = 5.0;
const AUGER_MOTOR: f64 = 60.0;
const IGNITER_HOT: f64 = 300.0;
const FAN_LOW_OPERATION: f64 = 15.0;
const FAN_HIGH_COOLING: f64 = 25.0;
const LIGHT: f64 = 3.0;
const PRIME: f64 = 60.0;

/// Host-supplied knobs the reducer and scheduler read. Configuration
/// *loading* is the host's job; this is the typed shape the core reads
/// once loaded.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Preferences {
    pub refresh_interval: Duration,
    pub unit: Unit,
    pub auto_rediscovery: bool,
    /// `None` means "use the default sentinel", i.e. auto-rediscovery is
    /// eligible; `Some(ip)` pins a specific address.
    pub ip_address: Option<String>,
    pub scan_continue: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            unit: Unit::Fahrenheit,
            auto_rediscovery: true,
            ip_address: None,
            scan_continue: true,
        }
    }
}

/// Per-device memory that survives across polls within one session.
/// Includes a few fields beyond the persisted device keys:
/// `last_successful_health_check` (the reducer needs it for
/// `main_temp_failed`), a `last_valid_grill_temp` cache, and
/// `last_known_grill_on`, which auth-failure arbitration reads directly
/// for the polls where no status was decoded at all to compute it from.
#[derive(Debug, Clone, Default)]
pub struct SessionMemory {
    pub grill_start_time: Option<Instant>,
    pub last_target_temp: Option<i32>,
    pub session_reached_temp: bool,
    pub session_ever_reached_temp: bool,
    pub last_active_time: Option<Instant>,
    pub panic_state: bool,
    pub consecutive_auth_failures: u32,
    pub first_offline_time: Option<Instant>,
    pub last_successful_health_check: Option<Instant>,
    pub last_valid_grill_temp: Option<i32>,
    pub last_known_grill_on: bool,
}

/// The reducer's output.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedState {
    pub connectivity: Connectivity,
    pub operation: Operation,
    pub panic: bool,
    pub message: Message,
    pub power_w: f64,
    pub last_status: Option<Status>,
}

impl Default for DerivedState {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Offline,
            operation: Operation::Off,
            panic: false,
            message: Message::Disconnected,
            power_w: 0.0,
            last_status: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
    AuthFailing { grill_on: bool },
}

/// Collapses the scattered `is_preheating`/`is_heating`/
/// `is_cooling` booleans into one sum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Off,
    Preheating,
    Heating,
    AtTemp,
    Cooling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareErrorKind {
    Error1,
    Error2,
    Error3,
    HighTemp,
    Fan,
    Hot,
    Motor,
    NoPellets,
    Erl,
}

/// User-visible status messages, host-rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Connected,
    ConnectedRediscovered,
    ConnectedPeriodicRediscovery,
    Disconnected,
    ConnectedCooling,
    ConnectedPreheating,
    ConnectedHeating,
    ConnectedAtTemp,
    ConnectedGrillOff,
    ConnectedGrillPriming,
    ConnectedGrillPrimeOff,
    AuthIssueGrillOn,
    AuthIssueGrillOff,
    MsgDelayLastKnown,
    ErrorWithMainTemp,
    PanicLostConnection,
    HardwareError(HardwareErrorKind),
}

/// What the scheduler feeds into [`reduce`] for one tick.
#[derive(Debug, Clone)]
pub enum ReduceInput {
    Fresh(Status),
    Offline,
    AuthFail { grill_on: bool },
}

fn grill_on_from_status(status: &Status) -> bool {
    status.motor_state || status.hot_state || status.module_on
}

fn first_valid_probe(status: &Status) -> Option<i32> {
    [status.grill_temp, status.set_temp, status.smoker_temp, status.p1, status.p2, status.p3, status.p4, status.p1_target]
        .into_iter()
        .find_map(|t| t.value())
}

fn hardware_error(status: &Status) -> Option<HardwareErrorKind> {
    let e = &status.errors;
    if e.error_1 {
        Some(HardwareErrorKind::Error1)
    } else if e.error_2 {
        Some(HardwareErrorKind::Error2)
    } else if e.error_3 {
        Some(HardwareErrorKind::Error3)
    } else if e.high_temp {
        Some(HardwareErrorKind::HighTemp)
    } else if e.fan {
        Some(HardwareErrorKind::Fan)
    } else if e.hot {
        Some(HardwareErrorKind::Hot)
    } else if e.motor {
        Some(HardwareErrorKind::Motor)
    } else if e.no_pellets {
        Some(HardwareErrorKind::NoPellets)
    } else if e.erl {
        Some(HardwareErrorKind::Erl)
    } else {
        None
    }
}

/// Component-wattage estimate: base plus
/// each active component's net above base, fan net depending on whether
/// the unit is cooling. Clamped at zero.
pub fn estimate_power_w(status: &Status, cooling: bool) -> f64 {
    let mut total = BASE_CONTROLLER;
    if status.motor_state {
        total += AUGER_MOTOR - BASE_CONTROLLER;
    }
    if status.hot_state {
        total += IGNITER_HOT - BASE_CONTROLLER;
    }
    if status.light_state {
        total += LIGHT - BASE_CONTROLLER;
    }
    if status.prime_state {
        total += PRIME - BASE_CONTROLLER;
    }
    if status.fan_state {
        total += if cooling { FAN_HIGH_COOLING - BASE_CONTROLLER } else { FAN_LOW_OPERATION - BASE_CONTROLLER };
    }
    total.max(0.0)
}

/// Folds one poll result into derived operational state. `prev` is the
/// state this same fold produced on the previous tick: a sub-threshold
/// auth failure leaves it untouched rather than synthesizing a new state,
/// since one failed poll alone isn't enough to declare the device
/// unreachable.
pub fn reduce(mem: &mut SessionMemory, prev: &DerivedState, input: ReduceInput, now: Instant) -> DerivedState {
    match input {
        ReduceInput::Fresh(status) => reduce_fresh(mem, status, now),
        ReduceInput::Offline => {
            panic_manager::on_offline(mem, now);
            DerivedState {
                connectivity: Connectivity::Offline,
                operation: Operation::Off,
                panic: mem.panic_state,
                message: if mem.panic_state { Message::PanicLostConnection } else { Message::Disconnected },
                power_w: 0.0,
                last_status: None,
            }
        }
        ReduceInput::AuthFail { grill_on } => {
            let outcome = panic_manager::on_auth_fail(mem, grill_on, now);
            if !outcome.mark_offline {
                return prev.clone();
            }
            let connectivity = Connectivity::AuthFailing { grill_on };
            let message = if outcome.panic {
                Message::PanicLostConnection
            } else if grill_on {
                Message::AuthIssueGrillOn
            } else {
                Message::AuthIssueGrillOff
            };
            DerivedState {
                connectivity,
                operation: Operation::Off,
                panic: mem.panic_state,
                message,
                power_w: 0.0,
                last_status: None,
            }
        }
    }
}

fn reduce_fresh(mem: &mut SessionMemory, status: Status, now: Instant) -> DerivedState {
    panic_manager::on_fresh_success(mem);
    mem.last_successful_health_check = Some(now);
    if let Some(valid) = status.grill_temp.value() {
        mem.last_valid_grill_temp = Some(valid);
    }

    let grill_on = grill_on_from_status(&status);
    mem.last_known_grill_on = grill_on;
    let was_on = mem.grill_start_time.is_some();
    let just_started = grill_on && !was_on;
    let prior_target = mem.last_target_temp;
    let new_target = status.set_temp.value();

    if just_started {
        mem.grill_start_time = Some(now);
        mem.session_reached_temp = false;
    } else if !grill_on && was_on {
        mem.grill_start_time = None;
        // "last_target_temp is absent" refers to this
        // poll's reported target, not the stale value from before the
        // falling edge — a target still being reported means the device
        // merely power-cycled, not a complete shutdown.
        if new_target.is_none() {
            mem.session_ever_reached_temp = false;
        }
    }

    if new_target.is_some() && new_target != prior_target {
        mem.session_reached_temp = false;
    }
    mem.last_target_temp = new_target;

    if grill_on {
        mem.last_active_time = Some(now);
    }

    let current = status.grill_temp.value();
    let target = status.set_temp.value();
    if let (Some(current), Some(target)) = (current, target) {
        if target > 0 && current as f64 >= TEMP_TOLERANCE_PERCENT * target as f64 {
            mem.session_reached_temp = true;
            mem.session_ever_reached_temp = true;
        }
    }

    let below_threshold = match (current, target) {
        (Some(current), Some(target)) if target > 0 => {
            (current as f64) < TEMP_TOLERANCE_PERCENT * target as f64
        }
        (None, Some(target)) => target > 0,
        _ => false,
    };
    let has_target = target.is_some_and(|t| t > 0);

    let cooling = !grill_on && status.fan_state;
    let preheating = if just_started {
        has_target && !mem.session_ever_reached_temp
    } else {
        has_target && below_threshold && !mem.session_reached_temp
    };
    let heating = !preheating && has_target && below_threshold && mem.session_ever_reached_temp;

    let operation = if cooling {
        Operation::Cooling
    } else if preheating {
        Operation::Preheating
    } else if heating {
        Operation::Heating
    } else if grill_on {
        Operation::AtTemp
    } else {
        Operation::Off
    };

    let main_temp_failed = current.is_none()
        && mem.last_valid_grill_temp.is_none()
        && mem.grill_start_time.map(|s| now.saturating_duration_since(s) >= STARTUP_GRACE_PERIOD).unwrap_or(true)
        && first_valid_probe(&status).is_none()
        && mem
            .last_successful_health_check
            .map(|t| now.saturating_duration_since(t) > STARTUP_GRACE_PERIOD * 2)
            .unwrap_or(false);

    let using_cached = current.is_none() && mem.last_valid_grill_temp.is_some() && !main_temp_failed;

    let message = if let Some(kind) = hardware_error(&status) {
        Message::HardwareError(kind)
    } else if main_temp_failed {
        Message::ErrorWithMainTemp
    } else if using_cached {
        Message::MsgDelayLastKnown
    } else {
        match operation {
            Operation::Cooling => Message::ConnectedCooling,
            Operation::Preheating => Message::ConnectedPreheating,
            Operation::Heating => Message::ConnectedHeating,
            Operation::AtTemp => Message::ConnectedAtTemp,
            Operation::Off if status.prime_state => Message::ConnectedGrillPriming,
            Operation::Off => Message::ConnectedGrillOff,
        }
    };

    DerivedState {
        connectivity: Connectivity::Online,
        operation,
        panic: mem.panic_state,
        message,
        power_w: estimate_power_w(&status, cooling),
        last_status: Some(status),
    }
}

#[cfg(test)]
#[path = "reducer_tests.rs"]
mod tests;
