use super::*;
use crate::status::{ErrorFlags, Temp};
use proptest::prelude::*;

fn status_with(grill: (u8, u8, u8), set: (u8, u8, u8), motor: bool, hot: bool, fan: bool, module_on: bool) -> Status {
    Status {
        unit: Unit::Fahrenheit,
        grill_temp: to_temp(grill),
        set_temp: to_temp(set),
        motor_state: motor,
        hot_state: hot,
        fan_state: fan,
        module_on,
        ..Status::default()
    }
}

fn to_temp(triple: (u8, u8, u8)) -> Temp {
    crate::status::convert_temperature(&[triple.0, triple.1, triple.2], 1)
}

// Seeded mid-session (not the very first tick) so the "runtime 0"
// just-started override doesn't apply — a grill already at temp on its
// first-ever tick would hit that special case and read as Preheating
// instead.
#[test]
fn steady_healthy_poll_is_at_temp() {
    let earlier = Instant::now() - Duration::from_secs(600);
    let mut mem = SessionMemory {
        grill_start_time: Some(earlier),
        last_target_temp: Some(250),
        session_reached_temp: true,
        session_ever_reached_temp: true,
        ..Default::default()
    };
    let status = status_with((2, 5, 0), (2, 5, 0), true, false, true, true);
    let result = reduce(&mut mem, &DerivedState::default(), ReduceInput::Fresh(status), Instant::now());
    assert_eq!(result.connectivity, Connectivity::Online);
    assert_eq!(result.operation, Operation::AtTemp);
    assert!(!result.panic);
    assert_eq!(result.message, Message::ConnectedAtTemp);
    assert_eq!(result.power_w, BASE_CONTROLLER + (AUGER_MOTOR - BASE_CONTROLLER) + (FAN_LOW_OPERATION - BASE_CONTROLLER));
}

#[test]
fn preheat_on_first_turn_on() {
    let mut mem = SessionMemory::default();
    let status = status_with((1, 5, 0), (2, 5, 0), true, false, false, true);
    let result = reduce(&mut mem, &DerivedState::default(), ReduceInput::Fresh(status), Instant::now());
    assert_eq!(result.operation, Operation::Preheating);
    assert!(!mem.session_ever_reached_temp);
    assert_eq!(result.message, Message::ConnectedPreheating);
}

#[test]
fn panic_on_loss_after_recent_activity() {
    let mut mem = SessionMemory { last_active_time: Some(Instant::now()), ..Default::default() };
    let result = reduce(&mut mem, &DerivedState::default(), ReduceInput::Offline, Instant::now());
    assert!(result.panic);
    assert_eq!(result.message, Message::PanicLostConnection);
}

#[test]
fn auth_failure_grace_then_panic_on_second_consecutive_failure() {
    let mut mem = SessionMemory::default();
    let online = DerivedState {
        connectivity: Connectivity::Online,
        operation: Operation::AtTemp,
        panic: false,
        message: Message::ConnectedAtTemp,
        power_w: 65.0,
        last_status: None,
    };

    // A single, sub-threshold auth failure leaves the prior state untouched.
    let first = reduce(&mut mem, &online, ReduceInput::AuthFail { grill_on: true }, Instant::now());
    assert_eq!(first, online);
    assert!(!first.panic);

    let second = reduce(&mut mem, &first, ReduceInput::AuthFail { grill_on: true }, Instant::now());
    assert!(second.panic);
    assert_eq!(second.message, Message::PanicLostConnection);
}

#[test]
fn session_ever_reached_persists_across_power_cycle_with_target() {
    let mut mem = SessionMemory::default();
    let hot = status_with((2, 5, 0), (2, 5, 0), true, false, true, true);
    reduce(&mut mem, &DerivedState::default(), ReduceInput::Fresh(hot.clone()), Instant::now());
    assert!(mem.session_ever_reached_temp);

    // Power cycles off, but a target temp is still remembered (same session).
    let off_with_target = status_with((2, 0, 0), (2, 5, 0), false, false, false, false);
    reduce(&mut mem, &DerivedState::default(), ReduceInput::Fresh(off_with_target), Instant::now());
    assert!(mem.session_ever_reached_temp);
}

#[test]
fn complete_shutdown_clears_session_ever_reached() {
    let mut mem = SessionMemory::default();
    let hot = status_with((2, 5, 0), (2, 5, 0), true, false, true, true);
    reduce(&mut mem, &DerivedState::default(), ReduceInput::Fresh(hot), Instant::now());
    assert!(mem.session_ever_reached_temp);

    let off_no_target = Status { set_temp: Temp::Disconnected, ..Status::default() };
    reduce(&mut mem, &DerivedState::default(), ReduceInput::Fresh(off_no_target), Instant::now());
    assert!(!mem.session_ever_reached_temp);
}

#[test]
fn hardware_error_takes_priority_over_operational_message() {
    let mut mem = SessionMemory::default();
    let mut status = status_with((2, 5, 0), (2, 5, 0), true, false, true, true);
    status.errors = ErrorFlags { no_pellets: true, ..Default::default() };
    let result = reduce(&mut mem, &DerivedState::default(), ReduceInput::Fresh(status), Instant::now());
    assert_eq!(result.message, Message::HardwareError(HardwareErrorKind::NoPellets));
}

#[yare::parameterized(
    on = { true, Message::AuthIssueGrillOn },
    off = { false, Message::AuthIssueGrillOff },
)]
fn auth_failure_message_reflects_last_known_switch_state(grill_on: bool, expected: Message) {
    let mut mem = SessionMemory::default();
    let first = reduce(&mut mem, &DerivedState::default(), ReduceInput::AuthFail { grill_on }, Instant::now());
    let second = reduce(&mut mem, &first, ReduceInput::AuthFail { grill_on }, Instant::now());
    if grill_on {
        assert_eq!(second.message, Message::PanicLostConnection);
    } else {
        assert_eq!(second.message, expected);
    }
}

proptest! {
    // Power estimate is never below base, never negative, for any
    // combination of active components.
    #[test]
    fn prop_power_estimate_floor(
        motor in any::<bool>(), hot in any::<bool>(), fan in any::<bool>(),
        light in any::<bool>(), prime in any::<bool>(), cooling in any::<bool>(),
    ) {
        let status = Status {
            motor_state: motor, hot_state: hot, fan_state: fan,
            light_state: light, prime_state: prime, ..Status::default()
        };
        let power = estimate_power_w(&status, cooling);
        prop_assert!(power >= BASE_CONTROLLER);
        prop_assert!(power >= 0.0);
    }
}
