use super::*;
use std::time::{Duration, Instant};

#[test]
fn offline_within_panic_timeout_enters_panic() {
    let mut mem = SessionMemory { last_active_time: Some(Instant::now()), ..Default::default() };
    on_offline(&mut mem, Instant::now());
    assert!(mem.panic_state);
}

#[test]
fn offline_long_after_activity_does_not_panic() {
    let now = Instant::now();
    let stale = now.checked_sub(PANIC_TIMEOUT + Duration::from_secs(1));
    let mut mem = SessionMemory { last_active_time: stale, ..Default::default() };
    on_offline(&mut mem, now);
    assert!(!mem.panic_state);
}

#[test]
fn panic_clears_once_silence_exceeds_timeout() {
    let now = Instant::now();
    let mut mem = SessionMemory { panic_state: true, last_active_time: None, ..Default::default() };
    on_offline(&mut mem, now);
    assert!(!mem.panic_state);
}

#[test]
fn single_auth_failure_does_not_act() {
    let mut mem = SessionMemory::default();
    let outcome = on_auth_fail(&mut mem, true, Instant::now());
    assert!(!outcome.mark_offline);
    assert_eq!(mem.consecutive_auth_failures, 1);
}

#[test]
fn second_consecutive_auth_failure_with_grill_on_panics() {
    let mut mem = SessionMemory::default();
    on_auth_fail(&mut mem, true, Instant::now());
    let outcome = on_auth_fail(&mut mem, true, Instant::now());
    assert!(outcome.mark_offline);
    assert!(outcome.panic);
    assert!(mem.panic_state);
}

#[test]
fn second_consecutive_auth_failure_with_grill_off_marks_offline_without_panic() {
    let mut mem = SessionMemory::default();
    on_auth_fail(&mut mem, false, Instant::now());
    let outcome = on_auth_fail(&mut mem, false, Instant::now());
    assert!(outcome.mark_offline);
    assert!(!outcome.panic);
}

#[test]
fn fresh_success_resets_counters() {
    let mut mem = SessionMemory { consecutive_auth_failures: 4, panic_state: true, ..Default::default() };
    on_fresh_success(&mut mem);
    assert_eq!(mem.consecutive_auth_failures, 0);
    assert!(!mem.panic_state);
}
