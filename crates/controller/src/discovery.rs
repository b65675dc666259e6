// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Targeted subnet rediscovery: bounded-concurrency, resumable,
//! dual-rate-limited scanning for a grill that has gone silent on its last
//! known address.
//!
//! A scan can either stop the moment one candidate matches or keep the
//! full range in flight and settle on a match at the end (see
//! `scan_subnet`'s `continue_full_range` flag), so this uses a `JoinSet`
//! plus a `Semaphore` rather than a simpler "poll everything" loop.
//!
//! The in-memory lock that keeps one device from running two overlapping
//! scans is process-global, keyed by device ID. Rather than a genuine
//! `static`, [`RediscoveryLocks`] is an ordinary shared value: the caller
//! constructs one and hands the same `Arc` to every `Controller`, giving
//! the process-global behaviour without reaching for global mutable
//! state the rest of this crate avoids everywhere else (see DESIGN.md).

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::field_store::{FieldStore, FieldValue, SetOptions};
use crate::reducer::Preferences;

/// Bounded-concurrency ceiling for one scan (spec `MAX_CONCURRENT_CONNECTIONS`).
pub const MAX_CONCURRENT_CONNECTIONS: usize = 10;
/// Inclusive host-octet scan range (spec `DEFAULT_SCAN_START_IP`/`_END_IP`).
pub const DEFAULT_SCAN_START_IP: u8 = 2;
pub const DEFAULT_SCAN_END_IP: u8 = 253;
/// Timeout for one candidate's probe request.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Deadline for an entire scan attempt, from wait-start.
pub const REDISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
/// Grace period after the deadline for outstanding probes to unwind.
pub const SCAN_CANCEL_GRACE: Duration = Duration::from_secs(2);
/// Floor below which rediscovery is not retried at all (spec `PERIODIC_REDISCOVERY_INTERVAL`).
pub const PERIODIC_REDISCOVERY_INTERVAL: Duration = Duration::from_secs(86_400);
/// A `rediscovery_in_progress` flag older than this is considered stuck and reset.
pub const STUCK_FLAG_TIMEOUT: Duration = Duration::from_secs(300);

/// Process-global (de facto: one instance, shared via `Arc`), keyed-by-
/// device-ID set of devices with a scan currently running. Prevents two
/// overlapping scans for the same device within one process.
#[derive(Default)]
pub struct RediscoveryLocks {
    in_progress: Mutex<HashSet<String>>,
}

impl RediscoveryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to take the lock for `device_id`. `false` means a scan is
    /// already running for that device in this process.
    pub async fn try_acquire(&self, device_id: &str) -> bool {
        self.in_progress.lock().await.insert(device_id.to_string())
    }

    pub async fn release(&self, device_id: &str) {
        self.in_progress.lock().await.remove(device_id);
    }
}

/// The outcome of [`check_rate_limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
}

/// Dual rate limit: a short per-attempt cooldown, and a
/// 24-hour floor that must elapse both since the device went offline and
/// since the last successful rediscovery. `bypass` (a preference-change
/// scan) skips both checks.
#[allow(clippy::too_many_arguments)]
pub fn check_rate_limit(
    prefs: &Preferences,
    now: Instant,
    last_rediscovery_attempt: Option<Instant>,
    first_offline_time: Option<Instant>,
    last_successful_rediscovery: Option<Instant>,
    bypass: bool,
) -> RateLimitDecision {
    if bypass {
        return RateLimitDecision { allowed: true };
    }

    let base = if prefs.refresh_interval.is_zero() { Duration::from_secs(30) } else { prefs.refresh_interval };
    let cooldown = base.saturating_mul(3);
    if let Some(last_attempt) = last_rediscovery_attempt {
        if now.saturating_duration_since(last_attempt) < cooldown {
            return RateLimitDecision { allowed: false };
        }
    }

    let offline_long_enough = first_offline_time
        .map(|t| now.saturating_duration_since(t) >= PERIODIC_REDISCOVERY_INTERVAL)
        .unwrap_or(false);
    let rediscovery_stale_enough = last_successful_rediscovery
        .map(|t| now.saturating_duration_since(t) >= PERIODIC_REDISCOVERY_INTERVAL)
        .unwrap_or(true);

    RateLimitDecision { allowed: offline_long_enough && rediscovery_stale_enough }
}

/// `true` when a persisted `rediscovery_in_progress` flag is stale enough
/// to ignore and reset.
pub fn is_stuck_flag(rediscovery_start_time: Option<Instant>, now: Instant) -> bool {
    match rediscovery_start_time {
        Some(start) => now.saturating_duration_since(start) > STUCK_FLAG_TIMEOUT,
        None => false,
    }
}

/// Derives the `a.b.c.` subnet prefix (first three octets) from a hub IP.
pub fn subnet_prefix(hub_ip: &str) -> Option<String> {
    let octets = parse_ipv4(hub_ip)?;
    Some(format!("{}.{}.{}.", octets[0], octets[1], octets[2]))
}

/// Lenient IPv4 dotted-quad parser, used here and by preference-change
/// IP validation.
pub fn parse_ipv4(s: &str) -> Option<[u8; 4]> {
    let mut parts = s.split('.');
    let mut out = [0u8; 4];
    for slot in &mut out {
        *slot = parts.next()?.parse::<u8>().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

/// One scan attempt's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A responding device matched (either the known `device_network_id`,
    /// or the first Pit Boss responder when none was known).
    Matched { ip: String, device_id: String },
    /// The full range was probed with no match.
    Exhausted,
    /// The deadline elapsed before the range was exhausted; scanning
    /// should resume at `next_position` next attempt.
    TimedOut { next_position: u8 },
    /// Cancelled cooperatively before completion.
    Cancelled,
}

/// A type-erased probe: candidate IP in, reported device ID out (`None`
/// on any failure, timeout, or non-Pit-Boss response).
pub type BoxProbeFuture = Pin<Box<dyn Future<Output = Option<String>> + Send>>;
pub type ProbeFn = dyn Fn(String) -> BoxProbeFuture + Send + Sync;

/// Runs a bounded-concurrency sweep of `prefix{start..=DEFAULT_SCAN_END_IP}`.
/// `probe` is injected so tests can run this without a real
/// network; production wiring points it at [`probe_device`].
///
/// `continue_full_range` selects which of the two discovery behaviors a
/// match stops at: `false` aborts the remaining probes the instant a
/// candidate matches (fastest return); `true` keeps the whole range
/// in flight to completion, collecting every match, and at the end picks
/// the lowest-octet one — useful when the caller wants a stable,
/// reproducible pick rather than whichever probe happens to finish first.
pub async fn scan_subnet(
    prefix: &str,
    start: u8,
    expected_device_id: Option<&str>,
    probe: Arc<ProbeFn>,
    cancel: &CancellationToken,
    deadline: Instant,
    continue_full_range: bool,
) -> ScanOutcome {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CONNECTIONS));
    let mut tasks: JoinSet<(u8, Option<String>)> = JoinSet::new();
    let mut matches: Vec<(u8, String)> = Vec::new();

    let mut next_to_spawn = start;
    let end = DEFAULT_SCAN_END_IP;

    loop {
        if cancel.is_cancelled() {
            tasks.abort_all();
            return ScanOutcome::Cancelled;
        }
        if Instant::now() >= deadline {
            tasks.abort_all();
            return ScanOutcome::TimedOut { next_position: next_to_spawn };
        }

        // Keep the in-flight set topped up to the concurrency ceiling
        // while there's still range left to cover.
        while next_to_spawn <= end && tasks.len() < MAX_CONCURRENT_CONNECTIONS {
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let ip = format!("{prefix}{next_to_spawn}");
            let octet = next_to_spawn;
            let probe = probe.clone();
            tasks.spawn(async move {
                let _permit = permit;
                (octet, probe(ip).await)
            });
            if next_to_spawn == end {
                next_to_spawn = end.saturating_add(1);
                break;
            }
            next_to_spawn += 1;
        }

        if tasks.is_empty() {
            return match matches.into_iter().min_by_key(|(octet, _)| *octet) {
                Some((octet, device_id)) => ScanOutcome::Matched { ip: format!("{prefix}{octet}"), device_id },
                None => ScanOutcome::Exhausted,
            };
        }

        let joined = tokio::select! {
            _ = cancel.cancelled() => {
                tasks.abort_all();
                return ScanOutcome::Cancelled;
            }
            _ = tokio::time::sleep_until(deadline.into()) => {
                tasks.abort_all();
                return ScanOutcome::TimedOut { next_position: next_to_spawn.min(end).max(start) };
            }
            joined = tasks.join_next() => joined,
        };

        let Some(joined) = joined else { continue };
        let Ok((octet, reported_id)) = joined else { continue };
        let Some(reported_id) = reported_id else { continue };

        let is_match = expected_device_id.map(|expected| expected == reported_id).unwrap_or(true);
        if is_match {
            if !continue_full_range {
                tasks.abort_all();
                return ScanOutcome::Matched { ip: format!("{prefix}{octet}"), device_id: reported_id };
            }
            matches.push((octet, reported_id));
        }
    }
}

/// Production probe: an unauthenticated `Sys.GetInfo` with a short
/// timeout, accepting only responses that identify as a Pit Boss unit.
pub async fn probe_device(ip: String) -> Option<String> {
    let http = crate::http_client::GrillHttpClient::with_timeout(&ip, PROBE_TIMEOUT);
    let auth = crate::auth::AuthCache::new();
    let rpc = crate::rpc::RpcClient::new(&http, &auth, ip.clone());
    let info = rpc.sys_get_info().await.ok()?;
    if info.get("app").and_then(|v| v.as_str()) != Some("PitBoss") {
        return None;
    }
    info.get("id").and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Persists the fields a successful match updates: new IP, cleared auth
/// cache, and the rediscovery bookkeeping fields.
pub async fn apply_match(
    field_store: &dyn FieldStore,
    auth: &crate::auth::AuthCache,
    device_id: &str,
    old_ip: &str,
    new_ip: &str,
    now: Instant,
) {
    field_store.set(device_id, "ip_address", FieldValue::Text(new_ip.to_string()), SetOptions { persist: true }).await;
    field_store
        .set(device_id, "last_successful_rediscovery", FieldValue::Instant(now), SetOptions { persist: true })
        .await;
    field_store.clear(device_id, "rediscovery_in_progress").await;
    field_store.clear(device_id, "rediscovery_start_time").await;
    field_store.clear(device_id, "last_scan_position").await;
    auth.invalidate(old_ip).await;
    auth.invalidate(new_ip).await;
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
