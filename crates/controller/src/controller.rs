// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owns one device's scheduler, reducer, and panic manager end to end:
//! `init`/`refresh`/`send_command`/`on_prefs_changed`/`remove`.
//!
//! A composition root that wires config into a spawned background task
//! under a shared `CancellationToken`, with a single rule: every mutation
//! of `SessionMemory`/auth/timer bookkeeping for a device flows through
//! this `Controller`, never directly through its collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::AuthCache;
use crate::discovery::{self, RediscoveryLocks};
use crate::error::ControllerError;
use crate::field_store::{FieldStore, FieldValue, SetOptions};
use crate::reducer::{self, Connectivity, DerivedState, Preferences, ReduceInput, SessionMemory};
use crate::rpc::GrillRpc;
use crate::scheduler::{self, Scheduler};
use crate::status::parse_status;

/// Delay between a successful command send and the follow-up refresh
/// that observes its effect.
pub const REFRESH_DELAY: Duration = Duration::from_secs(3);
/// Flat delay before a single command retry; sends are not transactional.
pub const COMMAND_RETRY_DELAY: Duration = Duration::from_secs(1);

struct Inner {
    ip: String,
    prefs: Preferences,
    prefs_fingerprint: Option<String>,
    mem: SessionMemory,
    state: DerivedState,
    scheduler: Scheduler,
    device_network_id: Option<String>,
    last_rediscovery_attempt: Option<Instant>,
    last_successful_rediscovery: Option<Instant>,
}

/// One device's live controller. Cheap to clone (an `Arc` around the
/// mutable parts); the background tick loop and any delayed-refresh
/// tasks hold their own `Arc` so the controller outlives a caller that
/// drops its handle, until `remove` cancels it.
pub struct Controller<R: GrillRpc, FS: FieldStore> {
    device_id: String,
    rpc: Arc<R>,
    field_store: Arc<FS>,
    auth: Arc<AuthCache>,
    rediscovery_locks: Arc<RediscoveryLocks>,
    cancel: CancellationToken,
    is_polling: AtomicBool,
    inner: Mutex<Inner>,
}

impl<R: GrillRpc + 'static, FS: FieldStore + 'static> Controller<R, FS> {
    pub fn new(
        device_id: impl Into<String>,
        ip: impl Into<String>,
        prefs: Preferences,
        rpc: Arc<R>,
        field_store: Arc<FS>,
        auth: Arc<AuthCache>,
        rediscovery_locks: Arc<RediscoveryLocks>,
    ) -> Arc<Self> {
        Arc::new(Self {
            device_id: device_id.into(),
            rpc,
            field_store,
            auth,
            rediscovery_locks,
            cancel: CancellationToken::new(),
            is_polling: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                ip: ip.into(),
                prefs,
                prefs_fingerprint: None,
                mem: SessionMemory::default(),
                state: DerivedState::default(),
                scheduler: Scheduler::new(),
                device_network_id: None,
                last_rediscovery_attempt: None,
                last_successful_rediscovery: None,
            }),
        })
    }

    /// Extracts metadata, initialises state, and arms the first
    /// health-check tick by forcing one timer restart with
    /// `first_after_setup = true`. Spawns the background tick loop;
    /// idempotent only in the sense that calling it twice spawns two
    /// loops racing the same timer bookkeeping, so callers must not call
    /// it more than once per device lifetime.
    pub async fn init(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().await;
            inner.scheduler.force_first_after_setup();
            let fp = prefs_fingerprint(&inner.prefs);
            inner.prefs_fingerprint = Some(fp);
        }
        info!(device_id = %self.device_id, "device initialised");

        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_loop().await });
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            let interval = {
                let mut inner = self.inner.lock().await;
                inner.scheduler.arm(Instant::now());
                if inner.scheduler.take_first_after_setup() {
                    scheduler::first_tick_interval(&inner.prefs)
                } else {
                    scheduler::compute_interval(inner.state.panic, inner.state.operation, &inner.prefs)
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if self.cancel.is_cancelled() {
                break;
            }

            self.tick().await;
        }
        debug!(device_id = %self.device_id, "tick loop stopped");
    }

    /// One scheduler tick: clear the timer record, skip if a poll is
    /// already in flight, otherwise poll, fold the result through the
    /// reducer/panic manager, and persist the handful of fields the host
    /// needs to see.
    async fn tick(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().await;
            inner.scheduler.clear();
        }

        if self.is_polling.swap(true, Ordering::SeqCst) {
            debug!(device_id = %self.device_id, "poll already in flight, skipping tick");
            return;
        }
        let result = self.poll_once().await;
        self.is_polling.store(false, Ordering::SeqCst);

        let now = Instant::now();
        let grill_on_before = { self.inner.lock().await.mem.last_known_grill_on };

        let input = match result {
            Ok(blobs) => ReduceInput::Fresh(parse_status(&blobs.sc_11, &blobs.sc_12)),
            Err(ControllerError::AuthenticationFailed) => ReduceInput::AuthFail { grill_on: grill_on_before },
            Err(e) => {
                debug!(device_id = %self.device_id, err = %e, "poll failed, treating as offline");
                ReduceInput::Offline
            }
        };

        let (new_state, should_rediscover) = {
            let mut inner = self.inner.lock().await;
            let was_panic = inner.mem.panic_state;
            let prev = inner.state.clone();
            let new_state = reducer::reduce(&mut inner.mem, &prev, input, now);
            if !was_panic && new_state.panic {
                warn!(device_id = %self.device_id, "entering panic: grill was recently active and is now unreachable");
            }
            if was_panic && !new_state.panic {
                info!(device_id = %self.device_id, "exiting panic");
            }
            inner.state = new_state.clone();
            let offline = !matches!(new_state.connectivity, Connectivity::Online);
            (new_state, offline)
        };

        self.persist_state(&new_state).await;

        if should_rediscover {
            self.maybe_rediscover().await;
        }
    }

    async fn poll_once(&self) -> Result<crate::rpc::StateBlobs, ControllerError> {
        let ip = self.inner.lock().await.ip.clone();
        self.rpc.get_state(&ip).await
    }

    async fn persist_state(&self, state: &DerivedState) {
        let inner = self.inner.lock().await;
        self.field_store
            .set(&self.device_id, "panic_state", FieldValue::Bool(state.panic), SetOptions { persist: true })
            .await;
        self.field_store
            .set(
                &self.device_id,
                "is_connected",
                FieldValue::Bool(matches!(state.connectivity, Connectivity::Online)),
                SetOptions { persist: true },
            )
            .await;
        if let Some(t) = inner.mem.last_active_time {
            self.field_store
                .set(&self.device_id, "last_active_time", FieldValue::Instant(t), SetOptions { persist: true })
                .await;
        }
        if let Some(t) = inner.mem.first_offline_time {
            self.field_store
                .set(&self.device_id, "first_offline_time", FieldValue::Instant(t), SetOptions { persist: true })
                .await;
        }
        self.field_store
            .set(
                &self.device_id,
                "consecutive_auth_failures",
                FieldValue::Int(inner.mem.consecutive_auth_failures as i64),
                SetOptions { persist: true },
            )
            .await;
    }

    /// Targeted rediscovery after a failed poll, gated by the
    /// dual rate limit and the user's auto-rediscovery preference, and
    /// serialised per device by [`RediscoveryLocks`].
    async fn maybe_rediscover(self: &Arc<Self>) {
        let eligible = {
            let inner = self.inner.lock().await;
            inner.prefs.auto_rediscovery && inner.prefs.ip_address.is_none()
        };
        if !eligible {
            return;
        }
        let hub_ip = { self.inner.lock().await.ip.clone() };
        self.run_rediscovery(&hub_ip, false).await;
    }

    /// Runs one rediscovery attempt. `bypass_rate_limit` skips the dual
    /// rate limit entirely; a failed-poll-triggered attempt still has to clear it.
    async fn run_rediscovery(self: &Arc<Self>, hub_ip: &str, bypass_rate_limit: bool) {
        if !bypass_rate_limit {
            let (prefs, first_offline_time, last_attempt, last_success) = {
                let inner = self.inner.lock().await;
                (inner.prefs.clone(), inner.mem.first_offline_time, inner.last_rediscovery_attempt, inner.last_successful_rediscovery)
            };
            let decision =
                discovery::check_rate_limit(&prefs, Instant::now(), last_attempt, first_offline_time, last_success, false);
            if !decision.allowed {
                debug!(device_id = %self.device_id, "rediscovery rate-limited, not attempted");
                return;
            }
        }

        if !self.rediscovery_locks.try_acquire(&self.device_id).await {
            debug!(device_id = %self.device_id, "rediscovery already running for this device");
            return;
        }

        {
            let mut inner = self.inner.lock().await;
            inner.last_rediscovery_attempt = Some(Instant::now());
        }
        self.field_store
            .set(&self.device_id, "rediscovery_in_progress", FieldValue::Bool(true), SetOptions { persist: true })
            .await;
        self.field_store
            .set(&self.device_id, "rediscovery_start_time", FieldValue::Instant(Instant::now()), SetOptions { persist: true })
            .await;

        let Some(prefix) = discovery::subnet_prefix(hub_ip) else {
            warn!(device_id = %self.device_id, ip = %hub_ip, "cannot derive subnet prefix, aborting rediscovery");
            self.rediscovery_locks.release(&self.device_id).await;
            return;
        };

        let (expected_id, scan_continue) = {
            let inner = self.inner.lock().await;
            (inner.device_network_id.clone(), inner.prefs.scan_continue)
        };
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + discovery::REDISCOVERY_TIMEOUT;
        let probe: Arc<discovery::ProbeFn> = Arc::new(|ip| Box::pin(discovery::probe_device(ip)));

        info!(device_id = %self.device_id, prefix = %prefix, "starting targeted rediscovery");
        let outcome = discovery::scan_subnet(
            &prefix,
            discovery::DEFAULT_SCAN_START_IP,
            expected_id.as_deref(),
            probe,
            &cancel,
            deadline,
            scan_continue,
        )
        .await;

        match outcome {
            discovery::ScanOutcome::Matched { ip: new_ip, device_id } => {
                let old_ip = { self.inner.lock().await.ip.clone() };
                discovery::apply_match(self.field_store.as_ref(), &self.auth, &self.device_id, &old_ip, &new_ip, Instant::now()).await;
                let mut inner = self.inner.lock().await;
                inner.ip = new_ip.clone();
                inner.device_network_id = Some(device_id);
                inner.last_successful_rediscovery = Some(Instant::now());
                info!(device_id = %self.device_id, ip = %new_ip, "rediscovery matched, updated address");
            }
            discovery::ScanOutcome::Exhausted => {
                warn!(device_id = %self.device_id, "rediscovery scan exhausted with no match");
                self.field_store.clear(&self.device_id, "last_scan_position").await;
            }
            discovery::ScanOutcome::TimedOut { next_position } => {
                warn!(device_id = %self.device_id, next_position, "rediscovery scan timed out, will resume");
                self.field_store
                    .set(&self.device_id, "last_scan_position", FieldValue::Int(next_position as i64), SetOptions { persist: true })
                    .await;
            }
            discovery::ScanOutcome::Cancelled => {
                debug!(device_id = %self.device_id, "rediscovery scan cancelled");
            }
        }

        self.field_store.clear(&self.device_id, "rediscovery_in_progress").await;
        self.field_store.clear(&self.device_id, "rediscovery_start_time").await;
        self.rediscovery_locks.release(&self.device_id).await;
    }

    /// Manual poll requested by the host: rejects
    /// while a poll is already in flight rather than queuing behind it,
    /// and makes sure the tick loop is still running.
    pub async fn refresh(self: &Arc<Self>) -> Result<(), ControllerError> {
        if self.is_polling.load(Ordering::SeqCst) {
            return Err(ControllerError::Saturated);
        }
        self.ensure_active().await;
        self.tick().await;
        Ok(())
    }

    /// Re-arms the tick loop if the recorded timer has gone stale (spec
    /// §4.I "Timer staleness") — e.g. after the process was suspended.
    async fn ensure_active(self: &Arc<Self>) {
        let stale = {
            let inner = self.inner.lock().await;
            inner.scheduler.is_stale(Instant::now())
        };
        if stale {
            warn!(device_id = %self.device_id, "stale timer detected, restarting tick loop");
            {
                let mut inner = self.inner.lock().await;
                inner.scheduler.clear();
                inner.scheduler.force_first_after_setup();
            }
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_loop().await });
        }
    }

    /// Sends an encoded command with one retry and schedules a follow-up
    /// refresh `REFRESH_DELAY` after a successful send.
    pub async fn send_command(self: &Arc<Self>, command: Vec<u8>) -> Result<(), ControllerError> {
        self.ensure_active().await;
        let ip = { self.inner.lock().await.ip.clone() };

        match self.rpc.send_mcu_command(&ip, &command).await {
            Ok(()) => {
                self.schedule_delayed_refresh();
                Ok(())
            }
            Err(first_err) => {
                debug!(device_id = %self.device_id, err = %first_err, "command send failed, retrying once");
                tokio::time::sleep(COMMAND_RETRY_DELAY).await;
                let outcome = self.rpc.send_mcu_command(&ip, &command).await;
                if outcome.is_ok() {
                    self.schedule_delayed_refresh();
                }
                outcome
            }
        }
    }

    fn schedule_delayed_refresh(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(REFRESH_DELAY).await;
            if this.cancel.is_cancelled() {
                return;
            }
            let _ = this.refresh().await;
        });
    }

    /// Applies preference changes, a no-op
    /// if the host re-delivers preferences that hash identically to what
    /// was last processed. Newly enabling auto-rediscovery (with the IP
    /// preference at its default sentinel) kicks off an immediate scan
    /// that bypasses the normal rate limit.
    pub async fn on_prefs_changed(self: &Arc<Self>, new_prefs: Preferences) {
        let fingerprint = prefs_fingerprint(&new_prefs);
        let mut inner = self.inner.lock().await;
        if inner.prefs_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return;
        }

        let was_rediscovery_eligible = inner.prefs.auto_rediscovery && inner.prefs.ip_address.is_none();
        let old_ip_pref = inner.prefs.ip_address.clone();
        if new_prefs.ip_address != old_ip_pref {
            if let Some(ref ip) = new_prefs.ip_address {
                if discovery::parse_ipv4(ip).is_some() {
                    let old_ip = inner.ip.clone();
                    inner.ip = ip.clone();
                    drop(inner);
                    self.auth.invalidate(&old_ip).await;
                    self.auth.invalidate(ip).await;
                    inner = self.inner.lock().await;
                    info!(device_id = %self.device_id, ip = %ip, "IP preference applied");
                } else {
                    warn!(device_id = %self.device_id, ip = %ip, "ignoring malformed IP preference");
                }
            }
        }

        let is_rediscovery_eligible = new_prefs.auto_rediscovery && new_prefs.ip_address.is_none();
        let hub_ip = inner.ip.clone();

        inner.prefs = new_prefs;
        inner.prefs_fingerprint = Some(fingerprint);
        drop(inner);

        if is_rediscovery_eligible && !was_rediscovery_eligible {
            info!(device_id = %self.device_id, "auto-rediscovery newly enabled, running an immediate bypass scan");
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_rediscovery(&hub_ip, true).await });
        }
    }

    /// Tears the device down: cancels the tick loop
    /// and any pending delayed refresh, and clears the panic/timing
    /// fields from the field store.
    pub async fn remove(&self) {
        self.cancel.cancel();
        for key in [
            "panic_state",
            "last_active_time",
            "first_offline_time",
            "is_polling",
            "rediscovery_in_progress",
            "rediscovery_start_time",
            "last_scan_position",
        ] {
            self.field_store.clear(&self.device_id, key).await;
        }
        info!(device_id = %self.device_id, "device removed");
    }

    pub async fn current_state(&self) -> DerivedState {
        self.inner.lock().await.state.clone()
    }

    pub async fn current_ip(&self) -> String {
        self.inner.lock().await.ip.clone()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// A stable fingerprint of a `Preferences` value, used by
/// `on_prefs_changed` to detect "nothing actually changed" without
/// deriving `Hash` on a struct whose fields exist for serde round-tripping
/// to the host, not hashing.
fn prefs_fingerprint(prefs: &Preferences) -> String {
    serde_json::to_string(prefs).unwrap_or_default()
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
