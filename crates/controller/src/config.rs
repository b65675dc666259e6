// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The crate's own ambient configuration surface. Full config *loading*,
//! env layering, and the top-level process supervisor belong to the host;
//! what's here is the thin, typed slice the demo binary needs.

use std::time::Duration;

use crate::status::Unit;

/// Flags for the developer harness binary (`src/main.rs`) — not the
/// home-automation host's configuration system, which supplies
/// [`crate::reducer::Preferences`] by its own means.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "pitboss-controller", about = "LAN controller demo harness for Pit Boss WiFi grills")]
pub struct DemoArgs {
    /// IP address of the grill to poll.
    #[arg(long, env = "PITBOSS_IP")]
    pub ip: String,

    /// Device ID used for field-store bookkeeping and logging.
    #[arg(long, default_value = "demo-grill", env = "PITBOSS_DEVICE_ID")]
    pub device_id: String,

    /// Steady-state refresh interval, in seconds.
    #[arg(long, default_value_t = 30, env = "PITBOSS_REFRESH_INTERVAL_SECS")]
    pub refresh_interval_secs: u64,

    /// Temperature unit to report in ("f" or "c").
    #[arg(long, default_value = "f", env = "PITBOSS_UNIT")]
    pub unit: String,

    /// Allow the controller to scan the subnet for a new IP if this one
    /// stops answering.
    #[arg(long, default_value_t = true, env = "PITBOSS_AUTO_REDISCOVERY")]
    pub auto_rediscovery: bool,

    /// Emit structured JSON logs instead of the default human format.
    #[arg(long, default_value_t = false, env = "PITBOSS_LOG_JSON")]
    pub log_json: bool,
}

impl DemoArgs {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn unit(&self) -> Unit {
        if self.unit.eq_ignore_ascii_case("c") {
            Unit::Celsius
        } else {
            Unit::Fahrenheit
        }
    }
}
