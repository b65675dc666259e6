// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed endpoints over HTTP+auth with password-retry, plus
//! the command byte encoders and firmware-version comparison used by the
//! controller and command-handler-facing API.

use serde_json::json;

use crate::auth::{AuthCache, AuthTokens};
use crate::codec::encode_hex;
use crate::error::ControllerError;
use crate::http_client::GrillHttpClient;
use crate::status::Unit;

/// Lower/upper Fahrenheit bound a `set_temperature` call will accept
/// before snapping to the nearest approved setpoint.
pub const MIN_TEMP_F: i32 = 180;
pub const MAX_TEMP_F: i32 = 500;
/// Celsius equivalents.
pub const MIN_TEMP_C: i32 = 82;
pub const MAX_TEMP_C: i32 = 260;

/// Approved Fahrenheit setpoints.
pub const APPROVED_F: &[i32] = &[180, 200, 225, 250, 275, 300, 325, 350, 375, 400, 425, 450, 475, 500];
/// Approved Celsius setpoints.
pub const APPROVED_C: &[i32] = &[82, 93, 107, 121, 135, 148, 162, 176, 190, 204, 218, 232, 260];

/// Oldest firmware the controller considers fully supported.
pub const MINIMUM_FIRMWARE_VERSION: &str = "0.5.7";

/// Snaps `value` to the nearest entry in `unit`'s approved setpoint list,
/// breaking ties toward the lower value.
pub fn snap_to_approved(value: i32, unit: Unit) -> i32 {
    let table = match unit {
        Unit::Fahrenheit => APPROVED_F,
        Unit::Celsius => APPROVED_C,
    };
    let mut best = table[0];
    let mut best_dist = (value - best).abs();
    for &candidate in &table[1..] {
        let dist = (value - candidate).abs();
        if dist < best_dist {
            best = candidate;
            best_dist = dist;
        }
    }
    best
}

fn temp_range(unit: Unit) -> (i32, i32) {
    match unit {
        Unit::Fahrenheit => (MIN_TEMP_F, MAX_TEMP_F),
        Unit::Celsius => (MIN_TEMP_C, MAX_TEMP_C),
    }
}

/// Encodes `set_temperature(t)` after range-checking `t` and snapping it
/// to the nearest approved setpoint.
pub fn set_temperature(t: i32, unit: Unit) -> Result<Vec<u8>, ControllerError> {
    let (min, max) = temp_range(unit);
    if t < min || t > max {
        return Err(ControllerError::InvalidArgument(format!(
            "temperature {t} out of range [{min}, {max}]"
        )));
    }
    let snapped = snap_to_approved(t, unit);
    let hundreds = (snapped / 100) % 10;
    let tens = (snapped / 10) % 10;
    let units = snapped % 10;
    Ok(vec![0xfe, 0x05, 0x01, hundreds as u8, tens as u8, units as u8, 0xff])
}

pub fn set_light(on: bool) -> Vec<u8> {
    vec![0xfe, 0x02, if on { 0x01 } else { 0x00 }, 0xff]
}

pub fn set_prime(on: bool) -> Vec<u8> {
    vec![0xfe, 0x08, if on { 0x01 } else { 0x00 }, 0xff]
}

pub fn set_power(on: bool) -> Vec<u8> {
    vec![0xfe, 0x01, if on { 0x01 } else { 0x02 }, 0xff]
}

pub fn set_unit(celsius: bool) -> Vec<u8> {
    vec![0xfe, 0x09, if celsius { 0x02 } else { 0x01 }, 0xff]
}

/// Parses a dotted firmware version, zero-padding to three components.
fn parse_version(v: &str) -> Option<(u32, u32, u32)> {
    if v.is_empty() {
        return None;
    }
    let mut parts = v.split('.').map(|p| p.parse::<u32>().ok());
    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some((major, minor, patch))
}

/// True when `version` is at or above [`MINIMUM_FIRMWARE_VERSION`].
pub fn is_firmware_valid(version: &str) -> bool {
    let Some(actual) = parse_version(version) else { return false };
    let Some(minimum) = parse_version(MINIMUM_FIRMWARE_VERSION) else { return false };
    actual >= minimum
}

/// Decoded `PB.GetState` response: the two hex status blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateBlobs {
    pub sc_11: String,
    pub sc_12: String,
}

/// Seam between the `Controller` and the wire, narrowed to
/// IP-parameterised methods so a single implementation can be rebound to
/// a new address after rediscovery without the controller holding a
/// borrowed, address-pinned client. A `FakeRpc` test double implements
/// this for `controller_tests.rs`, hand-rolled rather than pulled from a
/// mocking crate.
#[async_trait::async_trait]
pub trait GrillRpc: Send + Sync {
    async fn get_state(&self, ip: &str) -> Result<StateBlobs, ControllerError>;
    async fn send_mcu_command(&self, ip: &str, command: &[u8]) -> Result<(), ControllerError>;
    async fn sys_get_info(&self, ip: &str) -> Result<serde_json::Value, ControllerError>;
}

/// Production [`GrillRpc`]: builds a fresh [`GrillHttpClient`] per call,
/// one connection per request, against
/// a process-shared [`AuthCache`].
pub struct LiveRpc {
    auth: std::sync::Arc<AuthCache>,
}

impl LiveRpc {
    pub fn new(auth: std::sync::Arc<AuthCache>) -> Self {
        Self { auth }
    }
}

#[async_trait::async_trait]
impl GrillRpc for LiveRpc {
    async fn get_state(&self, ip: &str) -> Result<StateBlobs, ControllerError> {
        let http = GrillHttpClient::new(ip);
        RpcClient::new(&http, &self.auth, ip).get_state().await
    }

    async fn send_mcu_command(&self, ip: &str, command: &[u8]) -> Result<(), ControllerError> {
        let http = GrillHttpClient::new(ip);
        RpcClient::new(&http, &self.auth, ip).send_mcu_command(command).await
    }

    async fn sys_get_info(&self, ip: &str) -> Result<serde_json::Value, ControllerError> {
        let http = GrillHttpClient::new(ip);
        RpcClient::new(&http, &self.auth, ip).sys_get_info().await
    }
}

/// Typed RPC layer over one grill's HTTP client and shared auth cache.
pub struct RpcClient<'a> {
    http: &'a GrillHttpClient,
    auth: &'a AuthCache,
    ip: String,
}

impl<'a> RpcClient<'a> {
    pub fn new(http: &'a GrillHttpClient, auth: &'a AuthCache, ip: impl Into<String>) -> Self {
        Self { http, auth, ip: ip.into() }
    }

    /// Runs an authenticated POST, retrying once with the alternate
    /// (`time_int + 1`) token on any transport/status failure (spec
    /// §4.D "Auth-retry").
    async fn authenticated_post(
        &self,
        path: &str,
        extra_fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ControllerError> {
        let tokens = self.auth.get_tokens(&self.ip, self.http).await?;
        match self.try_post(path, &tokens.psw_hex, tokens.time_int, &extra_fields).await {
            Ok(value) => Ok(value),
            Err(ControllerError::Transport(_)) => {
                match self.try_post(path, &tokens.psw_hex_plus1, tokens.time_int + 1, &extra_fields).await {
                    Ok(value) => Ok(value),
                    Err(ControllerError::Transport(_)) => Err(ControllerError::AuthenticationFailed),
                    Err(other) => Err(other),
                }
            }
            Err(other) => Err(other),
        }
    }

    async fn try_post(
        &self,
        path: &str,
        psw_hex: &str,
        time_int: u32,
        extra_fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ControllerError> {
        let mut body = json!({ "time": time_int, "psw": psw_hex });
        if let Some(map) = body.as_object_mut() {
            map.extend(extra_fields.clone());
        }
        self.http.post_json(path, &body).await
    }

    /// `PB.GetState`: the two status hex blobs.
    pub async fn get_state(&self) -> Result<StateBlobs, ControllerError> {
        let value = self.authenticated_post("/rpc/PB.GetState", serde_json::Map::new()).await?;
        let sc_11 = value
            .get("sc_11")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ControllerError::ProtocolDecode("missing sc_11".into()))?
            .to_string();
        let sc_12 = value
            .get("sc_12")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ControllerError::ProtocolDecode("missing sc_12".into()))?
            .to_string();
        Ok(StateBlobs { sc_11, sc_12 })
    }

    /// `PB.SendMCUCommand`: fire-and-forget, response body ignored on
    /// success.
    pub async fn send_mcu_command(&self, command: &[u8]) -> Result<(), ControllerError> {
        let mut fields = serde_json::Map::new();
        fields.insert("command".to_string(), json!(encode_hex(command)));
        self.authenticated_post("/rpc/PB.SendMCUCommand", fields).await?;
        Ok(())
    }

    /// `PB.GetFirmwareVersion`: unauthenticated.
    pub async fn get_firmware_version(&self) -> Result<String, ControllerError> {
        let value = self.http.post_json("/rpc/PB.GetFirmwareVersion", &json!({})).await?;
        value
            .get("firmwareVersion")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ControllerError::ProtocolDecode("missing firmwareVersion".into()))
    }

    /// `Sys.GetInfo`: unauthenticated, used both for the steady-state
    /// identity check and discovery probes.
    pub async fn sys_get_info(&self) -> Result<serde_json::Value, ControllerError> {
        self.http.post_json("/rpc/Sys.GetInfo", &json!({})).await
    }
}

/// Used only by tests that want to assert token shape without going
/// through the full auth cache.
#[cfg(test)]
pub(crate) fn fake_tokens(time_int: u32) -> AuthTokens {
    AuthTokens { time_int, psw_hex: "deadbeef".into(), psw_hex_plus1: "beefdead".into() }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
