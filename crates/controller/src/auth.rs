// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-IP password fetch/decrypt and dual-token derivation.
//!
//! The cache is keyed by IP rather than by device: several controllers
//! aimed at the same grill share one entry. TTL/`expires_at` bookkeeping
//! and a refresh-margin, adapted from OAuth token refresh to this
//! protocol's drift-tolerant dual tokens.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::RwLock;

use crate::codec::{codec, decode_hex, encode_hex, get_codec_key, get_codec_time, FILE_DECODE_KEY, RPC_AUTH_KEY_BASE};
use crate::error::ControllerError;
use crate::http_client::GrillHttpClient;

/// How long a cached password/token pair is trusted before a fresh
/// `PB.GetTime` round trip is required.
pub const AUTH_CACHE_TIMEOUT: Duration = Duration::from_secs(4);

/// The pair of tokens produced for a given uptime reading, generated for
/// `t` and `t + 1` to tolerate clock drift between us and the grill.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub time_int: u32,
    pub psw_hex: String,
    pub psw_hex_plus1: String,
}

struct CacheEntry {
    password: Vec<u8>,
    last_uptime_integer: u32,
    tokens: AuthTokens,
    cached_at: Instant,
}

/// Process-global, IP-keyed password/token cache.
#[derive(Default)]
pub struct AuthCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl AuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns fresh-enough auth tokens for `ip`, refreshing the cached
    /// password and/or tokens as needed.
    pub async fn get_tokens(&self, ip: &str, http: &GrillHttpClient) -> Result<AuthTokens, ControllerError> {
        let now = Instant::now();

        let fresh_snapshot = {
            let entries = self.entries.read().await;
            entries.get(ip).and_then(|entry| {
                let age = now.checked_duration_since(entry.cached_at)?;
                (age < AUTH_CACHE_TIMEOUT).then(|| {
                    (entry.password.clone(), entry.last_uptime_integer, entry.tokens.clone(), entry.cached_at)
                })
            })
        };

        if let Some((password, last_uptime_integer, tokens, cached_at)) = fresh_snapshot {
            let uptime = fetch_uptime(http).await?;
            let time_int = get_codec_time(uptime);
            if time_int.abs_diff(last_uptime_integer) < 2 {
                return Ok(tokens);
            }
            return self.regenerate_tokens(ip, password, time_int, cached_at).await;
        }

        self.refresh_fully(ip, http, now).await
    }

    /// Refreshes `last_uptime`/the derived token pair without touching
    /// `cached_at` — a token-only refresh isn't a new password fetch, so it
    /// must not extend the cache's TTL window.
    async fn regenerate_tokens(
        &self,
        ip: &str,
        password: Vec<u8>,
        time_int: u32,
        cached_at: Instant,
    ) -> Result<AuthTokens, ControllerError> {
        let tokens = derive_tokens(&password, time_int);
        let mut entries = self.entries.write().await;
        entries.insert(
            ip.to_string(),
            CacheEntry { password, last_uptime_integer: time_int, tokens: tokens.clone(), cached_at },
        );
        Ok(tokens)
    }

    async fn refresh_fully(&self, ip: &str, http: &GrillHttpClient, now: Instant) -> Result<AuthTokens, ControllerError> {
        let config = http.get_json("/extconfig.json").await?;
        let psw_hex_raw = config
            .get("data")
            .and_then(|d| d.get("psw"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| ControllerError::ProtocolDecode("missing data.psw in /extconfig.json".into()))?;
        let encrypted = decode_hex(psw_hex_raw);
        let password = codec(&encrypted, FILE_DECODE_KEY, 0, false);

        let uptime = fetch_uptime(http).await?;
        let time_int = get_codec_time(uptime);
        let tokens = derive_tokens(&password, time_int);

        let mut entries = self.entries.write().await;
        entries.insert(
            ip.to_string(),
            CacheEntry { password, last_uptime_integer: time_int, tokens: tokens.clone(), cached_at: now },
        );
        Ok(tokens)
    }

    /// Drops the cached entry for `ip`, forcing a full refresh on next use
    /// (used after rediscovery or a clock-backward detection upstream).
    pub async fn invalidate(&self, ip: &str) {
        self.entries.write().await.remove(ip);
    }
}

fn derive_tokens(password: &[u8], time_int: u32) -> AuthTokens {
    let psw_hex = encode_hex(&codec(password, get_codec_key(RPC_AUTH_KEY_BASE, time_int), 0, true));
    let psw_hex_plus1 =
        encode_hex(&codec(password, get_codec_key(RPC_AUTH_KEY_BASE, time_int.wrapping_add(1)), 0, true));
    AuthTokens { time_int, psw_hex, psw_hex_plus1 }
}

async fn fetch_uptime(http: &GrillHttpClient) -> Result<u64, ControllerError> {
    let resp = http.post_json("/rpc/PB.GetTime", &json!({})).await?;
    resp.get("time")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ControllerError::ProtocolDecode("missing time in PB.GetTime response".into()))
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
