// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal HTTP client for a single grill: one connection per
//! request, a fixed connect+I/O timeout, and `GET`/`POST` helpers that map
//! transport failures onto [`ControllerError::Transport`] rather than
//! bubbling up a raw `reqwest::Error`.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::error::ControllerError;

/// Default connect+I/O timeout for every request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client wrapper for one grill's IP address.
pub struct GrillHttpClient {
    base_url: String,
    client: Client,
}

impl GrillHttpClient {
    /// Builds a client targeting `http://{ip}`. A fresh TCP connection is
    /// used per request (`Connection: close`) by
    /// disabling pooled keep-alive.
    pub fn new(ip: &str) -> Self {
        Self::with_timeout(ip, REQUEST_TIMEOUT)
    }

    /// Builds a client with a caller-chosen timeout, used by discovery
    /// probes that want to fail fast rather than wait the full
    /// [`REQUEST_TIMEOUT`] per candidate address.
    pub fn with_timeout(ip: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_default();
        Self { base_url: format!("http://{ip}"), client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET path`, returning the parsed JSON body.
    pub async fn get_json(&self, path: &str) -> Result<Value, ControllerError> {
        let resp = self
            .client
            .get(self.url(path))
            .header("Connection", "close")
            .send()
            .await
            .map_err(transport_error)?;
        resp.error_for_status()
            .map_err(transport_error)?
            .json()
            .await
            .map_err(|e| ControllerError::ProtocolDecode(e.to_string()))
    }

    /// `POST path` with a JSON body, returning the parsed JSON response.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ControllerError> {
        let resp = self
            .client
            .post(self.url(path))
            .header("Connection", "close")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = resp.error_for_status().map_err(transport_error)?;
        let bytes = resp.bytes().await.map_err(transport_error)?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ControllerError::ProtocolDecode(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> ControllerError {
    if err.is_timeout() {
        ControllerError::Transport(format!("timeout: {err}"))
    } else if err.is_connect() {
        ControllerError::Transport(format!("connect failed: {err}"))
    } else if err.is_status() {
        ControllerError::Transport(format!("bad status: {err}"))
    } else {
        ControllerError::Transport(err.to_string())
    }
}
