// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The crate's error taxonomy: a plain enum rather than a
//! `thiserror`-derived one.

use std::fmt;

/// Everything a caller of this crate can observe going wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Connect failed, send failed, request timed out, or the response
    /// had a malformed status line.
    Transport(String),
    /// Both the primary and secondary auth tokens were rejected.
    AuthenticationFailed,
    /// A response was missing fields this crate requires to decode it.
    ProtocolDecode(String),
    /// A caller-supplied argument was out of range or malformed.
    InvalidArgument(String),
    /// Arming a scheduled health-check timer failed.
    TimerArmFailed(String),
    /// A rate-limited operation (rediscovery) was not attempted.
    Saturated,
}

impl ControllerError {
    /// A short machine-stable tag, useful for structured log fields and
    /// test assertions without stringly matching the full message.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::AuthenticationFailed => "authentication_failed",
            Self::ProtocolDecode(_) => "protocol_decode",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::TimerArmFailed(_) => "timer_arm_failed",
            Self::Saturated => "saturated",
        }
    }
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::AuthenticationFailed => write!(f, "authentication failed"),
            Self::ProtocolDecode(msg) => write!(f, "protocol decode error: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::TimerArmFailed(msg) => write!(f, "timer arm failed: {msg}"),
            Self::Saturated => write!(f, "rate limited, not attempted"),
        }
    }
}

impl std::error::Error for ControllerError {}
