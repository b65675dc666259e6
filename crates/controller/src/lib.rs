// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A LAN-only controller for Pit Boss WiFi pellet grills.
//!
//! Continuously reconciles a remote grill's observable state (temperatures,
//! component outputs, errors, authentication clock) with a local model
//! exposed to a home-automation host. Four coupled subsystems: the wire
//! protocol/crypto codec, the status decoder, the adaptive health/discovery
//! loop, and the status-to-state reducer.

pub mod auth;
pub mod codec;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod field_store;
pub mod http_client;
pub mod panic_manager;
pub mod reducer;
pub mod rpc;
pub mod scheduler;
pub mod status;

pub use controller::Controller;
pub use error::ControllerError;
pub use field_store::{FieldStore, FieldValue, MemoryFieldStore};
pub use reducer::{DerivedState, Preferences, SessionMemory};
pub use rpc::{GrillRpc, LiveRpc};
pub use status::Status;
