// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The opaque per-device key-value store the home-automation host exposes.
//! The core never owns durable storage itself; it only reads and writes
//! through this narrow interface. [`MemoryFieldStore`] is a usable
//! in-process reference implementation, used by the demo binary and by
//! integration tests.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::RwLock;

/// One persisted device field's value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Instant(Instant),
}

impl FieldValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_instant(&self) -> Option<Instant> {
        match self {
            FieldValue::Instant(i) => Some(*i),
            _ => None,
        }
    }
}

/// Write options for [`FieldStore::set`]; `persist` asks the host to
/// retain the value across a process restart. The core treats persistence
/// as advisory and never fails a tick because a write wasn't durable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    pub persist: bool,
}

/// The host-supplied per-device field store. Every known key the core
/// writes is listed as a persisted device-field key.
#[async_trait::async_trait]
pub trait FieldStore: Send + Sync {
    async fn get(&self, device_id: &str, key: &str) -> Option<FieldValue>;
    async fn set(&self, device_id: &str, key: &str, value: FieldValue, opts: SetOptions);
    async fn clear(&self, device_id: &str, key: &str);
}

/// A plain in-memory [`FieldStore`]. `persist` is accepted but has no
/// effect beyond process lifetime — there is nothing durable to hand it
/// to in a reference implementation.
#[derive(Default)]
pub struct MemoryFieldStore {
    fields: RwLock<HashMap<(String, String), FieldValue>>,
}

impl MemoryFieldStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FieldStore for MemoryFieldStore {
    async fn get(&self, device_id: &str, key: &str) -> Option<FieldValue> {
        let fields = self.fields.read().await;
        fields.get(&(device_id.to_string(), key.to_string())).cloned()
    }

    async fn set(&self, device_id: &str, key: &str, value: FieldValue, _opts: SetOptions) {
        let mut fields = self.fields.write().await;
        fields.insert((device_id.to_string(), key.to_string()), value);
    }

    async fn clear(&self, device_id: &str, key: &str) {
        let mut fields = self.fields.write().await;
        fields.remove(&(device_id.to_string(), key.to_string()));
    }
}

#[cfg(test)]
#[path = "field_store_tests.rs"]
mod tests;
