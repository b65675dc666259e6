// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests for `Controller` against a fake `GrillRpc` and the
//! in-process `MemoryFieldStore` (no real network).

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use pitboss_controller::auth::AuthCache;
use pitboss_controller::discovery::RediscoveryLocks;
use pitboss_controller::reducer::Connectivity;
use pitboss_controller::rpc::StateBlobs;
use pitboss_controller::status::Unit;
use pitboss_controller::{Controller, ControllerError, FieldStore, GrillRpc, MemoryFieldStore, Preferences};

struct FakeRpc {
    state_responses: StdMutex<Vec<Result<StateBlobs, ControllerError>>>,
    commands: StdMutex<Vec<Vec<u8>>>,
}

impl FakeRpc {
    fn new(responses: Vec<Result<StateBlobs, ControllerError>>) -> Self {
        Self { state_responses: StdMutex::new(responses), commands: StdMutex::new(Vec::new()) }
    }
}

#[async_trait::async_trait]
impl GrillRpc for FakeRpc {
    async fn get_state(&self, _ip: &str) -> Result<StateBlobs, ControllerError> {
        let mut responses = self.state_responses.lock().unwrap();
        if responses.is_empty() {
            Err(ControllerError::Transport("no more canned responses".into()))
        } else {
            responses.remove(0)
        }
    }

    async fn send_mcu_command(&self, _ip: &str, command: &[u8]) -> Result<(), ControllerError> {
        self.commands.lock().unwrap().push(command.to_vec());
        Ok(())
    }

    async fn sys_get_info(&self, _ip: &str) -> Result<serde_json::Value, ControllerError> {
        Ok(serde_json::json!({ "app": "PitBoss", "id": "grill-integration" }))
    }
}

fn online_blobs() -> StateBlobs {
    let mut sc11 = vec![0u8; 44];
    sc11[24] = 1; // module_on
    sc11[36] = 1; // motor_state
    StateBlobs { sc_11: hex::encode(sc11), sc_12: String::new() }
}

fn build(responses: Vec<Result<StateBlobs, ControllerError>>) -> (Arc<Controller<FakeRpc, MemoryFieldStore>>, Arc<MemoryFieldStore>) {
    let prefs = Preferences { unit: Unit::Fahrenheit, ..Default::default() };
    let field_store = Arc::new(MemoryFieldStore::new());
    let controller = Controller::new(
        "grill-integration",
        "192.168.1.50",
        prefs,
        Arc::new(FakeRpc::new(responses)),
        Arc::clone(&field_store),
        Arc::new(AuthCache::new()),
        Arc::new(RediscoveryLocks::new()),
    );
    (controller, field_store)
}

// -- refresh --------------------------------------------------------------

#[tokio::test]
async fn refresh_polls_and_persists_connectivity() {
    let (controller, field_store) = build(vec![Ok(online_blobs())]);
    controller.refresh().await.unwrap();

    let state = controller.current_state().await;
    assert_eq!(state.connectivity, Connectivity::Online);

    let is_connected = field_store.get("grill-integration", "is_connected").await.unwrap();
    assert_eq!(is_connected.as_bool(), Some(true));
}

#[tokio::test]
async fn a_failed_poll_marks_offline_and_persists_first_offline_time() {
    let (controller, field_store) = build(vec![Err(ControllerError::Transport("unreachable".into()))]);
    controller.refresh().await.unwrap();

    let state = controller.current_state().await;
    assert_eq!(state.connectivity, Connectivity::Offline);
    assert!(field_store.get("grill-integration", "first_offline_time").await.is_some());
}

// -- send_command ----------------------------------------------------------

#[tokio::test]
async fn send_command_then_scheduled_refresh_observes_new_state() {
    let (controller, _field_store) = build(vec![Ok(online_blobs())]);
    controller.send_command(vec![0xfe, 0x01, 0x01, 0xff]).await.unwrap();

    // The delayed refresh fires on its own background task; exercise the
    // same effect directly instead of sleeping on REFRESH_DELAY.
    controller.refresh().await.unwrap();
    let state = controller.current_state().await;
    assert_eq!(state.connectivity, Connectivity::Online);
}

// -- on_prefs_changed --------------------------------------------------------

#[tokio::test]
async fn prefs_changed_rebinds_the_active_ip() {
    let (controller, _field_store) = build(vec![]);
    let mut new_prefs = Preferences { unit: Unit::Fahrenheit, ..Default::default() };
    new_prefs.ip_address = Some("10.0.0.77".to_string());

    controller.on_prefs_changed(new_prefs).await;
    assert_eq!(controller.current_ip().await, "10.0.0.77");
}

// -- remove ------------------------------------------------------------------

#[tokio::test]
async fn remove_clears_persisted_bookkeeping_fields() {
    let (controller, field_store) = build(vec![Ok(online_blobs())]);
    controller.refresh().await.unwrap();
    assert!(field_store.get("grill-integration", "panic_state").await.is_some());

    controller.remove().await;
    assert!(field_store.get("grill-integration", "panic_state").await.is_none());
}
