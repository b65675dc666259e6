use super::*;
use std::sync::Mutex as StdMutex;

use crate::field_store::MemoryFieldStore;
use crate::rpc::StateBlobs;
use crate::status::Unit;

/// Canned, queue-driven [`GrillRpc`] double — the "fake `RpcClient`" the
/// expanded spec's test-tooling section calls for, hand-rolled in the
/// teacher's style rather than pulled from a mocking crate.
struct FakeRpc {
    state_responses: StdMutex<Vec<Result<StateBlobs, ControllerError>>>,
    commands: StdMutex<Vec<Vec<u8>>>,
    command_should_fail_once: StdMutex<bool>,
}

impl FakeRpc {
    fn new(responses: Vec<Result<StateBlobs, ControllerError>>) -> Self {
        Self {
            state_responses: StdMutex::new(responses),
            commands: StdMutex::new(Vec::new()),
            command_should_fail_once: StdMutex::new(false),
        }
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
        let mut should_fail = self.command_should_fail_once.lock().unwrap();
        if *should_fail {
            *should_fail = false;
            Err(ControllerError::Transport("first attempt dropped".into()))
        } else {
            Ok(())
        }
    }

    async fn sys_get_info(&self, _ip: &str) -> Result<serde_json::Value, ControllerError> {
        Ok(serde_json::json!({ "app": "PitBoss", "id": "grill-xyz" }))
    }
}

fn online_blobs() -> StateBlobs {
    // module_on (byte 25) + motor (byte 37), nothing else set; short blobs
    // otherwise, relying on parse_status's defensive defaults.
    let mut sc11 = vec![0u8; 44];
    sc11[24] = 1; // byte 25: module_on
    sc11[36] = 1; // byte 37: motor_state
    StateBlobs { sc_11: hex::encode(sc11), sc_12: String::new() }
}

fn test_controller(responses: Vec<Result<StateBlobs, ControllerError>>) -> Arc<Controller<FakeRpc, MemoryFieldStore>> {
    let prefs = Preferences { unit: Unit::Fahrenheit, ..Default::default() };
    Controller::new(
        "grill-1",
        "192.168.1.42",
        prefs,
        Arc::new(FakeRpc::new(responses)),
        Arc::new(MemoryFieldStore::new()),
        Arc::new(AuthCache::new()),
        Arc::new(RediscoveryLocks::new()),
    )
}

#[tokio::test]
async fn refresh_polls_once_and_updates_state() {
    let controller = test_controller(vec![Ok(online_blobs())]);
    controller.refresh().await.unwrap();
    let state = controller.current_state().await;
    assert!(matches!(state.connectivity, Connectivity::Online));
}

#[tokio::test]
async fn refresh_rejects_while_a_poll_is_in_flight() {
    let controller = test_controller(vec![Ok(online_blobs())]);
    controller.is_polling.store(true, std::sync::atomic::Ordering::SeqCst);
    let err = controller.refresh().await.unwrap_err();
    assert_eq!(err.as_str(), "saturated");
}

#[tokio::test]
async fn offline_poll_marks_disconnected() {
    let controller = test_controller(vec![Err(ControllerError::Transport("connect failed".into()))]);
    controller.refresh().await.unwrap();
    let state = controller.current_state().await;
    assert!(matches!(state.connectivity, Connectivity::Offline));
}

#[tokio::test]
async fn send_command_retries_once_then_succeeds() {
    let controller = test_controller(vec![]);
    {
        let mut should_fail = controller.rpc.command_should_fail_once.lock().unwrap();
        *should_fail = true;
    }
    controller.send_command(vec![0xfe, 0x02, 0x01, 0xff]).await.unwrap();
    assert_eq!(controller.rpc.commands.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn prefs_changed_is_a_noop_when_fingerprint_is_unchanged() {
    let controller = test_controller(vec![]);
    let prefs = { controller.inner.lock().await.prefs.clone() };
    {
        let mut inner = controller.inner.lock().await;
        inner.prefs_fingerprint = Some(prefs_fingerprint(&prefs));
    }
    controller.on_prefs_changed(prefs.clone()).await;
    assert_eq!(controller.current_ip().await, "192.168.1.42");
}

#[tokio::test]
async fn prefs_changed_applies_a_new_ip_preference() {
    let controller = test_controller(vec![]);
    let mut new_prefs = { controller.inner.lock().await.prefs.clone() };
    new_prefs.ip_address = Some("192.168.1.99".to_string());
    controller.on_prefs_changed(new_prefs).await;
    assert_eq!(controller.current_ip().await, "192.168.1.99");
}

#[tokio::test]
async fn prefs_changed_ignores_a_malformed_ip() {
    let controller = test_controller(vec![]);
    let mut new_prefs = { controller.inner.lock().await.prefs.clone() };
    new_prefs.ip_address = Some("not-an-ip".to_string());
    controller.on_prefs_changed(new_prefs).await;
    assert_eq!(controller.current_ip().await, "192.168.1.42");
}

#[tokio::test]
async fn remove_cancels_the_tick_loop() {
    let controller = test_controller(vec![]);
    controller.init().await;
    controller.remove().await;
    assert!(controller.cancel.is_cancelled());
}
