use super::*;

#[tokio::test]
async fn set_then_get_round_trips() {
    let store = MemoryFieldStore::new();
    store.set("grill-1", "ip_address", FieldValue::Text("192.168.1.42".into()), SetOptions { persist: true }).await;
    let value = store.get("grill-1", "ip_address").await;
    assert_eq!(value.unwrap().as_text(), Some("192.168.1.42"));
}

#[tokio::test]
async fn missing_key_is_none() {
    let store = MemoryFieldStore::new();
    assert!(store.get("grill-1", "nonexistent").await.is_none());
}

#[tokio::test]
async fn clear_removes_value() {
    let store = MemoryFieldStore::new();
    store.set("grill-1", "panic_state", FieldValue::Bool(true), SetOptions::default()).await;
    store.clear("grill-1", "panic_state").await;
    assert!(store.get("grill-1", "panic_state").await.is_none());
}

#[tokio::test]
async fn fields_are_scoped_per_device() {
    let store = MemoryFieldStore::new();
    store.set("grill-1", "unit", FieldValue::Text("F".into()), SetOptions::default()).await;
    assert!(store.get("grill-2", "unit").await.is_none());
}
