use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

async fn read_file(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_str(&tokio::fs::read_to_string(path).await.unwrap()).unwrap()
}

#[tokio::test]
async fn test_in_memory_updates() {
    let manager = StateManager::in_memory();
    assert!(manager.is_in_memory());
    assert!(manager.path().is_none());
    assert!(manager.get_stream_state("users").await.is_none());

    manager.set_stream_state("users", json!({"id": 1})).await.unwrap();
    manager.set_stream_state("users", json!({"id": 2})).await.unwrap();
    manager
        .set_stream_state("orders", json!({"states": []}))
        .await
        .unwrap();
    manager.save().await.unwrap();

    assert_eq!(manager.get_stream_state("users").await, Some(json!({"id": 2})));
    assert_eq!(
        manager.to_json().await.unwrap(),
        r#"{"streams":{"orders":{"states":[]},"users":{"id":2}}}"#
    );
}

#[tokio::test]
async fn test_from_json_document() {
    let manager =
        StateManager::from_json(r#"{"streams": {"users": {"updated_at": "2024-01-01"}}}"#)
            .unwrap();
    assert_eq!(
        manager.get_stream_state("users").await,
        Some(json!({"updated_at": "2024-01-01"}))
    );

    assert!(StateManager::from_json("  ")
        .unwrap()
        .snapshot()
        .await
        .is_empty());

    let err = StateManager::from_json("{ invalid").unwrap_err();
    assert!(err.to_string().contains("Failed to parse state JSON"));
}

#[tokio::test]
async fn test_from_json_state_messages() {
    let messages = r#"[
        {"type": "STATE", "stream": "users", "data": {"ts": "2024-01-01"}},
        {"type": "STATE", "stream": "orders", "data": {"id": 7}},
        {"type": "STATE", "stream": "users", "data": {"ts": "2024-02-01"}}
    ]"#;
    let manager = StateManager::from_json(messages).unwrap();

    assert_eq!(
        manager.get_stream_state("users").await,
        Some(json!({"ts": "2024-02-01"}))
    );
    assert_eq!(manager.get_stream_state("orders").await, Some(json!({"id": 7})));

    assert!(StateManager::from_json(r#"[{"data": {}}]"#).is_err());
}

#[tokio::test]
async fn test_file_write_through() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    let manager = StateManager::from_file(&path).unwrap();
    assert!(manager.snapshot().await.is_empty());
    assert_eq!(manager.path(), Some(path.as_path()));

    manager.set_stream_state("users", json!({"seq": 10})).await.unwrap();
    assert_eq!(read_file(&path).await, json!({"streams": {"users": {"seq": 10}}}));
    assert!(!path.with_extension("tmp").exists());

    let reloaded = StateManager::from_file(&path).unwrap();
    assert_eq!(reloaded.snapshot().await, manager.snapshot().await);
}

#[tokio::test]
async fn test_file_without_auto_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    let manager = StateManager::from_file(&path).unwrap().with_auto_save(false);
    manager.set_stream_state("users", json!({"seq": 1})).await.unwrap();
    assert!(!path.exists());

    manager.save().await.unwrap();
    assert_eq!(read_file(&path).await["streams"]["users"], json!({"seq": 1}));
}

#[tokio::test]
async fn test_clear_stream() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    tokio::fs::write(&path, r#"{"streams": {"a": {"x": 1}, "b": {"x": 2}}}"#)
        .await
        .unwrap();

    let manager = StateManager::from_file(&path).unwrap();
    manager.clear_stream("a").await.unwrap();

    assert!(manager.get_stream_state("a").await.is_none());
    assert_eq!(read_file(&path).await, json!({"streams": {"b": {"x": 2}}}));
}

#[tokio::test]
async fn test_clones_share_state() {
    let manager = StateManager::in_memory();
    let cloned = manager.clone();

    manager.set_stream_state("users", json!({"id": 5})).await.unwrap();
    assert_eq!(cloned.get_stream_state("users").await, Some(json!({"id": 5})));
}

#[tokio::test]
async fn test_invalid_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("invalid.json");
    tokio::fs::write(&path, "{ invalid json }").await.unwrap();

    let err = StateManager::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse state file"));
}
