// Persistent Config Store Tests
// Exercises `ConfigStore` only through its public async API, with a real
// temp directory on disk so atomic-replace and crash-consistency
// properties are genuinely tested rather than mocked away.

use hsm_proxy::config::{ConfigStore, KeyState, ProxyRecord};
use hsm_proxy::secret::{ProxySecret, Tag};

#[tokio::test]
async fn load_on_an_empty_directory_returns_none() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path(), "v2");
    assert!(store.load().await.unwrap().is_none());
    assert!(!store.exists().await);
}

#[tokio::test]
async fn store_then_load_round_trips_every_field() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path(), "v2");

    let record = ProxyRecord {
        tag: Tag::from_bytes([7u8; 16]),
        state: KeyState::TwoKeys,
        proxy_key: Some(ProxySecret::from_bytes([1u8; 32])),
        previous_proxy_key: Some(ProxySecret::from_bytes([2u8; 32])),
    };
    store.store(&record).await.unwrap();

    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.tag, record.tag);
    assert_eq!(loaded.state, record.state);
    assert_eq!(loaded.proxy_key, record.proxy_key);
    assert_eq!(loaded.previous_proxy_key, record.previous_proxy_key);
}

#[tokio::test]
async fn file_name_follows_the_protocol_tagged_convention() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path(), "v2");
    assert_eq!(store.path().file_name().unwrap(), "HSMProxyv2.json");
}

#[tokio::test]
async fn keyless_record_omits_key_fields_from_the_catalog() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path(), "v2");
    store.store(&ProxyRecord::fresh()).await.unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(!raw.contains("proxyKey"));
    assert!(!raw.contains("previousProxyKey"));
    assert!(raw.contains("keyless"));
}

#[tokio::test]
async fn store_is_atomic_a_reader_never_observes_a_partial_write() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path(), "v2");

    let mut record = ProxyRecord::fresh();
    record.state = KeyState::LoneKey;
    record.proxy_key = Some(ProxySecret::from_bytes([9u8; 32]));
    store.store(&record).await.unwrap();

    // Overwrite with a second record; the temp-file-then-rename dance
    // means the directory should never contain a stray `.tmp` sibling.
    let mut second = record.clone();
    second.state = KeyState::TwoKeys;
    second.previous_proxy_key = Some(ProxySecret::from_bytes([3u8; 32]));
    store.store(&second).await.unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("HSMProxyv2.json")]);

    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.state, KeyState::TwoKeys);
}

#[tokio::test]
async fn delete_is_idempotent_on_an_already_absent_record() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path(), "v2");
    store.delete().await.unwrap();
    store.delete().await.unwrap();
}

#[tokio::test]
async fn delete_removes_a_previously_stored_record() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path(), "v2");
    store.store(&ProxyRecord::fresh()).await.unwrap();
    assert!(store.exists().await);

    store.delete().await.unwrap();
    assert!(!store.exists().await);
    assert!(store.load().await.unwrap().is_none());
}
