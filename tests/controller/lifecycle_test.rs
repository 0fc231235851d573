// Key-Lifecycle Controller Tests
// Drives the full `HsmProxy` facade from outside the crate, against a
// locally defined scripted `Transport`, the way an integrator depending
// on this crate would.

use hsm_proxy::config::ConfigStore;
use hsm_proxy::error::ProxyError;
use hsm_proxy::transport::Transport;
use hsm_proxy::HsmProxy;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Each call to `exchange` pops one canned response (or error) in order,
/// regardless of which blocks it was asked to carry.
struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<Vec<u8>, String>>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<Result<Vec<u8>, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

impl Transport for ScriptedTransport {
    async fn exchange(&self, _blocks: &[Vec<u8>]) -> Result<Vec<u8>, ProxyError> {
        let mut responses = self.responses.lock().await;
        match responses.pop_front() {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(msg)) => Err(ProxyError::transport("scripted-transport", msg)),
            None => panic!("ScriptedTransport ran out of canned responses"),
        }
    }
}

fn proxy_with(
    responses: Vec<Result<Vec<u8>, String>>,
    dir: &tempfile::TempDir,
) -> HsmProxy<ScriptedTransport> {
    let transport = ScriptedTransport::new(responses);
    let store = ConfigStore::new(dir.path(), hsm_proxy::PROTOCOL_VERSION);
    HsmProxy::new(transport, store, 3)
}

#[tokio::test]
async fn full_lifecycle_generate_sign_rotate_sign_erase() {
    let dir = tempfile::TempDir::new().unwrap();
    let proxy = proxy_with(
        vec![
            Ok(vec![1u8; 32]),  // generateKeys -> pub1
            Ok(vec![0xAA; 64]), // signBytes -> sig1 (current key)
            Ok(vec![2u8; 32]),  // rotateKeys -> pub2
            Ok(vec![0xBB; 64]), // signBytes -> sig2 (one-shot previous key)
            Ok(vec![1]),        // eraseKeys -> true
        ],
        &dir,
    );

    let tag = proxy.get_tag().await.unwrap();
    assert_eq!(proxy.get_tag().await.unwrap(), tag);
    assert_eq!(proxy.get_protocol(), "v2");

    let pub1 = proxy.generate_keys().await.unwrap();
    assert_eq!(pub1, vec![1u8; 32]);

    let sig1 = proxy.sign_bytes(b"first message").await.unwrap();
    assert_eq!(sig1, vec![0xAA; 64]);

    let pub2 = proxy.rotate_keys().await.unwrap();
    assert_eq!(pub2, vec![2u8; 32]);

    // The one-shot previous-key sign right after rotation.
    let sig2 = proxy.sign_bytes(b"second message").await.unwrap();
    assert_eq!(sig2, vec![0xBB; 64]);

    let erased = proxy.erase_keys().await.unwrap();
    assert!(erased);

    // Keyless again: signing now fails its precondition.
    let err = proxy.sign_bytes(b"third message").await.unwrap_err();
    assert!(matches!(err, ProxyError::InvalidState { .. }));
}

#[tokio::test]
async fn rotate_before_any_key_exists_is_invalid_state() {
    let dir = tempfile::TempDir::new().unwrap();
    let proxy = proxy_with(vec![], &dir);
    let err = proxy.rotate_keys().await.unwrap_err();
    assert!(matches!(err, ProxyError::InvalidState { .. }));
}

#[tokio::test]
async fn generate_keys_twice_without_erasing_is_invalid_state() {
    let dir = tempfile::TempDir::new().unwrap();
    let proxy = proxy_with(vec![Ok(vec![1u8; 32])], &dir);
    proxy.generate_keys().await.unwrap();

    let err = proxy.generate_keys().await.unwrap_err();
    assert!(matches!(err, ProxyError::InvalidState { .. }));
}

#[tokio::test]
async fn digest_and_valid_signature_never_touch_the_key_state_machine() {
    let dir = tempfile::TempDir::new().unwrap();
    let proxy = proxy_with(vec![Ok(vec![0xCD; 64]), Ok(vec![1])], &dir);

    let digest = proxy.digest_bytes(b"payload").await.unwrap();
    assert_eq!(digest, vec![0xCD; 64]);

    let valid = proxy
        .valid_signature(b"pubkey", b"signature", b"payload")
        .await
        .unwrap();
    assert!(valid);

    let store = ConfigStore::new(dir.path(), hsm_proxy::PROTOCOL_VERSION);
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn exhausting_the_retry_budget_surfaces_as_request_failed() {
    let dir = tempfile::TempDir::new().unwrap();
    let proxy = proxy_with(
        vec![
            Err("attempt 1".into()),
            Err("attempt 2".into()),
            Err("attempt 3".into()),
        ],
        &dir,
    );

    let err = proxy.generate_keys().await.unwrap_err();
    assert!(matches!(err, ProxyError::RequestFailed { .. }));

    let store = ConfigStore::new(dir.path(), hsm_proxy::PROTOCOL_VERSION);
    assert!(
        store.load().await.unwrap().is_none(),
        "a failed exchange must never leave a partial record behind"
    );
}

#[tokio::test]
async fn a_transient_failure_followed_by_success_still_succeeds() {
    let dir = tempfile::TempDir::new().unwrap();
    let proxy = proxy_with(
        vec![Err("flaky adapter".into()), Ok(vec![5u8; 32])],
        &dir,
    );

    let public_key = proxy.generate_keys().await.unwrap();
    assert_eq!(public_key, vec![5u8; 32]);
}

#[cfg(unix)]
#[tokio::test]
async fn stateless_operations_stay_usable_once_the_latch_trips() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::TempDir::new().unwrap();
    let proxy = proxy_with(
        vec![
            Ok(vec![1u8; 32]), // generateKeys -> pub1, persists fine
            Ok(vec![2u8; 32]), // rotateKeys -> pub2, but persisting it fails
            Ok(vec![0xCD; 64]), // digestBytes, reached despite the latch
            Ok(vec![1]),        // validSignature, reached despite the latch
        ],
        &dir,
    );

    proxy.generate_keys().await.unwrap();

    // Make the config directory unwritable so the post-rotation commit
    // cannot persist, tripping the `InconsistentState` latch.
    let original_perms = std::fs::metadata(dir.path()).unwrap().permissions();
    let mut readonly = original_perms.clone();
    readonly.set_mode(0o500);
    std::fs::set_permissions(dir.path(), readonly).unwrap();

    let latch_err = proxy.rotate_keys().await.unwrap_err();
    assert!(matches!(latch_err, ProxyError::InconsistentState { .. }));

    // State-bearing operations now refuse outright.
    let err = proxy.generate_keys().await.unwrap_err();
    assert!(matches!(err, ProxyError::InconsistentState { .. }));

    // But the two stateless operations never touch the persisted record
    // and must keep working even while the latch is tripped.
    let digest = proxy.digest_bytes(b"payload").await.unwrap();
    assert_eq!(digest, vec![0xCD; 64]);

    let valid = proxy
        .valid_signature(b"pubkey", b"signature", b"payload")
        .await
        .unwrap();
    assert!(valid);

    std::fs::set_permissions(dir.path(), original_perms).unwrap();
}
