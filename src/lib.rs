// Host-side proxy to a BLE-attached hardware security module.
//
// The HSM holds the private signing key; this crate never sees it. It
// implements the two hard pieces of being its host-side proxy: a
// chunked request/response framing over BLE UART (`frame`, `transport`,
// `engine`), and a persisted, crash-consistent key-lifecycle state
// machine that keeps the HSM and the host agreeing on which key is
// "current" and which is "previous, one more signature only"
// (`config`, `controller`).

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod frame;
pub mod secret;
pub mod settings;
pub mod transport;

use config::ConfigStore;
use controller::KeyLifecycleController;
use engine::RequestEngine;
use error::ProxyError;
use secret::Tag;
use transport::Transport;

/// The protocol this crate speaks. `v1` was wire-identical but
/// advertised a different device name; only `v2` is implemented.
pub const PROTOCOL_VERSION: &str = "v2";

/// The six cryptographic operations the HSM exposes, plus the two
/// metadata accessors, fronting a [`KeyLifecycleController`].
pub struct HsmProxy<T: Transport> {
    controller: KeyLifecycleController<T>,
}

impl<T: Transport> HsmProxy<T> {
    pub fn new(transport: T, store: ConfigStore, max_attempts: u32) -> Self {
        let engine = RequestEngine::new(transport, max_attempts);
        Self {
            controller: KeyLifecycleController::new(engine, store),
        }
    }

    /// The persisted tag identifying this proxy instance, loading (and
    /// if absent, creating) the record as a side effect.
    pub async fn get_tag(&self) -> Result<Tag, ProxyError> {
        self.controller.get_tag().await
    }

    pub fn get_protocol(&self) -> &'static str {
        PROTOCOL_VERSION
    }

    /// Preconditions: state = keyless. Returns the new public key.
    pub async fn generate_keys(&self) -> Result<Vec<u8>, ProxyError> {
        self.controller.generate_keys().await
    }

    /// Preconditions: state = loneKey. Returns the new public key.
    pub async fn rotate_keys(&self) -> Result<Vec<u8>, ProxyError> {
        self.controller.rotate_keys().await
    }

    /// No preconditions. Returns whether the HSM reports the erase as
    /// successful.
    pub async fn erase_keys(&self) -> Result<bool, ProxyError> {
        self.controller.erase_keys().await
    }

    /// Stateless.
    pub async fn digest_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, ProxyError> {
        self.controller.digest_bytes(bytes).await
    }

    /// Preconditions: state ∈ {loneKey, twoKeys}. If a rotation just
    /// happened, this consumes the superseded secret instead of the
    /// current one — the "previous-key one-shot" rule.
    pub async fn sign_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, ProxyError> {
        self.controller.sign_bytes(bytes).await
    }

    /// Stateless.
    pub async fn valid_signature(
        &self,
        public_key: &[u8],
        signature: &[u8],
        bytes: &[u8],
    ) -> Result<bool, ProxyError> {
        self.controller.valid_signature(public_key, signature, bytes).await
    }
}
