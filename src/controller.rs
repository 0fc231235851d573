// Key-Lifecycle Controller — owns the persisted state machine, the
// proxy-side secrets, and the single lock that serializes every
// operation against the one BLE peripheral.

use crate::config::{ConfigStore, KeyState, ProxyRecord};
use crate::engine::RequestEngine;
use crate::error::ProxyError;
use crate::frame::{Op, Response};
use crate::secret::{ProxySecret, Tag};
use crate::transport::Transport;

const COMPONENT: &str = "key-lifecycle-controller";

struct ControllerState {
    /// `None` until the record has been loaded (or created) for the
    /// first time.
    record: Option<ProxyRecord>,
    /// Set once a post-exchange persistence failure leaves the HSM and
    /// the host disagreeing about key state. Latched: every subsequent
    /// state-bearing operation fails immediately without touching the
    /// HSM, until a manual `erase_keys` recovers.
    latched: bool,
}

pub struct KeyLifecycleController<T: Transport> {
    engine: RequestEngine<T>,
    store: ConfigStore,
    state: tokio::sync::Mutex<ControllerState>,
}

impl<T: Transport> KeyLifecycleController<T> {
    pub fn new(engine: RequestEngine<T>, store: ConfigStore) -> Self {
        Self {
            engine,
            store,
            state: tokio::sync::Mutex::new(ControllerState {
                record: None,
                latched: false,
            }),
        }
    }

    /// Load the record, creating and persisting a fresh keyless one if
    /// none exists yet. Assumes the caller already holds `self.state`.
    async fn ensure_loaded(&self, guard: &mut ControllerState) -> Result<(), ProxyError> {
        if guard.record.is_some() {
            return Ok(());
        }
        let record = match self.store.load().await? {
            Some(record) => record,
            None => {
                let fresh = ProxyRecord::fresh();
                self.store.store(&fresh).await?;
                fresh
            }
        };
        guard.record = Some(record);
        Ok(())
    }

    fn fail_if_latched(guard: &ControllerState) -> Result<(), ProxyError> {
        if guard.latched {
            return Err(ProxyError::inconsistent_state(COMPONENT));
        }
        Ok(())
    }

    pub async fn get_tag(&self) -> Result<Tag, ProxyError> {
        let mut guard = self.state.lock().await;
        self.ensure_loaded(&mut guard).await?;
        Ok(guard.record.as_ref().expect("just loaded").tag)
    }

    pub async fn generate_keys(&self) -> Result<Vec<u8>, ProxyError> {
        let mut guard = self.state.lock().await;
        Self::fail_if_latched(&guard)?;
        self.ensure_loaded(&mut guard).await?;

        let record = guard.record.as_ref().expect("just loaded");
        if record.state != KeyState::Keyless {
            return Err(ProxyError::invalid_state(COMPONENT));
        }

        let proxy_key = ProxySecret::random();
        let response = self
            .engine
            .request(Op::GenerateKeys, &[proxy_key.to_vec()])
            .await?;
        let public_key = expect_bytes(response)?;

        let mut next = guard.record.clone().expect("just loaded");
        next.proxy_key = Some(proxy_key);
        next.state = KeyState::LoneKey;
        self.commit(&mut guard, next).await?;

        Ok(public_key)
    }

    pub async fn rotate_keys(&self) -> Result<Vec<u8>, ProxyError> {
        let mut guard = self.state.lock().await;
        Self::fail_if_latched(&guard)?;
        self.ensure_loaded(&mut guard).await?;

        let record = guard.record.as_ref().expect("just loaded");
        if record.state != KeyState::LoneKey {
            return Err(ProxyError::invalid_state(COMPONENT));
        }
        let previous_proxy_key = record
            .proxy_key
            .clone()
            .expect("LoneKey state guarantees proxy_key is present");

        let new_proxy_key = ProxySecret::random();
        let response = self
            .engine
            .request(
                Op::RotateKeys,
                &[previous_proxy_key.to_vec(), new_proxy_key.to_vec()],
            )
            .await?;
        let public_key = expect_bytes(response)?;

        let mut next = guard.record.clone().expect("just loaded");
        next.previous_proxy_key = Some(previous_proxy_key);
        next.proxy_key = Some(new_proxy_key);
        next.state = KeyState::TwoKeys;
        self.commit(&mut guard, next).await?;

        Ok(public_key)
    }

    pub async fn erase_keys(&self) -> Result<bool, ProxyError> {
        let mut guard = self.state.lock().await;
        Self::fail_if_latched(&guard)?;

        let response = self.engine.request(Op::EraseKeys, &[]).await?;
        let erased = expect_bool(response)?;

        if let Err(e) = self.store.delete().await {
            guard.latched = true;
            tracing::error!(component = COMPONENT, error = %e, "erase succeeded on the HSM but the record could not be deleted");
            return Err(ProxyError::inconsistent_state(COMPONENT));
        }
        guard.record = None;
        guard.latched = false;

        Ok(erased)
    }

    pub async fn digest_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, ProxyError> {
        // Stateless: not subject to the `InconsistentState` latch, which
        // only guards operations that read or write the persisted record.
        let _guard = self.state.lock().await;

        let response = self
            .engine
            .request(Op::DigestBytes, &[bytes.to_vec()])
            .await?;
        expect_bytes(response)
    }

    pub async fn sign_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, ProxyError> {
        let mut guard = self.state.lock().await;
        Self::fail_if_latched(&guard)?;
        self.ensure_loaded(&mut guard).await?;

        let record = guard.record.as_ref().expect("just loaded");
        if !matches!(record.state, KeyState::LoneKey | KeyState::TwoKeys) {
            return Err(ProxyError::invalid_state(COMPONENT));
        }

        // The previous-key one-shot rule: if a rotation just happened,
        // this sign consumes the superseded secret; otherwise the
        // current one.
        let consuming_previous = record.previous_proxy_key.is_some();
        let signing_key = if consuming_previous {
            record
                .previous_proxy_key
                .clone()
                .expect("checked is_some above")
        } else {
            record
                .proxy_key
                .clone()
                .expect("LoneKey/TwoKeys state guarantees proxy_key is present")
        };

        let response = self
            .engine
            .request(Op::SignBytes, &[signing_key.to_vec(), bytes.to_vec()])
            .await?;
        let signature = expect_bytes(response)?;

        let mut next = guard.record.clone().expect("just loaded");
        if consuming_previous {
            next.previous_proxy_key = None;
        }
        next.state = KeyState::LoneKey;
        self.commit(&mut guard, next).await?;

        Ok(signature)
    }

    pub async fn valid_signature(
        &self,
        public_key: &[u8],
        signature: &[u8],
        bytes: &[u8],
    ) -> Result<bool, ProxyError> {
        // Stateless: not subject to the `InconsistentState` latch, which
        // only guards operations that read or write the persisted record.
        let _guard = self.state.lock().await;

        let response = self
            .engine
            .request(
                Op::ValidSignature,
                &[public_key.to_vec(), signature.to_vec(), bytes.to_vec()],
            )
            .await?;
        expect_bool(response)
    }

    /// Persist `next` and, only if that succeeds, make it the
    /// controller's in-memory record. A persistence failure here means
    /// the HSM has already committed the transition but the host
    /// cannot record it — that is `InconsistentState`, latched until
    /// manual recovery.
    async fn commit(&self, guard: &mut ControllerState, next: ProxyRecord) -> Result<(), ProxyError> {
        if let Err(e) = self.store.store(&next).await {
            guard.latched = true;
            tracing::error!(
                component = COMPONENT,
                error = %e,
                "HSM key state changed but the record could not be persisted",
            );
            return Err(ProxyError::inconsistent_state(COMPONENT));
        }
        guard.record = Some(next);
        Ok(())
    }
}

fn expect_bytes(response: Response) -> Result<Vec<u8>, ProxyError> {
    match response {
        Response::Bytes(bytes) => Ok(bytes),
        Response::Bool(value) => Ok(vec![value as u8]),
        Response::Error(code) => Err(ProxyError::block_rejected(COMPONENT, code)),
    }
}

fn expect_bool(response: Response) -> Result<bool, ProxyError> {
    match response {
        Response::Bool(value) => Ok(value),
        Response::Bytes(bytes) if bytes.len() == 1 => Ok(bytes[0] != 0),
        Response::Bytes(_) => Err(ProxyError::unexpected(
            COMPONENT,
            "expected a boolean response but got a multi-byte payload",
        )),
        Response::Error(code) => Err(ProxyError::block_rejected(COMPONENT, code)),
    }
}
