// Persistent Config Store — durable, atomic storage of the one
// configuration record a proxy instance owns.
//
// The on-disk shape is a small JSON "catalog" (serde_json), written with
// write-to-temp-then-rename so a crash mid-write can never leave a
// half-written record behind. Byte fields are hex-encoded so the file
// stays a readable text catalog, per the spec's data model.

use crate::error::ProxyError;
use crate::secret::{ProxySecret, Tag};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

const COMPONENT: &str = "config-store";

/// Lifecycle state of the persisted key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyState {
    Keyless,
    LoneKey,
    TwoKeys,
}

/// The single configuration record a proxy instance owns.
///
/// Invariants (enforced by the lifecycle controller, not this type):
/// `state == Keyless` iff both keys are absent, `state == LoneKey` iff
/// only `proxy_key` is present, `state == TwoKeys` iff both are present.
#[derive(Debug, Clone)]
pub struct ProxyRecord {
    pub tag: Tag,
    pub state: KeyState,
    pub proxy_key: Option<ProxySecret>,
    pub previous_proxy_key: Option<ProxySecret>,
}

impl ProxyRecord {
    /// A brand new record: fresh random tag, keyless.
    pub fn fresh() -> Self {
        Self {
            tag: Tag::generate(),
            state: KeyState::Keyless,
            proxy_key: None,
            previous_proxy_key: None,
        }
    }
}

/// The on-disk DTO. Kept separate from `ProxyRecord` so the domain type
/// never has to know about hex encoding or serde.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedRecord {
    tag: String,
    state: KeyState,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_proxy_key: Option<String>,
}

impl From<&ProxyRecord> for PersistedRecord {
    fn from(record: &ProxyRecord) -> Self {
        Self {
            tag: hex::encode(record.tag.as_bytes()),
            state: record.state,
            proxy_key: record.proxy_key.as_ref().map(|k| hex::encode(k.as_bytes())),
            previous_proxy_key: record
                .previous_proxy_key
                .as_ref()
                .map(|k| hex::encode(k.as_bytes())),
        }
    }
}

impl TryFrom<PersistedRecord> for ProxyRecord {
    type Error = ProxyError;

    fn try_from(persisted: PersistedRecord) -> Result<Self, ProxyError> {
        Ok(Self {
            tag: Tag::from_bytes(decode_array(&persisted.tag, "tag")?),
            state: persisted.state,
            proxy_key: persisted
                .proxy_key
                .as_deref()
                .map(|s| decode_array(s, "proxyKey").map(ProxySecret::from_bytes))
                .transpose()?,
            previous_proxy_key: persisted
                .previous_proxy_key
                .as_deref()
                .map(|s| decode_array(s, "previousProxyKey").map(ProxySecret::from_bytes))
                .transpose()?,
        })
    }
}

fn decode_array<const N: usize>(hex_str: &str, field: &str) -> Result<[u8; N], ProxyError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| ProxyError::config_store(COMPONENT, format!("{field}: {e}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        ProxyError::config_store(
            COMPONENT,
            format!("{field}: expected {N} bytes, got {}", bytes.len()),
        )
    })
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// `directory` holds the config file; `protocol` (e.g. `"v2"`) is
    /// baked into the file name so different protocol revisions never
    /// collide.
    pub fn new(directory: impl AsRef<Path>, protocol: &str) -> Self {
        let file_name = format!("HSMProxy{protocol}.json");
        Self {
            path: directory.as_ref().join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record, or `None` if no file exists yet.
    pub async fn load(&self) -> Result<Option<ProxyRecord>, ProxyError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .map_err(|e| ProxyError::unexpected(COMPONENT, e))?
    }

    /// Atomically replace the persisted record.
    pub async fn store(&self, record: &ProxyRecord) -> Result<(), ProxyError> {
        let path = self.path.clone();
        let persisted = PersistedRecord::from(record);
        tokio::task::spawn_blocking(move || Self::store_sync(&path, &persisted))
            .await
            .map_err(|e| ProxyError::unexpected(COMPONENT, e))?
    }

    /// Remove the persisted record. Idempotent: deleting an
    /// already-absent record is not an error.
    pub async fn delete(&self) -> Result<(), ProxyError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::delete_sync(&path))
            .await
            .map_err(|e| ProxyError::unexpected(COMPONENT, e))?
    }

    /// Whether a record file currently exists.
    pub async fn exists(&self) -> bool {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || path.is_file())
            .await
            .unwrap_or(false)
    }

    fn load_sync(path: &Path) -> Result<Option<ProxyRecord>, ProxyError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ProxyError::config_store(COMPONENT, e)),
        };
        let persisted: PersistedRecord = serde_json::from_str(&contents)
            .map_err(|e| ProxyError::config_store(COMPONENT, e))?;
        Ok(Some(ProxyRecord::try_from(persisted)?))
    }

    fn store_sync(path: &Path, persisted: &PersistedRecord) -> Result<(), ProxyError> {
        let json = serde_json::to_string_pretty(persisted)
            .map_err(|e| ProxyError::config_store(COMPONENT, e))?;

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| ProxyError::config_store(COMPONENT, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| ProxyError::config_store(COMPONENT, e))?;
        use std::io::Write;
        tmp.write_all(json.as_bytes())
            .map_err(|e| ProxyError::config_store(COMPONENT, e))?;
        tmp.flush().map_err(|e| ProxyError::config_store(COMPONENT, e))?;
        tmp.persist(path)
            .map_err(|e| ProxyError::config_store(COMPONENT, e.error))?;
        Ok(())
    }

    fn delete_sync(path: &Path) -> Result<(), ProxyError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProxyError::config_store(COMPONENT, e)),
        }
    }
}
