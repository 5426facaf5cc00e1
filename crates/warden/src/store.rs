//! Persistent embedded KV store with zstd compression and AES-256-GCM
//! at-rest encryption, plus typed accessors for the catalog and notification
//! ring namespaces.
//!
//! Backed by [`sled`], a single-file embedded KV engine: every `put`/`delete`
//! is a single-key atomic write, so readers always observe a pre- or
//! post-state, never a partial one.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use warden_types::{
    Action, KvEntry, Notification, RESERVED_KEY_GROUPS, RESERVED_KEY_NOTIFICATIONS,
    is_reserved_key,
};

const ZSTD_LEVEL: i32 = 1;

/// On-disk shape of a KV entry: `KvEntry` minus its key, since the key is
/// already the sled row key and storing it twice would be redundant.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    secret: bool,
}

/// Opened store handle. Cloning is cheap: `sled::Db` is an `Arc` internally.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    encrypt_key: String,
}

impl Store {
    /// Open (creating if absent) the store at `path`, encrypting values at
    /// rest with a key derived from `encrypt_key` (must be ≥16 bytes; the
    /// caller, `warden-config`, already validates this at boot).
    pub fn open(path: &Path, encrypt_key: &str) -> Result<Self> {
        let db = sled::open(path)
            .with_context(|| format!("failed to open store at {}", path.display()))?;
        Ok(Self {
            db,
            encrypt_key: encrypt_key.to_string(),
        })
    }

    fn encode(&self, value: &str) -> Result<Vec<u8>> {
        let compressed =
            zstd::encode_all(value.as_bytes(), ZSTD_LEVEL).context("failed to compress value")?;
        warden_encrypt::encrypt(&compressed, &self.encrypt_key).context("failed to encrypt value")
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let encoded = std::str::from_utf8(bytes).context("stored value is not valid UTF-8")?;
        let compressed = warden_encrypt::decrypt(encoded, &self.encrypt_key)
            .context("failed to decrypt value")?;
        let raw = zstd::decode_all(compressed.as_slice()).context("failed to decompress value")?;
        String::from_utf8(raw).context("stored value is not valid UTF-8")
    }

    /// Raw get. Returns `Ok(None)` for a missing key. Persists and restores
    /// the entry's full `secret` flag, not just its value.
    pub fn get(&self, key: &str) -> Result<Option<KvEntry>> {
        match self.db.get(key).context("store get failed")? {
            Some(bytes) => Ok(Some(self.decode_entry(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Raw put. Rejects reserved keys; use [`Store::put_groups`]/
    /// [`Store::put_notifications`] for those namespaces instead.
    pub fn put(&self, entry: &KvEntry) -> Result<()> {
        if is_reserved_key(&entry.key) {
            anyhow::bail!("key '{}' is reserved", entry.key);
        }
        let encoded = self.encode_entry(entry)?;
        self.db
            .insert(entry.key.as_str(), encoded)
            .context("store put failed")?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        if is_reserved_key(key) {
            anyhow::bail!("key '{}' is reserved", key);
        }
        self.db.remove(key).context("store delete failed")?;
        Ok(())
    }

    /// All non-reserved entries, for the public KV dump.
    pub fn dump(&self) -> Result<Vec<KvEntry>> {
        let mut out = Vec::new();
        for item in self.db.iter() {
            let (key, value) = item.context("store iteration failed")?;
            let key = String::from_utf8_lossy(&key).to_string();
            if is_reserved_key(&key) {
                continue;
            }
            out.push(self.decode_entry(&key, &value)?);
        }
        Ok(out)
    }

    fn encode_entry(&self, entry: &KvEntry) -> Result<Vec<u8>> {
        let stored = StoredEntry {
            value: entry.value.clone(),
            secret: entry.secret,
        };
        let json = serde_json::to_string(&stored).context("failed to serialize kv entry")?;
        self.encode(&json)
    }

    fn decode_entry(&self, key: &str, bytes: &[u8]) -> Result<KvEntry> {
        let json = self.decode(bytes)?;
        let stored: StoredEntry =
            serde_json::from_str(&json).context("failed to deserialize kv entry")?;
        Ok(KvEntry {
            key: key.to_string(),
            value: stored.value,
            secret: stored.secret,
        })
    }

    fn put_raw_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).context("failed to serialize store value")?;
        let encoded = self.encode(&json)?;
        self.db.insert(key, encoded).context("store put failed")?;
        Ok(())
    }

    fn get_raw_json<T: serde::de::DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        match self.db.get(key).context("store get failed")? {
            Some(bytes) => {
                let json = self.decode(&bytes)?;
                serde_json::from_str(&json).context("failed to deserialize store value")
            }
            None => Ok(T::default()),
        }
    }

    pub fn get_notifications(&self) -> Result<Vec<Notification>> {
        self.get_raw_json(RESERVED_KEY_NOTIFICATIONS)
    }

    pub fn put_notifications(&self, notifications: &[Notification]) -> Result<()> {
        self.put_raw_json(RESERVED_KEY_NOTIFICATIONS, &notifications)
    }

    pub fn delete_notifications(&self) -> Result<()> {
        self.put_notifications(&[])
    }

    /// Load the merged catalog, `{group: [Action]}`.
    pub fn get_groups(&self) -> Result<BTreeMap<String, Vec<Action>>> {
        self.get_raw_json(RESERVED_KEY_GROUPS)
    }

    pub fn put_groups(&self, groups: &BTreeMap<String, Vec<Action>>) -> Result<()> {
        self.put_raw_json(RESERVED_KEY_GROUPS, groups)
    }

    pub fn get_group_actions(&self, group: &str) -> Result<Vec<Action>> {
        Ok(self.get_groups()?.get(group).cloned().unwrap_or_default())
    }

    pub fn get_group_action(&self, group: &str, action: &str) -> Result<Option<Action>> {
        Ok(self
            .get_group_actions(group)?
            .into_iter()
            .find(|a| a.action == action))
    }

    /// Replace a single action within its group, leaving the rest of the
    /// catalog untouched, then persist the whole blob back.
    pub fn put_group_action(&self, group: &str, updated: Action) -> Result<()> {
        let mut groups = self.get_groups()?;
        let actions = groups.entry(group.to_string()).or_default();
        if let Some(slot) = actions.iter_mut().find(|a| a.action == updated.action) {
            *slot = updated;
        } else {
            actions.push(updated);
        }
        self.put_groups(&groups)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("store flush failed")?;
        Ok(())
    }
}
