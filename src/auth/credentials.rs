//! API key records and the credential store.
//!
//! Tokens have the shape `sgw_<id>.<secret>`. Only `sha256:<hex>` of the
//! whole token is kept; the plaintext exists once, at issue time.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::ffi::OsString;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const TOKEN_PREFIX: &str = "sgw_";
const HASH_PREFIX: &str = "sha256:";
const SECRET_BYTES: usize = 32;
const MAX_ID_LEN: usize = 32;

/// Access level of a key. Ordered: a higher role satisfies a lower requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Analyst,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Analyst => "analyst",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Role::Viewer),
            "analyst" => Ok(Role::Analyst),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role `{}`", other)),
        }
    }
}

/// A stored API key. Never carries the plaintext secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub secret_hash: String,
    pub role: Role,
    /// Seconds since epoch.
    pub created_at: u64,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Overrides the global per-window limit for this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_minute: Option<u32>,
}

/// A freshly issued key. `token` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub token: String,
    pub key: ApiKey,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("token is not of the form sgw_<id>.<secret>")]
    MalformedToken,
    #[error("key `{0}` already exists")]
    DuplicateId(String),
}

/// Hash a full token for storage or comparison.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{}{}", HASH_PREFIX, hex::encode(digest))
}

/// Split a presented token into `(id, secret)` if it is well formed.
pub fn parse_token(token: &str) -> Option<(&str, &str)> {
    let rest = token.strip_prefix(TOKEN_PREFIX)?;
    let (id, secret) = rest.split_once('.')?;
    if !is_key_id(id) {
        return None;
    }
    if secret.is_empty() || !secret.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some((id, secret))
}

/// Key ids are 1-32 chars of `[a-z0-9]`.
pub fn is_key_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Random 12-char key id.
pub fn generate_key_id() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build a new random token for `id`.
pub fn generate_token(id: &str) -> String {
    let mut secret = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut secret);
    format!("{}{}.{}", TOKEN_PREFIX, id, hex::encode(secret))
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Issue a key without touching any store (offline keygen).
pub fn issue_key(role: Role, label: Option<String>, rate_limit_per_minute: Option<u32>) -> IssuedKey {
    let id = generate_key_id();
    let token = generate_token(&id);
    let key = ApiKey {
        secret_hash: hash_token(&token),
        id,
        role,
        created_at: now_secs(),
        revoked: false,
        label,
        rate_limit_per_minute,
    };
    IssuedKey { token, key }
}

/// Thread-safe table of API keys, optionally persisted to a JSON file.
///
/// Keys are never removed: revocation flips a flag so the record stays
/// available for audit.
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<DashMap<String, ApiKey>>,
    persistence_path: Option<PathBuf>,
    /// Serializes keys file writes across clones of the store.
    save_lock: Arc<Mutex<()>>,
}

impl CredentialStore {
    /// Create a new empty store.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open a store backed by `path`, loading it if the file exists.
    pub fn load_from_file(path: &Path) -> std::io::Result<Self> {
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            for key in read_keys_file(path)? {
                store.inner.insert(key.id.clone(), key);
            }
            tracing::info!(count = store.inner.len(), path = %path.display(), "Loaded API keys");
        }
        Ok(store)
    }

    /// Write all records back to the keys file, if one is configured.
    ///
    /// Writers are serialized and the snapshot is taken under the lock, so
    /// the last save always carries the newest state. The file is replaced
    /// by renaming a fully written sibling over it.
    pub fn save_to_file(&self) -> std::io::Result<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let keys = self.list();
        let tmp = temp_sibling(path);
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &keys)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        tracing::info!(count = keys.len(), path = %path.display(), "Saved API keys");
        Ok(())
    }

    pub fn persistence_path(&self) -> Option<&Path> {
        self.persistence_path.as_deref()
    }

    /// Generate, store and return a new key.
    pub fn issue(&self, role: Role, label: Option<String>, rate_limit_per_minute: Option<u32>) -> IssuedKey {
        loop {
            let issued = issue_key(role, label.clone(), rate_limit_per_minute);
            if let Entry::Vacant(slot) = self.inner.entry(issued.key.id.clone()) {
                slot.insert(issued.key.clone());
                tracing::info!(target: "audit", key_id = %issued.key.id, role = %role, "API key issued");
                return issued;
            }
        }
    }

    /// Register an externally supplied plaintext token (bootstrap key).
    pub fn register_token(&self, token: &str, role: Role, label: Option<String>) -> Result<ApiKey, CredentialError> {
        let (id, _) = parse_token(token).ok_or(CredentialError::MalformedToken)?;
        let key = ApiKey {
            id: id.to_string(),
            secret_hash: hash_token(token),
            role,
            created_at: now_secs(),
            revoked: false,
            label,
            rate_limit_per_minute: None,
        };
        match self.inner.entry(key.id.clone()) {
            Entry::Occupied(existing) if existing.get().secret_hash != key.secret_hash => {
                Err(CredentialError::DuplicateId(key.id))
            }
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(key.clone());
                Ok(key)
            }
        }
    }

    /// Merge records read from disk. New ids are inserted, known ids take
    /// the incoming metadata, and revocation is sticky in both directions.
    pub fn merge(&self, keys: Vec<ApiKey>) -> usize {
        let mut changed = 0;
        for incoming in keys {
            match self.inner.entry(incoming.id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(incoming);
                    changed += 1;
                }
                Entry::Occupied(mut existing) => {
                    let revoked = existing.get().revoked || incoming.revoked;
                    let merged = ApiKey { revoked, ..incoming };
                    if existing.get() != &merged {
                        existing.insert(merged);
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    pub fn get(&self, id: &str) -> Option<ApiKey> {
        self.inner.get(id).map(|r| r.value().clone())
    }

    /// Mark a key revoked. Returns the updated record, or `None` if unknown.
    pub fn revoke(&self, id: &str) -> Option<ApiKey> {
        let mut entry = self.inner.get_mut(id)?;
        entry.revoked = true;
        tracing::warn!(target: "audit", key_id = %id, "API key revoked");
        Some(entry.clone())
    }

    /// All records, ordered by creation time then id.
    pub fn list(&self) -> Vec<ApiKey> {
        let mut keys: Vec<ApiKey> = self.inner.iter().map(|r| r.value().clone()).collect();
        keys.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        keys
    }

    /// `(active, revoked)` counts.
    pub fn summary(&self) -> (usize, usize) {
        let revoked = self.inner.iter().filter(|r| r.value().revoked).count();
        (self.inner.len() - revoked, revoked)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// `<path>.tmp`, in the same directory so the rename stays on one filesystem.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Read a keys file (a JSON array of [`ApiKey`]).
pub fn read_keys_file(path: &Path) -> std::io::Result<Vec<ApiKey>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let keys: Vec<ApiKey> = serde_json::from_reader(reader)?;

    let mut seen = HashMap::new();
    for key in &keys {
        if !is_key_id(&key.id) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid key id `{}`", key.id),
            ));
        }
        if seen.insert(key.id.as_str(), ()).is_some() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("duplicate key id `{}`", key.id),
            ));
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let issued = issue_key(Role::Analyst, None, None);
        let (id, secret) = parse_token(&issued.token).unwrap();
        assert_eq!(id, issued.key.id);
        assert_eq!(secret.len(), SECRET_BYTES * 2);
        assert_eq!(issued.key.secret_hash, hash_token(&issued.token));
        assert!(!issued.key.secret_hash.contains(secret));
    }

    #[test]
    fn test_parse_token_rejects_garbage() {
        assert!(parse_token("").is_none());
        assert!(parse_token("invalid-key-12345").is_none());
        assert!(parse_token("sgw_.abcd").is_none());
        assert!(parse_token("sgw_ABC.abcd").is_none());
        assert!(parse_token("sgw_abc.").is_none());
        assert!(parse_token("sgw_abc.xyz").is_none());
        assert!(parse_token("sgw_abc.ab;cd").is_none());
        assert_eq!(parse_token("sgw_abc.00ff"), Some(("abc", "00ff")));
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Admin > Role::Analyst);
        assert!(Role::Analyst > Role::Viewer);
        assert_eq!("analyst".parse::<Role>().unwrap(), Role::Analyst);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_revoke_keeps_record() {
        let store = CredentialStore::new(None);
        let issued = store.issue(Role::Viewer, Some("ci".into()), None);
        let revoked = store.revoke(&issued.key.id).unwrap();
        assert!(revoked.revoked);
        assert_eq!(store.len(), 1);
        assert_eq!(store.summary(), (0, 1));
        assert!(store.revoke("missing").is_none());
    }

    #[test]
    fn test_merge_revocation_is_sticky() {
        let store = CredentialStore::new(None);
        let issued = store.issue(Role::Analyst, None, None);
        store.revoke(&issued.key.id);

        let mut from_disk = issued.key.clone();
        from_disk.revoked = false;
        from_disk.role = Role::Admin;
        let other = issue_key(Role::Viewer, None, None).key;

        assert_eq!(store.merge(vec![from_disk, other.clone()]), 2);
        let merged = store.get(&issued.key.id).unwrap();
        assert!(merged.revoked);
        assert_eq!(merged.role, Role::Admin);
        assert_eq!(store.get(&other.id), Some(other));
    }

    #[test]
    fn test_register_token() {
        let store = CredentialStore::new(None);
        let token = "sgw_boot.0123456789abcdef";
        let key = store.register_token(token, Role::Admin, None).unwrap();
        assert_eq!(key.id, "boot");
        // Same token again is idempotent.
        assert!(store.register_token(token, Role::Admin, None).is_ok());
        assert_eq!(
            store.register_token("sgw_boot.ffff", Role::Admin, None),
            Err(CredentialError::DuplicateId("boot".into()))
        );
        assert_eq!(
            store.register_token("not-a-token", Role::Admin, None),
            Err(CredentialError::MalformedToken)
        );
    }

    #[test]
    fn test_concurrent_saves_leave_a_readable_file() {
        let path = std::env::temp_dir().join(format!("sgw-keys-{}.json", uuid::Uuid::new_v4()));
        let store = CredentialStore::new(Some(path.clone()));

        let workers: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..8 {
                        let issued = store.issue(Role::Viewer, Some(format!("worker-{}", i)), None);
                        if i % 2 == 0 {
                            store.revoke(&issued.key.id);
                        }
                        store.save_to_file().unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let keys = read_keys_file(&path).unwrap();
        assert_eq!(keys.len(), 128);
        assert_eq!(keys.iter().filter(|k| k.revoked).count(), 64);
        assert!(!temp_sibling(&path).exists());

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_persistence() {
        let path = std::env::temp_dir().join(format!("sgw-keys-{}.json", uuid::Uuid::new_v4()));

        let store = CredentialStore::new(Some(path.clone()));
        let issued = store.issue(Role::Analyst, Some("scanner".into()), Some(10));
        store.save_to_file().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains(&issued.token));

        let loaded = CredentialStore::load_from_file(&path).unwrap();
        let key = loaded.get(&issued.key.id).unwrap();
        assert_eq!(key.rate_limit_per_minute, Some(10));
        assert_eq!(key.label.as_deref(), Some("scanner"));

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
