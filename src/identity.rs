//! Resolves operator-assigned labels for physical entities.
//!
//! One device is usually known under several handles at once: its IP address,
//! its hardware address, a hostname and sometimes a derived fingerprint such
//! as a hash of its BLE advertisement. The operator may have named the device
//! under any of them. [`IdentityResolver::resolve`] walks the handles in
//! precedence order and returns the first label found.
//!
//! The labels live in an [`AliasStore`] owned by a persistence collaborator.
//! The resolver only reads and writes through it.
//!
//! ```rust
//! use fleetscout::identity::{IdentityResolver, MemoryAliasStore};
//!
//! let store = MemoryAliasStore::from_pairs([("aa:bb:cc:dd:ee:ff", "Camera-1")]);
//! let resolver = IdentityResolver::new(store);
//!
//! assert_eq!(
//!     resolver.resolve(&["", "  ", "aa:bb:cc:dd:ee:ff"]),
//!     Some("Camera-1".to_owned())
//! );
//! ```
use crate::error::Result;
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Key/label storage backing the resolver.
///
/// Keys are unique; several keys may map to the same label.
pub trait AliasStore {
    /// Label stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `label` under `key`, replacing any previous label.
    fn set(&mut self, key: &str, label: &str) -> Result<()>;

    /// Removes the label stored under `key`. Removing a missing key is a no-op.
    fn delete(&mut self, key: &str) -> Result<()>;
}

impl<S: AliasStore + ?Sized> AliasStore for &mut S {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, label: &str) -> Result<()> {
        (**self).set(key, label)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        (**self).delete(key)
    }
}

/// Canonical form of an identity key.
///
/// Surrounding whitespace is dropped. Hardware addresses are lowercased and
/// use `:` separators so `AA-BB-CC-DD-EE-FF` and `aa:bb:cc:dd:ee:ff` meet.
/// Everything else (hostnames, fingerprints) keeps its case.
pub fn normalize_key(key: &str) -> String {
    let key = key.trim();
    if is_hardware_address(key) {
        key.replace('-', ":").to_ascii_lowercase()
    } else {
        key.to_owned()
    }
}

fn is_hardware_address(key: &str) -> bool {
    let parts = key.split([':', '-']).collect::<Vec<_>>();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Ordered list of handles for one entity, highest precedence first.
///
/// Empty handles are skipped when added, duplicates keep their first slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityKeys(Vec<String>);

impl IdentityKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys for a scanned host in the default precedence: hardware address,
    /// network address, hostname, content fingerprint.
    pub fn for_host(
        hardware_address: Option<&str>,
        address: Option<&str>,
        hostname: Option<&str>,
        fingerprint: Option<&str>,
    ) -> Self {
        Self::new()
            .with(hardware_address)
            .with(address)
            .with(hostname)
            .with(fingerprint)
    }

    /// Appends `key` if it is present and not blank.
    #[must_use]
    pub fn with(mut self, key: Option<&str>) -> Self {
        if let Some(key) = key {
            let key = normalize_key(key);
            if !key.is_empty() && !self.0.contains(&key) {
                self.0.push(key);
            }
        }
        self
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Resolves labels through an injected [`AliasStore`].
///
/// Mutation goes through `&mut self`, so concurrent callers serialize on
/// whoever owns the resolver.
#[derive(Debug)]
pub struct IdentityResolver<S> {
    store: S,
}

impl<S: AliasStore> IdentityResolver<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// First non-empty label found for `keys`, in order.
    ///
    /// Each key is looked up as given, then in its normalized form. Blank
    /// keys are skipped. Falling back to something like an observed hostname
    /// is the caller's business, see [`resolve_or`](Self::resolve_or).
    pub fn resolve<K: AsRef<str>>(&self, keys: &[K]) -> Option<String> {
        keys.iter()
            .map(AsRef::as_ref)
            .filter(|k| !k.trim().is_empty())
            .find_map(|k| self.lookup(k))
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let label = |k: &str| self.store.get(k).filter(|l| !l.trim().is_empty());
        label(key).or_else(|| {
            let normalized = normalize_key(key);
            (normalized != key).then(|| label(&normalized)).flatten()
        })
    }

    /// [`resolve`](Self::resolve), or `fallback` when no alias matches.
    pub fn resolve_or<K: AsRef<str>>(&self, keys: &[K], fallback: &str) -> String {
        self.resolve(keys).unwrap_or_else(|| fallback.to_owned())
    }

    /// Assigns `label` to `key`. A blank label removes the alias instead.
    pub fn set_alias(&mut self, key: &str, label: &str) -> Result<()> {
        let key = normalize_key(key);
        if key.is_empty() {
            return Ok(());
        }
        let label = label.trim();
        if label.is_empty() {
            return self.store.delete(&key);
        }
        debug!("Alias {key} -> {label}");
        self.store.set(&key, label)
    }

    pub fn delete_alias(&mut self, key: &str) -> Result<()> {
        let key = normalize_key(key);
        debug!("Alias {key} removed");
        self.store.delete(&key)
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

/// Alias store kept in memory only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryAliasStore {
    aliases: BTreeMap<String, String>,
}

impl MemoryAliasStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from `(key, label)` pairs, normalizing the keys.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let aliases = pairs
            .into_iter()
            .map(|(k, v)| (normalize_key(k.as_ref()), v.into()))
            .collect();
        Self { aliases }
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl AliasStore for MemoryAliasStore {
    fn get(&self, key: &str) -> Option<String> {
        self.aliases.get(key).cloned()
    }

    fn set(&mut self, key: &str, label: &str) -> Result<()> {
        self.aliases.insert(key.to_owned(), label.to_owned());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.aliases.remove(key);
        Ok(())
    }
}

/// Alias store persisted as a JSON object on disk.
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so a crash leaves either the old or the new map.
#[derive(Debug)]
pub struct JsonFileAliasStore {
    path: PathBuf,
    inner: MemoryAliasStore,
}

impl JsonFileAliasStore {
    /// Opens the store at `path`. A missing file starts an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let aliases: BTreeMap<String, String> = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        debug!("Loaded {} alias(es) from {}", aliases.len(), path.display());
        Ok(Self {
            path,
            inner: MemoryAliasStore::from_pairs(aliases),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.inner.aliases)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl AliasStore for JsonFileAliasStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, label: &str) -> Result<()> {
        self.inner.set(key, label)?;
        self.persist()
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        if self.inner.aliases.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }
}
