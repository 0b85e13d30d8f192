//! Viaduct Mapping -- command id tables per protocol revision.
//!
//! Every revision numbers its packets differently while the names stay put.
//! A table answers two questions: what is packet `id` called in revision `v`,
//! and which id does the same packet carry in another revision. Tables are
//! external configuration; the translation engine only reads them.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use viaduct_protocol::{CommandId, ProtocolError, ProtocolVersion};

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("bad version key: {0}")]
    Version(#[from] ProtocolError),
    #[error("duplicate command id {id} in {version}: {first} and {second}")]
    DuplicateId {
        version: ProtocolVersion,
        id: CommandId,
        first: String,
        second: String,
    },
}

pub type Result<T> = std::result::Result<T, MappingError>;

/// Read-only lookups the translation engine needs.
pub trait CommandMapping: Send + Sync {
    /// Packet name for `id` in `version`'s namespace.
    fn name_of(&self, version: ProtocolVersion, id: CommandId) -> Option<&str>;

    /// Command id for `name` in `version`'s namespace.
    fn id_of(&self, version: ProtocolVersion, name: &str) -> Option<CommandId>;

    /// Revisions this mapping knows about, oldest first.
    fn versions(&self) -> Vec<ProtocolVersion>;

    /// Translate an id from `from`'s namespace into `to`'s, joining on name.
    fn paired_id(
        &self,
        from: ProtocolVersion,
        to: ProtocolVersion,
        id: CommandId,
    ) -> Option<CommandId> {
        self.name_of(from, id).and_then(|name| self.id_of(to, name))
    }
}

#[derive(Debug, Clone, Default)]
struct VersionTable {
    by_id: HashMap<CommandId, String>,
    by_name: HashMap<String, CommandId>,
}

/// Immutable command table for a set of revisions.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    versions: BTreeMap<ProtocolVersion, VersionTable>,
    fingerprint: String,
}

/// On-disk layout:
///
/// ```toml
/// [versions."3.2"]
/// SceneEntityAppearNotify = 221
/// UnionCmdNotify = 5
/// ```
#[derive(Debug, Deserialize)]
struct RawTable {
    #[serde(default)]
    versions: BTreeMap<String, BTreeMap<String, CommandId>>,
}

impl CommandTable {
    /// Build a table from `(version, name, id)` triples.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ProtocolVersion, S, CommandId)>,
        S: Into<String>,
    {
        let mut versions: BTreeMap<ProtocolVersion, VersionTable> = BTreeMap::new();
        for (version, name, id) in entries {
            let name = name.into();
            let table = versions.entry(version).or_default();
            if let Some(first) = table.by_id.get(&id) {
                if *first != name {
                    return Err(MappingError::DuplicateId {
                        version,
                        id,
                        first: first.clone(),
                        second: name,
                    });
                }
            }
            // A renamed-in-place entry would leave a stale id behind.
            if let Some(old_id) = table.by_name.insert(name.clone(), id) {
                table.by_id.remove(&old_id);
            }
            table.by_id.insert(id, name);
        }

        let fingerprint = fingerprint(&versions);
        Ok(Self {
            versions,
            fingerprint,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawTable = toml::from_str(content)?;
        let mut entries = Vec::new();
        for (version_key, commands) in raw.versions {
            let version: ProtocolVersion = version_key.parse()?;
            for (name, id) in commands {
                entries.push((version, name, id));
            }
        }
        Self::from_entries(entries)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            versions = table.versions.len(),
            fingerprint = table.fingerprint(),
            "mapping: loaded command table"
        );
        Ok(table)
    }

    /// SHA-256 over the canonical (sorted) entry listing, hex encoded.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Number of commands known for `version`.
    pub fn command_count(&self, version: ProtocolVersion) -> usize {
        self.versions.get(&version).map_or(0, |t| t.by_id.len())
    }
}

impl CommandMapping for CommandTable {
    fn name_of(&self, version: ProtocolVersion, id: CommandId) -> Option<&str> {
        self.versions
            .get(&version)
            .and_then(|t| t.by_id.get(&id))
            .map(String::as_str)
    }

    fn id_of(&self, version: ProtocolVersion, name: &str) -> Option<CommandId> {
        self.versions
            .get(&version)
            .and_then(|t| t.by_name.get(name))
            .copied()
    }

    fn versions(&self) -> Vec<ProtocolVersion> {
        self.versions.keys().copied().collect()
    }
}

fn fingerprint(versions: &BTreeMap<ProtocolVersion, VersionTable>) -> String {
    let mut hasher = Sha256::new();
    for (version, table) in versions {
        let mut ids: Vec<_> = table.by_id.iter().collect();
        ids.sort();
        for (id, name) in ids {
            hasher.update(format!("{version} {name} {id}\n").as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Shared, atomically replaceable command table.
///
/// Readers take an `Arc` snapshot and keep using it for the whole call; a
/// concurrent [`publish`](Self::publish) swaps the pointer and never mutates
/// a table someone is reading.
#[derive(Debug, Default)]
pub struct MappingHandle {
    current: RwLock<Arc<CommandTable>>,
}

impl MappingHandle {
    pub fn new(table: CommandTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
        }
    }

    pub fn snapshot(&self) -> Arc<CommandTable> {
        // The guarded value is a plain Arc; a poisoned lock still holds a
        // complete table.
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn publish(&self, table: CommandTable) {
        let fingerprint = table.fingerprint().to_string();
        let versions = table.versions.len();
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(table);
        drop(guard);
        tracing::info!(fingerprint, versions, "mapping: published command table");
    }
}
