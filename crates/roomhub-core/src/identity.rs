//! Persisted room identities, keyed by controller address.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use roomhub_types::RoomId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomIdentity {
    pub name: String,
    #[serde(alias = "number")]
    pub id: RoomId,
}

#[derive(Debug, Default)]
pub struct IdentityStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, RoomIdentity>,
}

impl IdentityStore {
    /// Load the identity map at `path`. A missing file starts an empty map.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persistence` if the file exists but cannot be read or
    /// parsed. The file is left untouched so no identity is lost.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::persistence(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::persistence(&path, e)),
        };

        debug!("Loaded {} room identities", entries.len());
        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    /// A store that never touches disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn get(&self, address: &str) -> Option<&RoomIdentity> {
        self.entries.get(address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id for the next room never seen before.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persistence` once the highest stored id is `u32::MAX`.
    pub fn next_id(&self) -> Result<RoomId> {
        let Some(max) = self.entries.values().map(|identity| identity.id).max() else {
            return Ok(RoomId::new(1));
        };
        max.next().ok_or_else(|| {
            let path = self.path.clone().unwrap_or_default();
            Error::persistence(path, std::io::Error::other("room ids exhausted"))
        })
    }

    /// Identity for `address`: the remembered one, or a new one that is
    /// written to disk before it is kept in memory.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persistence` if a new identity cannot be saved. The
    /// in-memory map is unchanged in that case.
    pub fn recall_or_assign(&mut self, address: &str) -> Result<RoomIdentity> {
        if let Some(identity) = self.entries.get(address) {
            return Ok(identity.clone());
        }

        let id = self.next_id()?;
        let identity = RoomIdentity {
            name: id.default_name(),
            id,
        };

        let mut next = self.entries.clone();
        next.insert(address.to_string(), identity.clone());
        self.save(&next)?;
        self.entries = next;

        debug!("Assigned room {} to {}", identity.id, address);
        Ok(identity)
    }

    fn save(&self, entries: &BTreeMap<String, RoomIdentity>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(entries)?;
        let tmp = path.with_extension("json.tmp");

        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&tmp, &content)?;
            std::fs::rename(&tmp, path)
        };
        write().map_err(|e| Error::persistence(path, e))
    }
}
