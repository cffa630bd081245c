// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Persistent entity to path associations

use crate::error::Result;
use chrono::{DateTime, Utc};
use diagnostics::*;
use entitystore::EntityLink;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathCacheEntry {
    pub path: PathBuf,
    pub entity_type: String,
    pub entity_id: i64,
    pub name: String,
    pub is_primary: bool,
}

impl PathCacheEntry {
    pub fn new(path: PathBuf, entity: &EntityLink, name: String, is_primary: bool) -> Self {
        Self {
            path,
            entity_type: entity.entity_type.clone(),
            entity_id: entity.id,
            name,
            is_primary,
        }
    }

    pub fn link(&self) -> EntityLink {
        EntityLink::new(self.entity_type.clone(), self.entity_id).with_name(self.name.clone())
    }

    pub fn same_entity(&self, entity: &EntityLink) -> bool {
        self.entity_type == entity.entity_type && self.entity_id == entity.id
    }
}

pub trait PathCache {
    fn entries_for_path(&self, path: &Path) -> Result<Vec<PathCacheEntry>>;

    fn entries_for_entity(&self, entity_type: &str, entity_id: i64) -> Result<Vec<PathCacheEntry>>;

    /// Append new associations; entries already present are ignored
    fn add_entries(&mut self, entries: &[PathCacheEntry]) -> Result<()>;

    /// Paths recorded for an entity, primary ones first
    fn paths_for_entity(&self, entity_type: &str, entity_id: i64) -> Result<Vec<PathBuf>> {
        let mut entries = self.entries_for_entity(entity_type, entity_id)?;
        entries.sort_by_key(|e| !e.is_primary);
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            if !paths.contains(&entry.path) {
                paths.push(entry.path);
            }
        }
        Ok(paths)
    }

    /// The primary entity registered for a path
    fn entity_for_path(&self, path: &Path) -> Result<Option<EntityLink>> {
        Ok(self
            .entries_for_path(path)?
            .into_iter()
            .find(|e| e.is_primary)
            .map(|e| e.link()))
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryPathCache {
    entries: Vec<PathCacheEntry>,
}

impl MemoryPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[PathCacheEntry] {
        &self.entries
    }

    fn merge(&mut self, entries: &[PathCacheEntry]) -> usize {
        let mut added = 0;
        for entry in entries {
            if !self.entries.contains(entry) {
                self.entries.push(entry.clone());
                added += 1;
            }
        }
        added
    }
}

impl PathCache for MemoryPathCache {
    fn entries_for_path(&self, path: &Path) -> Result<Vec<PathCacheEntry>> {
        Ok(self.entries.iter().filter(|e| e.path == path).cloned().collect())
    }

    fn entries_for_entity(&self, entity_type: &str, entity_id: i64) -> Result<Vec<PathCacheEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    fn add_entries(&mut self, entries: &[PathCacheEntry]) -> Result<()> {
        _ = self.merge(entries);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    updated_at: Option<DateTime<Utc>>,
    entries: Vec<PathCacheEntry>,
}

/// Path cache stored as a JSON document, rewritten on every commit
#[derive(Debug)]
pub struct JsonPathCache {
    path: PathBuf,
    memory: RefCell<MemoryPathCache>,
    updated_at: Option<DateTime<Utc>>,
}

impl JsonPathCache {
    /// Load `path`, or start empty when it does not exist yet
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file: CacheFile = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            CacheFile::default()
        };
        let count = file.entries.len();
        let shown = path.display().to_string();
        log_debug!("Opened path cache {path} with {count} entries", path: shown, count: count);
        Ok(Self {
            path,
            memory: RefCell::new(MemoryPathCache {
                entries: file.entries,
            }),
            updated_at: file.updated_at,
        })
    }

    pub fn location(&self) -> &Path {
        &self.path
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn save(&self) -> Result<()> {
        let file = CacheFile {
            updated_at: self.updated_at,
            entries: self.memory.borrow().entries.clone(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PathCache for JsonPathCache {
    fn entries_for_path(&self, path: &Path) -> Result<Vec<PathCacheEntry>> {
        self.memory.borrow().entries_for_path(path)
    }

    fn entries_for_entity(&self, entity_type: &str, entity_id: i64) -> Result<Vec<PathCacheEntry>> {
        self.memory.borrow().entries_for_entity(entity_type, entity_id)
    }

    fn add_entries(&mut self, entries: &[PathCacheEntry]) -> Result<()> {
        let added = self.memory.borrow_mut().merge(entries);
        if added == 0 {
            return Ok(());
        }
        self.updated_at = Some(Utc::now());
        self.save()?;
        log_info!("Recorded {added} new path cache entries", added: added);
        Ok(())
    }
}
