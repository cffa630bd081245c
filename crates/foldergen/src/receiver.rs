// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Collects the operations of one request and commits them
//!
//! Nothing touches the disk or the path cache until every entity folder of
//! the request has been checked against the cache and against the rest of
//! the request.

use crate::error::{Error, Result};
use crate::hook::FolderIoHook;
use crate::path_cache::{PathCache, PathCacheEntry};
use diagnostics::*;
use entitystore::EntityLink;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum IoAction {
    Folder,
    EntityFolder { entity: EntityLink },
    Copy { source: PathBuf },
    Symlink { target: PathBuf },
    /// Path cache association only, no physical operation
    SecondaryEntity { entity: EntityLink },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IoItem {
    pub action: IoAction,
    pub path: PathBuf,
    pub metadata: Value,
}

impl IoItem {
    pub fn is_folder(&self) -> bool {
        matches!(self.action, IoAction::Folder | IoAction::EntityFolder { .. })
    }
}

#[derive(Debug, Default)]
pub struct FolderIoReceiver {
    items: Vec<IoItem>,
}

impl FolderIoReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[IoItem] {
        &self.items
    }

    fn push(&mut self, item: IoItem) {
        let duplicate = self
            .items
            .iter()
            .any(|i| i.path == item.path && i.action == item.action);
        if !duplicate {
            self.items.push(item);
        }
    }

    pub fn make_folder(&mut self, path: &Path, metadata: &Value) {
        self.push(IoItem {
            action: IoAction::Folder,
            path: path.to_path_buf(),
            metadata: metadata.clone(),
        });
    }

    pub fn make_entity_folder(&mut self, path: &Path, entity: &EntityLink, metadata: &Value) {
        self.push(IoItem {
            action: IoAction::EntityFolder {
                entity: entity.clone(),
            },
            path: path.to_path_buf(),
            metadata: metadata.clone(),
        });
    }

    pub fn copy_file(&mut self, source: &Path, target: &Path, metadata: &Value) {
        self.push(IoItem {
            action: IoAction::Copy {
                source: source.to_path_buf(),
            },
            path: target.to_path_buf(),
            metadata: metadata.clone(),
        });
    }

    pub fn create_symlink(&mut self, path: &Path, target: &Path, metadata: &Value) {
        self.push(IoItem {
            action: IoAction::Symlink {
                target: target.to_path_buf(),
            },
            path: path.to_path_buf(),
            metadata: metadata.clone(),
        });
    }

    pub fn register_secondary_entity(&mut self, path: &Path, entity: &EntityLink, metadata: &Value) {
        self.push(IoItem {
            action: IoAction::SecondaryEntity {
                entity: entity.clone(),
            },
            path: path.to_path_buf(),
            metadata: metadata.clone(),
        });
    }

    /// Every primary association in this request must agree with itself and with the cache
    pub fn validate(&self, cache: &dyn PathCache) -> Result<()> {
        let mut claimed: BTreeMap<&Path, &EntityLink> = BTreeMap::new();
        for item in &self.items {
            let IoAction::EntityFolder { entity } = &item.action else {
                continue;
            };
            if let Some(other) = claimed.insert(item.path.as_path(), entity)
                && !other.same_entity(entity)
            {
                return Err(conflict(format!(
                    "{} and {} both map to {}",
                    other,
                    entity,
                    item.path.display()
                )));
            }

            for existing in cache.entries_for_path(&item.path)? {
                if existing.is_primary && !existing.same_entity(entity) {
                    return Err(conflict(format!(
                        "{} is already associated with {}; cannot associate it with {}",
                        item.path.display(),
                        existing.link(),
                        entity
                    )));
                }
            }

            for existing in cache.entries_for_entity(&entity.entity_type, entity.id)? {
                let moved = existing.is_primary
                    && existing.path != item.path
                    && existing.path.parent() == item.path.parent();
                if moved {
                    return Err(conflict(format!(
                        "{} is already stored at {} but would now be created at {}; was it renamed?",
                        entity,
                        existing.path.display(),
                        item.path.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate, perform, then record; returns every folder path of the request
    pub fn execute(
        self,
        cache: &mut dyn PathCache,
        hook: &dyn FolderIoHook,
        preview: bool,
    ) -> Result<Vec<PathBuf>> {
        self.validate(cache)?;

        let mut created = 0usize;
        if !preview {
            for item in &self.items {
                let did = match &item.action {
                    IoAction::Folder | IoAction::EntityFolder { .. } => {
                        hook.make_folder(&item.path, &item.metadata)?
                    }
                    IoAction::Copy { source } => hook.copy_file(source, &item.path, &item.metadata)?,
                    IoAction::Symlink { target } => {
                        hook.create_symlink(&item.path, target, &item.metadata)?
                    }
                    IoAction::SecondaryEntity { .. } => false,
                };
                created += usize::from(did);
            }
        }
        hook.post_process(&self.items, preview)?;

        if !preview {
            let entries: Vec<PathCacheEntry> = self
                .items
                .iter()
                .filter_map(|item| match &item.action {
                    IoAction::EntityFolder { entity } => Some(cache_entry(&item.path, entity, true)),
                    IoAction::SecondaryEntity { entity } => Some(cache_entry(&item.path, entity, false)),
                    _ => None,
                })
                .collect();
            cache.add_entries(&entries)?;
        }

        let mut folders: Vec<PathBuf> = Vec::new();
        for item in self.items.iter().filter(|i| i.is_folder()) {
            if !folders.contains(&item.path) {
                folders.push(item.path.clone());
            }
        }
        let total = folders.len();
        log_info!("Folder request computed {total} folders, {created} new items", total: total, created: created);
        Ok(folders)
    }
}

fn cache_entry(path: &Path, entity: &EntityLink, is_primary: bool) -> PathCacheEntry {
    let name = entity.name.clone().unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    PathCacheEntry::new(path.to_path_buf(), entity, name, is_primary)
}

fn conflict(message: String) -> Error {
    log_error!("Folder creation aborted: {message}", message: message.clone());
    Error::PathConflict(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{RecordedOp, RecordingHook};
    use crate::path_cache::MemoryPathCache;

    fn shot(id: i64) -> EntityLink {
        EntityLink::new("Shot", id).with_name(format!("sh{:03}", id))
    }

    #[test]
    fn test_execute_records_primary_and_secondary() {
        let mut receiver = FolderIoReceiver::new();
        receiver.make_folder(Path::new("/p"), &Value::Null);
        receiver.make_entity_folder(Path::new("/p/sh042"), &shot(42), &Value::Null);
        receiver.make_entity_folder(Path::new("/p/sh042"), &shot(42), &Value::Null);
        receiver.register_secondary_entity(
            Path::new("/p/sh042"),
            &EntityLink::new("Sequence", 7),
            &Value::Null,
        );
        assert_eq!(receiver.items().len(), 3);

        let mut cache = MemoryPathCache::new();
        let hook = RecordingHook::new();
        let paths = receiver.execute(&mut cache, &hook, false).unwrap();
        assert_eq!(paths, vec![PathBuf::from("/p"), PathBuf::from("/p/sh042")]);
        assert_eq!(hook.folders().len(), 2);
        assert_eq!(cache.entries().len(), 2);
        assert!(cache.entries()[0].is_primary);
        assert_eq!(cache.entries()[0].name, "sh042");
        // unnamed links fall back to the folder name
        assert!(!cache.entries()[1].is_primary);
        assert_eq!(cache.entries()[1].entity_type, "Sequence");
        assert_eq!(cache.entries()[1].name, "sh042");
    }

    #[test]
    fn test_preview_touches_nothing() {
        let mut receiver = FolderIoReceiver::new();
        receiver.make_entity_folder(Path::new("/p/sh042"), &shot(42), &Value::Null);
        let mut cache = MemoryPathCache::new();
        let hook = RecordingHook::new();
        let paths = receiver.execute(&mut cache, &hook, true).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(cache.entries().is_empty());
        assert_eq!(
            hook.ops(),
            vec![RecordedOp::PostProcess {
                items: 1,
                preview: true
            }]
        );
    }

    #[test]
    fn test_conflicts_abort_before_any_write() {
        let mut cache = MemoryPathCache::new();
        cache
            .add_entries(&[cache_entry(Path::new("/p/sh042"), &shot(42), true)])
            .unwrap();

        // another entity on a recorded path
        let mut receiver = FolderIoReceiver::new();
        receiver.make_folder(Path::new("/p"), &Value::Null);
        receiver.make_entity_folder(Path::new("/p/sh042"), &shot(43), &Value::Null);
        let hook = RecordingHook::new();
        let err = receiver.execute(&mut cache, &hook, false).unwrap_err();
        assert!(matches!(err, Error::PathConflict(_)));
        assert!(err.to_string().starts_with("Folder creation aborted"));
        assert!(hook.ops().is_empty());
        assert_eq!(cache.entries().len(), 1);

        // the recorded entity under a new name in the same folder
        let mut receiver = FolderIoReceiver::new();
        receiver.make_entity_folder(Path::new("/p/sh042_renamed"), &shot(42), &Value::Null);
        assert!(matches!(receiver.validate(&cache), Err(Error::PathConflict(_))));

        // the same entity somewhere else entirely is fine
        let mut receiver = FolderIoReceiver::new();
        receiver.make_entity_folder(Path::new("/other/sh042"), &shot(42), &Value::Null);
        assert!(receiver.validate(&cache).is_ok());
    }

    #[test]
    fn test_conflict_within_one_request() {
        let mut receiver = FolderIoReceiver::new();
        receiver.make_entity_folder(Path::new("/p/x"), &shot(1), &Value::Null);
        receiver.make_entity_folder(Path::new("/p/x"), &shot(2), &Value::Null);
        assert!(matches!(
            receiver.validate(&MemoryPathCache::new()),
            Err(Error::PathConflict(_))
        ));
    }
}
