// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Physical side effects of folder creation

use crate::error::Result;
use crate::receiver::IoItem;
use diagnostics::*;
use serde_json::Value;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// Pluggable executor for folder, file and symlink operations
///
/// Each method returns whether something was created. Existing entries are
/// left alone.
pub trait FolderIoHook {
    fn make_folder(&self, path: &Path, metadata: &Value) -> Result<bool>;

    fn copy_file(&self, source: &Path, target: &Path, metadata: &Value) -> Result<bool>;

    fn create_symlink(&self, path: &Path, target: &Path, metadata: &Value) -> Result<bool>;

    /// Called once per request with every computed item
    fn post_process(&self, _items: &[IoItem], _preview: bool) -> Result<()> {
        Ok(())
    }
}

/// Writes to the local filesystem with `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFilesystemHook;

impl FolderIoHook for LocalFilesystemHook {
    fn make_folder(&self, path: &Path, _metadata: &Value) -> Result<bool> {
        if path.is_dir() {
            return Ok(false);
        }
        std::fs::create_dir_all(path)?;
        let shown = path.display().to_string();
        log_debug!("Created folder {path}", path: shown);
        Ok(true)
    }

    fn copy_file(&self, source: &Path, target: &Path, _metadata: &Value) -> Result<bool> {
        if target.exists() {
            return Ok(false);
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        _ = std::fs::copy(source, target)?;
        Ok(true)
    }

    #[cfg(unix)]
    fn create_symlink(&self, path: &Path, target: &Path, _metadata: &Value) -> Result<bool> {
        if path.symlink_metadata().is_ok() {
            return Ok(false);
        }
        std::os::unix::fs::symlink(target, path)?;
        Ok(true)
    }

    #[cfg(not(unix))]
    fn create_symlink(&self, path: &Path, _target: &Path, _metadata: &Value) -> Result<bool> {
        let shown = path.display().to_string();
        log_warn!("Symlinks are not supported on this platform, skipping {path}", path: shown);
        Ok(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    Folder(PathBuf),
    Copy { source: PathBuf, target: PathBuf },
    Symlink { path: PathBuf, target: PathBuf },
    PostProcess { items: usize, preview: bool },
}

/// Keeps a log of requested operations instead of touching the disk
#[derive(Debug, Default)]
pub struct RecordingHook {
    ops: RefCell<Vec<RecordedOp>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<RecordedOp> {
        self.ops.borrow().clone()
    }

    pub fn folders(&self) -> Vec<PathBuf> {
        self.ops
            .borrow()
            .iter()
            .filter_map(|op| match op {
                RecordedOp::Folder(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: RecordedOp) {
        self.ops.borrow_mut().push(op);
    }
}

impl FolderIoHook for RecordingHook {
    fn make_folder(&self, path: &Path, _metadata: &Value) -> Result<bool> {
        self.record(RecordedOp::Folder(path.to_path_buf()));
        Ok(true)
    }

    fn copy_file(&self, source: &Path, target: &Path, _metadata: &Value) -> Result<bool> {
        self.record(RecordedOp::Copy {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        });
        Ok(true)
    }

    fn create_symlink(&self, path: &Path, target: &Path, _metadata: &Value) -> Result<bool> {
        self.record(RecordedOp::Symlink {
            path: path.to_path_buf(),
            target: target.to_path_buf(),
        });
        Ok(true)
    }

    fn post_process(&self, items: &[IoItem], preview: bool) -> Result<()> {
        self.record(RecordedOp::PostProcess {
            items: items.len(),
            preview,
        });
        Ok(())
    }
}
