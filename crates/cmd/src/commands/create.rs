// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::common::RunContext;
use anyhow::{Context, Result};
use diagnostics::*;
use foldergen::{FolderCreator, FolderIoHook, LocalFilesystemHook, RecordingHook};

/// Create (or preview) the folders of `ids` of `entity_type`
///
/// Prints one computed folder per line.
pub fn create_command<F>(
    ctx: &RunContext,
    entity_type: &str,
    ids: &[i64],
    preview: bool,
    defer: Option<&str>,
    mut handler: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let pipeline = ctx.pipeline()?;
    let store = ctx.open_store()?;
    let mut cache = ctx.open_cache()?;

    let local = LocalFilesystemHook;
    let recording = RecordingHook::new();
    let hook: &dyn FolderIoHook = if preview { &recording } else { &local };

    let paths = FolderCreator::new(&pipeline, &store, &mut *cache, hook)
        .process_filesystem_structure(entity_type, ids, preview, defer)
        .with_context(|| format!("Failed to create folders for {} {:?}", entity_type, ids))?;

    let count = paths.len();
    log_info!("{count} folders computed", count: count);
    for path in paths {
        handler(&format!("{}\n", path.display()));
    }
    Ok(())
}
