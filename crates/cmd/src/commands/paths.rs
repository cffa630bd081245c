// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::common::RunContext;
use anyhow::Result;
use foldergen::PathCache;

/// Print the folders recorded for one entity, primary first
pub fn paths_command<F>(ctx: &RunContext, entity_type: &str, id: i64, mut handler: F) -> Result<()>
where
    F: FnMut(&str),
{
    let cache = ctx.open_cache()?;
    let paths = cache.paths_for_entity(entity_type, id)?;
    if paths.is_empty() {
        handler(&format!("No folders recorded for {} {}\n", entity_type, id));
    }
    for path in paths {
        handler(&format!("{}\n", path.display()));
    }
    Ok(())
}
