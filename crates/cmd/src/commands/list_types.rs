// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use diagnostics::*;
use foldergen::FolderTypeRegistry;

/// List the folder types a schema may use
pub fn list_types_command<F>(mut handler: F) -> Result<()>
where
    F: FnMut(&str),
{
    log_debug!("Listing folder types");

    handler("Available folder types:\n\n");
    for folder_type in FolderTypeRegistry::list() {
        handler(&format!("  {} - {}\n", folder_type.name, folder_type.description));
        if folder_type.create_with_parent {
            handler("    Created with its parent by default\n");
        }
        handler("\n");
    }
    Ok(())
}
