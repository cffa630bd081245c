// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::common::RunContext;
use anyhow::Result;

/// Print the compiled folder schema
pub fn schema_command<F>(ctx: &RunContext, mut handler: F) -> Result<()>
where
    F: FnMut(&str),
{
    let pipeline = ctx.pipeline()?;
    let tree = pipeline.tree();
    handler(&format!("Schema {} ({} folders)\n", tree.schema_root().display(), tree.len()));
    handler(&tree.render());
    Ok(())
}
