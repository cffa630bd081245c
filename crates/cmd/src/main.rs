// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use cmd::commands;
use cmd::common::RunContext;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "foldergen")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Pipeline configuration file (defaults to $FOLDERGEN_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Template variable for the configuration file, as key=value
    #[arg(short = 'v', long = "var", global = true)]
    vars: Vec<String>,
    /// Log at debug level regardless of FOLDERGEN_LOG
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the folders of one or more entities
    Create {
        /// Entity type, e.g. Shot, Asset or Task
        entity_type: String,
        /// Entity ids
        #[arg(required = true)]
        ids: Vec<i64>,
        /// Compute folders without writing anything
        #[arg(long)]
        preview: bool,
        /// Deferred-creation context, e.g. the name of the application
        #[arg(long)]
        defer: Option<String>,
    },
    /// Print the compiled folder schema
    Schema,
    /// Show the folders recorded for an entity
    Paths {
        entity_type: String,
        id: i64,
    },
    /// List the folder types a schema may use
    Types,
}

#[allow(clippy::print_stdout)]
fn print(text: &str) {
    print!("{}", text);
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        diagnostics::init_with_level("debug");
    } else {
        diagnostics::init_diagnostics();
    }

    if let Commands::Types = cli.command {
        return commands::list_types_command(print);
    }

    let ctx = RunContext::load(cli.config, &cli.vars)?;
    match &cli.command {
        Commands::Create {
            entity_type,
            ids,
            preview,
            defer,
        } => commands::create_command(&ctx, entity_type, ids, *preview, defer.as_deref(), print),
        Commands::Schema => commands::schema_command(&ctx, print),
        Commands::Paths { entity_type, id } => commands::paths_command(&ctx, entity_type, *id, print),
        Commands::Types => commands::list_types_command(print),
    }
}
