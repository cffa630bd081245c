// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Foldergen - schema-driven folder structures for production entities
//!
//! A folder schema is a directory tree whose folders carry YAML metadata
//! describing what each folder stands for: a static folder, a project, one
//! folder per entity matching a filter, one folder per value of a list field,
//! a user workspace, a pipeline step or a task. [`compile`] turns that tree into
//! a [`SchemaTree`]; a [`FolderCreator`] then materializes the folders for a
//! set of requested entities, recording every entity folder in a [`PathCache`].
//!
//! Set FOLDERGEN_LOG to control logging (see the `diagnostics` crate).

pub mod bag;
pub mod compile;
pub mod config;
pub mod error;
pub mod expression;
pub mod extract;
pub mod format;
pub mod hook;
pub mod materialize;
pub mod node;
pub mod path_cache;
pub mod process;
pub mod receiver;
pub mod registry;
pub mod template;
pub mod token;

pub use bag::{BagValue, DataBag, DataKey, TaskData};
pub use compile::{IGNORE_FILE, compile};
pub use config::{CONFIG_ENV, PipelineConfig, parse_vars};
pub use error::{Error, Result, TraversalOutcome, TraversalResult};
pub use expression::{NameExpression, validate_folder_name};
pub use format::{DefaultValueFormatter, ValueFormatter};
pub use hook::{FolderIoHook, LocalFilesystemHook, RecordedOp, RecordingHook};
pub use node::{DeferCreation, FolderNode, NodeId, NodeKind, SchemaTree};
pub use path_cache::{JsonPathCache, MemoryPathCache, PathCache, PathCacheEntry};
pub use process::{FolderCreator, Pipeline};
pub use receiver::{FolderIoReceiver, IoAction, IoItem};
pub use registry::{FolderType, FolderTypeRegistry};
