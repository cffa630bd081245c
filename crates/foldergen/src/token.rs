// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! `$name` references in schema filters and symlink targets
//!
//! A token is bound to a schema node when the schema is compiled and is
//! resolved against a [`DataBag`] each time a query is built.

use crate::bag::{DataBag, DataKey};
use crate::error::{Error, Result};
use crate::node::{NodeId, SchemaTree};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Marker that turns a filter value or symlink segment into a token
pub const TOKEN_PREFIX: char = '$';

#[derive(Debug, Clone, PartialEq)]
pub enum FilterToken {
    /// Value stored for an ancestor node
    EntityRef {
        name: String,
        node: NodeId,
        data_key: DataKey,
        /// Entity type the ancestor holds; `None` for list-field ancestors
        entity_type: Option<String>,
    },
    /// Id of the step of the task that triggered the request
    CurrentStep,
    /// Id of the task that triggered the request
    CurrentTask,
}

impl FilterToken {
    /// Bind `$name` to the nearest node at or above `start` whose schema folder is named `name`
    pub fn entity_ref(
        tree: &SchemaTree,
        start: Option<NodeId>,
        name: &str,
        config_path: &Path,
    ) -> Result<Self> {
        let name = name.trim_start_matches(TOKEN_PREFIX);
        let found = start.and_then(|s| tree.find_ancestor_named(s, name));
        let node = found.ok_or_else(|| {
            Error::config(
                config_path,
                format!("token '${}' does not refer to any parent folder", name),
            )
        })?;
        Self::for_node(tree, node, config_path)
    }

    /// Bind directly to a known node
    pub fn for_node(tree: &SchemaTree, node: NodeId, config_path: &Path) -> Result<Self> {
        let target = tree.node(node);
        let data_key = target.data_key().ok_or_else(|| {
            Error::config(
                config_path,
                format!(
                    "'{}' is a static folder and cannot be referenced as a token",
                    target.name()
                ),
            )
        })?;
        Ok(FilterToken::EntityRef {
            name: target.name(),
            node,
            data_key,
            entity_type: target.entity_node().map(|e| e.entity_type.clone()),
        })
    }

    /// Resolve against a bag
    ///
    /// `Ok(None)` only for the task tokens on requests that are not task scoped.
    /// A missing ancestor key is a schema or programming error.
    pub fn resolve(&self, bag: &DataBag) -> Result<Option<Value>> {
        match self {
            FilterToken::EntityRef { name, data_key, .. } => bag
                .get(data_key)
                .map(|v| Some(v.filter_value()))
                .ok_or_else(|| Error::missing_data(data_key, format!("token ${}", name))),
            FilterToken::CurrentStep => Ok(bag
                .current_task()
                .and_then(|t| t.step.as_ref())
                .map(|s| Value::from(s.id))),
            FilterToken::CurrentTask => Ok(bag.current_task().map(|t| Value::from(t.task.id))),
        }
    }

    /// Node referenced by an `EntityRef`
    pub fn node(&self) -> Option<NodeId> {
        match self {
            FilterToken::EntityRef { node, .. } => Some(*node),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Token { name: String, data_key: DataKey },
}

/// A `/`-delimited symlink target such as `../../$sequence/$shot`
#[derive(Debug, Clone, PartialEq)]
pub struct SymlinkTarget {
    raw: String,
    absolute: bool,
    segments: Vec<Segment>,
}

impl SymlinkTarget {
    /// Parse `raw`, binding tokens to `owner` or its ancestors
    pub fn parse(tree: &SchemaTree, owner: NodeId, raw: &str, config_path: &Path) -> Result<Self> {
        let mut segments = Vec::new();
        for part in raw.split('/').filter(|p| !p.is_empty()) {
            if let Some(name) = part.strip_prefix(TOKEN_PREFIX) {
                let FilterToken::EntityRef { data_key, .. } =
                    FilterToken::entity_ref(tree, Some(owner), name, config_path)?
                else {
                    return Err(Error::config(
                        config_path,
                        format!("'${}' cannot be used in a symlink target", name),
                    ));
                };
                segments.push(Segment::Token {
                    name: name.to_string(),
                    data_key,
                });
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        if segments.is_empty() {
            return Err(Error::config(config_path, "symlink target is empty"));
        }
        Ok(Self {
            raw: raw.to_string(),
            absolute: raw.starts_with('/'),
            segments,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Substitute each token with the folder name computed for it
    pub fn resolve(&self, bag: &DataBag) -> Result<PathBuf> {
        let mut target = if self.absolute {
            PathBuf::from("/")
        } else {
            PathBuf::new()
        };
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => target.push(s),
                Segment::Token { name, data_key } => {
                    let value = bag
                        .get(data_key)
                        .and_then(|v| v.computed_name())
                        .ok_or_else(|| {
                            Error::missing_data(data_key, format!("symlink target token ${}", name))
                        })?;
                    target.push(value);
                }
            }
        }
        Ok(target)
    }
}
