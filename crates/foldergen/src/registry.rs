// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Folder type registry
//!
//! Maps the `type` key of a schema metadata file to the constructor for the
//! matching [`NodeKind`]. Each constructor validates its own keys and resolves
//! `$token` filter values against the nodes built so far.

use crate::error::{Error, Result};
use crate::expression::NameExpression;
use crate::node::{EntityNode, ListFieldNode, NodeId, NodeKind, SchemaTree, StaticConstraint, StaticNode};
use crate::template::{FilterTemplate, TemplateCondition};
use crate::token::FilterToken;
use entitystore::FROM_PREFIX;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::Cell;
use std::path::Path;

/// What a constructor gets to see while the tree is being built
pub struct NodeContext<'a> {
    pub tree: &'a SchemaTree,
    /// The already-built node this one will hang under
    pub parent: Option<NodeId>,
    pub config_path: &'a Path,
    pub config: &'a Value,
}

impl NodeContext<'_> {
    fn typed<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.config.clone())
            .map_err(|e| Error::config(self.config_path, e.to_string()))
    }

    fn filters(&self, raw: &Value) -> Result<FilterTemplate> {
        FilterTemplate::parse(raw, self.tree, self.parent, self.config_path)
    }

    fn expression(&self, raw: &str) -> Result<NameExpression> {
        NameExpression::parse(&field_or_expression(raw))
            .map_err(|e| Error::config(self.config_path, e.to_string()))
    }
}

pub struct FolderType {
    /// Value of the `type` key
    pub name: &'static str,
    pub description: &'static str,
    /// Whether non-primary passes create this folder unless configured otherwise
    pub create_with_parent: bool,
    pub build: fn(&NodeContext<'_>) -> Result<NodeKind>,
}

pub static FOLDER_TYPES: &[FolderType] = &[
    FolderType {
        name: "static",
        description: "Fixed folder, optionally constrained by an ancestor entity",
        create_with_parent: true,
        build: build_static,
    },
    FolderType {
        name: "project",
        description: "Top-level project folder placed under a storage root",
        create_with_parent: true,
        build: build_project,
    },
    FolderType {
        name: "shotgun_entity",
        description: "One folder per entity record matching the filters",
        create_with_parent: false,
        build: build_entity,
    },
    FolderType {
        name: "shotgun_list_field",
        description: "One folder per valid value of a list field",
        create_with_parent: false,
        build: build_list_field,
    },
    FolderType {
        name: "user_workspace",
        description: "Folder for the current user",
        create_with_parent: true,
        build: build_user_workspace,
    },
    FolderType {
        name: "shotgun_step",
        description: "One folder per pipeline step used by the associated entity",
        create_with_parent: true,
        build: build_step,
    },
    FolderType {
        name: "shotgun_task",
        description: "One folder per task of the associated entity",
        create_with_parent: false,
        build: build_task,
    },
];

pub struct FolderTypeRegistry;

impl FolderTypeRegistry {
    #[must_use]
    pub fn get(name: &str) -> Option<&'static FolderType> {
        FOLDER_TYPES.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn list() -> &'static [FolderType] {
        FOLDER_TYPES
    }
}

/// Bare field names such as `short_name` stand for `{short_name}`
fn field_or_expression(raw: &str) -> String {
    if raw.contains('{') {
        raw.to_string()
    } else {
        format!("{{{}}}", raw.trim())
    }
}

#[derive(Deserialize)]
struct StaticConfig {
    constrain_by_entity: Option<String>,
    constraints: Option<Value>,
}

fn build_static(ctx: &NodeContext<'_>) -> Result<NodeKind> {
    let config: StaticConfig = ctx.typed()?;
    let constraint = match config.constrain_by_entity {
        None => None,
        Some(name) => {
            let Some(constraints) = &config.constraints else {
                return Err(Error::config(
                    ctx.config_path,
                    format!("constrain_by_entity '{}' requires a 'constraints' list", name),
                ));
            };
            let token = FilterToken::entity_ref(ctx.tree, ctx.parent, &name, ctx.config_path)?;
            let entity_type = match &token {
                FilterToken::EntityRef {
                    entity_type: Some(t),
                    ..
                } => t.clone(),
                _ => {
                    return Err(Error::config(
                        ctx.config_path,
                        format!("constrain_by_entity '{}' must refer to an entity folder", name),
                    ));
                }
            };
            let filters = ctx.filters(constraints)?;
            Some(StaticConstraint::new(token, entity_type, filters))
        }
    };
    Ok(NodeKind::Static(StaticNode { constraint }))
}

#[derive(Deserialize)]
struct EntityConfig {
    entity_type: String,
    name: String,
    filters: Value,
}

fn entity_node(ctx: &NodeContext<'_>, config: EntityConfig) -> Result<EntityNode> {
    Ok(EntityNode {
        expression: ctx.expression(&config.name)?,
        filters: ctx.filters(&config.filters)?,
        entity_type: config.entity_type,
    })
}

fn build_entity(ctx: &NodeContext<'_>) -> Result<NodeKind> {
    let config: EntityConfig = ctx.typed()?;
    Ok(NodeKind::Entity(entity_node(ctx, config)?))
}

#[derive(Deserialize)]
struct ProjectConfig {
    #[serde(default = "default_project_name")]
    name: String,
    #[serde(default = "default_root_name")]
    root_name: String,
    #[serde(default)]
    filters: Value,
}

fn default_project_name() -> String {
    "tank_name".to_string()
}

fn default_root_name() -> String {
    "primary".to_string()
}

fn build_project(ctx: &NodeContext<'_>) -> Result<NodeKind> {
    if ctx.parent.is_some() {
        return Err(Error::config(
            ctx.config_path,
            "project folders are only allowed at the top of the schema",
        ));
    }
    let config: ProjectConfig = ctx.typed()?;
    let entity = entity_node(
        ctx,
        EntityConfig {
            entity_type: "Project".to_string(),
            name: config.name,
            filters: config.filters,
        },
    )?;
    Ok(NodeKind::Project {
        entity,
        root_name: config.root_name,
    })
}

#[derive(Deserialize)]
struct ListFieldConfig {
    entity_type: String,
    field_name: String,
    name: Option<String>,
    #[serde(default)]
    skip_unused: bool,
}

fn build_list_field(ctx: &NodeContext<'_>) -> Result<NodeKind> {
    let config: ListFieldConfig = ctx.typed()?;
    let raw = config.name.unwrap_or_else(|| config.field_name.clone());
    let expression = ctx.expression(&raw)?;
    if let Some(other) = expression.fields().iter().find(|f| **f != config.field_name) {
        return Err(Error::config(
            ctx.config_path,
            format!(
                "list field folder name may only use '{}', found '{}'",
                config.field_name, other
            ),
        ));
    }
    Ok(NodeKind::ListField(ListFieldNode {
        entity_type: config.entity_type,
        field: config.field_name,
        expression,
        skip_unused: config.skip_unused,
    }))
}

#[derive(Deserialize)]
struct UserWorkspaceConfig {
    #[serde(default = "default_user_name")]
    name: String,
    #[serde(default)]
    filters: Value,
}

fn default_user_name() -> String {
    "login".to_string()
}

fn build_user_workspace(ctx: &NodeContext<'_>) -> Result<NodeKind> {
    let config: UserWorkspaceConfig = ctx.typed()?;
    let entity = entity_node(
        ctx,
        EntityConfig {
            entity_type: "HumanUser".to_string(),
            name: config.name,
            filters: config.filters,
        },
    )?;
    Ok(NodeKind::UserWorkspace {
        entity,
        user_id: Cell::new(None),
    })
}

#[derive(Deserialize)]
struct TaskFamilyConfig {
    name: Option<String>,
    associated_entity_type: Option<String>,
    #[serde(default)]
    filters: Value,
}

/// Nearest entity folder above `parent` that steps and tasks belong to
fn associated_entity(ctx: &NodeContext<'_>, wanted: Option<&str>) -> Result<Option<NodeId>> {
    let Some(parent) = ctx.parent else {
        return Ok(None);
    };
    let found = ctx
        .tree
        .ancestors(parent)
        .filter(|n| {
            !matches!(
                n.kind,
                NodeKind::UserWorkspace { .. } | NodeKind::Step { .. } | NodeKind::Task { .. }
            )
        })
        .find(|n| match wanted {
            Some(t) => n.entity_type() == Some(t),
            None => n.entity_node().is_some(),
        })
        .map(|n| n.id);
    match (found, wanted) {
        (None, Some(t)) => Err(Error::config(
            ctx.config_path,
            format!("no parent folder holds associated_entity_type '{}'", t),
        )),
        (found, _) => Ok(found),
    }
}

fn build_step(ctx: &NodeContext<'_>) -> Result<NodeKind> {
    let config: TaskFamilyConfig = ctx.typed()?;
    let associated = associated_entity(ctx, config.associated_entity_type.as_deref())?;
    let mut entity = entity_node(
        ctx,
        EntityConfig {
            entity_type: "Step".to_string(),
            name: config.name.unwrap_or_else(|| "short_name".to_string()),
            filters: config.filters,
        },
    )?;
    if let Some(node) = associated {
        let token = FilterToken::for_node(ctx.tree, node, ctx.config_path)?;
        // only steps that have a task on the associated entity
        entity.filters.push(TemplateCondition::is_token(
            format!("{}Task.step.entity", FROM_PREFIX),
            token,
        ));
    }
    entity
        .filters
        .push(TemplateCondition::is_token("id", FilterToken::CurrentStep));
    Ok(NodeKind::Step { entity, associated })
}

fn build_task(ctx: &NodeContext<'_>) -> Result<NodeKind> {
    let config: TaskFamilyConfig = ctx.typed()?;
    let associated = associated_entity(ctx, config.associated_entity_type.as_deref())?;
    let step = ctx.parent.and_then(|p| {
        ctx.tree
            .ancestors(p)
            .find(|n| matches!(n.kind, NodeKind::Step { .. }))
            .map(|n| n.id)
    });
    let mut entity = entity_node(
        ctx,
        EntityConfig {
            entity_type: "Task".to_string(),
            name: config.name.unwrap_or_else(|| "content".to_string()),
            filters: config.filters,
        },
    )?;
    if let Some(node) = associated {
        let token = FilterToken::for_node(ctx.tree, node, ctx.config_path)?;
        entity.filters.push(TemplateCondition::is_token("entity", token));
    }
    if let Some(node) = step {
        let token = FilterToken::for_node(ctx.tree, node, ctx.config_path)?;
        entity.filters.push(TemplateCondition::is_token("step", token));
    }
    entity
        .filters
        .push(TemplateCondition::is_token("id", FilterToken::CurrentTask));
    Ok(NodeKind::Task {
        entity,
        associated,
        step,
    })
}
