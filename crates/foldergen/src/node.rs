// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Compiled schema nodes
//!
//! Nodes live in an arena owned by [`SchemaTree`]. Children are owned lists of
//! ids; the parent link is a plain id used for upward walks only.

use crate::bag::DataKey;
use crate::expression::NameExpression;
use crate::template::FilterTemplate;
use crate::token::{FilterToken, SymlinkTarget};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Handle to a node in a [`SchemaTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// `defer_creation` policy of a node
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DeferCreation {
    #[default]
    Never,
    /// Created by any deferred pass
    Any,
    /// Created only by deferred passes running in one of these contexts
    Contexts(Vec<String>),
}

impl DeferCreation {
    /// Parse the comma separated string form
    pub fn from_contexts(raw: &str) -> Self {
        DeferCreation::Contexts(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn allows(&self, context: Option<&str>) -> bool {
        let context = context.map(str::trim).filter(|c| !c.is_empty());
        match self {
            DeferCreation::Never => true,
            DeferCreation::Any => context.is_some(),
            DeferCreation::Contexts(list) => context.is_some_and(|c| list.iter().any(|l| l == c)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymlinkSpec {
    pub name: String,
    pub target: SymlinkTarget,
    pub metadata: Value,
}

/// `constrain_by_entity` on a static folder
#[derive(Debug)]
pub struct StaticConstraint {
    /// The ancestor whose record must satisfy `filters`
    pub token: FilterToken,
    pub entity_type: String,
    pub filters: FilterTemplate,
    results: RefCell<HashMap<String, bool>>,
}

impl StaticConstraint {
    pub fn new(token: FilterToken, entity_type: String, filters: FilterTemplate) -> Self {
        Self {
            token,
            entity_type,
            filters,
            results: RefCell::new(HashMap::new()),
        }
    }

    pub fn cached(&self, key: &str) -> Option<bool> {
        self.results.borrow().get(key).copied()
    }

    pub fn remember(&self, key: String, matched: bool) {
        _ = self.results.borrow_mut().insert(key, matched);
    }
}

#[derive(Debug)]
pub struct StaticNode {
    pub constraint: Option<StaticConstraint>,
}

#[derive(Debug)]
pub struct ListFieldNode {
    pub entity_type: String,
    pub field: String,
    pub expression: NameExpression,
    /// Only create folders for values some record actually uses
    pub skip_unused: bool,
}

/// State shared by every entity-backed variant
#[derive(Debug)]
pub struct EntityNode {
    pub entity_type: String,
    pub expression: NameExpression,
    pub filters: FilterTemplate,
}

#[derive(Debug)]
pub enum NodeKind {
    Static(StaticNode),
    ListField(ListFieldNode),
    Entity(EntityNode),
    Project {
        entity: EntityNode,
        root_name: String,
    },
    UserWorkspace {
        entity: EntityNode,
        /// HumanUser id of the current user, looked up on first use
        user_id: Cell<Option<i64>>,
    },
    Step {
        entity: EntityNode,
        associated: Option<NodeId>,
    },
    Task {
        entity: EntityNode,
        associated: Option<NodeId>,
        step: Option<NodeId>,
    },
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Static(_) => "static",
            NodeKind::ListField(_) => "shotgun_list_field",
            NodeKind::Entity(_) => "shotgun_entity",
            NodeKind::Project { .. } => "project",
            NodeKind::UserWorkspace { .. } => "user_workspace",
            NodeKind::Step { .. } => "shotgun_step",
            NodeKind::Task { .. } => "shotgun_task",
        }
    }
}

#[derive(Debug)]
pub struct FolderNode {
    pub id: NodeId,
    /// Location of the node in the schema tree
    pub path: PathBuf,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    /// Raw metadata from the node's schema file, passed on to the IO hook
    pub metadata: Value,
    pub files: Vec<PathBuf>,
    pub symlinks: Vec<SymlinkSpec>,
    pub create_with_parent: bool,
    pub defer: DeferCreation,
}

impl FolderNode {
    /// Basename of the schema path; what `$name` tokens refer to
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn entity_node(&self) -> Option<&EntityNode> {
        match &self.kind {
            NodeKind::Entity(entity)
            | NodeKind::Project { entity, .. }
            | NodeKind::UserWorkspace { entity, .. }
            | NodeKind::Step { entity, .. }
            | NodeKind::Task { entity, .. } => Some(entity),
            NodeKind::Static(_) | NodeKind::ListField(_) => None,
        }
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.entity_node().map(|e| e.entity_type.as_str())
    }

    /// Where this node's value lives in a data bag; static folders have none
    pub fn data_key(&self) -> Option<DataKey> {
        match &self.kind {
            NodeKind::Static(_) => None,
            NodeKind::ListField(list) => Some(DataKey::list_field(&list.entity_type, &list.field)),
            _ => self.entity_type().map(DataKey::entity),
        }
    }

    /// Static folders always expand to exactly their own name
    pub fn is_dynamic(&self) -> bool {
        !matches!(self.kind, NodeKind::Static(_))
    }
}

#[derive(Debug, Default)]
pub struct SchemaTree {
    nodes: Vec<FolderNode>,
    roots: Vec<NodeId>,
    schema_root: PathBuf,
}

impl SchemaTree {
    pub(crate) fn new(schema_root: &Path) -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            schema_root: schema_root.to_path_buf(),
        }
    }

    /// Add a node and wire it under its parent
    pub(crate) fn push(
        &mut self,
        path: PathBuf,
        parent: Option<NodeId>,
        kind: NodeKind,
        metadata: Value,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let create_with_parent = matches!(kind, NodeKind::Static(_));
        self.nodes.push(FolderNode {
            id,
            path,
            parent,
            children: Vec::new(),
            kind,
            metadata,
            files: Vec::new(),
            symlinks: Vec::new(),
            create_with_parent,
            defer: DeferCreation::Never,
        });
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut FolderNode {
        &mut self.nodes[id.0]
    }

    pub fn node(&self, id: NodeId) -> &FolderNode {
        &self.nodes[id.0]
    }

    pub fn schema_root(&self) -> &Path {
        &self.schema_root
    }

    /// Top-level project nodes
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FolderNode> {
        self.nodes.iter()
    }

    /// `start` followed by each ancestor up to its root
    pub fn ancestors(&self, start: NodeId) -> impl Iterator<Item = &FolderNode> {
        std::iter::successors(Some(self.node(start)), |n| n.parent.map(|p| self.node(p)))
    }

    /// Nearest node at or above `start` whose schema folder is called `name`
    pub fn find_ancestor_named(&self, start: NodeId, name: &str) -> Option<NodeId> {
        self.ancestors(start).find(|n| n.name() == name).map(|n| n.id)
    }

    /// Ids from the root down to and including `node`
    pub fn chain_to(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain: Vec<NodeId> = self.ancestors(node).map(|n| n.id).collect();
        chain.reverse();
        chain
    }

    pub fn nodes_for_entity_type(&self, entity_type: &str) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.entity_type() == Some(entity_type))
            .map(|n| n.id)
            .collect()
    }

    pub fn task_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Task { .. }))
            .map(|n| n.id)
            .collect()
    }

    /// Indented listing of the tree, stable across compilations of the same schema
    pub fn render(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            self.render_node(*root, 0, &mut out);
        }
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let detail = match &node.kind {
            NodeKind::Static(s) if s.constraint.is_some() => " constrained".to_string(),
            NodeKind::Static(_) => String::new(),
            NodeKind::ListField(l) => format!(" {}.{} {}", l.entity_type, l.field, l.expression),
            NodeKind::Project { entity, root_name } => {
                format!(" {} {} root={}", entity.entity_type, entity.expression, root_name)
            }
            _ => node
                .entity_node()
                .map(|e| format!(" {} {}", e.entity_type, e.expression))
                .unwrap_or_default(),
        };
        _ = writeln!(
            out,
            "{:indent$}{} [{}{}]",
            "",
            node.name(),
            node.kind.type_name(),
            detail,
            indent = depth * 2
        );
        for file in &node.files {
            let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            _ = writeln!(out, "{:indent$}{} (file)", "", name, indent = depth * 2 + 2);
        }
        for link in &node.symlinks {
            _ = writeln!(
                out,
                "{:indent$}{} -> {} (symlink)",
                "",
                link.name,
                link.target.raw(),
                indent = depth * 2 + 2
            );
        }
        for child in &node.children {
            self.render_node(*child, depth + 1, out);
        }
    }
}
