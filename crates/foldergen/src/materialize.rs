// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Downward materialization
//!
//! Each node expands into zero or more `(path, bag)` pairs. Along the
//! explicit chain only the next chain node and its static siblings are
//! descended into; below the end of the chain every child is.

use crate::bag::{BagValue, DataBag, DataKey, EntityData, FieldData};
use crate::error::{Error, Result};
use crate::extract::display_name;
use crate::format::ValueFormatter;
use crate::node::{EntityNode, FolderNode, ListFieldNode, NodeId, NodeKind, SchemaTree, StaticConstraint};
use crate::receiver::FolderIoReceiver;
use diagnostics::*;
use entitystore::{Aggregate, Condition, EntityLink, EntityStore, Filter, Record, record_id};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub struct Materializer<'a> {
    tree: &'a SchemaTree,
    store: &'a dyn EntityStore,
    formatter: &'a dyn ValueFormatter,
    roots: &'a BTreeMap<String, PathBuf>,
    current_user: Option<&'a str>,
    receiver: &'a mut FolderIoReceiver,
}

impl<'a> Materializer<'a> {
    pub fn new(
        tree: &'a SchemaTree,
        store: &'a dyn EntityStore,
        formatter: &'a dyn ValueFormatter,
        roots: &'a BTreeMap<String, PathBuf>,
        current_user: Option<&'a str>,
        receiver: &'a mut FolderIoReceiver,
    ) -> Self {
        Self {
            tree,
            store,
            formatter,
            roots,
            current_user,
            receiver,
        }
    }

    /// Expand `node` under `parent_path` and recurse into its children
    ///
    /// `explicit` lists the nodes still to visit on the primary chain, nearest first.
    pub fn create_folders(
        &mut self,
        node: NodeId,
        parent_path: Option<&Path>,
        bag: &DataBag,
        is_primary: bool,
        explicit: &[NodeId],
        defer: Option<&str>,
    ) -> Result<()> {
        let tree = self.tree;
        let folder = tree.node(node);
        let name = folder.name();

        if !folder.defer.allows(defer) {
            log_debug!("Deferring creation of {name}", name: name);
            return Ok(());
        }
        if !is_primary && !folder.create_with_parent {
            log_debug!("Not creating {name} with its parent", name: name);
            return Ok(());
        }

        let expanded = match &folder.kind {
            NodeKind::Static(s) => self.expand_static(folder, s.constraint.as_ref(), parent_path, bag)?,
            NodeKind::ListField(list) => self.expand_list_field(folder, list, parent_path, bag)?,
            NodeKind::Project { entity, root_name } => {
                let roots = self.roots;
                let base = roots
                    .get(root_name)
                    .ok_or_else(|| Error::UnknownRoot(root_name.clone()))?;
                self.expand_entity(folder, entity, base, None, bag)?
            }
            NodeKind::UserWorkspace { entity, user_id } => {
                let id = self.current_user_id(user_id)?;
                let base = parent_dir(folder, parent_path)?;
                self.expand_entity(folder, entity, base, Some(Condition::is("id", json!(id))), bag)?
            }
            NodeKind::Entity(entity) | NodeKind::Step { entity, .. } | NodeKind::Task { entity, .. } => {
                let base = parent_dir(folder, parent_path)?;
                self.expand_entity(folder, entity, base, None, bag)?
            }
        };

        for (path, child_bag) in &expanded {
            self.attach_files(folder, path, child_bag);

            match explicit.split_first() {
                Some((next, rest)) => {
                    for child in &folder.children {
                        if child != next && !tree.node(*child).is_dynamic() {
                            self.create_folders(*child, Some(path), child_bag, false, &[], defer)?;
                        }
                    }
                    self.create_folders(*next, Some(path), child_bag, true, rest, defer)?;
                }
                None => {
                    for child in &folder.children {
                        self.create_folders(*child, Some(path), child_bag, false, &[], defer)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn expand_static(
        &mut self,
        folder: &FolderNode,
        constraint: Option<&StaticConstraint>,
        parent_path: Option<&Path>,
        bag: &DataBag,
    ) -> Result<Vec<(PathBuf, DataBag)>> {
        let base = parent_dir(folder, parent_path)?;
        if let Some(constraint) = constraint
            && !self.constraint_holds(constraint, bag)?
        {
            let name = folder.name();
            log_debug!("Constraint on {name} not met, pruning", name: name);
            return Ok(Vec::new());
        }
        let path = base.join(folder.name());
        self.receiver.make_folder(&path, &folder.metadata);
        Ok(vec![(path, bag.clone())])
    }

    fn constraint_holds(&self, constraint: &StaticConstraint, bag: &DataBag) -> Result<bool> {
        let ancestor = constraint
            .token
            .resolve(bag)?
            .as_ref()
            .and_then(EntityLink::from_value)
            .ok_or_else(|| Error::missing_data(&constraint.entity_type, "constrain_by_entity"))?;

        let mut filter = constraint.filters.resolve(bag)?;
        filter.push(Condition::is("id", json!(ancestor.id)));

        let mut hasher = Sha256::new();
        hasher.update(constraint.entity_type.as_bytes());
        hasher.update(serde_json::to_vec(&filter)?);
        let key = hex::encode(hasher.finalize());

        if let Some(hit) = constraint.cached(&key) {
            return Ok(hit);
        }
        let entity_type = constraint.entity_type.as_str();
        log_debug!("Checking static constraint against {entity_type}", entity_type: entity_type);
        let matched = self.store.find_one(entity_type, &filter, &[])?.is_some();
        constraint.remember(key, matched);
        Ok(matched)
    }

    fn expand_list_field(
        &mut self,
        folder: &FolderNode,
        list: &ListFieldNode,
        parent_path: Option<&Path>,
        bag: &DataBag,
    ) -> Result<Vec<(PathBuf, DataBag)>> {
        let base = parent_dir(folder, parent_path)?;
        let key = DataKey::list_field(&list.entity_type, &list.field);

        let values: Vec<Value> = match bag.get(&key) {
            Some(seeded) => vec![seeded.filter_value()],
            None => {
                let schema = self.store.schema_field_read(&list.entity_type, &list.field)?;
                let mut values: Vec<Value> = schema.valid_values.into_iter().map(Value::from).collect();
                if list.skip_unused {
                    values = self.used_values(list, values, bag)?;
                }
                values
            }
        };

        let mut expanded = Vec::with_capacity(values.len());
        for value in values {
            let mut record = Record::new();
            _ = record.insert(list.field.clone(), value.clone());
            let name = list.expression.generate_name(&list.entity_type, &record, self.formatter)?;
            let path = base.join(&name);
            self.receiver.make_folder(&path, &folder.metadata);
            let child_bag = bag.with(
                key.clone(),
                BagValue::Field(FieldData {
                    value,
                    computed_name: Some(name),
                }),
            );
            expanded.push((path, child_bag));
        }
        Ok(expanded)
    }

    /// One count query per candidate value
    fn used_values(&self, list: &ListFieldNode, values: Vec<Value>, bag: &DataBag) -> Result<Vec<Value>> {
        let project = bag.entity(&DataKey::entity("Project")).cloned();
        let mut used = Vec::with_capacity(values.len());
        for value in values {
            let mut filter = Filter::all().with(Condition::is(list.field.clone(), value.clone()));
            if let Some(project) = &project {
                filter.push(Condition::is("project", project.to_value()));
            }
            let summary = self
                .store
                .summarize(&list.entity_type, &filter, &[Aggregate::count("id")])?;
            if summary.count("id") > 0 {
                used.push(value);
            }
        }
        Ok(used)
    }

    fn expand_entity(
        &mut self,
        folder: &FolderNode,
        entity: &EntityNode,
        base: &Path,
        extra: Option<Condition>,
        bag: &DataBag,
    ) -> Result<Vec<(PathBuf, DataBag)>> {
        let key = DataKey::entity(&entity.entity_type);
        let mut filter = entity.filters.resolve(bag)?;
        if let Some(seeded) = bag.entity(&key) {
            filter.push(Condition::is("id", json!(seeded.id)));
        }
        if let Some(extra) = extra {
            filter.push(extra);
        }

        let mut fields = entity.expression.fields_to_fetch();
        if matches!(folder.kind, NodeKind::Task { .. }) && !fields.iter().any(|f| f == "step") {
            fields.push("step".to_string());
        }

        let entity_type = entity.entity_type.as_str();
        let records = self.store.find(entity_type, &filter, &fields)?;
        let count = records.len();
        log_debug!("Found {count} {entity_type} records to create", count: count, entity_type: entity_type);

        let mut expanded = Vec::with_capacity(records.len());
        for record in records {
            let Some(id) = record_id(&record) else {
                continue;
            };
            let name = entity.expression.generate_name(entity_type, &record, self.formatter)?;
            let label = display_name(&record).unwrap_or_else(|| name.clone());
            let link = EntityLink::new(entity_type, id).with_name(label);
            let path = base.join(&name);

            self.receiver.make_entity_folder(&path, &link, &folder.metadata);
            self.register_secondaries(folder, entity, &record, &path, bag);

            let child_bag = bag.with(
                key.clone(),
                BagValue::Entity(EntityData {
                    link,
                    computed_name: Some(name),
                }),
            );
            expanded.push((path, child_bag));
        }
        Ok(expanded)
    }

    fn register_secondaries(
        &mut self,
        folder: &FolderNode,
        entity: &EntityNode,
        record: &Record,
        path: &Path,
        bag: &DataBag,
    ) {
        let mut links = Vec::new();
        for field in entity.expression.link_fields() {
            match record.get(&field) {
                Some(Value::Array(items)) => links.extend(items.iter().filter_map(EntityLink::from_value)),
                Some(value) => links.extend(EntityLink::from_value(value)),
                None => {}
            }
        }
        match &folder.kind {
            NodeKind::Task { .. } => links.extend(record.get("step").and_then(EntityLink::from_value)),
            NodeKind::Step { .. } => links.extend(bag.current_task().map(|t| t.task.clone())),
            _ => {}
        }
        for link in links {
            self.receiver.register_secondary_entity(path, &link, &folder.metadata);
        }
    }

    fn attach_files(&mut self, folder: &FolderNode, path: &Path, bag: &DataBag) {
        for file in &folder.files {
            if let Some(name) = file.file_name() {
                self.receiver.copy_file(file, &path.join(name), &folder.metadata);
            }
        }
        for link in &folder.symlinks {
            match link.target.resolve(bag) {
                Ok(target) => {
                    self.receiver.create_symlink(&path.join(&link.name), &target, &link.metadata)
                }
                Err(e) => {
                    let name = link.name.clone();
                    let error = e.to_string();
                    log_warn!("Skipping symlink {name}: {error}", name: name, error: error);
                }
            }
        }
    }

    fn current_user_id(&self, memo: &Cell<Option<i64>>) -> Result<i64> {
        if let Some(id) = memo.get() {
            return Ok(id);
        }
        let login = self.current_user.ok_or(Error::NoCurrentUser)?;
        let filter = Filter::all().with(Condition::is("login", json!(login)));
        let id = self
            .store
            .find_one("HumanUser", &filter, &["login".to_string()])?
            .as_ref()
            .and_then(record_id)
            .ok_or_else(|| Error::UserNotFound(login.to_string()))?;
        memo.set(Some(id));
        Ok(id)
    }
}

fn parent_dir<'p>(folder: &FolderNode, parent_path: Option<&'p Path>) -> Result<&'p Path> {
    parent_path.ok_or_else(|| Error::config(&folder.path, "folder has no parent to be created in"))
}
