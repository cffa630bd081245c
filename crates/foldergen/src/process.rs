// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Folder creation requests

use crate::bag::{DataBag, TaskData};
use crate::compile::compile;
use crate::config::PipelineConfig;
use crate::error::{Error, Result, TraversalOutcome};
use crate::extract::extract_upward;
use crate::format::{DefaultValueFormatter, ValueFormatter};
use crate::hook::FolderIoHook;
use crate::materialize::Materializer;
use crate::node::{NodeId, NodeKind, SchemaTree};
use crate::path_cache::PathCache;
use crate::receiver::FolderIoReceiver;
use diagnostics::*;
use entitystore::{Condition, EntityLink, EntityStore, Filter};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A compiled schema together with where its projects live
pub struct Pipeline {
    tree: SchemaTree,
    roots: BTreeMap<String, PathBuf>,
    current_user: Option<String>,
    formatter: Box<dyn ValueFormatter>,
}

impl Pipeline {
    pub fn new(tree: SchemaTree, roots: BTreeMap<String, PathBuf>) -> Self {
        Self {
            tree,
            roots,
            current_user: None,
            formatter: Box::new(DefaultValueFormatter),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let tree = compile(&config.schema)?;
        for root in tree.roots() {
            if let NodeKind::Project { root_name, .. } = &tree.node(*root).kind
                && !config.roots.contains_key(root_name)
            {
                return Err(Error::UnknownRoot(root_name.clone()));
            }
        }
        Ok(Self::new(tree, config.roots.clone()).with_current_user(config.user_login()))
    }

    pub fn with_current_user(mut self, login: Option<String>) -> Self {
        self.current_user = login;
        self
    }

    pub fn with_formatter(mut self, formatter: Box<dyn ValueFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn tree(&self) -> &SchemaTree {
        &self.tree
    }

    pub fn roots(&self) -> &BTreeMap<String, PathBuf> {
        &self.roots
    }
}

/// Runs requests against one store, path cache and IO hook
pub struct FolderCreator<'a> {
    pipeline: &'a Pipeline,
    store: &'a dyn EntityStore,
    cache: &'a mut dyn PathCache,
    hook: &'a dyn FolderIoHook,
}

impl<'a> FolderCreator<'a> {
    pub fn new(
        pipeline: &'a Pipeline,
        store: &'a dyn EntityStore,
        cache: &'a mut dyn PathCache,
        hook: &'a dyn FolderIoHook,
    ) -> Self {
        Self {
            pipeline,
            store,
            cache,
            hook,
        }
    }

    /// Create the folders for `ids` of `entity_type`
    ///
    /// Returns every folder path the request computed, in creation order,
    /// whether or not it existed before. With `preview` nothing is written.
    /// `defer` names the deferred-creation context of this pass, if any.
    pub fn process_filesystem_structure(
        &mut self,
        entity_type: &str,
        ids: &[i64],
        preview: bool,
        defer: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let pipeline = self.pipeline;
        let tree = &pipeline.tree;
        let count = ids.len();
        log_info!("Creating folders for {count} {entity_type} entities", count: count, entity_type: entity_type);

        let mut receiver = FolderIoReceiver::new();
        {
            let mut materializer = Materializer::new(
                tree,
                self.store,
                pipeline.formatter.as_ref(),
                &pipeline.roots,
                pipeline.current_user.as_deref(),
                &mut receiver,
            );

            for id in ids {
                let (targets, bag) = self.targets(entity_type, *id)?;
                let mut matched = false;
                for target in targets {
                    let bag = match extract_upward(tree, self.store, target, bag.clone()) {
                        Ok(bag) => bag,
                        Err(TraversalOutcome::Mismatch(why)) => {
                            log_debug!("Skipping schema branch: {why}", why: why);
                            continue;
                        }
                        Err(TraversalOutcome::Fatal(e)) => return Err(e),
                    };
                    matched = true;
                    let chain = tree.chain_to(target);
                    if let Some((root, rest)) = chain.split_first() {
                        materializer.create_folders(*root, None, &bag, true, rest, defer)?;
                    }
                }
                if !matched {
                    log_warn!("{entity_type} {id} does not fit anywhere in the folder schema", entity_type: entity_type, id: *id);
                }
            }
        }

        receiver.execute(self.cache, self.hook, preview)
    }

    /// Schema nodes to materialize for one requested entity, with the seed bag
    fn targets(&self, entity_type: &str, id: i64) -> Result<(Vec<NodeId>, DataBag)> {
        let tree = &self.pipeline.tree;
        if entity_type != "Task" {
            let nodes = tree.nodes_for_entity_type(entity_type);
            if nodes.is_empty() {
                return Err(Error::UnknownEntityType(entity_type.to_string()));
            }
            return Ok((nodes, DataBag::seeded(EntityLink::new(entity_type, id))));
        }

        let filter = Filter::all().with(Condition::is("id", json!(id)));
        let fields = ["entity".to_string(), "step".to_string(), "content".to_string()];
        let record = self
            .store
            .find_one("Task", &filter, &fields)?
            .ok_or_else(|| Error::EntityNotFound {
                entity_type: "Task".to_string(),
                id,
            })?;
        let task = TaskData {
            task: EntityLink::new("Task", id),
            step: record.get("step").and_then(EntityLink::from_value),
        };

        let task_nodes = tree.task_nodes();
        if !task_nodes.is_empty() {
            return Ok((task_nodes, DataBag::seeded(task.task.clone()).with_task(task)));
        }

        // no task folders, so create the folders of the entity the task belongs to
        let entity = record
            .get("entity")
            .and_then(EntityLink::from_value)
            .ok_or_else(|| Error::missing_data("entity", format!("Task {}", id)))?;
        let nodes = tree.nodes_for_entity_type(&entity.entity_type);
        if nodes.is_empty() {
            return Err(Error::UnknownEntityType(entity.entity_type));
        }
        Ok((nodes, DataBag::seeded(entity).with_task(task)))
    }
}
