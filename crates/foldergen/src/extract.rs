// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Upward data extraction
//!
//! Starting from the node a request targets, climb to the root and query the
//! entity store once per entity folder whose value is already known, filling in
//! the ancestors each record links to.

use crate::bag::{BagValue, DataBag, DataKey};
use crate::error::{Error, TraversalOutcome, TraversalResult};
use crate::node::{EntityNode, NodeId, SchemaTree};
use crate::template::{FilterTemplate, TemplateItem};
use crate::token::FilterToken;
use diagnostics::*;
use entitystore::{Condition, EntityLink, EntityStore, Filter, FilterItem, LogicalOperator, Record};
use serde_json::{Value, json};

/// Fill `bag` with every ancestor value reachable from `node`
///
/// `Mismatch` means the seed entity does not belong under this branch of the
/// schema; callers skip the branch and carry on.
pub fn extract_upward(
    tree: &SchemaTree,
    store: &dyn EntityStore,
    node: NodeId,
    mut bag: DataBag,
) -> TraversalResult<DataBag> {
    for current in tree.ancestors(node) {
        let Some(entity) = current.entity_node() else {
            continue;
        };
        let Some(key) = current.data_key() else {
            continue;
        };
        let Some(seed) = bag.entity(&key).cloned() else {
            // filled in later by the downward pass
            continue;
        };
        bag = extract_node(entity, store, &key, &seed, bag)?;
    }
    Ok(bag)
}

fn extract_node(
    entity: &EntityNode,
    store: &dyn EntityStore,
    key: &DataKey,
    seed: &EntityLink,
    mut bag: DataBag,
) -> TraversalResult<DataBag> {
    let mut fields = entity.expression.fields_to_fetch();
    let mut links: Vec<(&str, &FilterToken)> = Vec::new();
    let mut filter = Filter::all();
    partition(&entity.filters, &bag, &mut fields, &mut links, &mut filter)?;
    filter.push(Condition::is("id", json!(seed.id)));

    let entity_type = entity.entity_type.as_str();
    let id = seed.id;
    log_debug!("Extracting {entity_type} {id}", entity_type: entity_type, id: id);

    let Some(record) = store.find_one(entity_type, &filter, &fields)? else {
        let by_id = Filter::all().with(Condition::is("id", json!(seed.id)));
        return match store.find_one(entity_type, &by_id, &[])? {
            None => Err(TraversalOutcome::Fatal(Error::EntityNotFound {
                entity_type: entity_type.to_string(),
                id: seed.id,
            })),
            Some(_) => Err(TraversalOutcome::Mismatch(format!(
                "{} is excluded by the filters of its folder",
                seed
            ))),
        };
    };

    for (path, token) in links {
        let FilterToken::EntityRef {
            data_key,
            entity_type: linked_type,
            ..
        } = token
        else {
            continue;
        };
        let value = record.get(path).cloned().unwrap_or(Value::Null);
        let resolved = link_value(seed, path, &value, linked_type.as_deref(), bag.get(data_key))?;
        bag.insert(data_key.clone(), resolved);
    }

    if let Some(name) = display_name(&record)
        && seed.name.is_none()
    {
        bag.insert(key.clone(), BagValue::entity(seed.clone().with_name(name)));
    }
    Ok(bag)
}

/// Split `template` into ancestor links to fetch and constraints usable now
fn partition<'a>(
    template: &'a FilterTemplate,
    bag: &DataBag,
    fields: &mut Vec<String>,
    links: &mut Vec<(&'a str, &'a FilterToken)>,
    filter: &mut Filter,
) -> TraversalResult<()> {
    for item in &template.items {
        match item {
            TemplateItem::Condition(cond) if cond.is_reverse_lookup() => {}
            TemplateItem::Condition(cond) => match cond.ancestor_link() {
                Some(token) => {
                    if !fields.iter().any(|f| f == &cond.path) {
                        fields.push(cond.path.clone());
                    }
                    links.push((cond.path.as_str(), token));
                }
                None => match cond.resolve(bag) {
                    Ok(Some(resolved)) => filter.push(resolved),
                    Ok(None) => {}
                    Err(Error::MissingData { key, .. }) => {
                        let path = cond.path.as_str();
                        log_debug!("Not constraining {path} upward, {key} is unknown", path: path, key: key);
                    }
                    Err(e) => return Err(e.into()),
                },
            },
            // members of an all-group bind like top-level conditions
            TemplateItem::Group(group) if group.logical_operator == LogicalOperator::All => {
                partition(group, bag, fields, links, filter)?;
            }
            TemplateItem::Group(group) => match group.resolve(bag) {
                Ok(resolved) => filter.conditions.push(FilterItem::Group(resolved)),
                Err(Error::MissingData { key, .. }) => {
                    log_debug!("Dropping any-group from upward query, {key} is unknown", key: key);
                }
                Err(e) => return Err(e.into()),
            },
        }
    }
    Ok(())
}

/// Validate one linked field value before it becomes an ancestor's bag value
fn link_value(
    seed: &EntityLink,
    path: &str,
    value: &Value,
    linked_type: Option<&str>,
    existing: Option<&BagValue>,
) -> TraversalResult<BagValue> {
    let mismatch = |why: String| Err(TraversalOutcome::Mismatch(format!("{}: {}", seed, why)));

    let Some(linked_type) = linked_type else {
        // list field ancestors hold plain values
        if value.is_null() {
            return mismatch(format!("'{}' is empty", path));
        }
        if let Some(existing) = existing
            && existing.filter_value() != *value
        {
            return mismatch(format!("'{}' is {} but the request is for {}", path, value, existing.filter_value()));
        }
        return Ok(BagValue::field(value.clone()));
    };

    let candidates: Vec<EntityLink> = match value {
        Value::Array(items) => items.iter().filter_map(EntityLink::from_value).collect(),
        other => EntityLink::from_value(other).into_iter().collect(),
    };
    let candidates: Vec<EntityLink> = candidates
        .into_iter()
        .filter(|l| l.entity_type == linked_type)
        .collect();
    let known = existing.and_then(BagValue::as_entity);

    let chosen = match known {
        Some(known) => candidates.into_iter().find(|l| l.same_entity(known)),
        None => candidates.into_iter().next(),
    };
    match chosen {
        Some(link) => Ok(BagValue::entity(link)),
        None if value.is_null() => mismatch(format!("'{}' is empty", path)),
        None => mismatch(format!(
            "'{}' does not link to the expected {}",
            path, linked_type
        )),
    }
}

pub(crate) fn display_name(record: &Record) -> Option<String> {
    ["code", "name", "content", "login", "short_name", "tank_name"]
        .iter()
        .find_map(|k| record.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}
