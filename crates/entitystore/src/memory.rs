// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! In-memory entity store
//!
//! Implements [`EntityStore`] over plain tables of records, for tests and for
//! running the command line against a YAML fixture instead of a live site.
//!
//! # Fixture Format
//! ```yaml
//! entities:
//!   Project:
//!     - { id: 1, name: "Big Buck", tank_name: big_buck }
//!   Sequence:
//!     - { id: 7, code: seq01, project: { type: Project, id: 1 } }
//! schema:
//!   Asset:
//!     sg_asset_type: { data_type: list, valid_values: [char, prop] }
//! ```

use crate::error::{Result, StoreError};
use crate::filter::{Condition, FROM_PREFIX, Filter, FilterItem, LogicalOperator, Relation};
use crate::store::{
    Aggregate, AggregateKind, EntityLink, EntityStore, FieldSchema, Record, Summary, record_id,
};
use diagnostics::log_debug;
use serde::Deserialize;
use serde_json::Value;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    entities: BTreeMap<String, Vec<Record>>,
    #[serde(default)]
    schema: BTreeMap<String, BTreeMap<String, FieldSchema>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, Vec<Record>>,
    schema: BTreeMap<String, BTreeMap<String, FieldSchema>>,
    queries: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let fixture: Fixture = serde_yaml_ng::from_str(text)?;
        let mut store = Self::new();
        for (entity_type, records) in fixture.entities {
            for record in records {
                store.insert_record(&entity_type, record)?;
            }
        }
        store.schema = fixture.schema;
        Ok(store)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Fixture {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Add (or replace) one record; `fields` must be a JSON object
    pub fn insert(&mut self, entity_type: &str, id: i64, fields: Value) -> Result<()> {
        let mut record = match fields {
            Value::Object(map) => map,
            Value::Null => Record::new(),
            other => {
                return Err(StoreError::MalformedRecord {
                    message: format!("{} {}: expected a map, got {}", entity_type, id, other),
                });
            }
        };
        _ = record.insert("id".to_string(), Value::from(id));
        self.insert_record(entity_type, record)
    }

    fn insert_record(&mut self, entity_type: &str, mut record: Record) -> Result<()> {
        let id = record_id(&record).ok_or_else(|| StoreError::MalformedRecord {
            message: format!("{} record without integer id", entity_type),
        })?;
        _ = record.insert("type".to_string(), Value::from(entity_type));

        let table = self.tables.entry(entity_type.to_string()).or_default();
        match table.iter_mut().find(|r| record_id(r) == Some(id)) {
            Some(existing) => *existing = record,
            None => table.push(record),
        }
        Ok(())
    }

    /// Change one field of an existing record (used to simulate renames)
    pub fn update_field(&mut self, entity_type: &str, id: i64, field: &str, value: Value) -> Result<()> {
        let record = self
            .tables
            .get_mut(entity_type)
            .and_then(|t| t.iter_mut().find(|r| record_id(r) == Some(id)))
            .ok_or_else(|| StoreError::MalformedRecord {
                message: format!("no {} with id {}", entity_type, id),
            })?;
        _ = record.insert(field.to_string(), value);
        Ok(())
    }

    pub fn set_field_schema(&mut self, entity_type: &str, field: &str, schema: FieldSchema) {
        _ = self
            .schema
            .entry(entity_type.to_string())
            .or_default()
            .insert(field.to_string(), schema);
    }

    /// Number of queries served so far
    pub fn query_count(&self) -> usize {
        self.queries.get()
    }

    fn count_query(&self) {
        self.queries.set(self.queries.get() + 1);
    }

    fn lookup(&self, entity_type: &str, id: i64) -> Option<&Record> {
        self.tables
            .get(entity_type)?
            .iter()
            .find(|r| record_id(r) == Some(id))
    }

    /// Resolve a plain or deep-link (`link.EntityType.field`) path on a record
    fn field_value(&self, record: &Record, path: &str) -> Value {
        let mut parts = path.splitn(3, '.');
        let head = parts.next().unwrap_or_default();
        match (parts.next(), parts.next()) {
            (None, _) => record.get(head).cloned().unwrap_or(Value::Null),
            (Some(linked_type), Some(rest)) => {
                let target = record
                    .get(head)
                    .and_then(EntityLink::from_value)
                    .filter(|link| link.entity_type == linked_type)
                    .and_then(|link| self.lookup(&link.entity_type, link.id));
                match target {
                    Some(target) => self.field_value(target, rest),
                    None => Value::Null,
                }
            }
            (Some(_), None) => Value::Null,
        }
    }

    fn matches(&self, entity_type: &str, record: &Record, filter: &Filter) -> Result<bool> {
        for item in &filter.conditions {
            let hit = match item {
                FilterItem::Condition(cond) => self.condition_holds(entity_type, record, cond)?,
                FilterItem::Group(group) => self.matches(entity_type, record, group)?,
            };
            match filter.logical_operator {
                LogicalOperator::All if !hit => return Ok(false),
                LogicalOperator::Any if hit => return Ok(true),
                _ => {}
            }
        }
        Ok(match filter.logical_operator {
            LogicalOperator::All => true,
            LogicalOperator::Any => filter.conditions.is_empty(),
        })
    }

    fn condition_holds(&self, entity_type: &str, record: &Record, cond: &Condition) -> Result<bool> {
        let Some(reverse) = cond.path.strip_prefix(FROM_PREFIX) else {
            let actual = self.field_value(record, &cond.path);
            return Ok(relation_holds(cond.relation, &actual, &cond.values));
        };

        // $FROM$Source.link.path: some Source record links here and satisfies path
        let mut parts = reverse.splitn(3, '.');
        let (Some(source_type), Some(link_field), Some(sub_path)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(StoreError::malformed_filter(format!(
                "reverse lookup path '{}' must look like $FROM$Type.link.field",
                cond.path
            )));
        };
        let Some(id) = record_id(record) else {
            return Ok(false);
        };
        let me = EntityLink::new(entity_type, id);
        let sources = self.tables.get(source_type).map(Vec::as_slice).unwrap_or(&[]);
        Ok(sources.iter().any(|source| {
            let links_here = EntityLink::from_value(&self.field_value(source, link_field))
                .is_some_and(|link| link.same_entity(&me));
            links_here
                && relation_holds(cond.relation, &self.field_value(source, sub_path), &cond.values)
        }))
    }

    fn project(&self, record: &Record, fields: &[String]) -> Record {
        let mut out = Record::new();
        for key in ["type", "id"] {
            if let Some(v) = record.get(key) {
                _ = out.insert(key.to_string(), v.clone());
            }
        }
        for field in fields {
            _ = out.insert(field.clone(), self.with_link_names(self.field_value(record, field)));
        }
        out
    }

    /// Links come back carrying the display name of the linked entity
    fn with_link_names(&self, value: Value) -> Value {
        match value {
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.with_link_names(v)).collect())
            }
            Value::Object(mut map) if !map.contains_key("name") => {
                let name = EntityLink::from_value(&Value::Object(map.clone()))
                    .and_then(|link| self.lookup(&link.entity_type, link.id))
                    .and_then(display_name);
                if let Some(name) = name {
                    _ = map.insert("name".to_string(), Value::from(name));
                }
                Value::Object(map)
            }
            other => other,
        }
    }
}

fn display_name(record: &Record) -> Option<String> {
    ["name", "code", "content", "login", "short_name"]
        .iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (EntityLink::from_value(a), EntityLink::from_value(b)) {
        (Some(x), Some(y)) => x.same_entity(&y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

fn contains(actual: &Value, needle: &Value) -> bool {
    match (actual, needle) {
        (Value::String(hay), Value::String(n)) => hay.contains(n.as_str()),
        (Value::Array(items), _) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}

fn relation_holds(relation: Relation, actual: &Value, values: &[Value]) -> bool {
    let first = values.first().unwrap_or(&Value::Null);
    match relation {
        Relation::Is => match actual {
            // multi-entity fields match when any member matches
            Value::Array(items) => items.iter().any(|item| values_equal(item, first)),
            _ => values_equal(actual, first),
        },
        Relation::IsNot => !relation_holds(Relation::Is, actual, values),
        Relation::In => values.iter().any(|v| values_equal(actual, v)),
        Relation::NotIn => !values.iter().any(|v| values_equal(actual, v)),
        Relation::Contains => contains(actual, first),
        Relation::NotContains => !contains(actual, first),
        Relation::StartsWith => match (actual.as_str(), first.as_str()) {
            (Some(a), Some(p)) => a.starts_with(p),
            _ => false,
        },
        Relation::EndsWith => match (actual.as_str(), first.as_str()) {
            (Some(a), Some(p)) => a.ends_with(p),
            _ => false,
        },
    }
}

impl EntityStore for MemoryStore {
    fn find(&self, entity_type: &str, filter: &Filter, fields: &[String]) -> Result<Vec<Record>> {
        self.count_query();
        let Some(table) = self.tables.get(entity_type) else {
            log_debug!("MemoryStore::find - no records of type {entity_type}", entity_type: entity_type);
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for record in table {
            if self.matches(entity_type, record, filter)? {
                found.push(self.project(record, fields));
            }
        }
        let count = found.len();
        log_debug!("MemoryStore::find - {entity_type} matched {count} records", entity_type: entity_type, count: count);
        Ok(found)
    }

    fn schema_field_read(&self, entity_type: &str, field: &str) -> Result<FieldSchema> {
        self.count_query();
        self.schema
            .get(entity_type)
            .and_then(|fields| fields.get(field))
            .cloned()
            .ok_or_else(|| StoreError::UnknownField {
                entity_type: entity_type.to_string(),
                field: field.to_string(),
            })
    }

    fn summarize(
        &self,
        entity_type: &str,
        filter: &Filter,
        aggregates: &[Aggregate],
    ) -> Result<Summary> {
        self.count_query();
        let mut count = 0u64;
        for record in self.tables.get(entity_type).map(Vec::as_slice).unwrap_or(&[]) {
            if self.matches(entity_type, record, filter)? {
                count += 1;
            }
        }

        let mut summary = Summary::default();
        for aggregate in aggregates {
            match aggregate.kind {
                AggregateKind::Count => {
                    _ = summary
                        .summaries
                        .insert(aggregate.field.clone(), Value::from(count));
                }
            }
        }
        Ok(summary)
    }
}
