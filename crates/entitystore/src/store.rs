// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::error::Result;
use crate::filter::Filter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One record returned by the store. Always carries `type` and `id`.
pub type Record = serde_json::Map<String, Value>;

/// A `{type, id, name}` reference to an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityLink {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntityLink {
    pub fn new<S: Into<String>>(entity_type: S, id: i64) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
            name: None,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse a link out of a field value, if it looks like one
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let entity_type = obj.get("type")?.as_str()?;
        let id = obj.get("id")?.as_i64()?;
        let name = obj.get("name").and_then(Value::as_str).map(str::to_string);
        Some(Self {
            entity_type: entity_type.to_string(),
            id,
            name,
        })
    }

    /// The `{type, id}` form used in filter values
    pub fn to_value(&self) -> Value {
        serde_json::json!({"type": self.entity_type, "id": self.id})
    }

    /// True when both refer to the same entity, names aside
    pub fn same_entity(&self, other: &EntityLink) -> bool {
        self.entity_type == other.entity_type && self.id == other.id
    }
}

impl std::fmt::Display for EntityLink {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} {} ({})", self.entity_type, self.id, name),
            None => write!(f, "{} {}", self.entity_type, self.id),
        }
    }
}

pub fn record_id(record: &Record) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}

/// Schema information for a single field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub data_type: String,
    #[serde(default)]
    pub valid_values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: AggregateKind,
}

impl Aggregate {
    pub fn count<S: Into<String>>(field: S) -> Self {
        Self {
            field: field.into(),
            kind: AggregateKind::Count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub summaries: BTreeMap<String, Value>,
}

impl Summary {
    pub fn count(&self, field: &str) -> u64 {
        self.summaries
            .get(field)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

/// Blocking client for the remote entity store
///
/// Every call is one network round trip in a real deployment; callers are
/// expected to memoize where it matters.
pub trait EntityStore {
    /// All records of `entity_type` matching `filter`, with `fields` populated
    fn find(&self, entity_type: &str, filter: &Filter, fields: &[String]) -> Result<Vec<Record>>;

    /// The first matching record, if any
    fn find_one(
        &self,
        entity_type: &str,
        filter: &Filter,
        fields: &[String],
    ) -> Result<Option<Record>> {
        Ok(self.find(entity_type, filter, fields)?.into_iter().next())
    }

    /// Schema for one field, including list valid values
    fn schema_field_read(&self, entity_type: &str, field: &str) -> Result<FieldSchema>;

    /// Aggregate over the records matching `filter`
    fn summarize(
        &self,
        entity_type: &str,
        filter: &Filter,
        aggregates: &[Aggregate],
    ) -> Result<Summary>;
}
