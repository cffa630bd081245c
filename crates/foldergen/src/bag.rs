// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Per-request accumulator of resolved entity store values
//!
//! A [`DataBag`] maps data keys to values. Upward extraction adds keys as it
//! climbs the schema, downward materialization adds one key per expanded
//! node. Bags are cheap to clone and copy-on-write: each branch of the
//! recursion works on its own snapshot, so siblings never see each other's
//! additions.

use entitystore::EntityLink;
use serde_json::Value;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Key into a data bag: `Shot` for entity nodes, `Asset.sg_asset_type` for list fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataKey(String);

impl DataKey {
    pub fn entity<S: AsRef<str>>(entity_type: S) -> Self {
        DataKey(entity_type.as_ref().to_string())
    }

    pub fn list_field<S: AsRef<str>, F: AsRef<str>>(entity_type: S, field: F) -> Self {
        DataKey(format!("{}.{}", entity_type.as_ref(), field.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityData {
    pub link: EntityLink,
    /// Folder name produced for this entity, once materialized
    pub computed_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    pub value: Value,
    pub computed_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BagValue {
    Entity(EntityData),
    Field(FieldData),
}

impl BagValue {
    pub fn entity(link: EntityLink) -> Self {
        BagValue::Entity(EntityData {
            link,
            computed_name: None,
        })
    }

    pub fn field(value: Value) -> Self {
        BagValue::Field(FieldData {
            value,
            computed_name: None,
        })
    }

    /// The value substituted into a query filter
    pub fn filter_value(&self) -> Value {
        match self {
            BagValue::Entity(e) => e.link.to_value(),
            BagValue::Field(f) => f.value.clone(),
        }
    }

    pub fn computed_name(&self) -> Option<&str> {
        match self {
            BagValue::Entity(e) => e.computed_name.as_deref(),
            BagValue::Field(f) => f.computed_name.as_deref(),
        }
    }

    pub fn as_entity(&self) -> Option<&EntityLink> {
        match self {
            BagValue::Entity(e) => Some(&e.link),
            BagValue::Field(_) => None,
        }
    }
}

/// The task that triggered a task-scoped request
#[derive(Debug, Clone, PartialEq)]
pub struct TaskData {
    pub task: EntityLink,
    pub step: Option<EntityLink>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataBag {
    entries: Rc<BTreeMap<DataKey, BagValue>>,
    current_task: Option<Rc<TaskData>>,
}

impl DataBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bag holding just the seed entity of a request
    pub fn seeded(entity: EntityLink) -> Self {
        let mut bag = Self::new();
        bag.insert(DataKey::entity(&entity.entity_type), BagValue::entity(entity));
        bag
    }

    pub fn with_task(mut self, task: TaskData) -> Self {
        self.current_task = Some(Rc::new(task));
        self
    }

    pub fn current_task(&self) -> Option<&TaskData> {
        self.current_task.as_deref()
    }

    pub fn get(&self, key: &DataKey) -> Option<&BagValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &DataKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn entity(&self, key: &DataKey) -> Option<&EntityLink> {
        self.get(key).and_then(BagValue::as_entity)
    }

    /// Add or refresh a key in this snapshot only
    pub fn insert(&mut self, key: DataKey, value: BagValue) {
        _ = Rc::make_mut(&mut self.entries).insert(key, value);
    }

    /// A new snapshot with one more key; `self` is left untouched
    pub fn with(&self, key: DataKey, value: BagValue) -> Self {
        let mut next = self.clone();
        next.insert(key, value);
        next
    }

    pub fn keys(&self) -> impl Iterator<Item = &DataKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
