// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Structured query filters
//!
//! A filter is a tree of `{logical_operator, conditions}` groups whose leaves are
//! `{path, relation, values}` conditions. Paths are either plain field names,
//! deep links of the form `link.EntityType.field`, or reverse lookups of the form
//! `$FROM$EntityType.link.field` ("some EntityType record links to the candidate
//! through `link`, and its `field` satisfies the relation").

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix marking a reverse-lookup condition path
pub const FROM_PREFIX: &str = "$FROM$";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    #[default]
    #[serde(alias = "and")]
    All,
    #[serde(alias = "or")]
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Is,
    IsNot,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Relation::Is => "is",
            Relation::IsNot => "is_not",
            Relation::Contains => "contains",
            Relation::NotContains => "not_contains",
            Relation::StartsWith => "starts_with",
            Relation::EndsWith => "ends_with",
            Relation::In => "in",
            Relation::NotIn => "not_in",
        };
        write!(f, "{}", name)
    }
}

/// A single `{path, relation, values}` leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub path: String,
    pub relation: Relation,
    #[serde(default)]
    pub values: Vec<Value>,
}

impl Condition {
    pub fn new<S: Into<String>>(path: S, relation: Relation, values: Vec<Value>) -> Self {
        Self {
            path: path.into(),
            relation,
            values,
        }
    }

    /// Shorthand for the very common `path is value`
    pub fn is<S: Into<String>>(path: S, value: Value) -> Self {
        Self::new(path, Relation::Is, vec![value])
    }

    /// True for `$FROM$...` reverse-lookup conditions
    pub fn is_reverse_lookup(&self) -> bool {
        self.path.starts_with(FROM_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterItem {
    Condition(Condition),
    Group(Filter),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub conditions: Vec<FilterItem>,
}

impl Filter {
    /// An empty conjunction, matching everything
    pub fn all() -> Self {
        Self::default()
    }

    pub fn any() -> Self {
        Self {
            logical_operator: LogicalOperator::Any,
            conditions: Vec::new(),
        }
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.push(condition);
        self
    }

    pub fn with_group(mut self, group: Filter) -> Self {
        self.conditions.push(FilterItem::Group(group));
        self
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(FilterItem::Condition(condition));
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Top-level leaf conditions, skipping nested groups
    pub fn leaf_conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter().filter_map(|item| match item {
            FilterItem::Condition(c) => Some(c),
            FilterItem::Group(_) => None,
        })
    }
}

impl From<Vec<Condition>> for Filter {
    fn from(conditions: Vec<Condition>) -> Self {
        Self {
            logical_operator: LogicalOperator::All,
            conditions: conditions.into_iter().map(FilterItem::Condition).collect(),
        }
    }
}
