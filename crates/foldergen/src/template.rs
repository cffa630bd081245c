// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Schema filters with unresolved `$token` values

use crate::bag::DataBag;
use crate::error::{Error, Result};
use crate::node::{NodeId, SchemaTree};
use crate::token::{FilterToken, TOKEN_PREFIX};
use entitystore::{Condition, FROM_PREFIX, Filter, FilterItem, LogicalOperator, Relation};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Literal(Value),
    Token(FilterToken),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateCondition {
    pub path: String,
    pub relation: Relation,
    pub values: Vec<TemplateValue>,
}

impl TemplateCondition {
    pub fn new<S: Into<String>>(path: S, relation: Relation, values: Vec<TemplateValue>) -> Self {
        Self {
            path: path.into(),
            relation,
            values,
        }
    }

    /// `path is <token>`
    pub fn is_token<S: Into<String>>(path: S, token: FilterToken) -> Self {
        Self::new(path, Relation::Is, vec![TemplateValue::Token(token)])
    }

    pub fn is_reverse_lookup(&self) -> bool {
        self.path.starts_with(FROM_PREFIX)
    }

    /// The ancestor token when this is a single-value reference to an ancestor node
    pub fn ancestor_link(&self) -> Option<&FilterToken> {
        match self.values.as_slice() {
            [TemplateValue::Token(token @ FilterToken::EntityRef { .. })] => Some(token),
            _ => None,
        }
    }

    /// `Ok(None)` when a task token has nothing to refer to
    pub fn resolve(&self, bag: &DataBag) -> Result<Option<Condition>> {
        let mut values = Vec::with_capacity(self.values.len());
        for value in &self.values {
            match value {
                TemplateValue::Literal(v) => values.push(v.clone()),
                TemplateValue::Token(token) => match token.resolve(bag)? {
                    Some(v) => values.push(v),
                    None => return Ok(None),
                },
            }
        }
        Ok(Some(Condition::new(self.path.clone(), self.relation, values)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateItem {
    Condition(TemplateCondition),
    Group(FilterTemplate),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterTemplate {
    pub logical_operator: LogicalOperator,
    pub items: Vec<TemplateItem>,
}

impl FilterTemplate {
    /// Parse the `filters` value of a schema file
    ///
    /// Accepts either a list of conditions (joined with `all`) or a
    /// `{logical_operator, conditions}` group. `$name` string values are bound
    /// to the ancestor of `parent` called `name`.
    pub fn parse(
        raw: &Value,
        tree: &SchemaTree,
        parent: Option<NodeId>,
        config_path: &Path,
    ) -> Result<Self> {
        match raw {
            Value::Null => Ok(Self::default()),
            Value::Array(items) => Self::parse_items(LogicalOperator::All, items, tree, parent, config_path),
            Value::Object(map) => {
                let op = match map.get("logical_operator") {
                    Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                        Error::config(config_path, format!("bad logical_operator: {}", e))
                    })?,
                    None => LogicalOperator::All,
                };
                let items = match map.get("conditions") {
                    Some(Value::Array(items)) => items.as_slice(),
                    _ => {
                        return Err(Error::config(
                            config_path,
                            "filter group requires a 'conditions' list",
                        ));
                    }
                };
                Self::parse_items(op, items, tree, parent, config_path)
            }
            other => Err(Error::config(
                config_path,
                format!("filters must be a list, got {}", other),
            )),
        }
    }

    fn parse_items(
        logical_operator: LogicalOperator,
        raw: &[Value],
        tree: &SchemaTree,
        parent: Option<NodeId>,
        config_path: &Path,
    ) -> Result<Self> {
        let mut items = Vec::with_capacity(raw.len());
        for item in raw {
            let is_group = item
                .as_object()
                .is_some_and(|m| m.contains_key("conditions"));
            if is_group {
                items.push(TemplateItem::Group(Self::parse(item, tree, parent, config_path)?));
            } else {
                items.push(TemplateItem::Condition(parse_condition(
                    item,
                    tree,
                    parent,
                    config_path,
                )?));
            }
        }
        Ok(Self {
            logical_operator,
            items,
        })
    }

    pub fn push(&mut self, condition: TemplateCondition) {
        self.items.push(TemplateItem::Condition(condition));
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Top-level conditions, skipping nested groups
    pub fn conditions(&self) -> impl Iterator<Item = &TemplateCondition> {
        self.items.iter().filter_map(|item| match item {
            TemplateItem::Condition(c) => Some(c),
            TemplateItem::Group(_) => None,
        })
    }

    /// Every token anywhere in the template
    pub fn tokens(&self) -> Vec<&FilterToken> {
        let mut out = Vec::new();
        for item in &self.items {
            match item {
                TemplateItem::Condition(c) => out.extend(c.values.iter().filter_map(|v| match v {
                    TemplateValue::Token(t) => Some(t),
                    TemplateValue::Literal(_) => None,
                })),
                TemplateItem::Group(g) => out.extend(g.tokens()),
            }
        }
        out
    }

    /// Substitute every token; task tokens without a current task drop their condition
    pub fn resolve(&self, bag: &DataBag) -> Result<Filter> {
        let mut conditions = Vec::with_capacity(self.items.len());
        for item in &self.items {
            match item {
                TemplateItem::Condition(c) => {
                    if let Some(resolved) = c.resolve(bag)? {
                        conditions.push(FilterItem::Condition(resolved));
                    }
                }
                TemplateItem::Group(g) => conditions.push(FilterItem::Group(g.resolve(bag)?)),
            }
        }
        Ok(Filter {
            logical_operator: self.logical_operator,
            conditions,
        })
    }
}

fn parse_condition(
    raw: &Value,
    tree: &SchemaTree,
    parent: Option<NodeId>,
    config_path: &Path,
) -> Result<TemplateCondition> {
    let path = raw
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config(config_path, format!("filter {} has no 'path'", raw)))?;
    let relation: Relation = match raw.get("relation") {
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            Error::config(config_path, format!("filter on '{}': bad relation: {}", path, e))
        })?,
        None => {
            return Err(Error::config(
                config_path,
                format!("filter on '{}' has no 'relation'", path),
            ));
        }
    };
    let raw_values = match raw.get("values") {
        Some(Value::Array(values)) => values.clone(),
        Some(single) => vec![single.clone()],
        None => Vec::new(),
    };

    let mut values = Vec::with_capacity(raw_values.len());
    for value in raw_values {
        match value.as_str() {
            Some(s) if s.starts_with(TOKEN_PREFIX) => {
                values.push(TemplateValue::Token(FilterToken::entity_ref(
                    tree,
                    parent,
                    s,
                    config_path,
                )?));
            }
            _ => values.push(TemplateValue::Literal(value)),
        }
    }
    Ok(TemplateCondition::new(path, relation, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::{BagValue, DataKey, TaskData};
    use crate::expression::NameExpression;
    use crate::node::{EntityNode, NodeKind};
    use entitystore::EntityLink;
    use serde_json::json;
    use std::path::PathBuf;

    fn tree_with_sequence() -> (SchemaTree, NodeId) {
        let mut tree = SchemaTree::new(Path::new("/schema"));
        let seq = tree.push(
            PathBuf::from("/schema/project/sequence"),
            None,
            NodeKind::Entity(EntityNode {
                entity_type: "Sequence".to_string(),
                expression: NameExpression::parse("{code}").unwrap(),
                filters: FilterTemplate::default(),
            }),
            Value::Null,
        );
        (tree, seq)
    }

    #[test]
    fn test_parse_and_resolve() {
        let (tree, seq) = tree_with_sequence();
        let raw = json!([
            {"path": "sg_sequence", "relation": "is", "values": ["$sequence"]},
            {"path": "code", "relation": "contains", "values": ["ext"]},
        ]);
        let template = FilterTemplate::parse(&raw, &tree, Some(seq), Path::new("shot.yml")).unwrap();
        assert_eq!(template.tokens().len(), 1);
        assert!(template.conditions().next().unwrap().ancestor_link().is_some());

        let bag = DataBag::new().with(
            DataKey::entity("Sequence"),
            BagValue::entity(EntityLink::new("Sequence", 7)),
        );
        let filter = template.resolve(&bag).unwrap();
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({
                "logical_operator": "all",
                "conditions": [
                    {"path": "sg_sequence", "relation": "is", "values": [{"type": "Sequence", "id": 7}]},
                    {"path": "code", "relation": "contains", "values": ["ext"]},
                ]
            })
        );

        // a missing ancestor key is an error, not an empty filter
        assert!(matches!(
            template.resolve(&DataBag::new()),
            Err(Error::MissingData { .. })
        ));
    }

    #[test]
    fn test_unknown_token_is_config_error() {
        let (tree, seq) = tree_with_sequence();
        let raw = json!([{"path": "entity", "relation": "is", "values": ["$shot"]}]);
        let err = FilterTemplate::parse(&raw, &tree, Some(seq), Path::new("/schema/x.yml")).unwrap_err();
        assert!(err.to_string().contains("$shot"));
        assert!(err.to_string().contains("/schema/x.yml"));
    }

    #[test]
    fn test_task_tokens_drop_without_task() {
        let mut template = FilterTemplate::default();
        template.push(TemplateCondition::is_token("id", FilterToken::CurrentStep));
        assert!(template.resolve(&DataBag::new()).unwrap().is_empty());

        let bag = DataBag::new().with_task(TaskData {
            task: EntityLink::new("Task", 100),
            step: Some(EntityLink::new("Step", 3)),
        });
        let filter = template.resolve(&bag).unwrap();
        assert_eq!(
            filter.leaf_conditions().next().unwrap().values,
            vec![json!(3)]
        );
    }

    #[test]
    fn test_nested_groups() {
        let (tree, seq) = tree_with_sequence();
        let raw = json!({
            "logical_operator": "or",
            "conditions": [
                {"path": "code", "relation": "starts_with", "values": ["a"]},
                {"logical_operator": "and", "conditions": [
                    {"path": "sg_sequence", "relation": "is", "values": ["$sequence"]}
                ]}
            ]
        });
        let template = FilterTemplate::parse(&raw, &tree, Some(seq), Path::new("x.yml")).unwrap();
        assert_eq!(template.logical_operator, LogicalOperator::Any);
        assert_eq!(template.conditions().count(), 1);
        assert_eq!(template.tokens().len(), 1);
    }
}
