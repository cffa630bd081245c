// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Folder naming expressions
//!
//! `{code}` substitutes a field, `{code:^(\w+)_}` keeps the first capture of a
//! regex applied to the field text, and `[...]` marks an optional section.
//! Every combination of optional sections is tried, most fields first, and
//! the first one whose fields all have values wins.

use crate::error::{Error, Result};
use crate::format::{ValueFormatter, is_safe_char};
use entitystore::{Record, record_id};
use regex::Regex;
use serde_json::Value;
use std::cmp::Reverse;

#[derive(Debug, Clone)]
struct Field {
    name: String,
    pattern: Option<Regex>,
}

#[derive(Debug, Clone)]
enum Part {
    Literal(String),
    Field(Field),
}

#[derive(Debug, Clone)]
enum Section {
    Required(Part),
    Optional(Vec<Part>),
}

#[derive(Debug, Clone)]
pub struct NameExpression {
    raw: String,
    /// Part lists to try in order
    variants: Vec<Vec<Part>>,
    fields: Vec<String>,
}

impl PartialEq for NameExpression {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl std::fmt::Display for NameExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl NameExpression {
    pub fn parse(raw: &str) -> Result<Self> {
        let sections = parse_sections(raw)?;

        let mut fields: Vec<String> = Vec::new();
        for section in &sections {
            let parts = match section {
                Section::Required(p) => std::slice::from_ref(p),
                Section::Optional(ps) => ps.as_slice(),
            };
            for part in parts {
                if let Part::Field(f) = part
                    && !fields.contains(&f.name)
                {
                    fields.push(f.name.clone());
                }
            }
        }
        if fields.is_empty() {
            return Err(Error::expression(raw, "must reference at least one {field}"));
        }

        let optional = sections
            .iter()
            .filter(|s| matches!(s, Section::Optional(_)))
            .count();
        if optional > 16 {
            return Err(Error::expression(raw, "too many optional sections"));
        }

        // Enumerate from "all sections present" down to "none present"
        let mut variants = Vec::with_capacity(1 << optional);
        for mask in (0..(1u32 << optional)).rev() {
            let mut parts = Vec::new();
            let mut index = 0;
            for section in &sections {
                match section {
                    Section::Required(p) => parts.push(p.clone()),
                    Section::Optional(ps) => {
                        if mask & (1 << (optional - 1 - index)) != 0 {
                            parts.extend(ps.iter().cloned());
                        }
                        index += 1;
                    }
                }
            }
            variants.push(parts);
        }
        variants.sort_by_key(|parts| {
            Reverse(parts.iter().filter(|p| matches!(p, Part::Field(_))).count())
        });

        Ok(Self {
            raw: raw.to_string(),
            variants,
            fields,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Fields the expression substitutes, in order of first appearance
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Link fields behind deep-link references (`sg_sequence` for `sg_sequence.Sequence.code`)
    pub fn link_fields(&self) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();
        for field in &self.fields {
            if let Some((link, _)) = field.split_once('.')
                && !links.iter().any(|l| l == link)
            {
                links.push(link.to_string());
            }
        }
        links
    }

    /// Everything a query must request to evaluate this expression
    pub fn fields_to_fetch(&self) -> Vec<String> {
        let mut out = self.fields.clone();
        for link in self.link_fields() {
            if !out.contains(&link) {
                out.push(link);
            }
        }
        out
    }

    /// Evaluate against a record of `entity_type` and validate the result
    pub fn generate_name(
        &self,
        entity_type: &str,
        record: &Record,
        formatter: &dyn ValueFormatter,
    ) -> Result<String> {
        let entity_id = record_id(record);
        let describe = || describe_entity(entity_type, record);

        let mut missing: Vec<&str> = Vec::new();
        'variants: for parts in &self.variants {
            let mut name = String::new();
            for part in parts {
                match part {
                    Part::Literal(text) => name.push_str(text),
                    Part::Field(field) => {
                        let value = record.get(&field.name).unwrap_or(&Value::Null);
                        match render_field(entity_type, entity_id, field, value, formatter) {
                            Some(text) => name.push_str(&text),
                            None => {
                                if !missing.contains(&field.name.as_str()) {
                                    missing.push(&field.name);
                                }
                                continue 'variants;
                            }
                        }
                    }
                }
            }
            validate_folder_name(entity_type, &name).map_err(|_| Error::InvalidFolderName {
                entity: describe(),
                name: name.clone(),
            })?;
            return Ok(name);
        }

        Err(Error::NameGeneration {
            entity: describe(),
            message: format!(
                "expression '{}' needs values for field(s) {}",
                self.raw,
                missing.join(", ")
            ),
        })
    }
}

fn render_field(
    entity_type: &str,
    entity_id: Option<i64>,
    field: &Field,
    value: &Value,
    formatter: &dyn ValueFormatter,
) -> Option<String> {
    if value.is_null() {
        return None;
    }
    let text = formatter.format(entity_type, entity_id, &field.name, value);
    let text = match &field.pattern {
        None => text,
        Some(re) => {
            let caps = re.captures(&text)?;
            caps.get(1).or_else(|| caps.get(0))?.as_str().to_string()
        }
    };
    (!text.is_empty()).then_some(text)
}

fn describe_entity(entity_type: &str, record: &Record) -> String {
    let id = record_id(record).map(|i| i.to_string()).unwrap_or_else(|| "?".to_string());
    let label = ["code", "name", "content", "login"]
        .iter()
        .find_map(|k| record.get(*k).and_then(Value::as_str));
    match label {
        Some(label) => format!("{} {} ({})", entity_type, id, label),
        None => format!("{} {}", entity_type, id),
    }
}

/// Only `Project` names may span several directory levels
pub fn validate_folder_name(entity_type: &str, name: &str) -> std::result::Result<(), String> {
    let segments: Vec<&str> = if entity_type == "Project" {
        name.split('/').collect()
    } else {
        vec![name]
    };
    for segment in segments {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(format!("empty or relative segment in '{}'", name));
        }
        if let Some(bad) = segment.chars().find(|c| !is_safe_char(*c)) {
            return Err(format!("character '{}' in '{}'", bad, name));
        }
    }
    Ok(())
}

fn parse_sections(raw: &str) -> Result<Vec<Section>> {
    let mut sections = Vec::new();
    let mut optional: Option<Vec<Part>> = None;
    let mut literal = String::new();
    let mut chars = raw.chars();

    let flush = |literal: &mut String, optional: &mut Option<Vec<Part>>, sections: &mut Vec<Section>| {
        if literal.is_empty() {
            return;
        }
        let part = Part::Literal(std::mem::take(literal));
        match optional {
            Some(parts) => parts.push(part),
            None => sections.push(Section::Required(part)),
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '[' => {
                if optional.is_some() {
                    return Err(Error::expression(raw, "optional sections cannot be nested"));
                }
                flush(&mut literal, &mut optional, &mut sections);
                optional = Some(Vec::new());
            }
            ']' => {
                flush(&mut literal, &mut optional, &mut sections);
                match optional.take() {
                    Some(parts) => sections.push(Section::Optional(parts)),
                    None => return Err(Error::expression(raw, "unmatched ']'")),
                }
            }
            '{' => {
                flush(&mut literal, &mut optional, &mut sections);
                // regexes may hold their own braces
                let mut depth = 1;
                let mut body = String::new();
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    if depth == 0 {
                        break;
                    }
                    body.push(c);
                }
                if depth != 0 {
                    return Err(Error::expression(raw, "unmatched '{'"));
                }
                let part = Part::Field(parse_field(raw, &body)?);
                match optional.as_mut() {
                    Some(parts) => parts.push(part),
                    None => sections.push(Section::Required(part)),
                }
            }
            '}' => return Err(Error::expression(raw, "unmatched '}'")),
            other => literal.push(other),
        }
    }
    if optional.is_some() {
        return Err(Error::expression(raw, "unmatched '['"));
    }
    flush(&mut literal, &mut optional, &mut sections);
    Ok(sections)
}

fn parse_field(raw: &str, body: &str) -> Result<Field> {
    let (name, pattern) = match body.split_once(':') {
        Some((name, pattern)) => (name.trim(), Some(pattern)),
        None => (body.trim(), None),
    };
    if name.is_empty() {
        return Err(Error::expression(raw, "empty field name"));
    }
    let pattern = pattern
        .map(|p| {
            Regex::new(p).map_err(|e| Error::expression(raw, format!("bad regex for {}: {}", name, e)))
        })
        .transpose()?;
    Ok(Field {
        name: name.to_string(),
        pattern,
    })
}
