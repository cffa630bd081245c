// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Turning entity store field values into folder name fragments

use serde_json::Value;

/// Studio hook converting one field value into text for a folder name
pub trait ValueFormatter {
    fn format(&self, entity_type: &str, entity_id: Option<i64>, field: &str, value: &Value) -> String;
}

/// Links become their display name, lists are comma joined, and anything
/// that is not a word character, `-` or `.` becomes `_`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueFormatter;

impl DefaultValueFormatter {
    fn raw_text(value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(items) => items
                .iter()
                .map(Self::raw_text)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(map) => match (map.get("name"), map.get("type"), map.get("id")) {
                (Some(Value::String(name)), _, _) => name.clone(),
                (_, Some(t), Some(id)) => format!("{}_{}", Self::raw_text(t), id),
                _ => String::new(),
            },
        }
    }
}

/// Word characters, `-` and `.` may appear in a folder name
pub fn is_safe_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if is_safe_char(c) { c } else { '_' })
        .collect()
}

impl ValueFormatter for DefaultValueFormatter {
    fn format(&self, entity_type: &str, _entity_id: Option<i64>, field: &str, value: &Value) -> String {
        let text = Self::raw_text(value);
        if entity_type == "Project" && field == "tank_name" {
            // multi-level project names keep their separators
            return text.split('/').map(sanitize).collect::<Vec<_>>().join("/");
        }
        sanitize(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_formatting() {
        let f = DefaultValueFormatter;
        assert_eq!(f.format("Shot", Some(1), "code", &json!("sh 010")), "sh_010");
        assert_eq!(f.format("Shot", Some(1), "code", &json!(12)), "12");
        assert_eq!(f.format("Shot", Some(1), "code", &Value::Null), "");
        assert_eq!(
            f.format("Shot", Some(1), "sg_sequence", &json!({"type": "Sequence", "id": 7, "name": "seq/01"})),
            "seq_01"
        );
        assert_eq!(
            f.format("Asset", Some(1), "tags", &json!(["a", "b"])),
            "a_b"
        );
    }

    #[test]
    fn test_project_tank_name_keeps_levels() {
        let f = DefaultValueFormatter;
        assert_eq!(
            f.format("Project", Some(1), "tank_name", &json!("studio/big buck")),
            "studio/big_buck"
        );
        assert_eq!(f.format("Project", Some(1), "name", &json!("a/b")), "a_b");
    }
}
