// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use entitystore::{Condition, EntityStore, Filter, MemoryStore, StoreError};
use serde_json::json;

#[test]
fn test_fixture_file_roundtrip_through_queries() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("store.yml");
    std::fs::write(
        &path,
        r#"
entities:
  Asset:
    - { id: 5, code: hero, sg_asset_type: char }
    - { id: 6, code: chair, sg_asset_type: prop }
"#,
    )
    .unwrap();

    let mut store = MemoryStore::from_yaml_file(&path).unwrap();
    let props = Filter::all().with(Condition::is("sg_asset_type", json!("prop")));
    let found = store.find("Asset", &props, &["code".to_string()]).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["code"], json!("chair"));

    store
        .update_field("Asset", 5, "sg_asset_type", json!("prop"))
        .unwrap();
    assert_eq!(store.find("Asset", &props, &[]).unwrap().len(), 2);

    // Replacing a record by id keeps a single copy
    store.insert("Asset", 6, json!({"code": "stool"})).unwrap();
    let all = store.find("Asset", &Filter::all(), &["code".to_string()]).unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn test_missing_fixture_and_bad_records() {
    let err = MemoryStore::from_yaml_file("/definitely/not/here.yml").unwrap_err();
    assert!(matches!(err, StoreError::Fixture { .. }));

    let err = MemoryStore::from_yaml_str("entities:\n  Shot:\n    - { code: no_id }\n").unwrap_err();
    assert!(err.to_string().contains("without integer id"));

    let mut store = MemoryStore::new();
    assert!(store.insert("Shot", 1, json!("scalar")).is_err());
    assert!(store.update_field("Shot", 99, "code", json!("x")).is_err());
}
