// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end folder creation requests against an in-memory entity store

use entitystore::{Condition, EntityStore, Filter, MemoryStore};
use foldergen::{
    DefaultValueFormatter, Error, FolderCreator, JsonPathCache, LocalFilesystemHook, MemoryPathCache,
    PathCache, Pipeline, RecordedOp, RecordingHook, compile,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STORE: &str = r#"
entities:
  Project:
    - { id: 1, name: Big Buck, tank_name: big_buck }
  Sequence:
    - { id: 7, code: seq01, project: { type: Project, id: 1 } }
  Shot:
    - { id: 42, code: ext_wide, sg_status_list: ip, sg_sequence: { type: Sequence, id: 7 }, project: { type: Project, id: 1 } }
    - { id: 43, code: int_car, sg_status_list: ip, sg_sequence: { type: Sequence, id: 7 }, project: { type: Project, id: 1 } }
    - { id: 44, code: sh_omit, sg_status_list: omt, sg_sequence: { type: Sequence, id: 7 }, project: { type: Project, id: 1 } }
  Asset:
    - { id: 5, code: hero, sg_asset_type: char, project: { type: Project, id: 1 } }
  Step:
    - { id: 3, code: Animation, short_name: anim }
    - { id: 4, code: Lighting, short_name: light }
  Task:
    - { id: 100, content: animate, entity: { type: Shot, id: 42 }, step: { type: Step, id: 3 } }
  HumanUser:
    - { id: 20, login: jdoe }
schema:
  Asset:
    sg_asset_type: { data_type: list, valid_values: [char, prop] }
"#;

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn folder(root: &Path, rel: &str, config: &str) {
    fs::create_dir_all(root.join(rel)).unwrap();
    write(root, &format!("{}.yml", rel), config);
}

/// project / sequence / shot
fn shot_schema() -> TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    folder(root, "project", "type: project\n");
    folder(
        root,
        "project/sequence",
        "type: shotgun_entity\nentity_type: Sequence\nname: code\nfilters:\n  - { path: project, relation: is, values: [$project] }\n",
    );
    folder(
        root,
        "project/sequence/shot",
        "type: shotgun_entity\nentity_type: Shot\nname: code\nfilters:\n  - { path: sg_sequence, relation: is, values: [$sequence] }\n  - { path: sg_status_list, relation: is_not, values: [omt] }\n",
    );
    tmp
}

fn add_steps(root: &Path, step_config: &str) {
    folder(root, "project/sequence/shot/step", step_config);
    folder(root, "project/sequence/shot/step/task", "type: shotgun_task\n");
}

fn store() -> MemoryStore {
    MemoryStore::from_yaml_str(STORE).unwrap()
}

fn pipeline(schema: &Path) -> Pipeline {
    let roots = BTreeMap::from([("primary".to_string(), PathBuf::from("/mnt"))]);
    Pipeline::new(compile(schema).unwrap(), roots).with_current_user(Some("jdoe".to_string()))
}

fn request(
    pipeline: &Pipeline,
    store: &MemoryStore,
    cache: &mut dyn PathCache,
    entity_type: &str,
    ids: &[i64],
    defer: Option<&str>,
) -> foldergen::Result<Vec<PathBuf>> {
    let hook = RecordingHook::new();
    FolderCreator::new(pipeline, store, cache, &hook).process_filesystem_structure(entity_type, ids, false, defer)
}

fn paths(list: &[&str]) -> Vec<PathBuf> {
    list.iter().map(PathBuf::from).collect()
}

#[test]
fn test_shot_request_builds_primary_chain() {
    let tmp = shot_schema();
    let pipeline = pipeline(tmp.path());
    let store = store();
    let mut cache = MemoryPathCache::new();

    let created = request(&pipeline, &store, &mut cache, "Shot", &[42], None).unwrap();
    assert_eq!(
        created,
        paths(&["/mnt/big_buck", "/mnt/big_buck/seq01", "/mnt/big_buck/seq01/ext_wide"])
    );
    assert_eq!(
        cache.paths_for_entity("Shot", 42).unwrap(),
        paths(&["/mnt/big_buck/seq01/ext_wide"])
    );
    assert_eq!(
        cache.entity_for_path(Path::new("/mnt/big_buck/seq01")).unwrap().unwrap().id,
        7
    );
    // siblings of the requested shot are left alone
    assert!(cache.paths_for_entity("Shot", 43).unwrap().is_empty());
}

#[test]
fn test_folder_name_matches_direct_evaluation() {
    let tmp = shot_schema();
    let pipeline = pipeline(tmp.path());
    let store = store();
    let mut cache = MemoryPathCache::new();

    for id in [42, 43] {
        let created = request(&pipeline, &store, &mut cache, "Shot", &[id], None).unwrap();
        let shot_node = pipeline.tree().node(pipeline.tree().nodes_for_entity_type("Shot")[0]);
        let expression = &shot_node.entity_node().unwrap().expression;
        let record = store
            .find_one(
                "Shot",
                &Filter::all().with(Condition::is("id", json!(id))),
                &expression.fields_to_fetch(),
            )
            .unwrap()
            .unwrap();
        let expected = expression
            .generate_name("Shot", &record, &DefaultValueFormatter)
            .unwrap();
        let last = created.last().unwrap();
        assert_eq!(last.file_name().unwrap().to_string_lossy(), expected);
    }
}

#[test]
fn test_constrained_static_folder() {
    let tmp = shot_schema();
    folder(
        tmp.path(),
        "project/sequence/shot/exterior",
        "type: static\nconstrain_by_entity: $shot\nconstraints:\n  - { path: code, relation: contains, values: [ext] }\n",
    );
    let pipeline = pipeline(tmp.path());
    let store = store();
    let mut cache = MemoryPathCache::new();

    let ext = request(&pipeline, &store, &mut cache, "Shot", &[42], None).unwrap();
    assert!(ext.contains(&PathBuf::from("/mnt/big_buck/seq01/ext_wide/exterior")));

    let int = request(&pipeline, &store, &mut cache, "Shot", &[43], None).unwrap();
    assert_eq!(int.last().unwrap(), &PathBuf::from("/mnt/big_buck/seq01/int_car"));
    assert!(!int.iter().any(|p| p.ends_with("exterior")));
}

#[test]
fn test_conflicting_request_leaves_cache_untouched() {
    let tmp = shot_schema();
    let pipeline = pipeline(tmp.path());
    let mut store = store();
    let mut cache = MemoryPathCache::new();

    _ = request(&pipeline, &store, &mut cache, "Shot", &[42], None).unwrap();
    let before = cache.entries().to_vec();

    // a second shot now computes the same folder
    store.update_field("Shot", 43, "code", json!("ext_wide")).unwrap();
    let err = request(&pipeline, &store, &mut cache, "Shot", &[43], None).unwrap_err();
    assert!(matches!(err, Error::PathConflict(_)), "{}", err);
    assert_eq!(cache.entries(), before.as_slice());
}

#[test]
fn test_renamed_entity_is_a_conflict() {
    let tmp = shot_schema();
    let pipeline = pipeline(tmp.path());
    let mut store = store();
    let mut cache = MemoryPathCache::new();

    _ = request(&pipeline, &store, &mut cache, "Shot", &[42], None).unwrap();
    store.update_field("Shot", 42, "code", json!("ext_wider")).unwrap();
    let err = request(&pipeline, &store, &mut cache, "Shot", &[42], None).unwrap_err();
    assert!(err.to_string().contains("renamed"), "{}", err);
}

#[test]
fn test_repeated_request_is_idempotent() {
    let tmp = shot_schema();
    add_steps(tmp.path(), "type: shotgun_step\n");
    let pipeline = pipeline(tmp.path());
    let store = store();
    let mut cache = MemoryPathCache::new();

    let first = request(&pipeline, &store, &mut cache, "Task", &[100], None).unwrap();
    let entries = cache.entries().len();
    let second = request(&pipeline, &store, &mut cache, "Task", &[100], None).unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.entries().len(), entries);
}

#[test]
fn test_task_request_creates_step_and_task() {
    let tmp = shot_schema();
    add_steps(tmp.path(), "type: shotgun_step\n");
    let pipeline = pipeline(tmp.path());
    let store = store();
    let mut cache = MemoryPathCache::new();

    let created = request(&pipeline, &store, &mut cache, "Task", &[100], None).unwrap();
    assert_eq!(
        created,
        paths(&[
            "/mnt/big_buck",
            "/mnt/big_buck/seq01",
            "/mnt/big_buck/seq01/ext_wide",
            "/mnt/big_buck/seq01/ext_wide/anim",
            "/mnt/big_buck/seq01/ext_wide/anim/animate",
        ])
    );

    // primary first, then the step folder the task was registered on
    assert_eq!(
        cache.paths_for_entity("Task", 100).unwrap(),
        paths(&[
            "/mnt/big_buck/seq01/ext_wide/anim/animate",
            "/mnt/big_buck/seq01/ext_wide/anim",
        ])
    );
    assert_eq!(
        cache.paths_for_entity("Step", 3).unwrap(),
        paths(&[
            "/mnt/big_buck/seq01/ext_wide/anim",
            "/mnt/big_buck/seq01/ext_wide/anim/animate",
        ])
    );
    // no task on the shot uses lighting
    assert!(cache.paths_for_entity("Step", 4).unwrap().is_empty());
}

#[test]
fn test_shot_request_stops_at_task_folders() {
    let tmp = shot_schema();
    add_steps(tmp.path(), "type: shotgun_step\n");
    let pipeline = pipeline(tmp.path());
    let store = store();
    let mut cache = MemoryPathCache::new();

    let created = request(&pipeline, &store, &mut cache, "Shot", &[42], None).unwrap();
    assert_eq!(created.last().unwrap(), &PathBuf::from("/mnt/big_buck/seq01/ext_wide/anim"));
    assert!(cache.paths_for_entity("Task", 100).unwrap().is_empty());
}

#[test]
fn test_deferred_step_folders() {
    let tmp = shot_schema();
    add_steps(tmp.path(), "type: shotgun_step\ndefer_creation: maya\n");
    let pipeline = pipeline(tmp.path());
    let store = store();
    let step = PathBuf::from("/mnt/big_buck/seq01/ext_wide/anim");

    let mut cache = MemoryPathCache::new();
    let plain = request(&pipeline, &store, &mut cache, "Shot", &[42], None).unwrap();
    assert!(!plain.contains(&step));

    let nuke = request(&pipeline, &store, &mut cache, "Shot", &[42], Some("nuke")).unwrap();
    assert!(!nuke.contains(&step));

    let maya = request(&pipeline, &store, &mut cache, "Shot", &[42], Some("maya")).unwrap();
    assert!(maya.contains(&step));
}

#[test]
fn test_symlink_target_joins_computed_names() {
    let tmp = shot_schema();
    write(
        tmp.path(),
        "project/sequence/shot/latest.symlink.yml",
        "target: /$project/$sequence/$shot\n",
    );
    write(
        tmp.path(),
        "project/sequence/shot/up.symlink.yml",
        "target: ../$shot\n",
    );
    let pipeline = pipeline(tmp.path());
    let store = store();
    let mut cache = MemoryPathCache::new();
    let hook = RecordingHook::new();

    _ = FolderCreator::new(&pipeline, &store, &mut cache, &hook)
        .process_filesystem_structure("Shot", &[42], false, None)
        .unwrap();

    let links: BTreeMap<PathBuf, PathBuf> = hook
        .ops()
        .into_iter()
        .filter_map(|op| match op {
            RecordedOp::Symlink { path, target } => Some((path, target)),
            _ => None,
        })
        .collect();
    let shot = Path::new("/mnt/big_buck/seq01/ext_wide");
    let latest = &links[&shot.join("latest")];
    assert_eq!(latest, Path::new("/big_buck/seq01/ext_wide"));
    // one separator per segment for an absolute target
    assert_eq!(latest.to_string_lossy().matches('/').count(), 3);
    assert_eq!(links[&shot.join("up")], Path::new("../ext_wide"));
}

#[test]
fn test_list_field_ancestor() {
    let tmp = shot_schema();
    folder(
        tmp.path(),
        "project/asset_type",
        "type: shotgun_list_field\nentity_type: Asset\nfield_name: sg_asset_type\n",
    );
    folder(
        tmp.path(),
        "project/asset_type/asset",
        "type: shotgun_entity\nentity_type: Asset\nname: code\nfilters:\n  - { path: project, relation: is, values: [$project] }\n  - { path: sg_asset_type, relation: is, values: [$asset_type] }\n",
    );
    let pipeline = pipeline(tmp.path());
    let store = store();
    let mut cache = MemoryPathCache::new();

    let created = request(&pipeline, &store, &mut cache, "Asset", &[5], None).unwrap();
    assert_eq!(
        created,
        paths(&["/mnt/big_buck", "/mnt/big_buck/char", "/mnt/big_buck/char/hero"])
    );

    // list values are not created along with the project by default
    let project = request(&pipeline, &store, &mut cache, "Project", &[1], None).unwrap();
    assert_eq!(project, paths(&["/mnt/big_buck"]));
}

#[test]
fn test_list_field_without_values() {
    let tmp = shot_schema();
    folder(
        tmp.path(),
        "project/asset_type",
        "type: shotgun_list_field\nentity_type: Asset\nfield_name: sg_asset_type\ncreate_with_parent: true\n",
    );
    let pipeline = pipeline(tmp.path());
    let mut store = store();
    let mut cache = MemoryPathCache::new();

    let full = request(&pipeline, &store, &mut cache, "Project", &[1], None).unwrap();
    assert_eq!(
        full,
        paths(&["/mnt/big_buck", "/mnt/big_buck/char", "/mnt/big_buck/prop"])
    );

    store.set_field_schema("Asset", "sg_asset_type", entitystore::FieldSchema::default());
    let empty = request(&pipeline, &store, &mut cache, "Project", &[1], None).unwrap();
    assert_eq!(empty, paths(&["/mnt/big_buck"]));
}

#[test]
fn test_user_workspace_follows_current_user() {
    let tmp = shot_schema();
    folder(tmp.path(), "project/sequence/shot/work", "type: user_workspace\n");
    let store = store();
    let mut cache = MemoryPathCache::new();

    let jdoe = pipeline(tmp.path());
    let created = request(&jdoe, &store, &mut cache, "Shot", &[42], None).unwrap();
    assert_eq!(created.last().unwrap(), &PathBuf::from("/mnt/big_buck/seq01/ext_wide/jdoe"));

    let stranger = pipeline(tmp.path()).with_current_user(Some("nobody".to_string()));
    let err = request(&stranger, &store, &mut cache, "Shot", &[42], None).unwrap_err();
    assert!(matches!(err, Error::UserNotFound(_)));
}

#[test]
fn test_request_errors_and_skips() {
    let tmp = shot_schema();
    let pipeline = pipeline(tmp.path());
    let store = store();
    let mut cache = MemoryPathCache::new();

    // filtered out by its folder: nothing to create, not an error
    let omitted = request(&pipeline, &store, &mut cache, "Shot", &[44], None).unwrap();
    assert!(omitted.is_empty());

    let missing = request(&pipeline, &store, &mut cache, "Shot", &[999], None).unwrap_err();
    assert!(matches!(missing, Error::EntityNotFound { id: 999, .. }));

    let unknown = request(&pipeline, &store, &mut cache, "Playlist", &[1], None).unwrap_err();
    assert!(matches!(unknown, Error::UnknownEntityType(t) if t == "Playlist"));

    assert!(cache.entries().is_empty());
}

#[test]
fn test_preview_writes_nothing() {
    let tmp = shot_schema();
    let pipeline = pipeline(tmp.path());
    let store = store();
    let mut cache = MemoryPathCache::new();
    let hook = RecordingHook::new();

    let previewed = FolderCreator::new(&pipeline, &store, &mut cache, &hook)
        .process_filesystem_structure("Shot", &[42, 43], true, None)
        .unwrap();
    assert_eq!(previewed.len(), 4);
    assert!(cache.entries().is_empty());
    assert!(hook.folders().is_empty());
}

#[test]
fn test_local_filesystem_with_json_cache() {
    let tmp = shot_schema();
    write(tmp.path(), "project/sequence/shot/notes.txt", "shot notes\n");
    let out = tempfile::tempdir().unwrap();
    let roots = BTreeMap::from([("primary".to_string(), out.path().join("projects"))]);
    let pipeline = Pipeline::new(compile(tmp.path()).unwrap(), roots);
    let store = store();
    let cache_file = out.path().join("cache/path_cache.json");

    {
        let mut cache = JsonPathCache::open(&cache_file).unwrap();
        assert!(cache.updated_at().is_none());
        _ = FolderCreator::new(&pipeline, &store, &mut cache, &LocalFilesystemHook)
            .process_filesystem_structure("Shot", &[42], false, None)
            .unwrap();
    }

    let shot = out.path().join("projects/big_buck/seq01/ext_wide");
    assert!(shot.is_dir());
    assert_eq!(fs::read_to_string(shot.join("notes.txt")).unwrap(), "shot notes\n");

    let reopened = JsonPathCache::open(&cache_file).unwrap();
    assert!(reopened.updated_at().is_some());
    assert_eq!(reopened.paths_for_entity("Shot", 42).unwrap(), vec![shot]);
}

#[test]
fn test_project_on_each_storage_root() {
    let tmp = shot_schema();
    let root = tmp.path();
    folder(root, "archive", "type: project\nroot_name: archive\n");
    folder(
        root,
        "archive/sequence",
        "type: shotgun_entity\nentity_type: Sequence\nname: code\nfilters:\n  - { path: project, relation: is, values: [$project] }\n",
    );
    folder(
        root,
        "archive/sequence/shot",
        "type: shotgun_entity\nentity_type: Shot\nname: code\nfilters:\n  - { path: sg_sequence, relation: is, values: [$sequence] }\n",
    );
    let roots = BTreeMap::from([
        ("primary".to_string(), PathBuf::from("/mnt")),
        ("archive".to_string(), PathBuf::from("/archive")),
    ]);
    let pipeline = Pipeline::new(compile(root).unwrap(), roots);
    let store = store();
    let mut cache = MemoryPathCache::new();

    let created = request(&pipeline, &store, &mut cache, "Shot", &[42], None).unwrap();
    for path in ["/mnt/big_buck/seq01/ext_wide", "/archive/big_buck/seq01/ext_wide"] {
        assert!(created.contains(&PathBuf::from(path)), "{:?}", created);
    }

    let mut shot_paths = cache.paths_for_entity("Shot", 42).unwrap();
    shot_paths.sort();
    assert_eq!(
        shot_paths,
        paths(&["/archive/big_buck/seq01/ext_wide", "/mnt/big_buck/seq01/ext_wide"])
    );
    assert_eq!(cache.paths_for_entity("Project", 1).unwrap().len(), 2);

    // a second pass finds both roots already consistent
    let again = request(&pipeline, &store, &mut cache, "Shot", &[42], None).unwrap();
    assert_eq!(again, created);
}

#[test]
fn test_name_link_fields_register_secondary_entities() {
    let tmp = shot_schema();
    let root = tmp.path();
    write(
        root,
        "project/sequence/shot.yml",
        "type: shotgun_entity\nentity_type: Shot\nname: \"{sg_sequence.Sequence.code}_{code}\"\nfilters:\n  - { path: sg_sequence, relation: is, values: [$sequence] }\n",
    );
    let pipeline = pipeline(root);
    let store = store();
    let mut cache = MemoryPathCache::new();

    let created = request(&pipeline, &store, &mut cache, "Shot", &[42], None).unwrap();
    let shot = PathBuf::from("/mnt/big_buck/seq01/seq01_ext_wide");
    assert_eq!(created.last(), Some(&shot));

    let entries = cache.entries_for_path(&shot).unwrap();
    let primary = entries.iter().find(|e| e.is_primary).unwrap();
    assert_eq!((primary.entity_type.as_str(), primary.entity_id), ("Shot", 42));
    let secondary = entries.iter().find(|e| !e.is_primary).unwrap();
    assert_eq!((secondary.entity_type.as_str(), secondary.entity_id), ("Sequence", 7));

    // the shot path still resolves to the shot, the sequence folder stays listed first
    assert_eq!(cache.entity_for_path(&shot).unwrap().unwrap().id, 42);
    assert_eq!(
        cache.paths_for_entity("Sequence", 7).unwrap(),
        vec![PathBuf::from("/mnt/big_buck/seq01"), shot]
    );
}
