// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Schema compiler
//!
//! Walks a schema directory and builds the [`SchemaTree`]. A folder `shot/`
//! with a sibling `shot.yml` is dispatched on the file's `type` key; a folder
//! without one is a plain static folder. `name.symlink.yml` files declare
//! symlinks and every other file is copied into each folder created for its
//! parent.

use crate::error::{Error, Result};
use crate::node::{DeferCreation, NodeId, NodeKind, SchemaTree, StaticNode, SymlinkSpec};
use crate::registry::{FolderTypeRegistry, NodeContext};
use crate::token::SymlinkTarget;
use diagnostics::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use wax::{Glob, Pattern};

/// Optional file at the schema root listing globs to leave out
pub const IGNORE_FILE: &str = "ignore_files";

const METADATA_EXT: &str = "yml";
const SYMLINK_SUFFIX: &str = ".symlink.yml";

struct Compiler {
    tree: SchemaTree,
    ignore: Vec<Glob<'static>>,
}

pub fn compile<P: AsRef<Path>>(schema_root: P) -> Result<SchemaTree> {
    let schema_root = schema_root.as_ref();
    let root_str = schema_root.display().to_string();
    log_info!("Compiling folder schema at {root}", root: root_str);

    if !schema_root.is_dir() {
        return Err(Error::config(schema_root, "schema root is not a directory"));
    }

    let mut compiler = Compiler {
        tree: SchemaTree::new(schema_root),
        ignore: read_ignore_patterns(schema_root)?,
    };
    compiler.walk(schema_root, None)?;

    if compiler.tree.roots().is_empty() {
        return Err(Error::config(schema_root, "schema defines no project folder"));
    }
    let count = compiler.tree.len();
    log_info!("Compiled folder schema with {count} nodes", count: count);
    Ok(compiler.tree)
}

fn read_ignore_patterns(schema_root: &Path) -> Result<Vec<Glob<'static>>> {
    let path = schema_root.join(IGNORE_FILE);
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&path)?;
    let mut globs = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let glob = Glob::new(line).map_err(|e| Error::Glob {
            pattern: line.to_string(),
            message: e.to_string(),
        })?;
        globs.push(glob.into_owned());
    }
    Ok(globs)
}

impl Compiler {
    fn is_ignored(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(self.tree.schema_root()) else {
            return false;
        };
        self.ignore.iter().any(|g| g.is_match(relative))
    }

    fn sorted_entries(&self, dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if self.is_ignored(&path) {
                let shown = path.display().to_string();
                log_debug!("Ignoring schema entry {path}", path: shown);
                continue;
            }
            if path.is_dir() {
                dirs.push(path);
            } else {
                files.push(path);
            }
        }
        dirs.sort();
        files.sort();
        Ok((dirs, files))
    }

    fn walk(&mut self, dir: &Path, parent: Option<NodeId>) -> Result<()> {
        let (dirs, files) = self.sorted_entries(dir)?;

        for sub in &dirs {
            let metadata = dir.join(format!("{}.{}", file_name(sub), METADATA_EXT));
            let node = if metadata.is_file() {
                self.typed_node(sub, &metadata, parent)?
            } else if parent.is_none() {
                return Err(Error::config(
                    sub,
                    format!(
                        "top-level folders must be projects; {} is missing",
                        metadata.display()
                    ),
                ));
            } else {
                self.tree.push(
                    sub.clone(),
                    parent,
                    NodeKind::Static(StaticNode { constraint: None }),
                    Value::Null,
                )
            };
            self.check_single_occurrence(node)?;
            self.walk(sub, Some(node))?;
        }

        for file in &files {
            let name = file_name(file);
            if parent.is_none() && name == IGNORE_FILE {
                continue;
            }
            if name.ends_with(SYMLINK_SUFFIX) {
                self.attach_symlink(file, parent)?;
                continue;
            }
            // metadata for a sibling folder
            if file.extension().is_some_and(|e| e == METADATA_EXT) && file.with_extension("").is_dir() {
                continue;
            }
            match parent {
                Some(p) => self.tree.node_mut(p).files.push(file.clone()),
                None => {
                    let shown = file.display().to_string();
                    log_debug!("Skipping file at schema root {path}", path: shown);
                }
            }
        }
        Ok(())
    }

    fn typed_node(&mut self, dir: &Path, metadata: &Path, parent: Option<NodeId>) -> Result<NodeId> {
        let config = read_yaml(metadata)?;
        let type_name = config
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::config(metadata, "missing required key 'type'"))?;
        let folder_type = FolderTypeRegistry::get(type_name)
            .ok_or_else(|| Error::config(metadata, format!("unknown folder type '{}'", type_name)))?;
        if parent.is_none() && folder_type.name != "project" {
            return Err(Error::config(
                metadata,
                format!("top-level folders must be projects, not '{}'", type_name),
            ));
        }

        let kind = (folder_type.build)(&NodeContext {
            tree: &self.tree,
            parent,
            config_path: metadata,
            config: &config,
        })?;

        let create_with_parent = match config.get("create_with_parent") {
            None => folder_type.create_with_parent,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(Error::config(
                    metadata,
                    format!("create_with_parent must be true or false, got {}", other),
                ));
            }
        };
        let defer = parse_defer(metadata, config.get("defer_creation"))?;

        let id = self.tree.push(dir.to_path_buf(), parent, kind, config);
        let node = self.tree.node_mut(id);
        node.create_with_parent = create_with_parent;
        node.defer = defer;
        Ok(id)
    }

    fn check_single_occurrence(&self, id: NodeId) -> Result<()> {
        let node = self.tree.node(id);
        let Some(key) = node.data_key() else {
            return Ok(());
        };
        let Some(parent) = node.parent else {
            return Ok(());
        };
        if let Some(dup) = self.tree.ancestors(parent).find(|n| n.data_key().as_ref() == Some(&key)) {
            return Err(Error::config(
                &node.path,
                format!(
                    "{} already appears above this folder at {}",
                    key,
                    dup.path.display()
                ),
            ));
        }
        Ok(())
    }

    fn attach_symlink(&mut self, file: &Path, parent: Option<NodeId>) -> Result<()> {
        let Some(owner) = parent else {
            return Err(Error::config(file, "symlinks cannot be declared at the schema root"));
        };
        let config = read_yaml(file)?;
        let target = config
            .get("target")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::config(file, "missing required key 'target'"))?;
        let target = SymlinkTarget::parse(&self.tree, owner, target, file)?;
        let name = file_name(file).trim_end_matches(SYMLINK_SUFFIX).to_string();
        self.tree.node_mut(owner).symlinks.push(SymlinkSpec {
            name,
            target,
            metadata: config,
        });
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_yaml(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)?;
    let value: Value = serde_yaml_ng::from_str(&text)
        .map_err(|e| Error::config(path, format!("invalid YAML: {}", e)))?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Default::default())),
        _ => Err(Error::config(path, "expected a mapping of keys")),
    }
}

fn parse_defer(path: &Path, raw: Option<&Value>) -> Result<DeferCreation> {
    Ok(match raw {
        None | Some(Value::Null) | Some(Value::Bool(false)) => DeferCreation::Never,
        Some(Value::Bool(true)) => DeferCreation::Any,
        Some(Value::String(s)) => DeferCreation::from_contexts(s),
        Some(Value::Array(items)) => {
            let mut contexts = Vec::with_capacity(items.len());
            for item in items {
                let s = item.as_str().ok_or_else(|| {
                    Error::config(path, format!("defer_creation entries must be strings, got {}", item))
                })?;
                contexts.push(s.trim().to_string());
            }
            DeferCreation::Contexts(contexts)
        }
        Some(other) => {
            return Err(Error::config(
                path,
                format!("defer_creation must be a bool, string or list, got {}", other),
            ));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use std::fs;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn schema() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write(root, "project.yml", "type: project\n");
        write(root, "project/editorial/readme.txt", "hello");
        write(
            root,
            "project/sequences/sequence.yml",
            "type: shotgun_entity\nentity_type: Sequence\nname: \"{code}\"\nfilters:\n  - { path: project, relation: is, values: [$project] }\n",
        );
        write(
            root,
            "project/sequences/sequence/shot.yml",
            "type: shotgun_entity\nentity_type: Shot\nname: \"{code}\"\nfilters:\n  - { path: sg_sequence, relation: is, values: [$sequence] }\n",
        );
        write(
            root,
            "project/sequences/sequence/shot/step.yml",
            "type: shotgun_step\ndefer_creation: maya, nuke\n",
        );
        fs::create_dir_all(root.join("project/sequences/sequence/shot/step/work")).unwrap();
        write(
            root,
            "project/sequences/sequence/shot/current.symlink.yml",
            "target: ../$sequence\n",
        );
        tmp
    }

    #[test]
    fn test_compile_structure() {
        let tmp = schema();
        let tree = compile(tmp.path()).unwrap();
        assert_eq!(tree.roots().len(), 1);
        // project, editorial, sequences, sequence, shot, step, work
        assert_eq!(tree.len(), 7);

        let shot = tree.nodes_for_entity_type("Shot")[0];
        let shot_node = tree.node(shot);
        assert_eq!(shot_node.symlinks.len(), 1);
        assert_eq!(shot_node.symlinks[0].name, "current");
        assert!(!shot_node.create_with_parent);

        let step = tree.nodes_for_entity_type("Step")[0];
        match &tree.node(step).kind {
            NodeKind::Step { associated, entity } => {
                assert_eq!(*associated, Some(shot));
                // $FROM$ association plus the current step
                assert_eq!(entity.filters.conditions().count(), 2);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(
            tree.node(step).defer,
            DeferCreation::Contexts(vec!["maya".to_string(), "nuke".to_string()])
        );

        let editorial = tree.iter().find(|n| n.name() == "editorial").unwrap();
        assert!(!editorial.is_dynamic());
        assert_eq!(editorial.files.len(), 1);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let tmp = schema();
        let a = compile(tmp.path()).unwrap();
        let b = compile(tmp.path()).unwrap();
        assert_eq!(a.render(), b.render());
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn test_duplicate_entity_type_on_one_path() {
        let tmp = schema();
        write(
            tmp.path(),
            "project/sequences/sequence/shot/step/work/shot.yml",
            "type: shotgun_entity\nentity_type: Shot\nname: \"{code}\"\nfilters: []\n",
        );
        fs::create_dir_all(tmp.path().join("project/sequences/sequence/shot/step/work/shot")).unwrap();
        let err = compile(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("Shot already appears"), "{}", err);
    }

    #[test]
    fn test_unresolvable_token() {
        let tmp = schema();
        write(
            tmp.path(),
            "project/assets/asset.yml",
            "type: shotgun_entity\nentity_type: Asset\nname: \"{code}\"\nfilters:\n  - { path: shots, relation: is, values: [$shot] }\n",
        );
        fs::create_dir_all(tmp.path().join("project/assets/asset")).unwrap();
        let err = compile(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("$shot"));
    }

    #[test]
    fn test_top_level_must_be_project() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("loose")).unwrap();
        assert!(matches!(compile(tmp.path()), Err(Error::Config { .. })));
    }

    #[test]
    fn test_ignore_files() {
        let tmp = schema();
        write(tmp.path(), IGNORE_FILE, "# editor droppings\n**/*.txt\n");
        let tree = compile(tmp.path()).unwrap();
        assert!(tree.iter().all(|n| n.files.is_empty()));
    }
}
