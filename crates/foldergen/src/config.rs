// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Pipeline configuration file

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming the pipeline configuration file
pub const CONFIG_ENV: &str = "FOLDERGEN_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Root of the folder schema tree
    pub schema: PathBuf,
    /// Storage roots by `root_name`
    pub roots: BTreeMap<String, PathBuf>,
    /// JSON path cache; kept in memory when absent
    #[serde(default)]
    pub path_cache: Option<PathBuf>,
    /// Entity store fixture
    #[serde(default)]
    pub store: Option<PathBuf>,
    /// Login of the user whose workspace folders are created
    #[serde(default)]
    pub current_user: Option<String>,
}

impl PipelineConfig {
    /// Render `filename` as a template with `vars`, then parse it
    ///
    /// Relative paths are taken relative to the directory holding the file.
    pub fn open<P: AsRef<Path>>(filename: P, vars: &[(String, String)]) -> Result<Self> {
        let filename = filename.as_ref();
        let file = std::fs::read_to_string(filename)
            .map_err(|e| Error::config(filename, format!("could not read file: {}", e)))?;

        let mut ctx = tera::Context::new();
        for (k, v) in vars {
            ctx.insert(k, v);
        }
        let expanded = tera::Tera::one_off(&file, &ctx, false)?;

        let mut config = Self::from_yaml_str(&expanded)
            .map_err(|e| Error::config(filename, e.to_string()))?;
        let base = filename.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_relative(base);
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(text)?;
        if config.roots.is_empty() {
            return Err(Error::config("<pipeline config>", "at least one storage root is required"));
        }
        Ok(config)
    }

    fn resolve_relative(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.schema);
        self.roots.values_mut().for_each(fix);
        self.path_cache.iter_mut().for_each(fix);
        self.store.iter_mut().for_each(fix);
    }

    /// The configured user, else the login of the current OS user
    pub fn user_login(&self) -> Option<String> {
        self.current_user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .filter(|u| !u.is_empty())
    }
}

/// Split `key=value` command line variables
pub fn parse_vars<S: AsRef<str>>(raw: &[S]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|s| {
            let s = s.as_ref();
            s.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| Error::config("<command line>", format!("expected key=value, got '{}'", s)))
        })
        .collect()
}
