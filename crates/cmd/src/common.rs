// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result, anyhow};
use diagnostics::*;
use entitystore::MemoryStore;
use foldergen::{CONFIG_ENV, JsonPathCache, MemoryPathCache, PathCache, Pipeline, PipelineConfig};
use std::env;
use std::path::PathBuf;

/// Get the config path with an optional override, falling back to FOLDERGEN_CONFIG
pub fn get_config_path_with_override(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }

    env::var(CONFIG_ENV)
        .map_err(|_| anyhow!("{} environment variable not set and no --config given", CONFIG_ENV))
        .map(PathBuf::from)
}

/// Everything a command needs, loaded from one pipeline configuration
pub struct RunContext {
    pub config_path: PathBuf,
    pub config: PipelineConfig,
}

impl RunContext {
    /// Resolve the config location, then render and parse it with `vars`
    pub fn load(override_path: Option<PathBuf>, vars: &[String]) -> Result<Self> {
        let config_path = get_config_path_with_override(override_path)?;
        let vars = foldergen::parse_vars(vars)?;
        let config = PipelineConfig::open(&config_path, &vars)
            .with_context(|| format!("Failed to load pipeline config {}", config_path.display()))?;
        let shown = config_path.display().to_string();
        log_debug!("Loaded pipeline config {path}", path: shown);
        Ok(Self { config_path, config })
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        Pipeline::from_config(&self.config).with_context(|| {
            format!("Failed to compile folder schema {}", self.config.schema.display())
        })
    }

    /// The fixture-backed entity store named by the config
    pub fn open_store(&self) -> Result<MemoryStore> {
        let path = self
            .config
            .store
            .as_ref()
            .ok_or_else(|| anyhow!("{} does not name an entity store", self.config_path.display()))?;
        MemoryStore::from_yaml_file(path)
            .with_context(|| format!("Failed to load entity store {}", path.display()))
    }

    /// The JSON path cache if configured, else an empty in-memory one
    pub fn open_cache(&self) -> Result<Box<dyn PathCache>> {
        match &self.config.path_cache {
            Some(path) => {
                let cache = JsonPathCache::open(path)
                    .with_context(|| format!("Failed to open path cache {}", path.display()))?;
                Ok(Box::new(cache))
            }
            None => {
                log_warn!("No path_cache configured, associations will not be kept");
                Ok(Box::new(MemoryPathCache::new()))
            }
        }
    }
}
