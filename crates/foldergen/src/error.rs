// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

// Error types for folder generation
use entitystore::StoreError;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Invalid naming expression '{expression}': {message}")]
    Expression { expression: String, message: String },

    #[error("Could not create a folder name for {entity}: {message}")]
    NameGeneration { entity: String, message: String },

    #[error("Folder name '{name}' for {entity} contains characters not allowed in a folder name")]
    InvalidFolderName { entity: String, name: String },

    #[error("{entity_type} {id} does not exist in the entity store. Perhaps it has been deleted?")]
    EntityNotFound { entity_type: String, id: i64 },

    #[error("No folder in the schema holds {0} entities")]
    UnknownEntityType(String),

    #[error("Folder creation aborted: {0}")]
    PathConflict(String),

    #[error("No data for '{key}' while resolving {context}")]
    MissingData { key: String, context: String },

    #[error("No HumanUser with login '{0}' exists in the entity store")]
    UserNotFound(String),

    #[error("Could not determine the current user login")]
    NoCurrentUser,

    #[error("Storage root '{0}' is not defined in the pipeline configuration")]
    UnknownRoot(String),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    Glob { pattern: String, message: String },

    #[error("Entity store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
}

impl Error {
    pub fn config<P: AsRef<Path>, S: Into<String>>(path: P, message: S) -> Self {
        Error::Config {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn expression<E: AsRef<str>, S: Into<String>>(expression: E, message: S) -> Self {
        Error::Expression {
            expression: expression.as_ref().to_string(),
            message: message.into(),
        }
    }

    pub fn missing_data<K: ToString, S: Into<String>>(key: K, context: S) -> Self {
        Error::MissingData {
            key: key.to_string(),
            context: context.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a traversal step that did not produce a value
///
/// `Mismatch` means "this branch of the schema does not apply to the entity"
/// and callers skip the branch. `Fatal` aborts the whole request.
#[derive(Debug, thiserror::Error)]
pub enum TraversalOutcome {
    #[error("Entity link mismatch: {0}")]
    Mismatch(String),

    #[error(transparent)]
    Fatal(#[from] Error),
}

impl From<StoreError> for TraversalOutcome {
    fn from(err: StoreError) -> Self {
        TraversalOutcome::Fatal(Error::Store(err))
    }
}

pub type TraversalResult<T> = std::result::Result<T, TraversalOutcome>;
