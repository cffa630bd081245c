// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

// Error types for entity store operations
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No schema for field {entity_type}.{field}")]
    UnknownField { entity_type: String, field: String },

    #[error("Malformed filter: {message}")]
    MalformedFilter { message: String },

    #[error("Malformed record in fixture: {message}")]
    MalformedRecord { message: String },

    #[error("Could not read fixture {path}: {source}")]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl StoreError {
    pub fn malformed_filter<S: Into<String>>(message: S) -> Self {
        StoreError::MalformedFilter {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
