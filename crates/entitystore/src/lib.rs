// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Entity store collaborator
//!
//! The entity store is the remote service holding projects, sequences, shots,
//! assets, tasks, users and pipeline steps. This crate defines the query model
//! (`Filter`), the blocking [`EntityStore`] client trait, and [`MemoryStore`],
//! an in-memory implementation used by tests and fixture-driven runs.

pub mod error;
pub mod filter;
pub mod memory;
pub mod store;

pub use error::{Result, StoreError};
pub use filter::{Condition, FROM_PREFIX, Filter, FilterItem, LogicalOperator, Relation};
pub use memory::MemoryStore;
pub use store::{
    Aggregate, AggregateKind, EntityLink, EntityStore, FieldSchema, Record, Summary, record_id,
};
