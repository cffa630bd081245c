// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod create;
pub mod list_types;
pub mod paths;
pub mod schema;

pub use create::create_command;
pub use list_types::list_types_command;
pub use paths::paths_command;
pub use schema::schema_command;
