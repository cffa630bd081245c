// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Logging facade shared by every foldergen crate
//!
//! Wraps `emit` so that library code can log structured events without
//! caring where they end up.
//!
//! Usage:
//! - Set FOLDERGEN_LOG=off (default) - no logs
//! - Set FOLDERGEN_LOG=info - folder creation summaries, schema loads
//! - Set FOLDERGEN_LOG=debug - every entity store query and pruned branch

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable consulted by [`init_diagnostics`]
pub const LOG_ENV: &str = "FOLDERGEN_LOG";

static INIT: Once = Once::new();

/// Initialize diagnostics based on the FOLDERGEN_LOG environment variable
///
/// Safe to call multiple times; only the first call has any effect.
pub fn init_diagnostics() {
    let level = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());
    init_with_level(&level);
}

/// Initialize diagnostics at an explicit level, ignoring the environment
///
/// Used by the command line when `--verbose` is passed.
pub fn init_with_level(level: &str) {
    INIT.call_once(|| {
        let min = match level {
            "off" => return,
            "debug" => emit::Level::Debug,
            "info" => emit::Level::Info,
            "warn" => emit::Level::Warn,
            "error" => emit::Level::Error,
            other => {
                // Bootstrap warning, emit is not running yet
                eprintln!("Warning: Unknown {} value '{}', using 'info'", LOG_ENV, other);
                emit::Level::Info
            }
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(min))
            .init();

        // The runtime lives for the rest of the process
        std::mem::forget(rt);
    });
}

/// Log basic operations (schema loads, creation summaries, cache commits)
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log detailed diagnostics (store queries, pruned branches, skipped nodes)
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log warning conditions (unresolvable symlinks, ignored schema files)
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log critical error conditions (path cache conflicts, aborted requests)
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

/// Re-export the init function for convenience
pub use init_diagnostics as init;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_safe_to_call_multiple_times() {
        init_diagnostics();
        init_with_level("debug");
        init_diagnostics();
    }

    #[test]
    fn test_macros_compile() {
        log_info!("Test message");
        log_debug!("Debug message with {value}", value: 42);
        log_warn!("Warning message for {path}", path: "/mnt/projects");
        log_error!("Error message");
    }
}
