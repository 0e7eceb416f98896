//! Shared configuration types for ticktock
//!
//! This crate contains serializable configuration types that are shared between
//! the scheduling core (ticktock-core) and the demonstration binary (ticktock-cli).

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler Config
// ─────────────────────────────────────────────────────────────────────────────

/// Settings for the dispatch thread owned by a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Name given to the dispatch thread (shows up in debuggers and panics)
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Stack size for the dispatch thread in bytes (platform default if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<usize>,
    /// Callbacks running longer than this are reported as slow.
    /// Zero disables the warning.
    #[serde(default = "default_slow_callback_warn_ms")]
    pub slow_callback_warn_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            stack_size: None,
            slow_callback_warn_ms: default_slow_callback_warn_ms(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Demo Config
// ─────────────────────────────────────────────────────────────────────────────

/// Settings for the demonstration binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// How long the demo scenario runs before shutting down
    #[serde(default = "default_run_secs")]
    pub run_secs: u64,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            run_secs: default_run_secs(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Serde Default Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn default_thread_name() -> String {
    "ticktock-dispatch".to_string()
}
fn default_slow_callback_warn_ms() -> u64 {
    250
}
fn default_run_secs() -> u64 {
    10
}
