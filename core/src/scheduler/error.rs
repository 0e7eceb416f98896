//! Error types for scheduler lifecycle

use thiserror::Error;

/// Errors while starting a scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to spawn dispatch thread {name}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
