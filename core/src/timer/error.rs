//! Error types for timer operations

use thiserror::Error;

use super::TimerId;

/// Errors returned by timer lifecycle calls
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    /// Waiting here would deadlock: the in-flight callback is the caller.
    /// The timer is disarmed anyway.
    #[error("timer {id} cannot be stopped synchronously from its own callback")]
    StopFromCallback { id: TimerId },
}
