pub mod config;
pub mod scheduler;
pub mod timer;

// Re-exports for convenience
pub use config::{ConfigError, DemoConfigExt};
pub use scheduler::{Scheduler, SchedulerError};
pub use ticktock_types::{DemoConfig, SchedulerConfig};
pub use timer::{Callback, Timer, TimerError, TimerId, TimerState};
