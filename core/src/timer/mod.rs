//! Timer system
//!
//! This module provides:
//! - **State**: The shared scheduling record for one armed timer
//! - **Handle**: The user-facing `Timer` that arms, reconfigures and stops
//! - **Completion**: Per-firing signal used by synchronous stop
//!
//! # Ownership
//!
//! ```text
//! Timer (handle) ──owns──▶ Arc<TimerState> ◀──owns── queue entries
//!        │                        ▲
//!        └─ reconfigure: disarm ──┘ bind a fresh TimerState (new id)
//! ```
//!
//! Old states stay reachable only through stale queue entries, which the
//! scheduler discards when they surface.

mod completion;
mod error;
mod handle;
mod state;


pub use error::TimerError;
pub use handle::Timer;
pub use state::{Callback, TimerId, TimerState};
