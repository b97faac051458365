//! Request aggregate - domain model and state transitions.
//!
//! This module contains the core domain logic for a retrieval:
//! - The published request state and failure taxonomy
//! - Fetch typestate records
//! - State transition methods

pub mod state;
pub mod transitions;

// Re-export commonly used types
pub use state::*;
pub use transitions::CancellationReason;
