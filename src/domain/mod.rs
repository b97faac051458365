//! Core domain types for fetchstate.
//!
//! This module contains pure domain types with no orchestration concerns:
//! - Request state and the fetch typestate machine
//! - Payloads of uncertain shape

pub mod payload;
pub mod request;
