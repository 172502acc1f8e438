//! # Operon Types
//!
//! Shared type definitions for the Operon execution framework. This crate
//! holds the serde-facing contracts that external collaborators (loggers,
//! test helpers, UI layers) consume without depending on the engine itself:
//!
//! - **`state`**: the execution lifecycle state and outcome status enums
//! - **`errors`**: the structured validation failure payload attached to
//!   failed outcomes

pub mod errors;
pub mod state;

pub use errors::ValidationErrors;
pub use state::{ExecutionState, ExecutionStatus};
