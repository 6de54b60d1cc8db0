//! Shared types and utilities for cluster inspection
//!
//! This crate contains the snapshot rows, findings, predicates and time helpers
//! used by the inspection engine and its command-line front end.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{finding::*, predicate::*, snapshot::*};
