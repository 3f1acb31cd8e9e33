//! # Tally Domain
//!
//! Domain types for the Tally telemetry pipeline.
//!
//! This crate contains:
//! - The metric value model and its merge algebra
//! - The metric wire record
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Wire constants
//!
//! ## Architecture
//! - No dependencies on other Tally crates
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
