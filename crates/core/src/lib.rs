//! # Tally Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (`MetricStore`, `SampleSource`, `IngestionObserver`)
//! - The concurrent in-memory metric store
//! - Ingestion and collection use cases
//!
//! ## Architecture Principles
//! - Only depends on `tally-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod collection;
pub mod ingestion;
pub mod store;

pub use collection::{CollectionService, PollSummary, SampleSource};
pub use ingestion::{IngestionObserver, IngestionService};
pub use store::{MemoryStore, MetricStore, StoreTransaction};
