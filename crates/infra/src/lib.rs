//! # Tally Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - The durable SQLite metric store
//! - The agent's delivery client and system sample source
//! - The server's HTTP router
//! - Background schedulers, snapshot persistence and the config loader
//!
//! ## Architecture
//! - Implements traits defined in `tally-core`
//! - Depends on `tally-common`, `tally-domain` and `tally-core`
//! - Contains all "impure" code (I/O, network, OS readings)

pub mod collector;
pub mod config;
pub mod database;
pub mod delivery;
pub mod errors;
pub mod scheduling;
pub mod server;
pub mod snapshot;
pub mod wire;

// Re-export commonly used items
pub use collector::SystemSampleSource;
pub use database::{DbManager, DurableStore};
pub use delivery::{DeliveryClient, DeliveryConfig, TickOutcome};
pub use errors::InfraError;
pub use scheduling::{CollectionScheduler, SchedulerError, SnapshotScheduler};
pub use server::{create_router, AppState, TrustedSubnet};
pub use snapshot::{SnapshotFile, SnapshotOnWrite};
pub use wire::{EncodedPayload, WireDecoder, WireEncoder};
