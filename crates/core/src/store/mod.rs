//! Metric storage port and the in-memory backend

pub mod memory;
pub mod ports;

pub use memory::MemoryStore;
pub use ports::{MetricStore, StoreTransaction};
