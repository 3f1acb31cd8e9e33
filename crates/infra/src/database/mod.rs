//! Database implementations

pub mod durable_store;
pub mod manager;

pub use durable_store::DurableStore;
pub use manager::DbManager;
