//! Batch ingestion use case

pub mod ports;
pub mod service;

pub use ports::IngestionObserver;
pub use service::IngestionService;
