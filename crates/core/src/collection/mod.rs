//! Periodic sample collection use case

pub mod ports;
pub mod service;

pub use ports::SampleSource;
pub use service::{CollectionService, PollSummary};
