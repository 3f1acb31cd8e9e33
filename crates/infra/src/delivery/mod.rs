//! Agent-side batch delivery

pub mod client;

pub use client::{DeliveryClient, DeliveryConfig, TickOutcome};
