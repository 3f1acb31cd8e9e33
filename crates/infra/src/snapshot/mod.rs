//! Memory backend persistence

pub mod file;

pub use file::{SnapshotFile, SnapshotOnWrite};
