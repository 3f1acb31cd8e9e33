//! Agent-side sample sources

pub mod system;

pub use system::SystemSampleSource;
