//! Port interfaces for sample collection

use std::collections::BTreeMap;

use async_trait::async_trait;
use tally_domain::{MetricSample, Result};

/// Source of raw process/system samples.
///
/// Called once per collection tick. Values are already converted to the
/// canonical numeric form; ordering is unspecified.
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn collect(&self) -> Result<BTreeMap<String, MetricSample>>;
}
