//! Domain types and models

pub mod metric;

pub use metric::{
    snapshot_records, validate_metric_name, MetricBatch, MetricKind, MetricRecord, MetricSample,
    MetricSnapshot, MetricValue,
};
