//! Metric value model and merge algebra
//!
//! A stored metric is a tagged union: counters hold an accumulated `i64`
//! total, gauges hold the latest `f64` reading. The kind of a name is decided
//! by its most recent write, so a write of the other kind replaces both the
//! kind and the stored number.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{GAUGE_RENDER_PRECISION, MAX_METRIC_NAME_LENGTH};
use crate::errors::{Result, TallyError};
use crate::impl_wire_name_conversions;

/// Metric kind as named on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl_wire_name_conversions!(MetricKind {
    Counter => "counter",
    Gauge => "gauge",
});

impl MetricKind {
    /// Case-insensitive parse reporting failures as invalid input.
    pub fn parse(raw: &str) -> Result<Self> {
        raw.parse().map_err(TallyError::InvalidInput)
    }
}

impl Serialize for MetricKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MetricKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One incoming observation, already converted to a canonical number.
///
/// A counter sample carries a delta to add; a gauge sample carries the new
/// reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricSample {
    Counter(i64),
    Gauge(f64),
}

impl MetricSample {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
        }
    }

    /// Reject readings no backend can store.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Gauge(value) if !value.is_finite() => {
                Err(TallyError::InvalidInput(format!("gauge value {value} is not finite")))
            }
            _ => Ok(()),
        }
    }
}

/// Stored state of one metric name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Accumulated total of every counter delta since the last kind change
    Counter(i64),
    /// Latest gauge reading
    Gauge(f64),
}

impl MetricValue {
    /// Apply `incoming` on top of `existing`.
    ///
    /// - Counter: previous total (0 if absent or not a counter) plus the
    ///   delta.
    /// - Gauge: the incoming value, whatever was stored before.
    ///
    /// Fails on counter overflow and on non-finite gauge readings, neither of
    /// which the durable backend can represent.
    pub fn merge(existing: Option<&MetricValue>, incoming: MetricSample) -> Result<MetricValue> {
        match incoming {
            MetricSample::Counter(delta) => {
                let base = match existing {
                    Some(MetricValue::Counter(total)) => *total,
                    _ => 0,
                };
                base.checked_add(delta).map(MetricValue::Counter).ok_or_else(|| {
                    TallyError::InvalidInput(format!("counter overflow adding {delta} to {base}"))
                })
            }
            MetricSample::Gauge(value) => {
                incoming.validate()?;
                Ok(MetricValue::Gauge(value))
            }
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
        }
    }

    /// Counter total or gauge reading as a float.
    pub fn get(&self) -> f64 {
        match self {
            Self::Counter(total) => *total as f64,
            Self::Gauge(value) => *value,
        }
    }

    pub fn as_counter(&self) -> Option<i64> {
        match self {
            Self::Counter(total) => Some(*total),
            Self::Gauge(_) => None,
        }
    }

    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            Self::Gauge(value) => Some(*value),
            Self::Counter(_) => None,
        }
    }

    /// Plain-text rendering: counters as integers, gauges with at most three
    /// decimals and no trailing zeros.
    pub fn render(&self) -> String {
        match self {
            Self::Counter(total) => total.to_string(),
            Self::Gauge(value) => {
                let fixed = format!("{:.*}", GAUGE_RENDER_PRECISION, value);
                let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
                match trimmed {
                    "" | "-" | "-0" => "0".to_string(),
                    other => other.to_string(),
                }
            }
        }
    }

    /// Wire form under `name`.
    ///
    /// A stored counter total travels as the record's `delta`: the receiver
    /// adds it to whatever it already holds.
    pub fn to_record(&self, name: impl Into<String>) -> MetricRecord {
        match self {
            Self::Counter(total) => MetricRecord::counter(name, *total),
            Self::Gauge(value) => MetricRecord::gauge(name, *value),
        }
    }

    /// Re-express the stored state as the sample that would recreate it on an
    /// empty store.
    pub fn as_sample(&self) -> MetricSample {
        match self {
            Self::Counter(total) => MetricSample::Counter(*total),
            Self::Gauge(value) => MetricSample::Gauge(*value),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Metric wire record: `{id, type, delta?, value?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// One transmission unit.
pub type MetricBatch = Vec<MetricRecord>;

/// `GET /` and snapshot-file shape: records keyed by name.
pub type MetricSnapshot = BTreeMap<String, MetricRecord>;

impl MetricRecord {
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self { id: id.into(), kind: MetricKind::Counter, delta: Some(delta), value: None }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self { id: id.into(), kind: MetricKind::Gauge, delta: None, value: Some(value) }
    }

    /// Bare `{id, type}` record used by the JSON query route.
    pub fn query(id: impl Into<String>, kind: MetricKind) -> Self {
        Self { id: id.into(), kind, delta: None, value: None }
    }

    /// Validate the record and convert it to a sample.
    ///
    /// The id must be a valid metric name; a counter must carry `delta` and
    /// no `value`, a gauge `value` and no `delta`.
    pub fn try_into_sample(&self) -> Result<MetricSample> {
        validate_metric_name(&self.id)?;
        match (self.kind, self.delta, self.value) {
            (MetricKind::Counter, Some(delta), None) => Ok(MetricSample::Counter(delta)),
            (MetricKind::Gauge, None, Some(value)) => Ok(MetricSample::Gauge(value)),
            (MetricKind::Counter, _, _) => Err(TallyError::InvalidInput(format!(
                "counter '{}' must carry a delta and no value",
                self.id
            ))),
            (MetricKind::Gauge, _, _) => Err(TallyError::InvalidInput(format!(
                "gauge '{}' must carry a value and no delta",
                self.id
            ))),
        }
    }
}

/// Names are non-empty and at most [`MAX_METRIC_NAME_LENGTH`] bytes.
pub fn validate_metric_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TallyError::InvalidInput("metric name must not be empty".to_string()));
    }
    if name.len() > MAX_METRIC_NAME_LENGTH {
        return Err(TallyError::InvalidInput(format!(
            "metric name exceeds {MAX_METRIC_NAME_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Build the wire snapshot from stored values.
pub fn snapshot_records(values: &BTreeMap<String, MetricValue>) -> MetricSnapshot {
    values.iter().map(|(name, value)| (name.clone(), value.to_record(name.as_str()))).collect()
}
