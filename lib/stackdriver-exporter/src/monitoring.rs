//! Monitoring API request shapes.
//!
//! These are the shapes accepted by the Cloud Monitoring v3 API: metric descriptors, monitored resources, time series,
//! and the requests that carry them.

use std::collections::BTreeMap;

use prost_types::Timestamp;

/// Whether a metric measures an instant or an accumulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Unspecified.
    #[default]
    Unspecified,

    /// Instantaneous measurement.
    Gauge,

    /// Accumulation since a fixed start time.
    Cumulative,
}

/// The type of a metric's point values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Unspecified.
    #[default]
    Unspecified,

    /// 64-bit signed integer.
    Int64,

    /// Double-precision floating point.
    Double,

    /// Distribution.
    Distribution,
}

/// The type of a label's values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LabelValueType {
    /// String.
    #[default]
    String,
}

/// A label declared by a metric descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelDescriptor {
    /// Label key.
    pub key: String,

    /// Human-readable description.
    pub description: String,

    /// Value type.
    pub value_type: LabelValueType,
}

/// Metric descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricDescriptor {
    /// Resource name: `projects/<project>/metricDescriptors/<type>`.
    pub name: String,

    /// Metric type, such as `custom.googleapis.com/opencensus/requests`.
    pub metric_type: String,

    /// Display name.
    pub display_name: String,

    /// Description.
    pub description: String,

    /// Unit.
    pub unit: String,

    /// Metric kind.
    pub metric_kind: MetricKind,

    /// Value type.
    pub value_type: ValueType,

    /// Labels.
    pub labels: Vec<LabelDescriptor>,
}

/// A monitored resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitoredResource {
    /// Resource type, such as `global` or `gce_instance`.
    pub resource_type: String,

    /// Resource labels.
    pub labels: BTreeMap<String, String>,
}

impl MonitoredResource {
    /// Creates a new `MonitoredResource` with the given type and no labels.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Creates the `global` monitored resource.
    pub fn global() -> Self {
        Self::new("global")
    }
}

/// Distribution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Distribution {
    /// Number of values.
    pub count: i64,

    /// Arithmetic mean of the values, or zero if there are none.
    pub mean: f64,

    /// Sum of squared deviations from the mean.
    pub sum_of_squared_deviation: f64,

    /// Explicit bucket bounds, if any.
    ///
    /// The first bucket is `(-infinity, bounds[0])`.
    pub explicit_bounds: Option<Vec<f64>>,

    /// Bucket counts.
    pub bucket_counts: Vec<i64>,
}

/// A typed point value.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    /// 64-bit signed integer.
    Int64(i64),

    /// Double-precision floating point.
    Double(f64),

    /// Distribution.
    Distribution(Distribution),
}

/// The interval a point covers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeInterval {
    /// Start of the interval. Absent for gauges.
    pub start_time: Option<Timestamp>,

    /// End of the interval.
    pub end_time: Option<Timestamp>,
}

/// A single point.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    /// Interval.
    pub interval: TimeInterval,

    /// Value.
    pub value: TypedValue,
}

/// A metric type plus its label values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metric {
    /// Metric type.
    pub metric_type: String,

    /// Label values, keyed by label key.
    pub labels: BTreeMap<String, String>,
}

/// A time series.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    /// Metric.
    pub metric: Metric,

    /// Monitored resource.
    pub resource: MonitoredResource,

    /// Points.
    pub points: Vec<Point>,
}

/// Request to write time series data.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateTimeSeriesRequest {
    /// Project name: `projects/<project>`.
    pub name: String,

    /// Time series to write.
    pub time_series: Vec<TimeSeries>,
}

/// Request to create a metric descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateMetricDescriptorRequest {
    /// Project name: `projects/<project>`.
    pub name: String,

    /// Descriptor to create.
    pub metric_descriptor: MetricDescriptor,
}

/// Request to fetch an existing metric descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetMetricDescriptorRequest {
    /// Descriptor resource name: `projects/<project>/metricDescriptors/<type>`.
    pub name: String,
}

/// Returns the project resource name for the given project ID.
pub fn project_path(project_id: &str) -> String {
    format!("projects/{}", project_id)
}
