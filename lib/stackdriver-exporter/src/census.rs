//! Census metrics data model.
//!
//! These types mirror the shape of OpenCensus metrics as they arrive from an instrumented process or an agent: a
//! metric is a descriptor plus a set of time series, and each time series holds points with one typed value each.

use std::{collections::BTreeMap, sync::Arc};

pub use prost_types::Timestamp;

/// A label key declared by a metric descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelKey {
    /// Key name.
    pub key: String,

    /// Human-readable description of the key.
    pub description: String,
}

impl LabelKey {
    /// Creates a new `LabelKey` with the given key and description.
    pub fn new(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
        }
    }
}

/// A label value, positionally paired with a [`LabelKey`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelValue {
    /// Value.
    pub value: String,
}

impl LabelValue {
    /// Creates a new `LabelValue`.
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

/// The type of a metric, which determines both its kind (gauge or cumulative) and the type of its point values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// Integer gauge.
    GaugeInt64,

    /// Floating-point gauge.
    GaugeDouble,

    /// Distribution gauge.
    GaugeDistribution,

    /// Monotonic integer counter.
    CumulativeInt64,

    /// Monotonic floating-point counter.
    CumulativeDouble,

    /// Cumulative distribution.
    CumulativeDistribution,

    /// Summary: running sum and count, plus a percentile snapshot.
    Summary,
}

/// Metric descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricDescriptor {
    /// Metric name.
    pub name: String,

    /// Metric description.
    pub description: String,

    /// Unit, following the Unified Code for Units of Measure.
    pub unit: String,

    /// Metric type.
    pub metric_type: MetricType,

    /// Ordered label keys.
    pub label_keys: Vec<LabelKey>,
}

impl MetricDescriptor {
    /// Creates a new `MetricDescriptor` with the given name and type, and no description, unit, or label keys.
    pub fn new(name: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            metric_type,
            label_keys: Vec::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Sets the label keys.
    pub fn with_label_keys(mut self, label_keys: Vec<LabelKey>) -> Self {
        self.label_keys = label_keys;
        self
    }
}

/// Bucket layout of a distribution.
#[derive(Clone, Debug, PartialEq)]
pub enum BucketOptions {
    /// Explicit, ascending bucket bounds.
    ///
    /// The first bucket is `[0, bounds[0])`, and the last bucket is `[bounds[n-1], +infinity)`.
    Explicit {
        /// Bucket bounds.
        bounds: Vec<f64>,
    },
}

/// A single distribution bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bucket {
    /// Number of values in the bucket.
    pub count: i64,
}

/// Distribution value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DistributionValue {
    /// Number of values in the population.
    pub count: i64,

    /// Sum of the values in the population.
    pub sum: f64,

    /// Sum of squared deviations from the mean.
    pub sum_of_squared_deviation: f64,

    /// Bucket layout, if any.
    pub bucket_options: Option<BucketOptions>,

    /// Buckets, one more than the number of explicit bounds.
    pub buckets: Vec<Bucket>,
}

/// The value at a given percentile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValueAtPercentile {
    /// Percentile, in the range `(0.0, 100.0]`.
    pub percentile: f64,

    /// Value at the percentile.
    pub value: f64,
}

/// Percentile snapshot of a summary.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Number of values in the snapshot.
    pub count: Option<i64>,

    /// Sum of values in the snapshot.
    pub sum: Option<f64>,

    /// Percentile values.
    pub percentile_values: Vec<ValueAtPercentile>,
}

/// Summary value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SummaryValue {
    /// Running count.
    pub count: Option<i64>,

    /// Running sum.
    pub sum: Option<f64>,

    /// Percentile snapshot.
    pub snapshot: Option<Snapshot>,
}

/// A typed point value.
#[derive(Clone, Debug, PartialEq)]
pub enum PointValue {
    /// Integer value.
    Int64(i64),

    /// Floating-point value.
    Double(f64),

    /// Distribution value.
    Distribution(DistributionValue),

    /// Summary value.
    Summary(SummaryValue),
}

impl PointValue {
    /// Returns the name of the value kind.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Int64(_) => "int64",
            Self::Double(_) => "double",
            Self::Distribution(_) => "distribution",
            Self::Summary(_) => "summary",
        }
    }
}

/// A single point.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    /// End of the measurement interval.
    pub timestamp: Option<Timestamp>,

    /// Value.
    pub value: PointValue,
}

impl Point {
    /// Creates a new `Point` with the given timestamp and value.
    pub fn new(timestamp: Timestamp, value: PointValue) -> Self {
        Self {
            timestamp: Some(timestamp),
            value,
        }
    }
}

/// A time series: a set of points sharing one combination of label values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSeries {
    /// Label values, paired positionally with the metric's label keys.
    pub label_values: Vec<LabelValue>,

    /// Start of the measurement interval, for cumulative metrics.
    pub start_timestamp: Option<Timestamp>,

    /// Points.
    pub points: Vec<Point>,
}

/// A monitored resource, in its abstract form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resource {
    /// Resource type, such as `container` or `k8s`.
    pub resource_type: String,

    /// Resource labels.
    pub labels: BTreeMap<String, String>,
}

impl Resource {
    /// Creates a new `Resource` with the given type and no labels.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Adds a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A metric.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metric {
    /// Descriptor.
    ///
    /// Required. A metric without a descriptor is rejected.
    pub descriptor: Option<MetricDescriptor>,

    /// Time series.
    pub timeseries: Vec<TimeSeries>,

    /// Resource override.
    ///
    /// When set, this takes precedence over the resource supplied with the export call. Resources are shared by
    /// reference, and mapping results are cached by reference identity.
    pub resource: Option<Arc<Resource>>,
}

impl Metric {
    /// Creates a new `Metric` with the given descriptor and time series.
    pub fn new(descriptor: MetricDescriptor, timeseries: Vec<TimeSeries>) -> Self {
        Self {
            descriptor: Some(descriptor),
            timeseries,
            resource: None,
        }
    }

    /// Sets the resource override.
    pub fn with_resource(mut self, resource: Arc<Resource>) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Returns the metric name, or an empty string if the descriptor is missing.
    pub fn name(&self) -> &str {
        self.descriptor.as_ref().map_or("", |d| d.name.as_str())
    }
}

/// Language of the instrumentation library.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Language {
    /// Unspecified.
    #[default]
    Unspecified,
    /// C++.
    Cpp,
    /// C#.
    CSharp,
    /// Erlang.
    Erlang,
    /// Go.
    GoLang,
    /// Java.
    Java,
    /// Node.js.
    NodeJs,
    /// PHP.
    Php,
    /// Python.
    Python,
    /// Ruby.
    Ruby,
    /// JavaScript in a browser.
    WebJs,
}

impl Language {
    /// Returns the lowercased wire name of the language.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "language_unspecified",
            Self::Cpp => "cpp",
            Self::CSharp => "c_sharp",
            Self::Erlang => "erlang",
            Self::GoLang => "go_lang",
            Self::Java => "java",
            Self::NodeJs => "node_js",
            Self::Php => "php",
            Self::Python => "python",
            Self::Ruby => "ruby",
            Self::WebJs => "web_js",
        }
    }
}

/// Identity of the process that produced a batch of metrics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessIdentifier {
    /// Host name.
    pub host_name: String,

    /// Process ID.
    pub pid: u32,

    /// Process start time.
    pub start_timestamp: Option<Timestamp>,
}

/// Information about the instrumentation library.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LibraryInfo {
    /// Library language.
    pub language: Language,

    /// Exporter version.
    pub exporter_version: String,

    /// Core library version.
    pub core_library_version: String,
}

/// Origin metadata for a batch of metrics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    /// Process identity.
    pub identifier: Option<ProcessIdentifier>,

    /// Library information.
    pub library_info: Option<LibraryInfo>,
}
