//! Conversion of census metrics into monitoring time series.

mod point;
pub use self::point::{convert_point, convert_value};

mod summary;
pub use self::summary::split_summary;

use crate::{
    census::{Metric, MetricType},
    error::{ConversionError, ExportError},
    labels::{labels_per_time_series, DefaultLabels},
    monitoring::{self, MetricKind, MonitoredResource, TimeSeries, ValueType},
};

/// Maps a census metric type to the monitoring metric kind and value type.
///
/// Summaries have no monitoring equivalent, and map to unspecified.
pub const fn metric_kind(metric_type: MetricType) -> (MetricKind, ValueType) {
    match metric_type {
        MetricType::CumulativeInt64 => (MetricKind::Cumulative, ValueType::Int64),
        MetricType::CumulativeDouble => (MetricKind::Cumulative, ValueType::Double),
        MetricType::CumulativeDistribution => (MetricKind::Cumulative, ValueType::Distribution),
        MetricType::GaugeInt64 => (MetricKind::Gauge, ValueType::Int64),
        MetricType::GaugeDouble => (MetricKind::Gauge, ValueType::Double),
        MetricType::GaugeDistribution => (MetricKind::Gauge, ValueType::Distribution),
        MetricType::Summary => (MetricKind::Unspecified, ValueType::Unspecified),
    }
}

/// Time series assembled from a single metric.
#[derive(Debug, Default)]
pub struct AssembledSeries {
    /// Assembled time series, in the order of the metric's time series.
    pub time_series: Vec<TimeSeries>,

    /// Errors for time series that were skipped.
    pub skipped: Vec<ConversionError>,
}

/// Assembles the monitoring time series for a metric.
///
/// Every time series of the metric is converted point by point, labelled with the default labels overlaid with its own
/// label values, and attached to the given monitored resource. Gauge points never carry a start time, while cumulative
/// points carry the start time of their series.
///
/// A time series whose label values do not match the metric's label keys is skipped, and its error is reported in
/// [`AssembledSeries::skipped`], without affecting the other time series.
///
/// # Errors
///
/// If the metric has no descriptor, or any point cannot be converted, an error is returned.
pub fn assemble_time_series(
    metric: &Metric, metric_type: &str, resource: &MonitoredResource, defaults: &DefaultLabels,
) -> Result<AssembledSeries, ExportError> {
    let descriptor = metric.descriptor.as_ref().ok_or(ExportError::MissingDescriptor)?;
    let (metric_kind, _) = metric_kind(descriptor.metric_type);

    let mut assembled = AssembledSeries {
        time_series: Vec::with_capacity(metric.timeseries.len()),
        skipped: Vec::new(),
    };

    for ts in &metric.timeseries {
        let start_time = match metric_kind {
            MetricKind::Gauge => None,
            _ => ts.start_timestamp.as_ref(),
        };

        let points = ts
            .points
            .iter()
            .map(|point| convert_point(start_time, point))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ExportError::Conversion {
                metric_name: descriptor.name.clone(),
                source,
            })?;

        let labels = match labels_per_time_series(defaults, &descriptor.label_keys, &ts.label_values) {
            Ok(labels) => labels,
            Err(e) => {
                assembled.skipped.push(e);
                continue;
            }
        };

        assembled.time_series.push(TimeSeries {
            metric: monitoring::Metric {
                metric_type: metric_type.to_string(),
                labels,
            },
            resource: resource.clone(),
            points,
        });
    }

    Ok(assembled)
}
