use crate::census::{
    LabelKey, LabelValue, Metric, MetricDescriptor, MetricType, Point, PointValue, SummaryValue, TimeSeries,
};

const PERCENTILE_LABEL_KEY: &str = "percentile";
const PERCENTILE_LABEL_DESCRIPTION: &str = "the value at a given percentile of a distribution";

/// Splits a summary metric into its component metrics.
///
/// The monitoring API has no summary type, so a summary is represented as up to three metrics:
///
/// - `<name>_summary_sum`: cumulative double, one series per input series
/// - `<name>_summary_count`: cumulative int64 with a unit of `1`, one series per input series
/// - `<name>_summary_percentile`: double gauge, one series per input series and percentile, labelled with an extra
///   trailing `percentile` label
///
/// Component metrics without any series are omitted. Points in the summary that are not summary values are skipped.
pub fn split_summary(summary: &Metric) -> Vec<Metric> {
    let descriptor = match summary.descriptor.as_ref() {
        Some(descriptor) => descriptor,
        None => return Vec::new(),
    };

    let mut sum_series = Vec::new();
    let mut count_series = Vec::new();
    let mut percentile_series = Vec::new();

    for ts in &summary.timeseries {
        for point in &ts.points {
            let summary_value = match &point.value {
                PointValue::Summary(summary_value) => summary_value,
                _ => continue,
            };

            let SummaryValue { count, sum, snapshot } = summary_value;

            if let Some(sum) = sum {
                sum_series.push(TimeSeries {
                    label_values: ts.label_values.clone(),
                    start_timestamp: ts.start_timestamp.clone(),
                    points: vec![Point {
                        timestamp: point.timestamp.clone(),
                        value: PointValue::Double(*sum),
                    }],
                });
            }

            if let Some(count) = count {
                count_series.push(TimeSeries {
                    label_values: ts.label_values.clone(),
                    start_timestamp: ts.start_timestamp.clone(),
                    points: vec![Point {
                        timestamp: point.timestamp.clone(),
                        value: PointValue::Int64(*count),
                    }],
                });
            }

            let percentile_values = snapshot.iter().flat_map(|snapshot| snapshot.percentile_values.iter());
            for percentile_value in percentile_values {
                let mut label_values = Vec::with_capacity(ts.label_values.len() + 1);
                label_values.extend_from_slice(&ts.label_values);
                label_values.push(LabelValue::new(format!("{:.6}", percentile_value.percentile)));

                // Percentiles are instantaneous, so they never carry a start time.
                percentile_series.push(TimeSeries {
                    label_values,
                    start_timestamp: None,
                    points: vec![Point {
                        timestamp: point.timestamp.clone(),
                        value: PointValue::Double(percentile_value.value),
                    }],
                });
            }
        }
    }

    let mut metrics = Vec::with_capacity(3);

    if !sum_series.is_empty() {
        let derived = derive_descriptor(descriptor, "sum", MetricType::CumulativeDouble)
            .with_unit(descriptor.unit.clone())
            .with_label_keys(descriptor.label_keys.clone());
        metrics.push(derived_metric(summary, derived, sum_series));
    }

    if !count_series.is_empty() {
        let derived = derive_descriptor(descriptor, "count", MetricType::CumulativeInt64)
            .with_unit("1")
            .with_label_keys(descriptor.label_keys.clone());
        metrics.push(derived_metric(summary, derived, count_series));
    }

    if !percentile_series.is_empty() {
        let mut label_keys = Vec::with_capacity(descriptor.label_keys.len() + 1);
        label_keys.extend_from_slice(&descriptor.label_keys);
        label_keys.push(LabelKey::new(PERCENTILE_LABEL_KEY, PERCENTILE_LABEL_DESCRIPTION));

        let derived = derive_descriptor(descriptor, "percentile", MetricType::GaugeDouble)
            .with_unit(descriptor.unit.clone())
            .with_label_keys(label_keys);
        metrics.push(derived_metric(summary, derived, percentile_series));
    }

    metrics
}

fn derive_descriptor(summary: &MetricDescriptor, suffix: &str, metric_type: MetricType) -> MetricDescriptor {
    MetricDescriptor::new(format!("{}_summary_{}", summary.name, suffix), metric_type)
        .with_description(summary.description.clone())
}

fn derived_metric(summary: &Metric, descriptor: MetricDescriptor, timeseries: Vec<TimeSeries>) -> Metric {
    Metric {
        descriptor: Some(descriptor),
        timeseries,
        resource: summary.resource.clone(),
    }
}
