use prost_types::Timestamp;

use crate::{
    census::{self, BucketOptions, DistributionValue, PointValue},
    error::ConversionError,
    monitoring::{Distribution, Point, TimeInterval, TypedValue},
};

/// Converts a census point into a monitoring point.
///
/// `start_time` is the start of the interval the point covers, and must be `None` for gauges.
///
/// # Errors
///
/// If the point value has no monitoring representation, an error is returned.
pub fn convert_point(start_time: Option<&Timestamp>, point: &census::Point) -> Result<Point, ConversionError> {
    Ok(Point {
        interval: TimeInterval {
            start_time: start_time.cloned(),
            end_time: point.timestamp.clone(),
        },
        value: convert_value(&point.value)?,
    })
}

/// Converts a census point value into a typed monitoring value.
///
/// # Errors
///
/// Summary values have no direct monitoring representation, and must be split into their component metrics before
/// conversion. Converting one is an error.
pub fn convert_value(value: &PointValue) -> Result<TypedValue, ConversionError> {
    match value {
        PointValue::Int64(value) => Ok(TypedValue::Int64(*value)),
        PointValue::Double(value) => Ok(TypedValue::Double(*value)),
        PointValue::Distribution(distribution) => Ok(TypedValue::Distribution(convert_distribution(distribution))),
        PointValue::Summary(_) => Err(ConversionError::UnsupportedValue {
            kind: value.kind_name(),
        }),
    }
}

fn convert_distribution(distribution: &DistributionValue) -> Distribution {
    let mean = if distribution.count > 0 {
        distribution.sum / distribution.count as f64
    } else {
        0.0
    };

    let mut bucket_counts = distribution.buckets.iter().map(|bucket| bucket.count).collect::<Vec<_>>();

    // Census buckets start at zero (`[0, bounds[0])`) while monitoring buckets start at negative infinity
    // (`(-inf, bounds[0])`), so an explicit zero bound, and an empty bucket below it, keep the two aligned.
    let explicit_bounds = distribution.bucket_options.as_ref().map(|options| match options {
        BucketOptions::Explicit { bounds } => {
            if should_insert_zero_bound(bounds) {
                bucket_counts.insert(0, 0);

                let mut adjusted = Vec::with_capacity(bounds.len() + 1);
                adjusted.push(0.0);
                adjusted.extend_from_slice(bounds);
                adjusted
            } else {
                bounds.clone()
            }
        }
    });

    Distribution {
        count: distribution.count,
        mean,
        sum_of_squared_deviation: distribution.sum_of_squared_deviation,
        explicit_bounds,
        bucket_counts,
    }
}

fn should_insert_zero_bound(bounds: &[f64]) -> bool {
    bounds.first().is_some_and(|first| *first != 0.0)
}
