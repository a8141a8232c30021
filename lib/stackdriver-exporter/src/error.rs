use std::time::Duration;

use snafu::Snafu;
use stackdriver_error::{GenericError, MultiError};

/// Conversion errors.
///
/// These are scoped to a single point or time series.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ConversionError {
    /// The point value kind has no representation in the monitoring API.
    #[snafu(display("unsupported point value kind '{}'", kind))]
    UnsupportedValue {
        /// Name of the value kind.
        kind: &'static str,
    },

    /// The number of label values in a time series did not match the number of label keys in its metric.
    #[snafu(display("length mismatch: len(labelKeys)={} len(labelValues)={}", keys, values))]
    LabelMismatch {
        /// Number of label keys.
        keys: usize,

        /// Number of label values.
        values: usize,
    },
}

/// Export errors.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ExportError {
    /// No metrics were given to export.
    #[snafu(display("expecting a non-empty list of metrics"))]
    NoMetrics,

    /// A metric was missing its descriptor.
    #[snafu(display("expecting a non-nil metric descriptor"))]
    MissingDescriptor,

    /// A metric could not be converted.
    #[snafu(display("failed to convert metric '{}': {}", metric_name, source))]
    Conversion {
        /// Name of the metric.
        metric_name: String,

        /// Error source.
        source: ConversionError,
    },

    /// A metric descriptor could not be created.
    #[snafu(display("failed to create metric descriptor '{}': {}", metric_type, source))]
    CreateDescriptor {
        /// Metric type of the descriptor.
        metric_type: String,

        /// Error source.
        source: GenericError,
    },

    /// A built-in metric descriptor could not be fetched.
    #[snafu(display("failed to get metric descriptor '{}': {}", metric_type, source))]
    GetDescriptor {
        /// Metric type of the descriptor.
        metric_type: String,

        /// Error source.
        source: GenericError,
    },

    /// A batch of time series could not be uploaded.
    #[snafu(display("failed to upload {} time series: {}", series, source))]
    Upload {
        /// Number of time series in the failed request.
        series: usize,

        /// Error source.
        source: GenericError,
    },

    /// The export did not complete within the configured timeout.
    #[snafu(display("export timed out after {:?}", timeout))]
    Timeout {
        /// Configured timeout.
        timeout: Duration,
    },

    /// The bundler's buffer is full, and the payload was dropped.
    #[snafu(display("failed to upload metrics: buffer full"))]
    BundlerFull,

    /// The bundler is no longer accepting payloads.
    #[snafu(display("bundler is shut down"))]
    BundlerClosed,

    /// Multiple errors occurred.
    #[snafu(display("{}", source))]
    Multiple {
        /// Errors.
        source: MultiError<ExportError>,
    },
}

impl ExportError {
    /// Returns `true` if this error came from a remote call.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::CreateDescriptor { .. } | Self::GetDescriptor { .. } | Self::Upload { .. } | Self::Timeout { .. }
        )
    }
}

/// Combines a list of errors into one.
///
/// An empty list is success, a single error is returned as-is, and anything more is wrapped in
/// [`ExportError::Multiple`].
pub fn combine_errors(mut errors: Vec<ExportError>) -> Result<(), ExportError> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ExportError::Multiple {
            source: MultiError::new(errors),
        }),
    }
}
