//! Exports OpenCensus metrics to Cloud Monitoring.
//!
//! The [`Exporter`] converts census metrics into monitoring time series and uploads them through a
//! [`MetricServiceClient`]. Along the way it:
//!
//! - splits summaries into sum, count, and percentile metrics, which the monitoring API can represent
//! - registers a metric descriptor for every metric name, once per exporter
//! - maps census resources to monitored resources through a [`ResourceMapper`]
//! - batches time series into upload requests, never writing the same time series twice in one request
//!
//! Metrics can be exported in the background, where they are bundled and uploaded when enough accumulate or enough
//! time passes, or directly, returning once every upload completes.
#![deny(warnings)]
#![deny(missing_docs)]

mod bundler;

pub mod census;

mod client;
pub use self::client::MetricServiceClient;

mod config;
pub use self::config::ExporterConfiguration;

pub mod convert;

pub mod descriptor;

mod error;
pub use self::error::{combine_errors, ConversionError, ExportError};

mod exporter;
pub use self::exporter::{ErrorHandler, Exporter, ExporterBuilder, LoggingErrorHandler};

pub mod labels;

pub mod monitoring;

pub mod request_builder;

pub mod resource;
pub use self::resource::{DefaultResourceMapper, ResourceMapper};

mod telemetry;
pub use self::telemetry::ExporterTelemetry;

#[cfg(test)]
mod testing;
