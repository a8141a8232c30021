//! Metric descriptors: naming, building, and the per-exporter descriptor cache.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    census::{Metric, MetricType},
    client::MetricServiceClient,
    convert::metric_kind,
    error::ExportError,
    labels::{label_descriptors, DefaultLabels},
    monitoring::{self, project_path, CreateMetricDescriptorRequest, GetMetricDescriptorRequest},
    telemetry::ExporterTelemetry,
};

/// Default metric type prefix.
pub const DEFAULT_METRIC_PREFIX: &str = "custom.googleapis.com/opencensus";

/// Default display name prefix.
pub const DEFAULT_DISPLAY_NAME_PREFIX: &str = "OpenCensus";

const CUSTOM_METRIC_DOMAINS: &[&str] = &["custom.googleapis.com/", "external.googleapis.com/"];

/// Returns `true` if the metric type belongs to a built-in metric, rather than a custom or external one.
///
/// Built-in descriptors already exist and cannot be created, only fetched.
pub fn is_builtin_metric(metric_type: &str) -> bool {
    !CUSTOM_METRIC_DOMAINS.iter().any(|domain| metric_type.starts_with(domain))
}

/// Derives monitoring names from census metric names.
#[derive(Clone, Debug)]
pub struct MetricNamer {
    project_id: String,
    metric_prefix: String,
    display_name_prefix: String,
}

impl MetricNamer {
    /// Creates a new `MetricNamer`.
    pub fn new(
        project_id: impl Into<String>, metric_prefix: impl Into<String>, display_name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            metric_prefix: metric_prefix.into(),
            display_name_prefix: display_name_prefix.into(),
        }
    }

    /// Returns the project ID.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Returns the project resource name: `projects/<project_id>`.
    pub fn project_name(&self) -> String {
        project_path(&self.project_id)
    }

    /// Returns the monitoring metric type for a census metric name.
    pub fn metric_type(&self, metric_name: &str) -> String {
        join_path(&self.metric_prefix, metric_name)
    }

    /// Returns the display name for a census metric name.
    pub fn display_name(&self, metric_name: &str) -> String {
        join_path(&self.display_name_prefix, metric_name)
    }

    /// Returns the descriptor resource name for a metric type.
    pub fn descriptor_name(&self, metric_type: &str) -> String {
        format!("projects/{}/metricDescriptors/{}", self.project_id, metric_type)
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let name = name.trim_start_matches('/');

    if prefix.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Builds the monitoring descriptor for a census metric.
///
/// # Errors
///
/// If the metric has no descriptor, an error is returned.
pub fn build_descriptor(
    namer: &MetricNamer, metric: &Metric, defaults: &DefaultLabels,
) -> Result<monitoring::MetricDescriptor, ExportError> {
    let descriptor = metric.descriptor.as_ref().ok_or(ExportError::MissingDescriptor)?;
    let metric_type = namer.metric_type(&descriptor.name);
    let (metric_kind, value_type) = metric_kind(descriptor.metric_type);

    // Counts of recorded measurements are dimensionless, whatever the unit of the measurements themselves.
    let unit = if descriptor.metric_type == MetricType::CumulativeInt64 {
        "1".to_string()
    } else {
        descriptor.unit.clone()
    };

    Ok(monitoring::MetricDescriptor {
        name: namer.descriptor_name(&metric_type),
        display_name: namer.display_name(&descriptor.name),
        description: descriptor.description.clone(),
        unit,
        metric_kind,
        value_type,
        labels: label_descriptors(defaults, &descriptor.label_keys),
        metric_type,
    })
}

/// Cache of metric descriptors known to exist remotely, keyed by census metric name.
///
/// Each name is created (or fetched) at most once for the lifetime of the cache. Failures are not cached, so a later
/// call will try again.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    descriptors: Mutex<HashMap<String, monitoring::MetricDescriptor>>,
}

impl DescriptorCache {
    /// Creates a new, empty `DescriptorCache`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures the descriptor for the given metric exists remotely.
    ///
    /// Cache hits return immediately. On a miss, the descriptor is built and then either fetched, for built-in metric
    /// types, or created. The cache lock is held for the duration of the remote call, so concurrent callers for the
    /// same metric wait rather than issue a second call.
    ///
    /// # Errors
    ///
    /// If the metric has no descriptor, or the remote call fails, an error is returned and the cache is left unchanged.
    pub async fn ensure_descriptor(
        &self, client: &dyn MetricServiceClient, namer: &MetricNamer, metric: &Metric, defaults: &DefaultLabels,
        telemetry: &ExporterTelemetry,
    ) -> Result<(), ExportError> {
        let metric_name = metric.descriptor.as_ref().ok_or(ExportError::MissingDescriptor)?.name.as_str();

        let mut descriptors = self.descriptors.lock().await;
        if descriptors.contains_key(metric_name) {
            telemetry.descriptor_cache_hits().increment(1);
            return Ok(());
        }

        let descriptor = build_descriptor(namer, metric, defaults)?;
        let metric_type = descriptor.metric_type.clone();

        let remote = if is_builtin_metric(&metric_type) {
            let request = GetMetricDescriptorRequest {
                name: descriptor.name.clone(),
            };
            let remote = client
                .get_metric_descriptor(request)
                .await
                .map_err(|source| ExportError::GetDescriptor {
                    metric_type: metric_type.clone(),
                    source,
                })?;
            telemetry.descriptors_fetched().increment(1);
            remote
        } else {
            let request = CreateMetricDescriptorRequest {
                name: namer.project_name(),
                metric_descriptor: descriptor,
            };
            let remote = client
                .create_metric_descriptor(request)
                .await
                .map_err(|source| ExportError::CreateDescriptor {
                    metric_type: metric_type.clone(),
                    source,
                })?;
            telemetry.descriptors_created().increment(1);
            remote
        };

        debug!(metric_name, metric_type = %metric_type, "Registered metric descriptor.");
        descriptors.insert(metric_name.to_string(), remote);

        Ok(())
    }

    /// Returns the cached descriptor for the given census metric name, if any.
    pub async fn get(&self, metric_name: &str) -> Option<monitoring::MetricDescriptor> {
        self.descriptors.lock().await.get(metric_name).cloned()
    }

    /// Returns the number of cached descriptors.
    pub async fn len(&self) -> usize {
        self.descriptors.lock().await.len()
    }

    /// Returns `true` if no descriptors are cached.
    pub async fn is_empty(&self) -> bool {
        self.descriptors.lock().await.is_empty()
    }
}
