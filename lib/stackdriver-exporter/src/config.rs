use std::time::Duration;

use serde::Deserialize;
use stackdriver_config::GenericConfiguration;
use stackdriver_error::GenericError;

use crate::{
    descriptor::{MetricNamer, DEFAULT_DISPLAY_NAME_PREFIX, DEFAULT_METRIC_PREFIX},
    labels::DefaultLabels,
    request_builder::DEFAULT_MAX_TIME_SERIES_PER_UPLOAD,
};

const MINIMUM_TIMEOUT: Duration = Duration::from_millis(10);

fn default_metric_prefix() -> String {
    DEFAULT_METRIC_PREFIX.to_owned()
}

fn default_display_name_prefix() -> String {
    DEFAULT_DISPLAY_NAME_PREFIX.to_owned()
}

const fn default_timeout_secs() -> u64 {
    5
}

const fn default_bundle_delay_threshold_ms() -> u64 {
    1000
}

const fn default_bundle_count_threshold() -> usize {
    10
}

const fn default_max_time_series_per_upload() -> usize {
    DEFAULT_MAX_TIME_SERIES_PER_UPLOAD
}

/// Exporter configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ExporterConfiguration {
    /// Project to export metrics to.
    pub project_id: String,

    /// Prefix prepended to every metric name to form its metric type.
    ///
    /// Defaults to `custom.googleapis.com/opencensus`.
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,

    /// Prefix prepended to every metric name to form its display name.
    ///
    /// Defaults to `OpenCensus`.
    #[serde(default = "default_display_name_prefix")]
    pub display_name_prefix: String,

    /// Timeout for a single export, in seconds.
    ///
    /// Covers every remote call made while exporting a batch of metrics: descriptor creation and uploads alike.
    ///
    /// Defaults to 5 seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum time a buffered metric waits before being uploaded, in milliseconds.
    ///
    /// Defaults to 1000 milliseconds.
    #[serde(default = "default_bundle_delay_threshold_ms")]
    pub bundle_delay_threshold_ms: u64,

    /// Number of buffered metrics that triggers an upload.
    ///
    /// Defaults to 10.
    #[serde(default = "default_bundle_count_threshold")]
    pub bundle_count_threshold: usize,

    /// Maximum number of time series in a single upload request.
    ///
    /// Defaults to 200.
    #[serde(default = "default_max_time_series_per_upload")]
    pub max_time_series_per_upload: usize,

    /// Labels attached to every exported time series.
    ///
    /// When unset, a single `opencensus_task` label identifying the originating process is used instead. Setting this
    /// to an empty map disables default labels entirely.
    #[serde(default)]
    pub default_labels: Option<DefaultLabels>,

    /// Whether to skip creating metric descriptors.
    ///
    /// Useful when descriptors are managed out of band, or the exporter lacks permission to create them.
    ///
    /// Defaults to `false`.
    #[serde(default)]
    pub skip_metric_descriptor_creation: bool,
}

impl ExporterConfiguration {
    /// Creates a new `ExporterConfiguration` for the given project, with default settings.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            metric_prefix: default_metric_prefix(),
            display_name_prefix: default_display_name_prefix(),
            timeout_secs: default_timeout_secs(),
            bundle_delay_threshold_ms: default_bundle_delay_threshold_ms(),
            bundle_count_threshold: default_bundle_count_threshold(),
            max_time_series_per_upload: default_max_time_series_per_upload(),
            default_labels: None,
            skip_metric_descriptor_creation: false,
        }
    }

    /// Creates a new `ExporterConfiguration` from the given configuration.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        Ok(config.as_typed()?)
    }

    /// Sets the default labels.
    pub fn with_default_labels(mut self, default_labels: DefaultLabels) -> Self {
        self.default_labels = Some(default_labels);
        self
    }

    /// Sets the export timeout, in seconds.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the bundle thresholds.
    pub fn with_bundle_thresholds(mut self, count: usize, delay_ms: u64) -> Self {
        self.bundle_count_threshold = count;
        self.bundle_delay_threshold_ms = delay_ms;
        self
    }

    /// Sets the maximum number of time series per upload request.
    pub fn with_max_time_series_per_upload(mut self, max_time_series_per_upload: usize) -> Self {
        self.max_time_series_per_upload = max_time_series_per_upload;
        self
    }

    /// Sets whether metric descriptor creation is skipped.
    pub fn with_skip_metric_descriptor_creation(mut self, skip: bool) -> Self {
        self.skip_metric_descriptor_creation = skip;
        self
    }

    /// Returns the export timeout.
    pub fn timeout(&self) -> Duration {
        // A zero timeout would fail every export before it starts, so there is always a small minimum.
        Duration::from_secs(self.timeout_secs).max(MINIMUM_TIMEOUT)
    }

    /// Returns the bundle delay threshold.
    pub fn bundle_delay_threshold(&self) -> Duration {
        match self.bundle_delay_threshold_ms {
            0 => MINIMUM_TIMEOUT,
            ms => Duration::from_millis(ms),
        }
    }

    /// Returns the bundle count threshold, which is always at least one.
    pub fn bundle_count_threshold(&self) -> usize {
        self.bundle_count_threshold.max(1)
    }

    /// Returns a metric namer for this configuration.
    pub fn namer(&self) -> MetricNamer {
        MetricNamer::new(&self.project_id, &self.metric_prefix, &self.display_name_prefix)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use stackdriver_config::ConfigurationLoader;

    use super::*;

    #[test]
    fn defaults() {
        let config = ExporterConfiguration::new("my-project");
        assert_eq!(config.metric_prefix, "custom.googleapis.com/opencensus");
        assert_eq!(config.display_name_prefix, "OpenCensus");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.bundle_delay_threshold(), Duration::from_secs(1));
        assert_eq!(config.bundle_count_threshold(), 10);
        assert_eq!(config.max_time_series_per_upload, 200);
        assert!(config.default_labels.is_none());
        assert!(!config.skip_metric_descriptor_creation);
    }

    #[test]
    fn zero_durations_are_clamped() {
        let config = ExporterConfiguration::new("p")
            .with_timeout_secs(0)
            .with_bundle_thresholds(0, 0);
        assert_eq!(config.timeout(), Duration::from_millis(10));
        assert_eq!(config.bundle_delay_threshold(), Duration::from_millis(10));
        assert_eq!(config.bundle_count_threshold(), 1);
    }

    fn yaml_config(contents: &str) -> GenericConfiguration {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("should not fail to create temporary file");
        file.write_all(contents.as_bytes())
            .expect("should not fail to write temporary file");

        ConfigurationLoader::default()
            .from_yaml(file.path())
            .expect("should not fail to load YAML")
            .into_generic()
    }

    #[test]
    fn from_yaml() {
        let generic = yaml_config(
            r#"
project_id: my-project
metric_prefix: external.googleapis.com/app
timeout_secs: 30
default_labels:
  zone:
    value: us-east1
    description: deployment zone
  env:
    value: prod
"#,
        );
        let config = ExporterConfiguration::from_configuration(&generic).unwrap();

        assert_eq!(config.project_id, "my-project");
        assert_eq!(config.metric_prefix, "external.googleapis.com/app");
        assert_eq!(config.display_name_prefix, "OpenCensus");
        assert_eq!(config.timeout(), Duration::from_secs(30));

        let default_labels = config.default_labels.unwrap();
        assert_eq!(default_labels.len(), 2);
        assert_eq!(default_labels["zone"].value, "us-east1");
        assert_eq!(default_labels["zone"].description, "deployment zone");
        assert_eq!(default_labels["env"].description, "");
    }

    #[test]
    fn missing_project_id() {
        let generic = yaml_config("timeout_secs: 1\n");
        assert!(ExporterConfiguration::from_configuration(&generic).is_err());
    }
}
