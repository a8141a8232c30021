use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, debug_span, error, warn, Instrument as _};

use crate::{
    bundler::{BundleHandler, BundlerHandle, BundlerSettings},
    census::{Metric, MetricType, Node, Resource},
    client::MetricServiceClient,
    config::ExporterConfiguration,
    convert::{assemble_time_series, split_summary},
    descriptor::{DescriptorCache, MetricNamer},
    error::{combine_errors, ExportError},
    labels::{default_labels_for_process, default_labels_from_node, DefaultLabels},
    monitoring::{CreateTimeSeriesRequest, MonitoredResource, TimeSeries},
    request_builder::build_requests,
    resource::{DefaultResourceMapper, ResourceCache, ResourceMapper},
    telemetry::ExporterTelemetry,
};

const BUNDLER_BUFFER_SIZE: usize = 1024;

/// Handles errors from buffered exports.
///
/// Buffered exports upload in the background, so their errors cannot be returned to the caller.
pub trait ErrorHandler: Send + Sync {
    /// Handles an export error.
    fn handle_error(&self, error: &ExportError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&ExportError) + Send + Sync,
{
    fn handle_error(&self, error: &ExportError) {
        self(error)
    }
}

/// An error handler that logs errors.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle_error(&self, error: &ExportError) {
        error!(error = %error, "Failed to export metrics.");
    }
}

/// A metric waiting in the bundler, along with everything needed to upload it.
struct MetricPayload {
    resource: Option<Arc<Resource>>,
    metric: Metric,
    default_labels: Arc<DefaultLabels>,
}

struct ExporterInner {
    config: ExporterConfiguration,
    namer: MetricNamer,
    client: Arc<dyn MetricServiceClient>,
    mapper: Arc<dyn ResourceMapper>,
    error_handler: Arc<dyn ErrorHandler>,
    descriptors: DescriptorCache,
    telemetry: ExporterTelemetry,
    configured_labels: Option<Arc<DefaultLabels>>,
    process_labels: Arc<DefaultLabels>,
}

impl ExporterInner {
    fn default_labels(&self, node: Option<&Node>) -> Arc<DefaultLabels> {
        if let Some(labels) = &self.configured_labels {
            return Arc::clone(labels);
        }

        match node {
            Some(node) => Arc::new(default_labels_from_node(node)),
            None => Arc::clone(&self.process_labels),
        }
    }

    async fn ensure_descriptor(&self, metric: &Metric, default_labels: &DefaultLabels) -> Result<(), ExportError> {
        if self.config.skip_metric_descriptor_creation {
            return Ok(());
        }

        self.descriptors
            .ensure_descriptor(
                self.client.as_ref(),
                &self.namer,
                metric,
                default_labels,
                &self.telemetry,
            )
            .await
    }

    fn assemble(
        &self, metric: &Metric, resource: &MonitoredResource, default_labels: &DefaultLabels,
    ) -> Result<Vec<TimeSeries>, ExportError> {
        let metric_type = self.namer.metric_type(metric.name());
        let assembled = assemble_time_series(metric, &metric_type, resource, default_labels)?;

        for e in &assembled.skipped {
            warn!(metric_name = metric.name(), error = %e, "Skipping time series with mismatched labels.");
            self.telemetry.series_dropped_labels().increment(1);
        }

        Ok(assembled.time_series)
    }

    fn build_requests(&self, time_series: Vec<TimeSeries>) -> Vec<CreateTimeSeriesRequest> {
        build_requests(
            &self.namer.project_name(),
            time_series,
            self.config.max_time_series_per_upload,
        )
    }

    async fn upload(&self, request: CreateTimeSeriesRequest) -> Result<(), ExportError> {
        let series = request.time_series.len();

        match self.client.create_time_series(request).await {
            Ok(()) => {
                debug!(series, "Uploaded time series.");
                self.telemetry.track_request_sent(series);
                Ok(())
            }
            Err(source) => {
                self.telemetry.track_request_failed(series);
                Err(ExportError::Upload { series, source })
            }
        }
    }

    /// Uploads a bundle of buffered metrics.
    ///
    /// Descriptors are ensured first, and every payload converted, each step stopping at the first failure. Every
    /// request is then uploaded, with all upload failures collected.
    async fn upload_bundle(&self, payloads: Vec<MetricPayload>) -> Result<(), ExportError> {
        for payload in &payloads {
            self.ensure_descriptor(&payload.metric, &payload.default_labels).await?;
        }

        let mut resources = ResourceCache::new(self.mapper.as_ref());
        let mut time_series = Vec::new();
        for payload in &payloads {
            let resource = resources.resolve(payload.resource.as_ref(), &payload.metric);
            time_series.extend(self.assemble(&payload.metric, &resource, &payload.default_labels)?);
        }

        let mut errors = Vec::new();
        for request in self.build_requests(time_series) {
            if let Err(e) = self.upload(request).await {
                errors.push(e);
            }
        }

        combine_errors(errors)
    }

    /// Exports metrics directly.
    ///
    /// A metric that fails to register or convert is skipped, and its error collected. Requests are uploaded in order,
    /// and the first failed upload stops the rest.
    async fn export_direct(
        &self, resource: Option<&Arc<Resource>>, metrics: &[Metric], default_labels: &DefaultLabels,
    ) -> Result<(), ExportError> {
        let mut errors = Vec::new();
        let mut resources = ResourceCache::new(self.mapper.as_ref());
        let mut time_series = Vec::new();

        for metric in metrics {
            let monitored_resource = resources.resolve(resource, metric);

            let summary_parts;
            let parts = if is_summary(metric) {
                summary_parts = split_summary(metric);
                summary_parts.iter().collect::<Vec<_>>()
            } else {
                vec![metric]
            };

            for part in parts {
                match self.convert(part, &monitored_resource, default_labels).await {
                    Ok(converted) => time_series.extend(converted),
                    Err(e) => errors.push(e),
                }
            }
        }

        for request in self.build_requests(time_series) {
            if let Err(e) = self.upload(request).await {
                errors.push(e);
                break;
            }
        }

        combine_errors(errors)
    }

    async fn convert(
        &self, metric: &Metric, resource: &MonitoredResource, default_labels: &DefaultLabels,
    ) -> Result<Vec<TimeSeries>, ExportError> {
        self.ensure_descriptor(metric, default_labels).await?;
        self.assemble(metric, resource, default_labels)
    }

    fn report(&self, error: &ExportError) {
        self.telemetry.export_errors().increment(1);
        self.error_handler.handle_error(error);
    }
}

fn is_summary(metric: &Metric) -> bool {
    metric
        .descriptor
        .as_ref()
        .is_some_and(|descriptor| descriptor.metric_type == MetricType::Summary)
}

struct UploadHandler {
    inner: Arc<ExporterInner>,
}

#[async_trait]
impl BundleHandler<MetricPayload> for UploadHandler {
    async fn handle_bundle(&self, bundle: Vec<MetricPayload>) {
        let export_timeout = self.inner.config.timeout();
        let span = debug_span!("upload_bundle", payloads = bundle.len());
        let upload = self.inner.upload_bundle(bundle).instrument(span);
        let result = match timeout(export_timeout, upload).await {
            Ok(result) => result,
            Err(_) => Err(ExportError::Timeout {
                timeout: export_timeout,
            }),
        };

        if let Err(e) = result {
            self.inner.report(&e);
        }
    }
}

/// Builder for [`Exporter`].
pub struct ExporterBuilder {
    config: ExporterConfiguration,
    client: Arc<dyn MetricServiceClient>,
    mapper: Option<Arc<dyn ResourceMapper>>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl ExporterBuilder {
    /// Sets the resource mapper.
    ///
    /// Defaults to [`DefaultResourceMapper`] for the configured project.
    pub fn with_resource_mapper<M>(mut self, mapper: M) -> Self
    where
        M: ResourceMapper + 'static,
    {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    /// Sets the error handler for buffered exports.
    ///
    /// Defaults to [`LoggingErrorHandler`].
    pub fn with_error_handler<H>(mut self, error_handler: H) -> Self
    where
        H: ErrorHandler + 'static,
    {
        self.error_handler = Arc::new(error_handler);
        self
    }

    /// Builds the exporter, spawning its bundler task on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn build(self) -> Exporter {
        let Self {
            config,
            client,
            mapper,
            error_handler,
        } = self;

        let mapper = mapper.unwrap_or_else(|| Arc::new(DefaultResourceMapper::new(&config.project_id)));
        let settings = BundlerSettings {
            count_threshold: config.bundle_count_threshold(),
            delay_threshold: config.bundle_delay_threshold(),
            buffer_size: BUNDLER_BUFFER_SIZE,
        };

        let inner = Arc::new(ExporterInner {
            namer: config.namer(),
            telemetry: ExporterTelemetry::new(&config.project_id),
            configured_labels: config.default_labels.clone().map(Arc::new),
            process_labels: Arc::new(default_labels_for_process()),
            descriptors: DescriptorCache::new(),
            config,
            client,
            mapper,
            error_handler,
        });

        let bundler = BundlerHandle::spawn(
            settings,
            UploadHandler {
                inner: Arc::clone(&inner),
            },
        );

        Exporter { inner, bundler }
    }
}

/// Metrics exporter.
///
/// Converts census metrics into monitoring time series and uploads them, either buffered in the background
/// ([`export_metrics`][Self::export_metrics]) or directly ([`export_metrics_sync`][Self::export_metrics_sync]).
///
/// Metric descriptors are registered at most once per metric name for the lifetime of the exporter.
pub struct Exporter {
    inner: Arc<ExporterInner>,
    bundler: BundlerHandle<MetricPayload>,
}

impl Exporter {
    /// Creates a builder for an exporter with the given configuration and client.
    pub fn builder<C>(config: ExporterConfiguration, client: C) -> ExporterBuilder
    where
        C: MetricServiceClient + 'static,
    {
        Self::builder_with_client(config, Arc::new(client))
    }

    /// Creates a builder for an exporter with the given configuration and shared client.
    pub fn builder_with_client(config: ExporterConfiguration, client: Arc<dyn MetricServiceClient>) -> ExporterBuilder {
        ExporterBuilder {
            config,
            client,
            mapper: None,
            error_handler: Arc::new(LoggingErrorHandler),
        }
    }

    /// Returns the exporter's configuration.
    pub fn config(&self) -> &ExporterConfiguration {
        &self.inner.config
    }

    /// Exports metrics in the background.
    ///
    /// Summaries are split into their component metrics, and each metric is queued for upload. `resource` applies to
    /// every metric without a resource of its own, and `node`, when present, identifies the originating process for
    /// the default labels. Upload errors go to the configured [`ErrorHandler`].
    ///
    /// # Errors
    ///
    /// If `metrics` is empty or any metric has no descriptor, an error is returned and nothing is queued. If a metric
    /// cannot be queued, an error is returned, and every other metric is still queued.
    pub fn export_metrics(
        &self, node: Option<&Node>, resource: Option<Arc<Resource>>, metrics: Vec<Metric>,
    ) -> Result<(), ExportError> {
        if metrics.is_empty() {
            return Err(ExportError::NoMetrics);
        }

        if metrics.iter().any(|metric| metric.descriptor.is_none()) {
            return Err(ExportError::MissingDescriptor);
        }

        let default_labels = self.inner.default_labels(node);
        let mut errors = Vec::new();

        for metric in metrics {
            let parts = if is_summary(&metric) {
                split_summary(&metric)
            } else {
                vec![metric]
            };

            for metric in parts {
                let payload = MetricPayload {
                    resource: resource.clone(),
                    metric,
                    default_labels: Arc::clone(&default_labels),
                };

                if let Err(e) = self.bundler.add(payload) {
                    self.inner.telemetry.payloads_dropped().increment(1);
                    errors.push(e);
                }
            }
        }

        combine_errors(errors)
    }

    /// Exports metrics directly, returning once every upload has completed.
    ///
    /// Each metric is registered and converted on its own: a metric that fails is skipped and its error collected,
    /// while the others are still uploaded. Uploads stop at the first failed request. The whole export is bounded by
    /// the configured timeout.
    ///
    /// # Errors
    ///
    /// If `metrics` is empty, or anything fails, an error is returned, combining every collected error.
    pub async fn export_metrics_sync(
        &self, node: Option<&Node>, resource: Option<Arc<Resource>>, metrics: Vec<Metric>,
    ) -> Result<(), ExportError> {
        if metrics.is_empty() {
            return Err(ExportError::NoMetrics);
        }

        let default_labels = self.inner.default_labels(node);
        let export_timeout = self.inner.config.timeout();

        let span = debug_span!("export_direct", metrics = metrics.len());
        let export = self
            .inner
            .export_direct(resource.as_ref(), &metrics, &default_labels)
            .instrument(span);

        let result = match timeout(export_timeout, export).await {
            Ok(result) => result,
            Err(_) => Err(ExportError::Timeout {
                timeout: export_timeout,
            }),
        };

        if result.is_err() {
            self.inner.telemetry.export_errors().increment(1);
        }
        result
    }

    /// Uploads every buffered metric, waiting until the upload completes.
    ///
    /// # Errors
    ///
    /// If the exporter has been shut down, an error is returned.
    pub async fn flush(&self) -> Result<(), ExportError> {
        self.bundler.flush().await
    }

    /// Uploads every buffered metric and stops accepting new ones.
    ///
    /// # Errors
    ///
    /// If the exporter has already been shut down, an error is returned.
    pub async fn shutdown(&self) -> Result<(), ExportError> {
        debug!("Shutting down exporter.");
        self.bundler.shutdown().await
    }

    /// Returns the number of metric descriptors registered so far.
    pub async fn registered_descriptors(&self) -> usize {
        self.inner.descriptors.len().await
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use prost_types::Timestamp;

    use super::*;
    use crate::{
        census::{
            Language, LabelKey, LabelValue, LibraryInfo, MetricDescriptor, Point, PointValue, ProcessIdentifier, Snapshot,
            SummaryValue, TimeSeries as CensusSeries, ValueAtPercentile,
        },
        labels::DefaultLabel,
        testing::RecordingClient,
    };

    fn ts(seconds: i64) -> Timestamp {
        Timestamp { seconds, nanos: 0 }
    }

    fn metric(name: &str, metric_type: MetricType, values: &[&str]) -> Metric {
        let descriptor = MetricDescriptor::new(name, metric_type).with_label_keys(vec![LabelKey::new("method", "")]);
        let timeseries = values
            .iter()
            .map(|value| CensusSeries {
                label_values: vec![LabelValue::new(*value)],
                start_timestamp: Some(ts(100)),
                points: vec![Point::new(ts(160), PointValue::Int64(1))],
            })
            .collect();
        Metric::new(descriptor, timeseries)
    }

    fn summary(name: &str) -> Metric {
        let descriptor = MetricDescriptor::new(name, MetricType::Summary).with_label_keys(vec![LabelKey::new("method", "")]);
        let point = Point::new(
            ts(160),
            PointValue::Summary(SummaryValue {
                count: Some(4),
                sum: Some(10.0),
                snapshot: Some(Snapshot {
                    count: None,
                    sum: None,
                    percentile_values: vec![ValueAtPercentile {
                        percentile: 50.0,
                        value: 2.0,
                    }],
                }),
            }),
        );
        Metric::new(
            descriptor,
            vec![CensusSeries {
                label_values: vec![LabelValue::new("GET")],
                start_timestamp: Some(ts(100)),
                points: vec![point],
            }],
        )
    }

    fn config() -> ExporterConfiguration {
        let mut labels = DefaultLabels::new();
        labels.insert("task".to_string(), DefaultLabel::new("t1", ""));
        ExporterConfiguration::new("my-project").with_default_labels(labels)
    }

    fn collecting_handler() -> (Arc<Mutex<Vec<String>>>, impl ErrorHandler) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let handler_errors = Arc::clone(&errors);
        let handler = move |error: &ExportError| handler_errors.lock().unwrap().push(error.to_string());
        (errors, handler)
    }

    #[tokio::test]
    async fn empty_metrics_fail_without_remote_calls() {
        let client = Arc::new(RecordingClient::new());
        let exporter = Exporter::builder_with_client(config(), client.clone()).build();

        assert!(matches!(
            exporter.export_metrics_sync(None, None, Vec::new()).await,
            Err(ExportError::NoMetrics)
        ));
        assert!(matches!(
            exporter.export_metrics(None, None, Vec::new()),
            Err(ExportError::NoMetrics)
        ));

        exporter.flush().await.unwrap();
        assert!(client.created_descriptors().is_empty());
        assert_eq!(client.upload_calls(), 0);
    }

    #[tokio::test]
    async fn sync_export_uploads_and_registers_once() {
        let client = Arc::new(RecordingClient::new());
        let exporter = Exporter::builder_with_client(config(), client.clone()).build();

        let metrics = vec![
            metric("requests", MetricType::CumulativeInt64, &["GET", "POST"]),
            metric("requests", MetricType::CumulativeInt64, &["PUT"]),
        ];
        exporter.export_metrics_sync(None, None, metrics).await.unwrap();

        assert_eq!(client.created_descriptors().len(), 1);
        assert_eq!(exporter.registered_descriptors().await, 1);

        let requests = client.time_series_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "projects/my-project");

        let series = &requests[0].time_series;
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].metric.metric_type, "custom.googleapis.com/opencensus/requests");
        assert_eq!(series[0].metric.labels["task"], "t1");
        assert_eq!(series[0].resource.resource_type, "global");
        assert_eq!(series[0].resource.labels["project_id"], "my-project");
    }

    #[tokio::test]
    async fn sync_export_splits_summaries() {
        let client = Arc::new(RecordingClient::new());
        let exporter = Exporter::builder_with_client(config(), client.clone()).build();

        exporter
            .export_metrics_sync(None, None, vec![summary("latency")])
            .await
            .unwrap();

        let mut types = client
            .created_descriptors()
            .into_iter()
            .map(|request| request.metric_descriptor.metric_type)
            .collect::<Vec<_>>();
        types.sort();
        assert_eq!(
            types,
            vec![
                "custom.googleapis.com/opencensus/latency_summary_count",
                "custom.googleapis.com/opencensus/latency_summary_percentile",
                "custom.googleapis.com/opencensus/latency_summary_sum",
            ]
        );
        assert_eq!(client.time_series_requests()[0].time_series.len(), 3);
    }

    #[tokio::test]
    async fn sync_export_skips_failed_metric() {
        let client = Arc::new(RecordingClient::new().fail_descriptors(1));
        let exporter = Exporter::builder_with_client(config(), client.clone()).build();

        let metrics = vec![
            metric("first", MetricType::GaugeInt64, &["GET"]),
            metric("second", MetricType::GaugeInt64, &["GET"]),
        ];
        let error = exporter.export_metrics_sync(None, None, metrics).await.unwrap_err();
        assert!(matches!(error, ExportError::CreateDescriptor { .. }));

        let requests = client.time_series_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].time_series.len(), 1);
        assert_eq!(
            requests[0].time_series[0].metric.metric_type,
            "custom.googleapis.com/opencensus/second"
        );
    }

    #[tokio::test]
    async fn sync_export_stops_at_first_failed_upload() {
        let client = Arc::new(RecordingClient::new().fail_uploads(&[0]));
        let config = config().with_max_time_series_per_upload(1);
        let exporter = Exporter::builder_with_client(config, client.clone()).build();

        let error = exporter
            .export_metrics_sync(
                None,
                None,
                vec![metric("requests", MetricType::CumulativeInt64, &["A", "B", "C"])],
            )
            .await
            .unwrap_err();

        assert!(matches!(error, ExportError::Upload { series: 1, .. }));
        assert_eq!(client.upload_calls(), 1);
    }

    #[tokio::test]
    async fn skip_descriptor_creation() {
        let client = Arc::new(RecordingClient::new());
        let config = config().with_skip_metric_descriptor_creation(true);
        let exporter = Exporter::builder_with_client(config, client.clone()).build();

        exporter
            .export_metrics_sync(None, None, vec![metric("requests", MetricType::GaugeInt64, &["GET"])])
            .await
            .unwrap();

        assert!(client.created_descriptors().is_empty());
        assert_eq!(client.time_series_requests().len(), 1);
    }

    #[tokio::test]
    async fn custom_resource_mapper_and_override() {
        let client = Arc::new(RecordingClient::new());
        let exporter = Exporter::builder_with_client(config(), client.clone())
            .with_resource_mapper(|resource: &Resource| MonitoredResource::new(resource.resource_type.clone()))
            .build();

        let default_resource = Arc::new(Resource::new("default"));
        let overridden =
            metric("b", MetricType::GaugeInt64, &["GET"]).with_resource(Arc::new(Resource::new("override")));
        exporter
            .export_metrics_sync(
                None,
                Some(default_resource),
                vec![metric("a", MetricType::GaugeInt64, &["GET"]), overridden],
            )
            .await
            .unwrap();

        let series = &client.time_series_requests()[0].time_series;
        assert_eq!(series[0].resource.resource_type, "default");
        assert_eq!(series[1].resource.resource_type, "override");
    }

    #[tokio::test]
    async fn node_labels_apply_without_configured_labels() {
        let client = Arc::new(RecordingClient::new());
        let exporter = Exporter::builder_with_client(ExporterConfiguration::new("p"), client.clone()).build();

        let node = Node {
            identifier: Some(ProcessIdentifier {
                host_name: "web-1".to_string(),
                pid: 42,
                start_timestamp: None,
            }),
            library_info: Some(LibraryInfo {
                language: Language::GoLang,
                ..Default::default()
            }),
        };

        exporter
            .export_metrics_sync(Some(&node), None, vec![metric("m", MetricType::GaugeInt64, &["GET"])])
            .await
            .unwrap();

        let series = &client.time_series_requests()[0].time_series;
        assert_eq!(series[0].metric.labels["opencensus_task"], "go_lang-42@web-1");
    }

    #[tokio::test(start_paused = true)]
    async fn sync_export_times_out() {
        let client = Arc::new(RecordingClient::new().with_upload_delay(Duration::from_secs(10)));
        let config = config().with_timeout_secs(1);
        let exporter = Exporter::builder_with_client(config, client.clone()).build();

        let error = exporter
            .export_metrics_sync(None, None, vec![metric("m", MetricType::GaugeInt64, &["GET"])])
            .await
            .unwrap_err();
        assert!(matches!(error, ExportError::Timeout { .. }));
        assert!(client.time_series_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_export_flushes_on_count_threshold() {
        let client = Arc::new(RecordingClient::new());
        let config = config().with_bundle_thresholds(2, 60_000);
        let exporter = Exporter::builder_with_client(config, client.clone()).build();

        exporter
            .export_metrics(
                None,
                None,
                vec![
                    metric("a", MetricType::GaugeInt64, &["GET"]),
                    metric("b", MetricType::GaugeInt64, &["GET"]),
                ],
            )
            .unwrap();

        // Let the bundler task run without advancing past the delay threshold.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(client.time_series_requests().len(), 1);
        assert_eq!(client.time_series_requests()[0].time_series.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_export_flushes_on_delay_threshold() {
        let client = Arc::new(RecordingClient::new());
        let config = config().with_bundle_thresholds(100, 500);
        let exporter = Exporter::builder_with_client(config, client.clone()).build();

        exporter
            .export_metrics(None, None, vec![metric("a", MetricType::GaugeInt64, &["GET"])])
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(client.time_series_requests().is_empty());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(client.time_series_requests().len(), 1);
    }

    #[tokio::test]
    async fn buffered_upload_errors_reach_handler_combined() {
        let client = Arc::new(RecordingClient::new().fail_uploads(&[0, 2]));
        let config = config().with_max_time_series_per_upload(1);
        let (errors, handler) = collecting_handler();
        let exporter = Exporter::builder_with_client(config, client.clone())
            .with_error_handler(handler)
            .build();

        exporter
            .export_metrics(
                None,
                None,
                vec![metric("requests", MetricType::CumulativeInt64, &["A", "B", "C"])],
            )
            .unwrap();
        exporter.flush().await.unwrap();

        assert_eq!(client.upload_calls(), 3);
        assert_eq!(client.time_series_requests().len(), 1);

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            "[failed to upload 1 time series: upload 0 rejected; failed to upload 1 time series: upload 2 rejected]"
        );
    }

    #[tokio::test]
    async fn buffered_descriptor_failure_aborts_pass() {
        let client = Arc::new(RecordingClient::new().fail_descriptors(1));
        let (errors, handler) = collecting_handler();
        let exporter = Exporter::builder_with_client(config(), client.clone())
            .with_error_handler(handler)
            .build();

        exporter
            .export_metrics(
                None,
                None,
                vec![
                    metric("a", MetricType::GaugeInt64, &["GET"]),
                    metric("b", MetricType::GaugeInt64, &["GET"]),
                ],
            )
            .unwrap();
        exporter.flush().await.unwrap();

        assert!(client.created_descriptors().is_empty());
        assert_eq!(client.upload_calls(), 0);
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn buffered_export_rejects_missing_descriptor() {
        let client = Arc::new(RecordingClient::new());
        let exporter = Exporter::builder_with_client(config(), client.clone()).build();

        let error = exporter
            .export_metrics(
                None,
                None,
                vec![Metric::default(), metric("a", MetricType::GaugeInt64, &["GET"])],
            )
            .unwrap_err();
        assert!(matches!(error, ExportError::MissingDescriptor));

        exporter.flush().await.unwrap();
        assert!(client.created_descriptors().is_empty());
        assert_eq!(client.upload_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_export_timeout_reaches_handler() {
        let client = Arc::new(RecordingClient::new().with_upload_delay(Duration::from_secs(10)));
        let config = config().with_timeout_secs(1);
        let (errors, handler) = collecting_handler();
        let exporter = Exporter::builder_with_client(config, client.clone())
            .with_error_handler(handler)
            .build();

        exporter
            .export_metrics(None, None, vec![metric("a", MetricType::GaugeInt64, &["GET"])])
            .unwrap();
        exporter.flush().await.unwrap();

        assert!(client.time_series_requests().is_empty());

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        let expected = ExportError::Timeout {
            timeout: Duration::from_secs(1),
        };
        assert_eq!(errors[0], expected.to_string());
    }

    #[tokio::test]
    async fn shutdown_flushes_and_closes() {
        let client = Arc::new(RecordingClient::new());
        let exporter = Exporter::builder_with_client(config(), client.clone()).build();

        exporter
            .export_metrics(None, None, vec![metric("a", MetricType::GaugeInt64, &["GET"])])
            .unwrap();
        exporter.shutdown().await.unwrap();
        assert_eq!(client.time_series_requests().len(), 1);

        let error = exporter
            .export_metrics(None, None, vec![metric("a", MetricType::GaugeInt64, &["GET"])])
            .unwrap_err();
        assert!(matches!(error, ExportError::BundlerClosed));
    }
}
