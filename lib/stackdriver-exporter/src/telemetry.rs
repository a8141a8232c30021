use metrics::{counter, histogram, Counter, Histogram};

/// Exporter telemetry.
///
/// Tracks what the exporter sends and what it drops, tagged by project.
#[derive(Clone)]
pub struct ExporterTelemetry {
    time_series_sent: Counter,
    requests_sent: Counter,
    requests_failed: Counter,
    request_batch_size: Histogram,
    descriptors_created: Counter,
    descriptors_fetched: Counter,
    descriptor_cache_hits: Counter,
    series_dropped_labels: Counter,
    series_dropped_upload: Counter,
    payloads_dropped: Counter,
    export_errors: Counter,
}

impl ExporterTelemetry {
    /// Creates a new `ExporterTelemetry` instance for the given project.
    pub fn new(project_id: &str) -> Self {
        let project_id = project_id.to_string();

        Self {
            time_series_sent: counter!("exporter_time_series_sent_total", "project_id" => project_id.clone()),
            requests_sent: counter!("exporter_requests_sent_total", "project_id" => project_id.clone()),
            requests_failed: counter!("exporter_errors_total", "project_id" => project_id.clone(), "error_type" => "upload"),
            request_batch_size: histogram!("exporter_request_batch_size", "project_id" => project_id.clone()),
            descriptors_created: counter!(
                "exporter_metric_descriptors_total", "project_id" => project_id.clone(), "operation" => "create"
            ),
            descriptors_fetched: counter!(
                "exporter_metric_descriptors_total", "project_id" => project_id.clone(), "operation" => "get"
            ),
            descriptor_cache_hits: counter!("exporter_metric_descriptor_cache_hits_total", "project_id" => project_id.clone()),
            series_dropped_labels: counter!(
                "exporter_time_series_dropped_total", "project_id" => project_id.clone(), "drop_reason" => "label_mismatch"
            ),
            series_dropped_upload: counter!(
                "exporter_time_series_dropped_total", "project_id" => project_id.clone(), "drop_reason" => "upload_failure"
            ),
            payloads_dropped: counter!("exporter_payloads_dropped_total", "project_id" => project_id.clone()),
            export_errors: counter!("exporter_errors_total", "project_id" => project_id, "error_type" => "export"),
        }
    }

    /// Tracks a successfully uploaded request.
    pub fn track_request_sent(&self, series: usize) {
        self.requests_sent.increment(1);
        self.time_series_sent.increment(series as u64);
        self.request_batch_size.record(series as f64);
    }

    /// Tracks a failed upload request.
    pub fn track_request_failed(&self, series: usize) {
        self.requests_failed.increment(1);
        self.series_dropped_upload.increment(series as u64);
    }

    /// Returns a reference to the "descriptors created" counter.
    pub fn descriptors_created(&self) -> &Counter {
        &self.descriptors_created
    }

    /// Returns a reference to the "descriptors fetched" counter.
    pub fn descriptors_fetched(&self) -> &Counter {
        &self.descriptors_fetched
    }

    /// Returns a reference to the "descriptor cache hits" counter.
    pub fn descriptor_cache_hits(&self) -> &Counter {
        &self.descriptor_cache_hits
    }

    /// Returns a reference to the "series dropped (label mismatch)" counter.
    pub fn series_dropped_labels(&self) -> &Counter {
        &self.series_dropped_labels
    }

    /// Returns a reference to the "payloads dropped" counter.
    pub fn payloads_dropped(&self) -> &Counter {
        &self.payloads_dropped
    }

    /// Returns a reference to the "export errors" counter.
    pub fn export_errors(&self) -> &Counter {
        &self.export_errors
    }
}
