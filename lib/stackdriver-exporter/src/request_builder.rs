//! Batching of time series into upload requests.

use std::collections::HashSet;

use tracing::trace;

use crate::monitoring::{CreateTimeSeriesRequest, TimeSeries};

/// Default maximum number of time series in a single upload request.
pub const DEFAULT_MAX_TIME_SERIES_PER_UPLOAD: usize = 200;

/// Returns the signature of a time series: its metric type and sorted label values.
///
/// The API rejects requests that write the same time series twice, and two time series with the same signature are
/// treated as the same time series.
pub fn metric_signature(ts: &TimeSeries) -> String {
    let mut label_values = ts.metric.labels.values().map(String::as_str).collect::<Vec<_>>();
    label_values.sort_unstable();

    format!("{}:{}", ts.metric.metric_type, label_values.join(","))
}

/// Builds upload requests from assembled time series.
///
/// No request contains two time series with the same signature, and no request holds more than the configured
/// maximum number of time series. Relative order is preserved within each request.
#[derive(Debug)]
pub struct RequestBuilder {
    project_name: String,
    max_time_series_per_request: usize,
    seen: HashSet<String>,
}

impl RequestBuilder {
    /// Creates a new `RequestBuilder` for the given project resource name.
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            max_time_series_per_request: DEFAULT_MAX_TIME_SERIES_PER_UPLOAD,
            seen: HashSet::new(),
        }
    }

    /// Sets the maximum number of time series in a single request.
    ///
    /// Values below one are treated as one.
    pub fn with_max_time_series_per_request(mut self, max_time_series_per_request: usize) -> Self {
        self.max_time_series_per_request = max_time_series_per_request.max(1);
        self
    }

    /// Builds the upload requests for the given time series.
    ///
    /// The first occurrence of each signature goes to the current round of requests, split into chunks of at most
    /// the maximum size. Later occurrences overflow into the next round, which is built the same way, until every
    /// time series has been placed.
    pub fn build(&mut self, time_series: Vec<TimeSeries>) -> Vec<CreateTimeSeriesRequest> {
        let mut requests = Vec::new();
        let mut remaining = time_series;

        while !remaining.is_empty() {
            self.seen.clear();

            let (unique, overflow): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|ts| self.seen.insert(metric_signature(ts)));

            trace!(
                unique = unique.len(),
                overflow = overflow.len(),
                "Partitioned time series by signature."
            );

            let mut unique = unique.into_iter().peekable();
            while unique.peek().is_some() {
                let chunk = unique.by_ref().take(self.max_time_series_per_request).collect();
                requests.push(CreateTimeSeriesRequest {
                    name: self.project_name.clone(),
                    time_series: chunk,
                });
            }

            remaining = overflow;
        }

        requests
    }
}

/// Builds the upload requests for the given time series.
///
/// See [`RequestBuilder::build`].
pub fn build_requests(
    project_name: &str, time_series: Vec<TimeSeries>, max_time_series_per_request: usize,
) -> Vec<CreateTimeSeriesRequest> {
    RequestBuilder::new(project_name)
        .with_max_time_series_per_request(max_time_series_per_request)
        .build(time_series)
}
