//! Test helpers.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use stackdriver_error::{generic_error, GenericError};

use crate::{
    client::MetricServiceClient,
    monitoring::{CreateMetricDescriptorRequest, CreateTimeSeriesRequest, GetMetricDescriptorRequest, MetricDescriptor},
};

/// A metric service client that records every request it receives.
#[derive(Default)]
pub struct RecordingClient {
    time_series: Mutex<Vec<CreateTimeSeriesRequest>>,
    created: Mutex<Vec<CreateMetricDescriptorRequest>>,
    fetched: Mutex<Vec<GetMetricDescriptorRequest>>,
    descriptor_failures: AtomicUsize,
    failing_uploads: Mutex<HashSet<usize>>,
    upload_calls: AtomicUsize,
    upload_delay: Option<Duration>,
    descriptor_delay: Option<Duration>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` descriptor calls.
    pub fn fail_descriptors(self, count: usize) -> Self {
        self.descriptor_failures.store(count, Relaxed);
        self
    }

    /// Fails the upload calls at the given zero-based call indexes.
    pub fn fail_uploads(self, indexes: &[usize]) -> Self {
        self.failing_uploads.lock().unwrap().extend(indexes.iter().copied());
        self
    }

    /// Delays every upload call.
    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    /// Delays every descriptor call.
    pub fn with_descriptor_delay(mut self, delay: Duration) -> Self {
        self.descriptor_delay = Some(delay);
        self
    }

    pub fn time_series_requests(&self) -> Vec<CreateTimeSeriesRequest> {
        self.time_series.lock().unwrap().clone()
    }

    pub fn created_descriptors(&self) -> Vec<CreateMetricDescriptorRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn fetched_descriptors(&self) -> Vec<GetMetricDescriptorRequest> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Relaxed)
    }

    fn take_descriptor_failure(&self) -> bool {
        self.descriptor_failures
            .fetch_update(Relaxed, Relaxed, |remaining| remaining.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MetricServiceClient for RecordingClient {
    async fn create_time_series(&self, request: CreateTimeSeriesRequest) -> Result<(), GenericError> {
        let call = self.upload_calls.fetch_add(1, Relaxed);
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_uploads.lock().unwrap().contains(&call) {
            return Err(generic_error!("upload {} rejected", call));
        }

        self.time_series.lock().unwrap().push(request);
        Ok(())
    }

    async fn create_metric_descriptor(
        &self, request: CreateMetricDescriptorRequest,
    ) -> Result<MetricDescriptor, GenericError> {
        if let Some(delay) = self.descriptor_delay {
            tokio::time::sleep(delay).await;
        }

        if self.take_descriptor_failure() {
            return Err(generic_error!("permission denied"));
        }

        let descriptor = request.metric_descriptor.clone();
        self.created.lock().unwrap().push(request);
        Ok(descriptor)
    }

    async fn get_metric_descriptor(&self, request: GetMetricDescriptorRequest) -> Result<MetricDescriptor, GenericError> {
        if self.take_descriptor_failure() {
            return Err(generic_error!("not found"));
        }

        let descriptor = MetricDescriptor {
            name: request.name.clone(),
            ..Default::default()
        };
        self.fetched.lock().unwrap().push(request);
        Ok(descriptor)
    }
}
