use async_trait::async_trait;
use stackdriver_error::GenericError;

use crate::monitoring::{
    CreateMetricDescriptorRequest, CreateTimeSeriesRequest, GetMetricDescriptorRequest, MetricDescriptor,
};

/// A client for the monitoring API's metric service.
///
/// Each method is a single remote call. Implementations must not retry: failures are reported to the caller as-is.
#[async_trait]
pub trait MetricServiceClient: Send + Sync {
    /// Writes a batch of time series.
    async fn create_time_series(&self, request: CreateTimeSeriesRequest) -> Result<(), GenericError>;

    /// Creates a metric descriptor, returning the descriptor as stored by the API.
    async fn create_metric_descriptor(
        &self, request: CreateMetricDescriptorRequest,
    ) -> Result<MetricDescriptor, GenericError>;

    /// Fetches an existing metric descriptor.
    async fn get_metric_descriptor(&self, request: GetMetricDescriptorRequest) -> Result<MetricDescriptor, GenericError>;
}
