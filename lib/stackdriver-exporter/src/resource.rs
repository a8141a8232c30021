//! Monitored resource mapping.

use std::{collections::HashMap, sync::Arc};

use crate::{
    census::{Metric, Resource},
    monitoring::MonitoredResource,
};

const PROJECT_ID_LABEL: &str = "project_id";

const K8S_CONTAINER_RESOURCE_TYPE: &str = "k8s_container";
const GCE_INSTANCE_RESOURCE_TYPE: &str = "gce_instance";
const AWS_EC2_INSTANCE_RESOURCE_TYPE: &str = "aws_ec2_instance";

const CONTAINER_RESOURCE_TYPE: &str = "container";
const CLOUD_PROVIDER_KEY: &str = "cloud.provider";
const CLOUD_PROVIDER_GCP: &str = "gcp";
const CLOUD_PROVIDER_AWS: &str = "aws";

// Monitored resource label, census resource label.
const K8S_CONTAINER_LABELS: &[(&str, &str)] = &[
    ("location", "cloud.zone"),
    ("cluster_name", "k8s.cluster.name"),
    ("namespace_name", "k8s.namespace.name"),
    ("pod_name", "k8s.pod.name"),
    ("container_name", "container.name"),
];
const GCE_INSTANCE_LABELS: &[(&str, &str)] = &[("instance_id", "host.id"), ("zone", "cloud.zone")];
const AWS_EC2_INSTANCE_LABELS: &[(&str, &str)] = &[
    ("instance_id", "host.id"),
    ("region", "cloud.region"),
    ("aws_account", "cloud.account.id"),
];

/// Maps census resources to monitored resources.
///
/// Mapping must be pure: the same resource always maps to the same monitored resource.
pub trait ResourceMapper: Send + Sync {
    /// Maps a census resource to a monitored resource.
    fn map_resource(&self, resource: &Resource) -> MonitoredResource;
}

impl<F> ResourceMapper for F
where
    F: Fn(&Resource) -> MonitoredResource + Send + Sync,
{
    fn map_resource(&self, resource: &Resource) -> MonitoredResource {
        self(resource)
    }
}

/// The default resource mapper.
///
/// Recognizes Kubernetes containers, GCE instances, and EC2 instances. Anything else, including a recognized resource
/// that is missing a required label, maps to the `global` resource. Every mapped resource carries the project ID.
#[derive(Clone, Debug)]
pub struct DefaultResourceMapper {
    project_id: String,
}

impl DefaultResourceMapper {
    /// Creates a new `DefaultResourceMapper` for the given project.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    fn global(&self) -> MonitoredResource {
        let mut global = MonitoredResource::global();
        global.labels.insert(PROJECT_ID_LABEL.to_string(), self.project_id.clone());
        global
    }

    fn transform(
        &self, resource: &Resource, resource_type: &str, label_mapping: &[(&str, &str)],
    ) -> Option<MonitoredResource> {
        let mut mapped = MonitoredResource::new(resource_type);
        mapped
            .labels
            .insert(PROJECT_ID_LABEL.to_string(), self.project_id.clone());

        for (target, source) in label_mapping {
            let mut value = resource.labels.get(*source)?.clone();
            if resource_type == AWS_EC2_INSTANCE_RESOURCE_TYPE && *target == "region" {
                value.insert_str(0, "aws:");
            }
            mapped.labels.insert(target.to_string(), value);
        }

        Some(mapped)
    }
}

impl ResourceMapper for DefaultResourceMapper {
    fn map_resource(&self, resource: &Resource) -> MonitoredResource {
        let mapped = if resource.resource_type == CONTAINER_RESOURCE_TYPE {
            self.transform(resource, K8S_CONTAINER_RESOURCE_TYPE, K8S_CONTAINER_LABELS)
        } else {
            match resource.labels.get(CLOUD_PROVIDER_KEY).map(String::as_str) {
                Some(CLOUD_PROVIDER_GCP) => self.transform(resource, GCE_INSTANCE_RESOURCE_TYPE, GCE_INSTANCE_LABELS),
                Some(CLOUD_PROVIDER_AWS) => {
                    self.transform(resource, AWS_EC2_INSTANCE_RESOURCE_TYPE, AWS_EC2_INSTANCE_LABELS)
                }
                _ => None,
            }
        };

        mapped.unwrap_or_else(|| self.global())
    }
}

/// Call-scoped cache of mapped resources.
///
/// Resources are keyed by identity: two metrics sharing the same `Arc<Resource>` are mapped once. Cached resources are
/// kept alive for the lifetime of the cache, so an identity can never be reused by a different resource.
pub struct ResourceCache<'a> {
    mapper: &'a dyn ResourceMapper,
    mapped: HashMap<Option<usize>, MonitoredResource>,
    held: Vec<Arc<Resource>>,
}

impl<'a> ResourceCache<'a> {
    /// Creates a new, empty `ResourceCache` that maps with the given mapper.
    pub fn new(mapper: &'a dyn ResourceMapper) -> Self {
        Self {
            mapper,
            mapped: HashMap::new(),
            held: Vec::new(),
        }
    }

    /// Resolves the monitored resource for a metric.
    ///
    /// The metric's own resource takes precedence over `default_resource`. When neither is present, the `global`
    /// resource is mapped.
    pub fn resolve(&mut self, default_resource: Option<&Arc<Resource>>, metric: &Metric) -> MonitoredResource {
        let resource = metric.resource.as_ref().or(default_resource);
        let key = resource.map(|resource| Arc::as_ptr(resource) as usize);

        if let Some(mapped) = self.mapped.get(&key) {
            return mapped.clone();
        }

        let mapped = match resource {
            Some(resource) => {
                self.held.push(Arc::clone(resource));
                self.mapper.map_resource(resource)
            }
            None => self.mapper.map_resource(&Resource::new("global")),
        };
        self.mapped.insert(key, mapped.clone());
        mapped
    }

    /// Returns the number of distinct resources mapped so far.
    pub fn len(&self) -> usize {
        self.mapped.len()
    }

    /// Returns `true` if no resources have been mapped.
    pub fn is_empty(&self) -> bool {
        self.mapped.is_empty()
    }
}
