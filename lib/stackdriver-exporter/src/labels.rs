//! Labels: sanitization, default labels, and per-series label assembly.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::{
    census::{LabelKey, LabelValue, Node},
    error::ConversionError,
    monitoring::{LabelDescriptor, LabelValueType},
};

/// Maximum length of a label key, in characters.
const LABEL_KEY_SIZE_LIMIT: usize = 100;

/// Key of the default label identifying the process that produced a metric.
pub const OPENCENSUS_TASK_KEY: &str = "opencensus_task";

/// Description of the default task label.
pub const OPENCENSUS_TASK_DESCRIPTION: &str = "Opencensus task identifier";

/// A label attached to every time series exported by a given process.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct DefaultLabel {
    /// Label value.
    pub value: String,

    /// Label description.
    #[serde(default)]
    pub description: String,
}

impl DefaultLabel {
    /// Creates a new `DefaultLabel`.
    pub fn new(value: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: description.into(),
        }
    }
}

/// Default labels, in declaration order.
pub type DefaultLabels = IndexMap<String, DefaultLabel>;

/// Rewrites a label key into the character set accepted by the monitoring API.
///
/// Keys are truncated to 100 characters, and any character that is not a letter or digit is replaced with `_`. Keys
/// starting with a digit are prefixed with `key_`, and keys starting with `_` are prefixed with `key`.
pub fn sanitize(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }

    let mut sanitized = key
        .chars()
        .take(LABEL_KEY_SIZE_LIMIT)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>();

    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert_str(0, "key_");
    }
    if sanitized.starts_with('_') {
        sanitized.insert_str(0, "key");
    }

    sanitized
}

/// Builds the task label value for an origin: `<language>-<pid>@<host>`.
fn task_value(language: &str, pid: u32, host_name: &str) -> String {
    format!("{}-{}@{}", language, pid, host_name)
}

/// Derives default labels from the origin metadata of a batch of metrics.
///
/// This produces a fresh mapping on every call, since each origin is different.
pub fn default_labels_from_node(node: &Node) -> DefaultLabels {
    let language = node.library_info.as_ref().map(|info| info.language).unwrap_or_default();
    let (pid, host_name) = node
        .identifier
        .as_ref()
        .map_or((0, ""), |identifier| (identifier.pid, identifier.host_name.as_str()));

    task_labels(task_value(language.as_str(), pid, host_name))
}

/// Derives default labels for the current process.
///
/// Used when no origin metadata accompanies a batch of metrics.
pub fn default_labels_for_process() -> DefaultLabels {
    let host_name = match hostname::get() {
        Ok(host_name) => host_name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to query hostname. Falling back to 'localhost'.");
            "localhost".to_string()
        }
    };

    task_labels(task_value("rust", std::process::id(), &host_name))
}

fn task_labels(value: String) -> DefaultLabels {
    let mut labels = DefaultLabels::with_capacity(1);
    labels.insert(
        OPENCENSUS_TASK_KEY.to_string(),
        DefaultLabel::new(value, OPENCENSUS_TASK_DESCRIPTION),
    );
    labels
}

/// Builds the label descriptors for a metric: defaults first, then the metric's own label keys.
pub fn label_descriptors(defaults: &DefaultLabels, label_keys: &[LabelKey]) -> Vec<LabelDescriptor> {
    let defaults = defaults.iter().map(|(key, label)| LabelDescriptor {
        key: sanitize(key),
        description: label.description.clone(),
        value_type: LabelValueType::String,
    });
    let keys = label_keys.iter().map(|label_key| LabelDescriptor {
        key: sanitize(&label_key.key),
        description: label_key.description.clone(),
        value_type: LabelValueType::String,
    });

    defaults.chain(keys).collect()
}

/// Builds the labels of a single time series.
///
/// Defaults are applied first, and then overlaid with the series' label values paired positionally with the metric's
/// label keys.
///
/// # Errors
///
/// If the number of label keys and label values differ, an error is returned.
pub fn labels_per_time_series(
    defaults: &DefaultLabels, label_keys: &[LabelKey], label_values: &[LabelValue],
) -> Result<BTreeMap<String, String>, ConversionError> {
    if label_keys.len() != label_values.len() {
        return Err(ConversionError::LabelMismatch {
            keys: label_keys.len(),
            values: label_values.len(),
        });
    }

    let mut labels = defaults
        .iter()
        .map(|(key, label)| (sanitize(key), label.value.clone()))
        .collect::<BTreeMap<_, _>>();

    for (label_key, label_value) in label_keys.iter().zip(label_values) {
        labels.insert(sanitize(&label_key.key), label_value.value.clone());
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::census::{Language, LibraryInfo, ProcessIdentifier};

    #[test]
    fn sanitize_keys() {
        let cases = [
            ("", ""),
            ("method", "method"),
            ("http.method", "http_method"),
            ("http/status code", "http_status_code"),
            ("1st", "key_1st"),
            ("_private", "key_private"),
            ("__double", "key__double"),
            ("ключ", "ключ"),
        ];

        for (input, expected) in cases {
            assert_eq!(sanitize(input), expected, "sanitizing {:?}", input);
        }
    }

    #[test]
    fn sanitize_truncates() {
        let long = "a".repeat(150);
        assert_eq!(sanitize(&long).len(), LABEL_KEY_SIZE_LIMIT);
    }

    #[test]
    fn default_labels_from_node_metadata() {
        let node = Node {
            identifier: Some(ProcessIdentifier {
                host_name: "host-1".to_string(),
                pid: 1234,
                start_timestamp: None,
            }),
            library_info: Some(LibraryInfo {
                language: Language::Java,
                ..Default::default()
            }),
        };

        let labels = default_labels_from_node(&node);
        assert_eq!(labels.len(), 1);
        let label = &labels[OPENCENSUS_TASK_KEY];
        assert_eq!(label.value, "java-1234@host-1");
        assert_eq!(label.description, OPENCENSUS_TASK_DESCRIPTION);
    }

    #[test]
    fn default_labels_for_current_process() {
        let labels = default_labels_for_process();
        let value = &labels[OPENCENSUS_TASK_KEY].value;
        assert!(value.starts_with(&format!("rust-{}@", std::process::id())));
    }

    #[test]
    fn descriptors_defaults_first() {
        let mut defaults = DefaultLabels::new();
        defaults.insert("task.id".to_string(), DefaultLabel::new("t", "task"));

        let keys = vec![LabelKey::new("method", "HTTP method"), LabelKey::new("1code", "")];
        let descriptors = label_descriptors(&defaults, &keys);

        let keys = descriptors.iter().map(|d| d.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["task_id", "method", "key_1code"]);
        assert_eq!(descriptors[0].description, "task");
        assert_eq!(descriptors[1].description, "HTTP method");
    }

    #[test]
    fn series_labels_overlay_defaults() {
        let mut defaults = DefaultLabels::new();
        defaults.insert("task".to_string(), DefaultLabel::new("t1", ""));
        defaults.insert("method".to_string(), DefaultLabel::new("default", ""));

        let keys = vec![LabelKey::new("method", "")];
        let values = vec![LabelValue::new("GET")];

        let labels = labels_per_time_series(&defaults, &keys, &values).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["task"], "t1");
        assert_eq!(labels["method"], "GET");
    }

    #[test]
    fn series_labels_mismatch() {
        let keys = vec![LabelKey::new("a", ""), LabelKey::new("b", "")];
        let values = vec![LabelValue::new("x")];

        let error = labels_per_time_series(&DefaultLabels::new(), &keys, &values).unwrap_err();
        assert!(matches!(error, ConversionError::LabelMismatch { keys: 2, values: 1 }));
    }
}
