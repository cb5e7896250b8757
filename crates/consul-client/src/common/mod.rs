//! Common request options for the Consul HTTP API
//!
//! Every Consul endpoint takes the same scoping parameters (`ns`,
//! `partition`, `dc`); reads additionally support filtering and blocking
//! queries.

use std::time::Duration;

/// Options for read requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Consul namespace (`ns`), empty for the agent default
    pub namespace: String,
    /// Admin partition, empty for the agent default
    pub partition: String,
    /// Datacenter, empty for the agent's own
    pub datacenter: String,
    /// Filter expression (`filter`)
    pub filter: String,
    /// Blocking query index (`index`); 0 returns immediately
    pub wait_index: u64,
    /// Maximum blocking time (`wait`)
    pub wait_time: Option<Duration>,
}

impl QueryOptions {
    /// Options scoped to a namespace only.
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Builder-style partition override.
    #[must_use]
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Query string pairs for this request. Empty values are omitted.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = scope_pairs(&self.namespace, &self.partition, &self.datacenter);
        if !self.filter.is_empty() {
            pairs.push(("filter", self.filter.clone()));
        }
        if self.wait_index > 0 {
            pairs.push(("index", self.wait_index.to_string()));
        }
        if let Some(wait) = self.wait_time {
            pairs.push(("wait", format!("{}ms", wait.as_millis())));
        }
        pairs
    }
}

/// Options for write requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Consul namespace (`ns`)
    pub namespace: String,
    /// Admin partition
    pub partition: String,
    /// Datacenter
    pub datacenter: String,
}

impl WriteOptions {
    /// Options scoped to a namespace only.
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Builder-style partition override.
    #[must_use]
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Query string pairs for this request. Empty values are omitted.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        scope_pairs(&self.namespace, &self.partition, &self.datacenter)
    }
}

/// Metadata returned by read requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryMeta {
    /// `X-Consul-Index` of the response; feed back as `wait_index`
    pub last_index: u64,
}

fn scope_pairs(namespace: &str, partition: &str, datacenter: &str) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if !namespace.is_empty() {
        pairs.push(("ns", namespace.to_string()));
    }
    if !partition.is_empty() {
        pairs.push(("partition", partition.to_string()));
    }
    if !datacenter.is_empty() {
        pairs.push(("dc", datacenter.to_string()));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_options_have_no_pairs() {
        assert!(QueryOptions::default().query_pairs().is_empty());
        assert!(WriteOptions::default().query_pairs().is_empty());
    }

    #[test]
    fn test_blocking_query_pairs() {
        let opts = QueryOptions {
            namespace: "team-a".to_string(),
            filter: "Service != \"consul\"".to_string(),
            wait_index: 42,
            wait_time: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let pairs = opts.query_pairs();
        assert_eq!(pairs[0], ("ns", "team-a".to_string()));
        assert!(pairs.contains(&("index", "42".to_string())));
        assert!(pairs.contains(&("wait", "5000ms".to_string())));
        assert!(!pairs.iter().any(|(k, _)| *k == "partition"));
    }
}
