//! The persisted state document.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use redisbroker_core::Instance;

/// Binding ids keyed by the instance they belong to.
pub type InstanceBindings = BTreeMap<String, Vec<String>>;

/// Pool membership and bindings of the dedicated plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub available_instances: Vec<Instance>,
    #[serde(default)]
    pub allocated_instances: Vec<Instance>,
    #[serde(default)]
    pub instance_bindings: InstanceBindings,
}

impl StateDocument {
    /// Add every configured node that is neither available nor allocated.
    ///
    /// Nodes already recorded stay put even if no longer configured.
    /// Returns the number of nodes added.
    pub fn reconcile(&mut self, nodes: &[String], redis_port: u16) -> usize {
        let mut known: HashSet<String> = self
            .available_instances
            .iter()
            .chain(&self.allocated_instances)
            .map(|i| i.host.clone())
            .collect();

        let mut added = 0;
        for host in nodes {
            if !known.insert(host.clone()) {
                continue;
            }
            self.available_instances.push(Instance {
                id: String::new(),
                host: host.clone(),
                port: redis_port,
                password: String::new(),
            });
            added += 1;
        }
        added
    }

    pub fn allocated(&self, id: &str) -> Option<&Instance> {
        self.allocated_instances.iter().find(|i| i.id == id)
    }

    pub fn allocated_mut(&mut self, id: &str) -> Option<&mut Instance> {
        self.allocated_instances.iter_mut().find(|i| i.id == id)
    }

    /// Id of the instance allocated on `host`, if any.
    pub fn id_for_host(&self, host: &str) -> Option<&str> {
        self.allocated_instances
            .iter()
            .find(|i| i.host == host)
            .map(|i| i.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(host: &str) -> Instance {
        Instance {
            id: String::new(),
            host: host.to_string(),
            port: 6379,
            password: String::new(),
        }
    }

    fn hosts(v: &[Instance]) -> Vec<&str> {
        v.iter().map(|i| i.host.as_str()).collect()
    }

    #[test]
    fn reconcile_fills_empty_document_in_config_order() {
        let mut doc = StateDocument::default();
        let nodes = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
        assert_eq!(doc.reconcile(&nodes, 6379), 2);
        assert_eq!(hosts(&doc.available_instances), vec!["10.0.0.1", "10.0.0.2"]);
        assert!(doc.allocated_instances.is_empty());
    }

    #[test]
    fn reconcile_skips_allocated_and_never_shrinks() {
        let mut doc = StateDocument::default();
        let mut allocated = node("10.0.0.1");
        allocated.id = "inst-1".to_string();
        doc.allocated_instances.push(allocated);
        doc.available_instances.push(node("10.0.0.9"));

        let nodes = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
        assert_eq!(doc.reconcile(&nodes, 6379), 1);

        assert_eq!(hosts(&doc.available_instances), vec!["10.0.0.9", "10.0.0.2"]);
        assert_eq!(hosts(&doc.allocated_instances), vec!["10.0.0.1"]);
    }

    #[test]
    fn reconcile_ignores_duplicate_config_entries() {
        let mut doc = StateDocument::default();
        let nodes = vec!["10.0.0.1".to_string(), "10.0.0.1".to_string()];
        assert_eq!(doc.reconcile(&nodes, 6379), 1);
    }

    #[test]
    fn id_for_host_scans_allocated_only() {
        let mut doc = StateDocument::default();
        doc.available_instances.push(node("10.0.0.2"));
        let mut allocated = node("10.0.0.1");
        allocated.id = "inst-1".to_string();
        doc.allocated_instances.push(allocated);

        assert_eq!(doc.id_for_host("10.0.0.1"), Some("inst-1"));
        assert_eq!(doc.id_for_host("10.0.0.2"), None);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let doc: StateDocument = serde_json::from_str("{}").unwrap();
        assert_eq!(doc, StateDocument::default());
    }
}
