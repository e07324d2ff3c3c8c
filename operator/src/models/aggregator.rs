use ome_types::{ModelKey, ModelLifecycleState, NodeModelStatus, NodeStateDocument};
use serde_json::Value;
use std::collections::HashSet;

/// One per-node state document as read from the cluster, paired with the
/// node it came from.
pub struct NodeDocument {
    pub node: String,
    pub document: NodeStateDocument,
}

/// Result of folding every node's state document entry for one model key
/// into a single lifecycle view (spec.md §4.3 `aggregate(modelKey)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationResult {
    pub nodes_ready: Vec<String>,
    pub nodes_failed: Vec<String>,
    /// One-way absorptive spec patch folded from every node-reported
    /// `config` (spec.md §4.3 step 1, §9 "Spec-from-nodes absorption").
    pub spec_patch: Option<Value>,
}

/// Folds per-node state documents into nodesReady/nodesFailed and an
/// absorptive spec patch (spec.md §4.3, P3, P4).
///
/// Documents from nodes no longer present in `existing_nodes` are ignored,
/// as are entries with an unrecognized status (counted, not surfaced, by
/// the caller via `metrics::MODELS_UNKNOWN_STATUS_TOTAL`).
pub fn aggregate(
    model_key: &ModelKey,
    documents: &[NodeDocument],
    existing_nodes: &HashSet<String>,
) -> AggregationResult {
    let mut nodes_ready = Vec::new();
    let mut nodes_failed = Vec::new();
    let mut spec_patch: Option<Value> = None;

    for doc in documents {
        if !existing_nodes.contains(&doc.node) {
            continue;
        }
        let entry = match doc.document.models.get(model_key.as_str()) {
            Some(entry) => entry,
            None => continue,
        };
        if let Some(config) = &entry.config {
            let patch = spec_patch.get_or_insert_with(|| Value::Object(Default::default()));
            crate::util::absorb(patch, config.clone());
        }
        match entry.status {
            NodeModelStatus::Ready => nodes_ready.push(doc.node.clone()),
            NodeModelStatus::Failed => nodes_failed.push(doc.node.clone()),
            NodeModelStatus::Updating | NodeModelStatus::Deleted => {}
            NodeModelStatus::Unknown => {
                #[cfg(feature = "metrics")]
                crate::util::metrics::MODELS_UNKNOWN_STATUS_TOTAL.inc();
            }
        }
    }

    // I2: sorted lexicographically so rendering is stable (P2-equivalent
    // property for model status).
    nodes_ready.sort();
    nodes_ready.dedup();
    nodes_failed.sort();
    nodes_failed.dedup();

    AggregationResult {
        nodes_ready,
        nodes_failed,
        spec_patch,
    }
}

/// Derives the model lifecycle state from an [`AggregationResult`] (spec.md
/// §3 "Lifecycle": "become Ready once at least one node reports Ready;
/// Failed iff zero Ready nodes and at least one Failed; otherwise
/// InTransit").
pub fn lifecycle_state(result: &AggregationResult) -> ModelLifecycleState {
    if !result.nodes_ready.is_empty() {
        ModelLifecycleState::Ready
    } else if !result.nodes_failed.is_empty() {
        ModelLifecycleState::Failed
    } else {
        ModelLifecycleState::InTransit
    }
}

/// True iff any node still "holds" the model: an entry exists for
/// `model_key` and is not marked Deleted (spec.md §4.3 "Deletion routine",
/// I3, P4).
pub fn any_node_holds_model(model_key: &ModelKey, documents: &[NodeDocument]) -> bool {
    documents.iter().any(|doc| {
        doc.document
            .models
            .get(model_key.as_str())
            .map(|entry| entry.status != NodeModelStatus::Deleted)
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ome_types::ModelEntry;

    fn doc(node: &str, key: &str, status: NodeModelStatus) -> NodeDocument {
        let mut models = std::collections::BTreeMap::new();
        models.insert(
            key.to_owned(),
            ModelEntry {
                status,
                config: None,
                progress: None,
            },
        );
        NodeDocument {
            node: node.to_owned(),
            document: NodeStateDocument { models },
        }
    }

    /// P3: aggregating N documents reporting Ready yields |nodesReady| = N
    /// and lifecycle = Ready, regardless of arrival order.
    #[test]
    fn all_ready_nodes_counted_regardless_of_order() {
        let key = ModelKey::encode(Some("ns"), "llama3", false);
        let documents = vec![
            doc("node-b", key.as_str(), NodeModelStatus::Ready),
            doc("node-a", key.as_str(), NodeModelStatus::Ready),
        ];
        let existing: HashSet<String> = ["node-a", "node-b"].iter().map(|s| s.to_string()).collect();
        let result = aggregate(&key, &documents, &existing);
        assert_eq!(result.nodes_ready, vec!["node-a", "node-b"]);
        assert_eq!(lifecycle_state(&result), ModelLifecycleState::Ready);
    }

    /// Scenario 4: two Ready, one Failed -> Ready wins.
    #[test]
    fn ready_wins_over_failed() {
        let key = ModelKey::encode(Some("ns"), "llama3", false);
        let documents = vec![
            doc("n1", key.as_str(), NodeModelStatus::Ready),
            doc("n2", key.as_str(), NodeModelStatus::Ready),
            doc("n3", key.as_str(), NodeModelStatus::Failed),
        ];
        let existing: HashSet<String> = ["n1", "n2", "n3"].iter().map(|s| s.to_string()).collect();
        let result = aggregate(&key, &documents, &existing);
        assert_eq!(result.nodes_ready, vec!["n1", "n2"]);
        assert_eq!(result.nodes_failed, vec!["n3"]);
        assert_eq!(lifecycle_state(&result), ModelLifecycleState::Ready);
    }

    #[test]
    fn zero_ready_with_failures_is_failed() {
        let key = ModelKey::encode(Some("ns"), "llama3", false);
        let documents = vec![doc("n1", key.as_str(), NodeModelStatus::Failed)];
        let existing: HashSet<String> = ["n1"].iter().map(|s| s.to_string()).collect();
        let result = aggregate(&key, &documents, &existing);
        assert_eq!(lifecycle_state(&result), ModelLifecycleState::Failed);
    }

    #[test]
    fn stale_node_entries_are_ignored() {
        let key = ModelKey::encode(Some("ns"), "llama3", false);
        let documents = vec![doc("gone", key.as_str(), NodeModelStatus::Ready)];
        let existing: HashSet<String> = HashSet::new();
        let result = aggregate(&key, &documents, &existing);
        assert!(result.nodes_ready.is_empty());
        assert_eq!(lifecycle_state(&result), ModelLifecycleState::InTransit);
    }

    /// P4/I3: a node with a non-Deleted entry still holds the model.
    #[test]
    fn updating_entry_still_holds_model() {
        let key = ModelKey::encode(Some("ns"), "llama3", false);
        let documents = vec![doc("n1", key.as_str(), NodeModelStatus::Updating)];
        assert!(any_node_holds_model(&key, &documents));
    }

    #[test]
    fn deleted_entry_releases_hold() {
        let key = ModelKey::encode(Some("ns"), "llama3", false);
        let documents = vec![doc("n1", key.as_str(), NodeModelStatus::Deleted)];
        assert!(!any_node_holds_model(&key, &documents));
    }

    #[test]
    fn no_entries_releases_hold() {
        let key = ModelKey::encode(Some("ns"), "llama3", false);
        assert!(!any_node_holds_model(&key, &[]));
    }
}
