use k8s_openapi::api::core::v1::{ConfigMap, Node};
use kube::{api::ListParams, Api, Client, ResourceExt};
use ome_types::NodeStateDocument;
use std::collections::HashSet;

use super::aggregator::NodeDocument;
use crate::util::{Error, NODE_STATE_DOCUMENT_LABEL};

/// Data key inside a node-state-document `ConfigMap` carrying the JSON blob
/// (spec.md §6 "Node-state documents"). The object's own name is the node
/// name.
const STATE_KEY: &str = "state.json";

/// Lists every node-state document currently in the cluster (spec.md §4.3
/// "List of per-node state documents in the operator namespace carrying the
/// model-status label").
pub async fn list_node_state_documents(
    client: Client,
    operator_namespace: &str,
) -> Result<Vec<NodeDocument>, Error> {
    let api: Api<ConfigMap> = Api::namespaced(client, operator_namespace);
    let list = api
        .list(&ListParams::default().labels(&format!("{NODE_STATE_DOCUMENT_LABEL}=true")))
        .await?;
    let mut out = Vec::with_capacity(list.items.len());
    for cm in list.items {
        let node = cm.name_any();
        let document = match cm.data.as_ref().and_then(|d| d.get(STATE_KEY)) {
            Some(raw) => serde_json::from_str::<NodeStateDocument>(raw)?,
            None => continue,
        };
        out.push(NodeDocument { node, document });
    }
    Ok(out)
}

/// The current set of node names known to the cluster, used to ignore
/// stale state documents left behind by removed nodes (spec.md §4.3 "whose
/// node still exists in the cluster").
pub async fn list_existing_nodes(client: Client) -> Result<HashSet<String>, Error> {
    let api: Api<Node> = Api::all(client);
    let list = api.list(&ListParams::default()).await?;
    Ok(list.items.into_iter().map(|n| n.name_any()).collect())
}
