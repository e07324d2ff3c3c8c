use std::time::Duration;

pub mod condition;
pub mod config;
pub mod finalizer;
pub mod leader;
pub mod metrics;
pub mod patch;
pub mod retry;

pub(crate) mod messages;

mod error;
mod merge;

pub use error::*;
pub use merge::{absorb, deep_merge};

/// The default interval for requeuing a managed resource whose lifecycle is
/// otherwise settled (spec.md §4.2/§4.3 status-propagation requeue cadence).
pub(crate) const PROBE_INTERVAL: Duration = Duration::from_secs(12);

/// Requeue interval while a model's lifecycle is Importing/InTransit
/// (spec.md §4.3 "Requeue cadence").
pub(crate) const MODEL_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Requeue interval while a model's finalizer is blocked on node-held
/// entries (spec.md §4.3 "Deletion routine").
pub(crate) const MODEL_DELETE_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Label carried by node-state-document ConfigMaps, used to list them by
/// selector rather than scanning every ConfigMap in the namespace (spec.md
/// §4.3, §6 "Node-state documents").
pub(crate) const NODE_STATE_DOCUMENT_LABEL: &str = "ome.io/node-state-document";

/// Name of the kubernetes resource manager used for server-side apply.
pub(crate) const MANAGER_NAME: &str = "ome-operator";

/// The namespace the operator itself runs in, read from the downward API
/// (spec.md §4.3 "in the operator namespace"). Defaults to `default` when
/// unset, matching how the rest of the operator resolves its own identity.
pub fn operator_namespace() -> String {
    std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string())
}
