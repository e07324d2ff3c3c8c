use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Shared spec fields for [`BaseModel`] (namespaced) and [`ClusterBaseModel`]
/// (cluster-scoped). The two kinds carry identical spec/status shapes; they
/// are split into separate CRDs because scope (namespaced vs cluster) is a
/// kind-level property in the orchestrator's API, not a spec field.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ModelFormat {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ModelStorage {
    pub path: Option<String>,
    pub uri: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ModelExtensionSpec {
    pub vendor: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ModelFramework {
    pub name: String,
    pub version: Option<String>,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ome.io",
    version = "v1",
    kind = "BaseModel",
    plural = "basemodels",
    derive = "PartialEq",
    status = "ModelStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.state\", \"name\": \"STATE\", \"type\": \"string\" }")]
pub struct BaseModelSpec {
    #[serde(rename = "modelFormat")]
    pub model_format: ModelFormat,
    #[serde(default)]
    pub storage: ModelStorage,
    #[serde(rename = "modelExtensionSpec", default)]
    pub model_extension_spec: ModelExtensionSpec,
    #[serde(rename = "modelType", default)]
    pub model_type: Option<String>,
    #[serde(rename = "modelArchitecture", default)]
    pub model_architecture: Option<String>,
    #[serde(rename = "modelParameterSize", default)]
    pub model_parameter_size: Option<String>,
    #[serde(rename = "modelCapabilities", default)]
    pub model_capabilities: Vec<String>,
    #[serde(rename = "modelFramework", default)]
    pub model_framework: Option<ModelFramework>,
    #[serde(rename = "maxTokens", default)]
    pub max_tokens: Option<u64>,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ome.io",
    version = "v1",
    kind = "ClusterBaseModel",
    plural = "clusterbasemodels",
    derive = "PartialEq",
    status = "ModelStatus"
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.state\", \"name\": \"STATE\", \"type\": \"string\" }")]
pub struct ClusterBaseModelSpec {
    #[serde(rename = "modelFormat")]
    pub model_format: ModelFormat,
    #[serde(default)]
    pub storage: ModelStorage,
    #[serde(rename = "modelExtensionSpec", default)]
    pub model_extension_spec: ModelExtensionSpec,
    #[serde(rename = "modelType", default)]
    pub model_type: Option<String>,
    #[serde(rename = "modelArchitecture", default)]
    pub model_architecture: Option<String>,
    #[serde(rename = "modelParameterSize", default)]
    pub model_parameter_size: Option<String>,
    #[serde(rename = "modelCapabilities", default)]
    pub model_capabilities: Vec<String>,
    #[serde(rename = "modelFramework", default)]
    pub model_framework: Option<ModelFramework>,
    #[serde(rename = "maxTokens", default)]
    pub max_tokens: Option<u64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ModelStatus {
    pub state: Option<ModelLifecycleState>,
    #[serde(rename = "nodesReady", default)]
    pub nodes_ready: Vec<String>,
    #[serde(rename = "nodesFailed", default)]
    pub nodes_failed: Vec<String>,
    #[serde(rename = "lastUpdated", default)]
    pub last_updated: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ModelLifecycleState {
    Importing,
    InTransit,
    Ready,
    Failed,
    Deleted,
}

impl FromStr for ModelLifecycleState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Importing" => Ok(Self::Importing),
            "InTransit" => Ok(Self::InTransit),
            "Ready" => Ok(Self::Ready),
            "Failed" => Ok(Self::Failed),
            "Deleted" => Ok(Self::Deleted),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ModelLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Importing => write!(f, "Importing"),
            Self::InTransit => write!(f, "InTransit"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
            Self::Deleted => write!(f, "Deleted"),
        }
    }
}

/// A per-node state document written by the model-agent (spec.md §6, "Node
/// state documents"). Keyed by node name at the orchestrator layer (one
/// object per node); the body maps [`ModelKey`]-encoded strings to
/// [`ModelEntry`] records.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct NodeStateDocument {
    #[serde(default)]
    pub models: std::collections::BTreeMap<String, ModelEntry>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ModelEntry {
    pub status: NodeModelStatus,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub progress: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum NodeModelStatus {
    Ready,
    Failed,
    Updating,
    Deleted,
    /// Catches any value the model-agent writes that this controller does
    /// not recognize. Aggregation skips these entries (spec.md §9 resolves
    /// the open question: skip silently, but countable).
    #[serde(other)]
    Unknown,
}

/// Injective, round-trippable encoding of `(namespace?, name, isClusterScoped)`
/// used as the key into [`NodeStateDocument::models`] (GLOSSARY: "Model key").
///
/// Namespaced keys are encoded `ns/name`; cluster-scoped keys are encoded
/// `*/name`. A literal `*` in a real namespace is doubled to `**` on encode
/// (and undoubled on decode) so a namespace named `*` can never be mistaken
/// for the cluster-scope marker; `name` itself is never split on (namespaces
/// and names forbid `/`), keeping the encoding injective.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelKey(String);

const CLUSTER_SCOPE_MARKER: &str = "*";

impl ModelKey {
    pub fn encode(namespace: Option<&str>, name: &str, is_cluster_scoped: bool) -> Self {
        let scope = if is_cluster_scoped {
            CLUSTER_SCOPE_MARKER.to_owned()
        } else {
            namespace.unwrap_or_default().replace('*', "**")
        };
        ModelKey(format!("{scope}/{name}"))
    }

    pub fn decode(&self) -> (Option<String>, String, bool) {
        match self.0.split_once('/') {
            Some((scope, name)) if scope == CLUSTER_SCOPE_MARKER => (None, name.to_owned(), true),
            Some((scope, name)) => (Some(scope.replace("**", "*")), name.to_owned(), false),
            None => (None, self.0.clone(), false),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_namespaced() {
        let key = ModelKey::encode(Some("ns1"), "llama3", false);
        assert_eq!(key.decode(), (Some("ns1".to_owned()), "llama3".to_owned(), false));
    }

    #[test]
    fn round_trips_cluster_scoped() {
        let key = ModelKey::encode(None, "llama3", true);
        assert_eq!(key.decode(), (None, "llama3".to_owned(), true));
    }

    #[test]
    fn namespaced_and_cluster_scoped_never_collide() {
        let ns = ModelKey::encode(Some("*"), "llama3", false);
        let cl = ModelKey::encode(None, "llama3", true);
        // Even a (pathological) namespace literally named "*" still decodes
        // distinctly because the cluster-scoped marker position is fixed.
        assert_ne!(ns, cl);
    }
}
