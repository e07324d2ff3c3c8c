use crate::condition::Condition;
use k8s_openapi::api::core::v1::PodSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fmt, str::FromStr};

/// Reference to the model + runtime an [`InferenceService`] serves
/// (spec.md §3 "InferenceService", `spec.model`).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ModelRef {
    #[serde(rename = "baseModel")]
    pub base_model: String,
    #[serde(rename = "fineTunedWeights", default)]
    pub fine_tuned_weights: Vec<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: Option<String>,
}

/// `{minReplicas, maxReplicas, labels, annotations}` shared by every
/// component spec (spec.md §3).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ComponentExtensionSpec {
    #[serde(rename = "minReplicas", default)]
    pub min_replicas: Option<i32>,
    #[serde(rename = "maxReplicas", default)]
    pub max_replicas: Option<i32>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// A leader or worker sub-specification: its own pod spec, nested under a
/// component (spec.md §4.4/§4.6: "If the component has both Leader and
/// Worker sub-specs").
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct SubPodSpec {
    #[serde(flatten)]
    pub pod_spec: PodSpec,
}

/// The spec for one serving component: engine, decoder, or router
/// (spec.md §3, §4.4, §4.6).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ComponentSpec {
    #[serde(flatten)]
    pub pod_spec: PodSpec,

    #[serde(default)]
    pub leader: Option<SubPodSpec>,

    #[serde(default)]
    pub worker: Option<SubPodSpec>,

    #[serde(rename = "componentExtension", default)]
    pub component_extension: ComponentExtensionSpec,

    /// Accelerator override; when set, bypasses the runtime's own default
    /// accelerator selection for this component.
    #[serde(default)]
    pub accelerator: Option<String>,

    /// Annotation-level deployment mode override (legacy predictor path,
    /// spec.md §4.5 "Annotation `deployment-mode`").
    #[serde(rename = "deploymentMode", default)]
    pub deployment_mode: Option<String>,
}

/// Legacy v1 predictor spec, superseded by `engine`/`decoder`/`router`
/// (spec.md §4.6 "the generic handle by which v2's engine/decoder/router
/// supersedes v1's predictor").
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct PredictorSpec {
    #[serde(flatten)]
    pub pod_spec: PodSpec,
    #[serde(rename = "componentExtension", default)]
    pub component_extension: ComponentExtensionSpec,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ome.io",
    version = "v1",
    kind = "InferenceService",
    plural = "inferenceservices",
    derive = "PartialEq",
    status = "InferenceServiceStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.conditions[?(@.type=='Ready')].status\", \"name\": \"READY\", \"type\": \"string\" }")]
pub struct InferenceServiceSpec {
    pub model: ModelRef,
    #[serde(default)]
    pub engine: Option<ComponentSpec>,
    #[serde(default)]
    pub decoder: Option<ComponentSpec>,
    #[serde(default)]
    pub router: Option<ComponentSpec>,
    #[serde(default)]
    pub predictor: Option<PredictorSpec>,
}

/// The set of serving-side roles a workload the operator produces can fill
/// (GLOSSARY: "Component").
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, JsonSchema)]
pub enum ComponentType {
    Engine,
    Decoder,
    Router,
    Predictor,
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine => write!(f, "engine"),
            Self::Decoder => write!(f, "decoder"),
            Self::Router => write!(f, "router"),
            Self::Predictor => write!(f, "predictor"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct InferenceServiceStatus {
    #[serde(default)]
    pub components: BTreeMap<String, ComponentStatus>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "modelStatus", default)]
    pub model_status: ModelStatusBlock,
    #[serde(rename = "lastUpdated", default)]
    pub last_updated: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ComponentStatus {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "latestCreatedRevision", default)]
    pub latest_created_revision: Option<String>,
    #[serde(rename = "latestReadyRevision", default)]
    pub latest_ready_revision: Option<String>,
    #[serde(rename = "latestRolledoutRevision", default)]
    pub latest_rolledout_revision: Option<String>,
    #[serde(rename = "previousRolledoutRevision", default)]
    pub previous_rolledout_revision: Option<String>,
    #[serde(default)]
    pub traffic: Vec<TrafficTarget>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phase: Option<ComponentPhase>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct TrafficTarget {
    #[serde(rename = "revisionName")]
    pub revision_name: String,
    pub percent: i32,
    #[serde(default)]
    pub tag: Option<String>,
}

/// Per-component reconciliation state machine (spec.md §4.6).
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ComponentPhase {
    Creating,
    Ready,
    Failed,
    Deleting,
}

impl fmt::Display for ComponentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "Creating"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
            Self::Deleting => write!(f, "Deleting"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ModelStatusBlock {
    #[serde(rename = "transitionStatus", default)]
    pub transition_status: Option<TransitionStatus>,
    #[serde(rename = "failureInfo", default)]
    pub failure_info: Option<FailureInfo>,
    #[serde(default)]
    pub copies: Option<ModelCopies>,
}

/// Coarse progress of the model-loading journey (GLOSSARY: "Transition status").
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum TransitionStatus {
    InProgress,
    UpToDate,
    BlockedByFailedLoad,
    InvalidSpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct FailureInfo {
    pub reason: FailureReason,
    pub message: String,
    #[serde(rename = "exitCode", default)]
    pub exit_code: Option<i32>,
}

impl Default for FailureReason {
    fn default() -> Self {
        FailureReason::InvalidPredictorSpec
    }
}

/// Typed reasons for the `InvalidSpec` terminal transition (spec.md §7).
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum FailureReason {
    BaseModelNotFound,
    BaseModelDisabled,
    RuntimeNotRecognized,
    RuntimeDisabled,
    NoSupportingRuntime,
    InvalidPredictorSpec,
    StackedFineTuneNotSupported,
    MainContainerAmbiguous,
    ServerlessModeRejected,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ModelCopies {
    pub total: usize,
    pub ready: usize,
}

/// Deployment modes a component can be rendered as (spec.md §4.5,
/// GLOSSARY: "Deployment mode").
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum DeploymentMode {
    RawDeployment,
    MultiNode,
    Serverless,
    MultiNodeRayVLLM,
    VirtualDeployment,
}

impl FromStr for DeploymentMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RawDeployment" => Ok(Self::RawDeployment),
            "MultiNode" => Ok(Self::MultiNode),
            "Serverless" => Ok(Self::Serverless),
            "MultiNodeRayVLLM" => Ok(Self::MultiNodeRayVLLM),
            "VirtualDeployment" => Ok(Self::VirtualDeployment),
            _ => Err(()),
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Runtime resource, referenced by name from [`ModelRef::runtime`] or
/// auto-selected by [`crate::inference::ComponentType`] + model format
/// (spec.md §4.4 "Runtime resolution").
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ome.io",
    version = "v1",
    kind = "ClusterServingRuntime",
    plural = "clusterservingruntimes",
    derive = "PartialEq",
    status = "ServingRuntimeStatus"
)]
#[kube(derive = "Default")]
pub struct ClusterServingRuntimeSpec {
    #[serde(default)]
    pub disabled: bool,
    #[serde(rename = "supportedModelFormats", default)]
    pub supported_model_formats: Vec<SupportedModelFormat>,
    #[serde(rename = "protocolVersions", default)]
    pub protocol_versions: Vec<String>,
    #[serde(default)]
    pub engine: Option<ComponentSpec>,
    #[serde(default)]
    pub decoder: Option<ComponentSpec>,
    #[serde(default)]
    pub router: Option<ComponentSpec>,
    /// True when this runtime expects a Ray-style distributed engine
    /// (spec.md §4.5 "MultiNodeRayVLLM").
    #[serde(rename = "distributedRuntime", default)]
    pub distributed_runtime: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct SupportedModelFormat {
    pub name: String,
    pub version: Option<String>,
    /// Maximum model parameter size (as a k8s-quantity-style string, e.g.
    /// `70B`) this runtime template has been validated against.
    #[serde(rename = "maxParameterSize", default)]
    pub max_parameter_size: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ServingRuntimeStatus {}
