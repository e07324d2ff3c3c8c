//! Minimal mirrors of the external workload/ingress CRDs the operator
//! renders and owns (spec.md §1 "out of scope... the knative/multi-node-
//! workload CRDs that receive the rendered workloads"). Only the fields
//! [`crate::status`] folding and [`crate::inference`] rendering need are
//! modeled; these are not meant to be complete schemas for the real CRDs.

use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::inference::TrafficTarget;

/// A leader+worker multi-node workload (spec.md §4.5 "MultiNode",
/// §4.6 "Worker spec").
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ome.io",
    version = "v1",
    kind = "LeaderWorkerSet",
    plural = "leaderworkersets",
    derive = "PartialEq",
    status = "LeaderWorkerSetStatus",
    namespaced
)]
#[kube(derive = "Default")]
pub struct LeaderWorkerSetSpec {
    #[serde(rename = "leaderTemplate", default)]
    pub leader_template: Option<PodTemplateSpec>,
    #[serde(rename = "workerTemplate", default)]
    pub worker_template: Option<PodTemplateSpec>,
    #[serde(default)]
    pub replicas: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct LeaderWorkerSetStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "resourceVersion", default)]
    pub observed_resource_version: Option<String>,
}

/// A multi-deployment Ray-backed workload (spec.md §4.5 "MultiNodeRayVLLM",
/// §4.7 "Multi-deployment (Ray)").
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ome.io",
    version = "v1",
    kind = "RayService",
    plural = "rayservices",
    derive = "PartialEq",
    status = "RayServiceStatus",
    namespaced
)]
#[kube(derive = "Default")]
pub struct RayServiceSpec {
    #[serde(rename = "headTemplate", default)]
    pub head_template: Option<PodTemplateSpec>,
    #[serde(rename = "workerTemplate", default)]
    pub worker_template: Option<PodTemplateSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct RayServiceStatus {
    #[serde(rename = "deployments", default)]
    pub deployments: Vec<RayDeploymentStatus>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct RayDeploymentStatus {
    #[serde(rename = "revision", default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A Knative-style serverless service (spec.md §4.5 "Serverless", §4.7
/// "Knative service").
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ome.io",
    version = "v1",
    kind = "KnativeService",
    plural = "knativeservices",
    derive = "PartialEq",
    status = "KnativeServiceStatus",
    namespaced
)]
#[kube(derive = "Default")]
pub struct KnativeServiceSpec {
    #[serde(rename = "template", default)]
    pub template: Option<PodTemplateSpec>,
    #[serde(default)]
    pub traffic: Vec<TrafficTarget>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct KnativeServiceStatus {
    #[serde(rename = "latestCreatedRevisionName", default)]
    pub latest_created_revision_name: Option<String>,
    #[serde(rename = "latestReadyRevisionName", default)]
    pub latest_ready_revision_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub traffic: Vec<TrafficTarget>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
