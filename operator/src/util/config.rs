use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};

use super::Error;

/// Name of the `ConfigMap` the operator reads its configuration document
/// from (spec.md §6 "Configuration"). Lives in the same namespace the
/// operator itself is deployed into.
pub const CONFIG_MAP_NAME: &str = "ome-operator-config";

/// Key inside [`CONFIG_MAP_NAME`] carrying the YAML configuration document.
pub const CONFIG_KEY: &str = "config.yaml";

/// Operator-wide configuration, loaded once at startup from a named
/// `ConfigMap` (spec.md §6). Every subtree is required; a missing subtree
/// is fatal at startup rather than silently defaulted, since there is no
/// safe default for cluster-queue thresholds or ingress behavior.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(rename = "clusterQueue")]
    pub cluster_queue: ClusterQueueConfig,
    pub ingress: IngressConfig,
    #[serde(rename = "inferenceService")]
    pub inference_service: InferenceServiceConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ClusterQueueConfig {
    #[serde(rename = "creationFailedTimeThresholdSecond")]
    pub creation_failed_time_threshold_seconds: u64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct IngressConfig {
    #[serde(rename = "disableIstioVirtualHost", default)]
    pub disable_istio_virtual_host: bool,
    #[serde(rename = "disableIngressCreation", default)]
    pub disable_ingress_creation: bool,
}

/// spec.md §4.5 "cluster_allows_serverless reflects the operator's own
/// configuration intent" -- the decider's input, independent of whether
/// the Knative CRD is actually installed (checked live at dispatch time).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct InferenceServiceConfig {
    #[serde(rename = "allowServerless", default = "default_allow_serverless")]
    pub allow_serverless: bool,
}

fn default_allow_serverless() -> bool {
    true
}

/// Loads [`Config`] from the [`CONFIG_MAP_NAME`] `ConfigMap` in `namespace`.
/// Missing `ConfigMap`, missing key, or a subtree absent from the parsed
/// document are all reported as [`Error::ConfigError`].
pub async fn load(client: Client, namespace: &str) -> Result<Config, Error> {
    let api: Api<ConfigMap> = Api::namespaced(client, namespace);
    let cm = api.get(CONFIG_MAP_NAME).await.map_err(|e| match e {
        kube::Error::Api(ae) if ae.code == 404 => Error::ConfigError(format!(
            "ConfigMap {}/{} not found",
            namespace, CONFIG_MAP_NAME
        )),
        other => Error::KubeError { source: other },
    })?;
    let document = cm
        .data
        .as_ref()
        .and_then(|data| data.get(CONFIG_KEY))
        .ok_or_else(|| {
            Error::ConfigError(format!(
                "ConfigMap {}/{} is missing key {}",
                namespace, CONFIG_MAP_NAME, CONFIG_KEY
            ))
        })?;
    serde_yaml::from_str(document)
        .map_err(|e| Error::ConfigError(format!("failed to parse configuration document: {e}")))
}
