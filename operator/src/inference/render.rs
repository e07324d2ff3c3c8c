use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar, HostPathVolumeSource,
    PersistentVolumeClaimVolumeSource, Volume, VolumeMount,
};
use ome_types::{ComponentType, ModelStorage};
use std::collections::BTreeMap;

use super::resolver::MAIN_CONTAINER_NAME;

/// Annotations the operator never lets through to a rendered pod, even if
/// the user or runtime template sets them (spec.md §4.6 step 1 "Disallowed
/// annotations (proxy-config, etc.) are filtered").
const DISALLOWED_ANNOTATIONS: &[&str] = &["proxy-config", "kubectl.kubernetes.io/last-applied-configuration"];

/// spec.md §4.6 step 1 "Name = <service-name>-<component-suffix>".
pub fn object_name(service_name: &str, component: ComponentType) -> String {
    format!("{service_name}-{component}")
}

/// spec.md §4.6 step 1 "labels include component, service, base-model,
/// vendor, size category, runtime, fine-tune flag".
pub struct LabelInputs<'a> {
    pub service_name: &'a str,
    pub component: ComponentType,
    pub base_model_name: &'a str,
    pub base_model_vendor: Option<&'a str>,
    pub base_model_size: Option<&'a str>,
    pub runtime_name: &'a str,
    pub fine_tuned: bool,
}

pub fn component_labels(inputs: &LabelInputs, extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("ome-component".to_owned(), inputs.component.to_string());
    labels.insert("ome-service".to_owned(), inputs.service_name.to_owned());
    labels.insert("base-model-name".to_owned(), inputs.base_model_name.to_owned());
    if let Some(vendor) = inputs.base_model_vendor {
        labels.insert("base-model-vendor".to_owned(), vendor.to_owned());
    }
    if let Some(size) = inputs.base_model_size {
        labels.insert("base-model-size".to_owned(), size.to_owned());
    }
    labels.insert("serving-runtime".to_owned(), inputs.runtime_name.to_owned());
    labels.insert("ft-serving".to_owned(), inputs.fine_tuned.to_string());
    labels.extend(extra.clone());
    labels
}

/// spec.md §4.6 step 1 "annotations carry base-model identity, decryption
/// hints, runtime key, and -- if fine-tuned -- adapter and strategy."
pub struct AnnotationInputs<'a> {
    pub base_model_name: &'a str,
    pub base_model_format: &'a str,
    pub base_model_format_version: Option<&'a str>,
    pub runtime_name: &'a str,
}

pub fn component_annotations(inputs: &AnnotationInputs, extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert("base-model-name".to_owned(), inputs.base_model_name.to_owned());
    annotations.insert("base-model-format".to_owned(), inputs.base_model_format.to_owned());
    if let Some(version) = inputs.base_model_format_version {
        annotations.insert("base-model-format-version".to_owned(), version.to_owned());
    }
    annotations.insert("serving-runtime".to_owned(), inputs.runtime_name.to_owned());
    for (key, value) in extra {
        if DISALLOWED_ANNOTATIONS.contains(&key.as_str()) {
            continue;
        }
        annotations.insert(key.clone(), value.clone());
    }
    annotations
}

/// spec.md §6 "models.<domain>/<namespace?>.<kind>.<model-name>", attached
/// as a node selector so pods only land where the model-agent has staged
/// the artifact (spec.md §4.6 step 3). The `<kind>` segment keeps a
/// namespaced and a cluster-scoped model of the same name from colliding on
/// the same key.
pub fn node_selector_key(namespace: Option<&str>, is_cluster_scoped: bool, model_name: &str) -> String {
    if is_cluster_scoped {
        format!("models.ome.io/clusterbasemodel.{model_name}")
    } else {
        let ns = namespace.unwrap_or_default();
        format!("models.ome.io/{ns}.basemodel.{model_name}")
    }
}

pub const NODE_SELECTOR_READY_VALUE: &str = "Ready";

/// spec.md §4.6 step 3 "Unless storage is PVC-backed or fine-tune-with-
/// merged-weights is active, append a node selector."
pub fn should_apply_node_selector(storage: &ModelStorage, fine_tune_with_merged_weights: bool) -> bool {
    storage.uri.as_deref().map(|u| !u.starts_with("pvc://")).unwrap_or(true) && !fine_tune_with_merged_weights
}

/// spec.md §4.6 step 2 "patch the main container's env (model path,
/// served-model name, parallelism size = GPUs-per-pod * (leaders +
/// workers))."
pub fn patch_main_container_env(
    containers: &mut [Container],
    model_path: &str,
    served_model_name: &str,
    parallelism_size: i64,
) {
    let Some(main) = containers.iter_mut().find(|c| c.name == MAIN_CONTAINER_NAME) else {
        return;
    };
    let env = main.env.get_or_insert_with(Vec::new);
    set_env(env, "MODEL_PATH", model_path);
    set_env(env, "SERVED_MODEL_NAME", served_model_name);
    set_env(env, "TENSOR_PARALLEL_SIZE", &parallelism_size.to_string());
}

fn set_env(env: &mut Vec<EnvVar>, name: &str, value: &str) {
    if let Some(existing) = env.iter_mut().find(|e| e.name == name) {
        existing.value = Some(value.to_owned());
        existing.value_from = None;
    } else {
        env.push(EnvVar {
            name: name.to_owned(),
            value: Some(value.to_owned()),
            value_from: None,
        });
    }
}

const MODEL_VOLUME_NAME: &str = "model-storage";
const FINE_TUNE_SCRATCH_VOLUME_NAME: &str = "fine-tune-scratch";

/// spec.md §4.6 step 2 "add volume mounts: host-path or PVC root for the
/// base model, empty-dir for fine-tuned scratch when fine-tuning,
/// configmap mounts for block-lists; add matching pod volumes."
pub fn model_volume(storage: &ModelStorage) -> (Volume, VolumeMount) {
    let volume = match storage.uri.as_deref() {
        Some(uri) if uri.starts_with("pvc://") => Volume {
            name: MODEL_VOLUME_NAME.to_owned(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: uri.trim_start_matches("pvc://").to_owned(),
                read_only: Some(true),
            }),
            ..Default::default()
        },
        _ => Volume {
            name: MODEL_VOLUME_NAME.to_owned(),
            host_path: Some(HostPathVolumeSource {
                path: storage.path.clone().unwrap_or_else(|| "/mnt/models".to_owned()),
                type_: None,
            }),
            ..Default::default()
        },
    };
    let mount = VolumeMount {
        name: MODEL_VOLUME_NAME.to_owned(),
        mount_path: "/mnt/models".to_owned(),
        read_only: Some(true),
        ..Default::default()
    };
    (volume, mount)
}

pub fn fine_tune_scratch_volume() -> (Volume, VolumeMount) {
    let volume = Volume {
        name: FINE_TUNE_SCRATCH_VOLUME_NAME.to_owned(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    };
    let mount = VolumeMount {
        name: FINE_TUNE_SCRATCH_VOLUME_NAME.to_owned(),
        mount_path: "/mnt/adapters".to_owned(),
        ..Default::default()
    };
    (volume, mount)
}

pub fn block_list_volume(config_map_name: &str) -> (Volume, VolumeMount) {
    let name = format!("{config_map_name}-block-list");
    let volume = Volume {
        name: name.clone(),
        config_map: Some(ConfigMapVolumeSource {
            name: Some(config_map_name.to_owned()),
            optional: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mount = VolumeMount {
        name,
        mount_path: "/mnt/block-lists".to_owned(),
        read_only: Some(true),
        ..Default::default()
    };
    (volume, mount)
}

/// spec.md §4.6 step 2 "parallelism size = GPUs-per-pod * (leaders +
/// workers)".
pub fn parallelism_size(gpus_per_pod: i64, num_leaders: i64, num_workers: i64) -> i64 {
    gpus_per_pod * (num_leaders + num_workers)
}

const GPU_RESOURCE_NAME: &str = "nvidia.com/gpu";

/// GPUs requested per pod, read off the main container's resource limits
/// (spec.md §4.6 step 2 "GPUs-per-pod").
pub fn gpus_per_pod(containers: &[Container]) -> i64 {
    containers
        .iter()
        .find(|c| c.name == MAIN_CONTAINER_NAME)
        .and_then(|c| c.resources.as_ref())
        .and_then(|r| r.limits.as_ref())
        .and_then(|limits| limits.get(GPU_RESOURCE_NAME))
        .and_then(|q| q.0.parse::<i64>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_uses_component_suffix() {
        assert_eq!(object_name("my-svc", ComponentType::Engine), "my-svc-engine");
    }

    #[test]
    fn node_selector_key_encodes_namespace_scope() {
        assert_eq!(
            node_selector_key(Some("ns1"), false, "llama3"),
            "models.ome.io/ns1.basemodel.llama3"
        );
        assert_eq!(
            node_selector_key(None, true, "llama3"),
            "models.ome.io/clusterbasemodel.llama3"
        );
    }

    #[test]
    fn node_selector_key_namespaced_and_cluster_scoped_never_collide() {
        let namespaced = node_selector_key(Some("llama3"), false, "llama3");
        let cluster = node_selector_key(None, true, "llama3");
        assert_ne!(namespaced, cluster);
    }

    #[test]
    fn node_selector_skipped_for_pvc_storage() {
        let storage = ModelStorage {
            uri: Some("pvc://my-claim".to_owned()),
            path: None,
        };
        assert!(!should_apply_node_selector(&storage, false));
    }

    #[test]
    fn node_selector_skipped_for_merged_weights_fine_tune() {
        let storage = ModelStorage::default();
        assert!(!should_apply_node_selector(&storage, true));
    }

    #[test]
    fn node_selector_applies_for_host_path_storage() {
        let storage = ModelStorage {
            uri: None,
            path: Some("/mnt/models/llama3".to_owned()),
        };
        assert!(should_apply_node_selector(&storage, false));
    }

    #[test]
    fn disallowed_annotations_are_filtered() {
        let mut extra = BTreeMap::new();
        extra.insert("proxy-config".to_owned(), "x".to_owned());
        extra.insert("keep-me".to_owned(), "y".to_owned());
        let annotations = component_annotations(
            &AnnotationInputs {
                base_model_name: "llama3",
                base_model_format: "safetensors",
                base_model_format_version: None,
                runtime_name: "vllm",
            },
            &extra,
        );
        assert!(!annotations.contains_key("proxy-config"));
        assert_eq!(annotations.get("keep-me").map(String::as_str), Some("y"));
    }

    #[test]
    fn parallelism_size_multiplies_gpus_by_pod_count() {
        assert_eq!(parallelism_size(4, 1, 3), 16);
    }

    #[test]
    fn gpus_per_pod_reads_main_container_limit() {
        use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
        use k8s_openapi::api::core::v1::ResourceRequirements;
        use std::collections::BTreeMap;

        let mut limits = BTreeMap::new();
        limits.insert(GPU_RESOURCE_NAME.to_owned(), Quantity("4".to_owned()));
        let containers = vec![Container {
            name: MAIN_CONTAINER_NAME.to_owned(),
            resources: Some(ResourceRequirements {
                limits: Some(limits),
                ..Default::default()
            }),
            ..Default::default()
        }];
        assert_eq!(gpus_per_pod(&containers), 4);
    }

    #[test]
    fn main_container_env_is_patched_in_place() {
        let mut containers = vec![Container {
            name: MAIN_CONTAINER_NAME.to_owned(),
            ..Default::default()
        }];
        patch_main_container_env(&mut containers, "/mnt/models/llama3", "llama3", 8);
        let env = containers[0].env.as_ref().unwrap();
        assert!(env.iter().any(|e| e.name == "MODEL_PATH" && e.value.as_deref() == Some("/mnt/models/llama3")));
        assert!(env.iter().any(|e| e.name == "TENSOR_PARALLEL_SIZE" && e.value.as_deref() == Some("8")));
    }
}
