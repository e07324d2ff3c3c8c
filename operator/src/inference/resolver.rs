use k8s_openapi::api::core::v1::Container;
use ome_types::{
    ClusterServingRuntime, ClusterServingRuntimeSpec, ComponentExtensionSpec, ComponentSpec,
    FailureReason, ModelFormat, SubPodSpec,
};
use std::collections::BTreeMap;

/// Conventional name identifying the "main" container inside any rendered
/// pod template (spec.md §4.4 "identifying the main container by the
/// conventional name").
pub const MAIN_CONTAINER_NAME: &str = "ome-container";

/// Output of [`merge_component`]: a component spec with the runtime
/// template and user overrides folded together (spec.md §4.4 "Merging").
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedComponent {
    pub containers: Vec<Container>,
    pub leader: Option<SubPodSpec>,
    pub worker: Option<SubPodSpec>,
    pub component_extension: ComponentExtensionSpec,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub deployment_mode_annotation: Option<String>,
}

/// Whether `runtime` (the model's resolved serving runtime) declares
/// support for `format`, ignoring a format version pin when the runtime
/// didn't specify one (spec.md §4.4 "Runtime resolution").
pub fn runtime_supports_format(runtime: &ClusterServingRuntimeSpec, format: &ModelFormat) -> bool {
    runtime.supported_model_formats.iter().any(|supported| {
        supported.name == format.name
            && (supported.version.is_none() || supported.version == format.version)
    })
}

/// Validates a user-named runtime (spec.md §4.4 "If the user named a
/// runtime, fetch it and validate: not disabled; supports the requested
/// protocol version (if any); declares support for the model format").
pub fn validate_named_runtime(
    runtime: &ClusterServingRuntimeSpec,
    protocol_version: Option<&str>,
    format: &ModelFormat,
) -> Result<(), FailureReason> {
    if runtime.disabled {
        return Err(FailureReason::RuntimeDisabled);
    }
    if let Some(pv) = protocol_version {
        if !runtime.protocol_versions.iter().any(|v| v == pv) {
            return Err(FailureReason::RuntimeNotRecognized);
        }
    }
    if !runtime_supports_format(runtime, format) {
        return Err(FailureReason::RuntimeNotRecognized);
    }
    Ok(())
}

/// Deterministically picks the first runtime (by the caller's listed order
/// — callers list by name to make this stable across reconciles) supporting
/// `format`, skipping disabled ones (spec.md §4.4 "Otherwise, query all
/// runtimes supporting the model's format + parameter size and
/// deterministically pick the first").
pub fn auto_select_runtime<'a>(
    runtimes: &'a [ClusterServingRuntime],
    format: &ModelFormat,
) -> Option<&'a ClusterServingRuntime> {
    runtimes
        .iter()
        .find(|r| !r.spec.disabled && runtime_supports_format(&r.spec, format))
}

fn merge_maps(runtime: &BTreeMap<String, String>, user: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut out = runtime.clone();
    out.extend(user.clone());
    out
}

fn non_empty<T: Clone>(v: &[T]) -> Option<Vec<T>> {
    if v.is_empty() {
        None
    } else {
        Some(v.to_vec())
    }
}

/// Merges one runtime-provided container with its user-override
/// counterpart, field by field, user values winning (spec.md §4.4
/// "merging by field — user values win over runtime values field-by-field").
fn merge_container(runtime: Option<&Container>, user: Option<&Container>) -> Container {
    match (runtime, user) {
        (Some(r), Some(u)) => Container {
            name: u.name.clone(),
            image: u.image.clone().or_else(|| r.image.clone()),
            command: non_empty(&u.command.clone().unwrap_or_default()).or_else(|| r.command.clone()),
            args: non_empty(&u.args.clone().unwrap_or_default()).or_else(|| r.args.clone()),
            env: merge_env(&r.env.clone().unwrap_or_default(), &u.env.clone().unwrap_or_default()),
            volume_mounts: merge_volume_mounts(
                &r.volume_mounts.clone().unwrap_or_default(),
                &u.volume_mounts.clone().unwrap_or_default(),
            ),
            resources: u.resources.clone().or_else(|| r.resources.clone()),
            ..u.clone()
        },
        (None, Some(u)) => u.clone(),
        (Some(r), None) => r.clone(),
        (None, None) => unreachable!("merge_container requires at least one side"),
    }
}

fn merge_env(
    runtime: &[k8s_openapi::api::core::v1::EnvVar],
    user: &[k8s_openapi::api::core::v1::EnvVar],
) -> Option<Vec<k8s_openapi::api::core::v1::EnvVar>> {
    let mut out = runtime.to_vec();
    for entry in user {
        if let Some(existing) = out.iter_mut().find(|e| e.name == entry.name) {
            *existing = entry.clone();
        } else {
            out.push(entry.clone());
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn merge_volume_mounts(
    runtime: &[k8s_openapi::api::core::v1::VolumeMount],
    user: &[k8s_openapi::api::core::v1::VolumeMount],
) -> Option<Vec<k8s_openapi::api::core::v1::VolumeMount>> {
    let mut out = runtime.to_vec();
    for entry in user {
        if let Some(existing) = out.iter_mut().find(|e| e.name == entry.name) {
            *existing = entry.clone();
        } else {
            out.push(entry.clone());
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn merge_containers(runtime: &[Container], user: &[Container]) -> Vec<Container> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for u in user {
        let r = runtime.iter().find(|c| c.name == u.name);
        out.push(merge_container(r, Some(u)));
        seen.insert(u.name.clone());
    }
    for r in runtime {
        if !seen.contains(&r.name) {
            out.push(r.clone());
        }
    }
    out
}

fn main_container_present(sub: Option<&SubPodSpec>) -> bool {
    sub.map(|s| s.pod_spec.containers.iter().any(|c| c.name == MAIN_CONTAINER_NAME))
        .unwrap_or(false)
}

/// spec.md §4.4 "Validation. The main container must appear in exactly one
/// of {runtime-worker, user-worker}; otherwise the merge fails."
fn validate_worker_main_container(
    runtime_worker: Option<&SubPodSpec>,
    user_worker: Option<&SubPodSpec>,
) -> Result<(), FailureReason> {
    let in_runtime = main_container_present(runtime_worker);
    let in_user = main_container_present(user_worker);
    if in_runtime ^ in_user {
        Ok(())
    } else {
        Err(FailureReason::MainContainerAmbiguous)
    }
}

fn merge_subpod(runtime: Option<&SubPodSpec>, user: Option<&SubPodSpec>) -> Option<SubPodSpec> {
    match (runtime, user) {
        (None, None) => None,
        (Some(r), None) => Some(r.clone()),
        (None, Some(u)) => Some(u.clone()),
        (Some(r), Some(u)) => {
            let mut merged = r.pod_spec.clone();
            merged.containers = merge_containers(&r.pod_spec.containers, &u.pod_spec.containers);
            Some(SubPodSpec { pod_spec: merged })
        }
    }
}

/// spec.md §4.4 "Honor the fine-tuned-weights subsystem: a single
/// fine-tuned-weight injects an adapter annotation and records the
/// fine-tune strategy; 'stacked' (>1) fine-tuned weights are not supported
/// and are rejected with a typed error."
fn apply_fine_tune(
    fine_tuned_weights: &[String],
    annotations: &mut BTreeMap<String, String>,
) -> Result<(), FailureReason> {
    match fine_tuned_weights.len() {
        0 => Ok(()),
        1 => {
            annotations.insert("fine-tuned-adapter-injection".to_owned(), "true".to_owned());
            annotations.insert("fine-tune-strategy".to_owned(), "adapter".to_owned());
            Ok(())
        }
        _ => Err(FailureReason::StackedFineTuneNotSupported),
    }
}

/// Merges a runtime-provided component template with the user's own
/// override for the same component (spec.md §4.4 "Merging"). Returns
/// `Ok(None)` when neither side provides anything for this component.
pub fn merge_component(
    runtime: Option<&ComponentSpec>,
    user: Option<&ComponentSpec>,
    fine_tuned_weights: &[String],
) -> Result<Option<MergedComponent>, FailureReason> {
    if runtime.is_none() && user.is_none() {
        return Ok(None);
    }

    let runtime_worker = runtime.and_then(|r| r.worker.as_ref());
    let user_worker = user.and_then(|u| u.worker.as_ref());
    if runtime_worker.is_some() || user_worker.is_some() {
        validate_worker_main_container(runtime_worker, user_worker)?;
    }

    let containers = merge_containers(
        runtime.map(|r| r.pod_spec.containers.as_slice()).unwrap_or(&[]),
        user.map(|u| u.pod_spec.containers.as_slice()).unwrap_or(&[]),
    );
    let leader = merge_subpod(runtime.and_then(|r| r.leader.as_ref()), user.and_then(|u| u.leader.as_ref()));
    let worker = merge_subpod(runtime_worker, user_worker);

    let labels = merge_maps(
        &runtime.map(|r| r.component_extension.labels.clone()).unwrap_or_default(),
        &user.map(|u| u.component_extension.labels.clone()).unwrap_or_default(),
    );
    let mut annotations = merge_maps(
        &runtime.map(|r| r.component_extension.annotations.clone()).unwrap_or_default(),
        &user.map(|u| u.component_extension.annotations.clone()).unwrap_or_default(),
    );
    apply_fine_tune(fine_tuned_weights, &mut annotations)?;

    let component_extension = user
        .map(|u| u.component_extension.clone())
        .or_else(|| runtime.map(|r| r.component_extension.clone()))
        .unwrap_or_default();
    let deployment_mode_annotation = user.and_then(|u| u.deployment_mode.clone());

    Ok(Some(MergedComponent {
        containers,
        leader,
        worker,
        component_extension,
        labels,
        annotations,
        deployment_mode_annotation,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{EnvVar, PodSpec};

    fn container(name: &str, image: &str) -> Container {
        Container {
            name: name.to_owned(),
            image: Some(image.to_owned()),
            ..Default::default()
        }
    }

    fn component(containers: Vec<Container>) -> ComponentSpec {
        ComponentSpec {
            pod_spec: PodSpec {
                containers,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn user_image_wins_over_runtime_image() {
        let runtime = component(vec![container(MAIN_CONTAINER_NAME, "runtime:latest")]);
        let mut user_container = container(MAIN_CONTAINER_NAME, "user:latest");
        user_container.env = Some(vec![EnvVar {
            name: "FOO".to_owned(),
            value: Some("bar".to_owned()),
            ..Default::default()
        }]);
        let user = component(vec![user_container]);

        let merged = merge_component(Some(&runtime), Some(&user), &[]).unwrap().unwrap();
        assert_eq!(merged.containers.len(), 1);
        assert_eq!(merged.containers[0].image.as_deref(), Some("user:latest"));
        assert_eq!(merged.containers[0].env.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn runtime_only_containers_are_concatenated() {
        let runtime = component(vec![
            container(MAIN_CONTAINER_NAME, "runtime:latest"),
            container("sidecar", "sidecar:latest"),
        ]);
        let user = component(vec![container(MAIN_CONTAINER_NAME, "user:latest")]);

        let merged = merge_component(Some(&runtime), Some(&user), &[]).unwrap().unwrap();
        assert_eq!(merged.containers.len(), 2);
        assert!(merged.containers.iter().any(|c| c.name == "sidecar"));
    }

    #[test]
    fn single_fine_tuned_weight_injects_adapter_annotation() {
        let user = component(vec![container(MAIN_CONTAINER_NAME, "user:latest")]);
        let merged = merge_component(None, Some(&user), &["adapter-1".to_owned()])
            .unwrap()
            .unwrap();
        assert_eq!(
            merged.annotations.get("fine-tuned-adapter-injection").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn stacked_fine_tuned_weights_are_rejected() {
        let user = component(vec![container(MAIN_CONTAINER_NAME, "user:latest")]);
        let err = merge_component(None, Some(&user), &["a".to_owned(), "b".to_owned()]).unwrap_err();
        assert_eq!(err, FailureReason::StackedFineTuneNotSupported);
    }

    #[test]
    fn worker_main_container_in_both_sides_is_ambiguous() {
        let worker = SubPodSpec {
            pod_spec: PodSpec {
                containers: vec![container(MAIN_CONTAINER_NAME, "x")],
                ..Default::default()
            },
        };
        let runtime = ComponentSpec {
            worker: Some(worker.clone()),
            ..component(vec![])
        };
        let user = ComponentSpec {
            worker: Some(worker),
            ..component(vec![])
        };
        let err = merge_component(Some(&runtime), Some(&user), &[]).unwrap_err();
        assert_eq!(err, FailureReason::MainContainerAmbiguous);
    }

    #[test]
    fn worker_main_container_in_neither_side_is_ambiguous() {
        let worker_without_main = SubPodSpec {
            pod_spec: PodSpec {
                containers: vec![container("other", "x")],
                ..Default::default()
            },
        };
        let runtime = ComponentSpec {
            worker: Some(worker_without_main.clone()),
            ..component(vec![])
        };
        let user = ComponentSpec {
            worker: Some(worker_without_main),
            ..component(vec![])
        };
        let err = merge_component(Some(&runtime), Some(&user), &[]).unwrap_err();
        assert_eq!(err, FailureReason::MainContainerAmbiguous);
    }

    #[test]
    fn auto_select_picks_first_supporting_runtime_in_listed_order() {
        use ome_types::SupportedModelFormat;
        let make = |name: &str, disabled: bool| {
            let mut rt = ClusterServingRuntime::new(
                name,
                ClusterServingRuntimeSpec {
                    disabled,
                    supported_model_formats: vec![SupportedModelFormat {
                        name: "safetensors".to_owned(),
                        version: None,
                        max_parameter_size: None,
                    }],
                    ..Default::default()
                },
            );
            rt.metadata.name = Some(name.to_owned());
            rt
        };
        let runtimes = vec![make("disabled-rt", true), make("good-rt", false)];
        let format = ModelFormat {
            name: "safetensors".to_owned(),
            version: None,
        };
        let picked = auto_select_runtime(&runtimes, &format).unwrap();
        assert_eq!(picked.metadata.name.as_deref(), Some("good-rt"));
    }
}
