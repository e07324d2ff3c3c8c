use futures::stream::StreamExt;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::ListParams, client::Client, runtime::controller::Action, runtime::Controller, Api,
    Resource, ResourceExt,
};
use ome_types::{
    condition_type, ComponentPhase, ComponentSpec, ComponentStatus, ComponentType, ConditionStatus,
    FailureInfo, FailureReason, InferenceService, ModelStatusBlock,
};
use serde_json::json;
use std::sync::Arc;
use tokio::time::Duration;

#[cfg(feature = "metrics")]
use super::metrics::{INFERENCE_ACTION_COUNTER, INFERENCE_COMPONENT_DISPATCH_COUNTER, INFERENCE_RECONCILE_COUNTER};

use super::actions::{self, ResolvedBaseModel};
use super::dispatch::{self, DispatchError, DispatchOutcome, RenderedComponent};
use super::mode::decide_mode;
use super::render;
use super::resolver::{self, MergedComponent};
use super::status::{aggregate_conditions, derive_model_transition, fold_knative, fold_leader_worker_workload, fold_multi_deployment, fold_plain_workload, FoldedComponent};
use crate::util::{
    condition::set_condition,
    finalizer, messages,
    patch::{patch_spec, patch_status},
    retry, Error, PROBE_INTERVAL,
};

/// Entrypoint for the `InferenceService` controller.
///
/// `cluster_allows_serverless` comes from `util::config::Config`'s
/// `inferenceService.allowServerless` (spec.md §4.5 decision rules).
pub async fn run(client: Client, cluster_allows_serverless: bool) -> Result<(), Error> {
    println!("Starting InferenceService controller...");
    let api: Api<InferenceService> = Api::all(client.clone());
    let context = Arc::new(ContextData { client, cluster_allows_serverless });
    Controller::new(api, ListParams::default())
        .run(reconcile, on_error, context)
        .for_each(|_res| async move {})
        .await;
    Ok(())
}

struct ContextData {
    client: Client,
    cluster_allows_serverless: bool,
}

#[derive(Debug, PartialEq)]
enum ServiceAction {
    AddFinalizer,
    Delete,
    Reconcile,
}

async fn reconcile(instance: Arc<InferenceService>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let name = instance.name_any();
    let namespace = instance.meta().namespace.clone().unwrap_or_default();

    #[cfg(feature = "metrics")]
    INFERENCE_RECONCILE_COUNTER.with_label_values(&[&name]).inc();

    let action = if instance.meta().deletion_timestamp.is_some() {
        ServiceAction::Delete
    } else if !instance
        .finalizers()
        .iter()
        .any(|f| f == finalizer::INFERENCE_SERVICE_FINALIZER)
    {
        ServiceAction::AddFinalizer
    } else {
        ServiceAction::Reconcile
    };

    #[cfg(feature = "metrics")]
    INFERENCE_ACTION_COUNTER.with_label_values(&[&name, &format!("{:?}", action)]).inc();

    let result = match action {
        ServiceAction::AddFinalizer => {
            retry::on_conflict(|| {
                finalizer::add::<InferenceService>(
                    client.clone(),
                    &name,
                    &namespace,
                    finalizer::INFERENCE_SERVICE_FINALIZER,
                )
            })
            .await?;
            Action::requeue(Duration::ZERO)
        }
        ServiceAction::Delete => {
            teardown_all_components(client.clone(), &namespace, &instance).await?;
            retry::on_conflict(|| finalizer::delete::<InferenceService>(client.clone(), &name, &namespace))
                .await?;
            Action::await_change()
        }
        ServiceAction::Reconcile => {
            reconcile_service(client, &namespace, &instance, context.cluster_allows_serverless).await?
        }
    };
    Ok(result)
}

/// spec.md §4.5 annotation override key used to pin a deployment mode
/// regardless of the decision rules (e.g. `VirtualDeployment`).
const DEPLOYMENT_MODE_ANNOTATION: &str = "ome.io/deployment-mode";

async fn reconcile_service(
    client: Client,
    namespace: &str,
    instance: &InferenceService,
    cluster_allows_serverless: bool,
) -> Result<Action, Error> {
    let name = instance.name_any();
    let annotation_override = instance.meta().annotations.as_ref().and_then(|a| a.get(DEPLOYMENT_MODE_ANNOTATION)).cloned();

    if annotation_override.as_deref() == Some("VirtualDeployment") {
        // spec.md §4.5: a VirtualDeployment override short-circuits rendering
        // entirely and marks the service immediately Ready with a
        // deterministic in-cluster URL for each declared component.
        let component_types: Vec<ComponentType> = [
            instance.spec.engine.as_ref().map(|_| ComponentType::Engine),
            instance.spec.decoder.as_ref().map(|_| ComponentType::Decoder),
            instance.spec.router.as_ref().map(|_| ComponentType::Router),
            instance.spec.predictor.as_ref().map(|_| ComponentType::Predictor),
        ]
        .into_iter()
        .flatten()
        .collect();
        let components: std::collections::BTreeMap<String, ComponentStatus> = component_types
            .iter()
            .map(|component_type| {
                let object_name = render::object_name(&name, *component_type);
                let url = Some(format!("http://{object_name}.{namespace}.svc.cluster.local"));
                (
                    object_name,
                    ComponentStatus {
                        url,
                        phase: Some(ComponentPhase::Ready),
                        ..Default::default()
                    },
                )
            })
            .collect();

        retry::on_conflict(|| {
            patch_status(client.clone(), instance, |status| {
                status.components = components.clone();
                set_condition(
                    &mut status.conditions,
                    condition_type::READY,
                    ConditionStatus::True,
                    Some("VirtualDeployment".to_owned()),
                    Some("Deployment delegated to a virtual (externally-managed) workload.".to_owned()),
                );
            })
        })
        .await?;
        return Ok(Action::requeue(PROBE_INTERVAL));
    }

    let resolved = match actions::resolve_base_model(client.clone(), namespace, &instance.spec.model.base_model).await? {
        Some(m) => m,
        None => {
            mark_invalid_spec(client, instance, FailureReason::BaseModelNotFound, messages::BASE_MODEL_NOT_FOUND).await?;
            return Ok(Action::await_change());
        }
    };
    if let Some(reason) = actions::failure_reason_for_base_model(resolved.extension.disabled) {
        mark_invalid_spec(client, instance, reason, messages::BASE_MODEL_DISABLED).await?;
        return Ok(Action::await_change());
    }

    let runtime = match &instance.spec.model.runtime {
        Some(runtime_name) => {
            let runtime = match actions::get_cluster_serving_runtime(client.clone(), runtime_name).await? {
                Some(rt) => rt,
                None => {
                    mark_invalid_spec(client, instance, FailureReason::RuntimeNotRecognized, "Named serving runtime does not exist.").await?;
                    return Ok(Action::await_change());
                }
            };
            if let Err(reason) = resolver::validate_named_runtime(
                &runtime.spec,
                instance.spec.model.protocol_version.as_deref(),
                &resolved.format,
            ) {
                mark_invalid_spec(client, instance, reason, "Named serving runtime failed validation.").await?;
                return Ok(Action::await_change());
            }
            runtime
        }
        None => {
            let runtimes = actions::list_cluster_serving_runtimes(client.clone()).await?;
            match resolver::auto_select_runtime(&runtimes, &resolved.format) {
                Some(rt) => {
                    let rt = rt.clone();
                    // spec.md §4.4: the chosen name is written back into the
                    // service spec so subsequent reconciles are stable.
                    let runtime_name = rt.name_any();
                    retry::on_conflict(|| {
                        patch_spec::<InferenceService>(
                            client.clone(),
                            &name,
                            namespace,
                            json!({ "model": { "runtime": runtime_name } }),
                        )
                    })
                    .await?;
                    rt
                }
                None => {
                    mark_invalid_spec(client, instance, FailureReason::NoSupportingRuntime, "No serving runtime supports this model format.").await?;
                    return Ok(Action::await_change());
                }
            }
        }
    };

    let knative_installed = actions::knative_installed(client.clone()).await?;

    let mut components = Vec::new();
    for (component_type, runtime_spec, user_spec) in [
        (ComponentType::Engine, &runtime.spec.engine, &instance.spec.engine),
        (ComponentType::Decoder, &runtime.spec.decoder, &instance.spec.decoder),
        (ComponentType::Router, &runtime.spec.router, &instance.spec.router),
    ] {
        let fine_tuned_weights: &[String] = if component_type == ComponentType::Engine {
            &instance.spec.model.fine_tuned_weights
        } else {
            &[]
        };
        let merged = match resolver::merge_component(runtime_spec.as_ref(), user_spec.as_ref(), fine_tuned_weights) {
            Ok(m) => m,
            Err(reason) => {
                mark_invalid_spec(client, instance, reason, "Component spec failed to merge.").await?;
                return Ok(Action::await_change());
            }
        };
        if let Some(merged) = merged {
            components.push((component_type, merged));
        }
    }

    if components.is_empty() {
        if let Some(predictor) = &instance.spec.predictor {
            let synthetic = ComponentSpec {
                pod_spec: predictor.pod_spec.clone(),
                component_extension: predictor.component_extension.clone(),
                ..Default::default()
            };
            let merged = match resolver::merge_component(runtime.spec.engine.as_ref(), Some(&synthetic), &instance.spec.model.fine_tuned_weights) {
                Ok(m) => m,
                Err(reason) => {
                    mark_invalid_spec(client, instance, reason, "Legacy predictor spec failed to merge.").await?;
                    return Ok(Action::await_change());
                }
            };
            if let Some(merged) = merged {
                components.push((ComponentType::Predictor, merged));
            }
        }
    }

    let mut previous_status = instance.status.clone().unwrap_or_default();
    let mut new_components = std::collections::BTreeMap::new();
    let mut ready_states = Vec::new();
    let mut main_ready_replicas = 0usize;

    for (component_type, merged) in &components {
        let object_name = render::object_name(&name, *component_type);
        let previous = previous_status.components.get(&object_name).cloned().unwrap_or_default();

        let runtime_distributed = runtime.spec.distributed_runtime;
        let has_leader_and_worker = merged.leader.is_some() && merged.worker.is_some();
        let mode = decide_mode(
            merged.deployment_mode_annotation.as_deref().or(annotation_override.as_deref()),
            has_leader_and_worker,
            runtime_distributed,
            cluster_allows_serverless,
        );

        #[cfg(feature = "metrics")]
        INFERENCE_COMPONENT_DISPATCH_COUNTER
            .with_label_values(&[&name, &component_type.to_string(), &mode.to_string()])
            .inc();

        let rendered = render_component(
            &name,
            namespace,
            *component_type,
            &instance.spec.model.base_model,
            &resolved,
            &runtime.name_any(),
            merged,
        );
        let outcome = dispatch::dispatch(client.clone(), namespace, &object_name, mode, &rendered, instance, knative_installed).await;

        let folded = match outcome {
            Ok(outcome) => fold_outcome(&outcome, &previous, namespace, &object_name),
            Err(DispatchError::Reason(reason)) => {
                let message = DispatchError::Reason(reason).message();
                mark_invalid_spec(client.clone(), instance, reason, &message).await?;
                return Ok(Action::await_change());
            }
            Err(DispatchError::Infra(e)) => return Err(e),
        };

        if component_type == &ComponentType::Engine || component_type == &ComponentType::Predictor {
            let selector = format!("ome-service={name},ome-component={component_type}");
            if let Some(pod) = actions::first_pod_for_labels(client.clone(), namespace, &selector).await? {
                if folded.ready == ConditionStatus::True {
                    main_ready_replicas = 1;
                }
                previous_status.model_status = derive_model_transition(Some(&pod), main_ready_replicas);
            }
        }

        let mut component_status = folded.status;
        component_status.phase = Some(match folded.ready {
            ConditionStatus::True => ComponentPhase::Ready,
            ConditionStatus::False => ComponentPhase::Failed,
            ConditionStatus::Unknown => ComponentPhase::Creating,
        });
        ready_states.push(folded.ready);
        new_components.insert(object_name, component_status);
    }

    for (existing_name, _) in previous_status.components.iter() {
        if !new_components.contains_key(existing_name) {
            dispatch::teardown(client.clone(), namespace, existing_name).await?;
        }
    }

    let routes_ready = aggregate_conditions(&ready_states);
    let latest_deployment_ready = aggregate_conditions(&ready_states);

    retry::on_conflict(|| {
        let client = client.clone();
        let new_components = new_components.clone();
        let model_status = previous_status.model_status.clone();
        async move {
            patch_status(client, instance, move |status| {
                status.components = new_components.clone();
                status.model_status = model_status.clone();
                set_condition(&mut status.conditions, condition_type::ROUTES_READY, routes_ready, None, None);
                set_condition(&mut status.conditions, condition_type::LATEST_DEPLOYMENT_READY, latest_deployment_ready, None, None);
                let ready = aggregate_conditions(&[routes_ready, latest_deployment_ready]);
                set_condition(&mut status.conditions, condition_type::READY, ready, None, None);
            })
            .await
        }
    })
    .await?;

    Ok(Action::requeue(PROBE_INTERVAL))
}

fn render_component(
    service_name: &str,
    namespace: &str,
    component_type: ComponentType,
    base_model_name: &str,
    base_model: &ResolvedBaseModel,
    runtime_name: &str,
    merged: &MergedComponent,
) -> RenderedComponent {
    let mut containers = merged.containers.clone();
    let num_leaders = if merged.leader.is_some() { 1 } else { 0 };
    let num_workers = if merged.worker.is_some() { 1 } else { 0 };
    let gpus = render::gpus_per_pod(&containers);
    let parallelism = render::parallelism_size(gpus, num_leaders, num_workers.max(1));
    let model_path = base_model.storage.path.clone().unwrap_or_else(|| "/mnt/models".to_owned());
    render::patch_main_container_env(&mut containers, &model_path, service_name, parallelism);

    let fine_tuned = merged.annotations.contains_key("fine-tuned-adapter-injection");

    let label_inputs = render::LabelInputs {
        service_name,
        component: component_type,
        base_model_name,
        base_model_vendor: base_model.extension.vendor.as_deref(),
        base_model_size: base_model.parameter_size.as_deref(),
        runtime_name,
        fine_tuned,
    };
    let labels = render::component_labels(&label_inputs, &merged.labels);

    let annotation_inputs = render::AnnotationInputs {
        base_model_name,
        base_model_format: &base_model.format.name,
        base_model_format_version: base_model.format.version.as_deref(),
        runtime_name,
    };
    let annotations = render::component_annotations(&annotation_inputs, &merged.annotations);

    let mut volumes = Vec::new();
    let (model_volume, model_mount) = render::model_volume(&base_model.storage);
    volumes.push(model_volume);
    let mut main_mounts = vec![model_mount];

    if fine_tuned {
        let (scratch_volume, scratch_mount) = render::fine_tune_scratch_volume();
        volumes.push(scratch_volume);
        main_mounts.push(scratch_mount);
    }

    let block_list_config_map = render::object_name(service_name, component_type);
    let (block_list_volume, block_list_mount) = render::block_list_volume(&block_list_config_map);
    volumes.push(block_list_volume);
    main_mounts.push(block_list_mount);

    for c in containers.iter_mut().filter(|c| c.name == resolver::MAIN_CONTAINER_NAME) {
        c.volume_mounts.get_or_insert_with(Vec::new).extend(main_mounts.iter().cloned());
    }

    let fine_tune_with_merged_weights = merged.annotations.get("fine-tune-strategy").map(String::as_str) == Some("merged");
    let node_selector = if render::should_apply_node_selector(&base_model.storage, fine_tune_with_merged_weights) {
        let mut ns = std::collections::BTreeMap::new();
        ns.insert(
            render::node_selector_key(Some(namespace), base_model.is_cluster_scoped, base_model_name),
            render::NODE_SELECTOR_READY_VALUE.to_owned(),
        );
        Some(ns)
    } else {
        None
    };

    let pod_spec = k8s_openapi::api::core::v1::PodSpec {
        containers,
        volumes: Some(volumes),
        node_selector,
        ..Default::default()
    };
    let pod_template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            annotations: Some(annotations.clone()),
            ..Default::default()
        }),
        spec: Some(pod_spec),
    };

    let leader_template = merged.leader.as_ref().map(|l| PodTemplateSpec {
        metadata: Some(ObjectMeta { labels: Some(labels.clone()), ..Default::default() }),
        spec: Some(l.pod_spec.clone()),
    });
    let worker_template = merged.worker.as_ref().map(|w| PodTemplateSpec {
        metadata: Some(ObjectMeta { labels: Some(labels.clone()), ..Default::default() }),
        spec: Some(w.pod_spec.clone()),
    });

    RenderedComponent {
        labels,
        annotations,
        pod_template,
        leader_template,
        worker_template,
        replicas: merged.component_extension.min_replicas.unwrap_or(1),
        traffic: vec![],
    }
}

fn fold_outcome(
    outcome: &DispatchOutcome,
    previous: &ComponentStatus,
    namespace: &str,
    object_name: &str,
) -> FoldedComponent {
    // spec.md §4.7: RawDeployment/MultiNode components have no external
    // ingress of their own, so their URL is the in-cluster Service DNS name
    // once Available=True (fold_plain_workload/fold_leader_worker_workload
    // withhold it otherwise).
    let in_cluster_url = Some(format!("http://{object_name}.{namespace}.svc.cluster.local"));
    match outcome {
        DispatchOutcome::RawDeployment(d) => {
            let available = d.status.as_ref().and_then(|s| s.conditions.as_ref()).and_then(|cs| {
                cs.iter().find(|c| c.type_ == "Available").map(|c| ome_types::Condition {
                    type_: c.type_.clone(),
                    status: match c.status.as_str() {
                        "True" => ConditionStatus::True,
                        "False" => ConditionStatus::False,
                        _ => ConditionStatus::Unknown,
                    },
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                    last_transition_time: None,
                })
            });
            let revision = d
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get("deployment.kubernetes.io/revision"))
                .map(String::as_str);
            fold_plain_workload(revision, available.as_ref(), in_cluster_url)
        }
        DispatchOutcome::MultiNode(lws) => {
            let status = lws.status.clone().unwrap_or_default();
            let available = status.conditions.iter().find(|c| c.type_ == condition_type::READY);
            fold_leader_worker_workload(status.observed_resource_version.as_deref(), available, in_cluster_url)
        }
        DispatchOutcome::Ray(rs) => {
            let status = rs.status.clone().unwrap_or_default();
            fold_multi_deployment(&status.deployments)
        }
        DispatchOutcome::Serverless(ks) => {
            let status = ks.status.clone().unwrap_or_default();
            fold_knative(&status, previous)
        }
    }
}

async fn mark_invalid_spec(client: Client, instance: &InferenceService, reason: FailureReason, message: &str) -> Result<(), Error> {
    retry::on_conflict(|| {
        patch_status(client.clone(), instance, |status| {
            status.model_status = ModelStatusBlock {
                transition_status: Some(ome_types::TransitionStatus::InvalidSpec),
                failure_info: Some(FailureInfo {
                    reason,
                    message: message.to_owned(),
                    exit_code: None,
                }),
                copies: None,
            };
            set_condition(&mut status.conditions, condition_type::READY, ConditionStatus::False, Some(format!("{reason:?}")), Some(message.to_owned()));
        })
    })
    .await?;
    Ok(())
}

async fn teardown_all_components(client: Client, namespace: &str, instance: &InferenceService) -> Result<(), Error> {
    if let Some(status) = &instance.status {
        for object_name in status.components.keys() {
            dispatch::teardown(client.clone(), namespace, object_name).await?;
        }
    }
    Ok(())
}

fn on_error(instance: Arc<InferenceService>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!("Reconciliation error:\n{:?}.\n{:?}", error, instance.name_any());
    Action::requeue(Duration::from_secs(5))
}
