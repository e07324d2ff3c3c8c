use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{
    api::{ListParams, PostParams},
    Api, Client, Resource, ResourceExt,
};
use ome_types::{
    BaseModel, ClusterBaseModel, ClusterServingRuntime, FailureReason, InferenceService,
    ModelExtensionSpec, ModelFormat, ModelStorage,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// The base model resolved for an `InferenceService`, namespaced or
/// cluster-scoped (spec.md §4.4 "Look up a BaseModel in the service's
/// namespace first, then a ClusterBaseModel").
pub struct ResolvedBaseModel {
    pub format: ModelFormat,
    pub storage: ModelStorage,
    pub extension: ModelExtensionSpec,
    pub parameter_size: Option<String>,
    pub is_cluster_scoped: bool,
}

/// Looks up `name` as a namespaced `BaseModel` first, falling back to a
/// `ClusterBaseModel`. Returns `None` (mapped by the caller to
/// `FailureReason::BaseModelNotFound`) if neither exists.
pub async fn resolve_base_model(
    client: Client,
    namespace: &str,
    name: &str,
) -> Result<Option<ResolvedBaseModel>, crate::util::Error> {
    let namespaced: Api<BaseModel> = Api::namespaced(client.clone(), namespace);
    match namespaced.get(name).await {
        Ok(model) => {
            return Ok(Some(ResolvedBaseModel {
                format: model.spec.model_format,
                storage: model.spec.storage,
                extension: model.spec.model_extension_spec,
                parameter_size: model.spec.model_parameter_size,
                is_cluster_scoped: false,
            }))
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {}
        Err(e) => return Err(e.into()),
    }

    let cluster: Api<ClusterBaseModel> = Api::all(client);
    match cluster.get(name).await {
        Ok(model) => Ok(Some(ResolvedBaseModel {
            format: model.spec.model_format,
            storage: model.spec.storage,
            extension: model.spec.model_extension_spec,
            parameter_size: model.spec.model_parameter_size,
            is_cluster_scoped: true,
        })),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Lists every `ClusterServingRuntime`, sorted by name so that auto-select
/// (spec.md §4.4 "deterministically pick the first") is stable across
/// reconciles regardless of the orchestrator's listing order.
pub async fn list_cluster_serving_runtimes(client: Client) -> Result<Vec<ClusterServingRuntime>, crate::util::Error> {
    let api: Api<ClusterServingRuntime> = Api::all(client);
    let mut runtimes = api.list(&ListParams::default()).await?.items;
    runtimes.sort_by(|a, b| a.name_any().cmp(&b.name_any()));
    Ok(runtimes)
}

pub async fn get_cluster_serving_runtime(
    client: Client,
    name: &str,
) -> Result<Option<ClusterServingRuntime>, crate::util::Error> {
    let api: Api<ClusterServingRuntime> = Api::all(client);
    match api.get(name).await {
        Ok(rt) => Ok(Some(rt)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// True iff the Knative `Service` CRD is installed in this cluster (spec.md
/// §8 scenario 6: "Deployment mode resolves to Serverless but the Knative
/// CRD is not installed"). Checked live rather than cached, since CRD
/// installation is not something this operator's own watches observe.
pub async fn knative_installed(client: Client) -> Result<bool, crate::util::Error> {
    let api: Api<CustomResourceDefinition> = Api::all(client);
    match api.get("services.serving.knative.dev").await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn owner_ref(service: &InferenceService) -> OwnerReference {
    OwnerReference {
        api_version: "ome.io/v1".to_owned(),
        kind: "InferenceService".to_owned(),
        name: service.name_any(),
        uid: service.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// `checkExist -> create | update` for an owned child object, shared by
/// every deployment-mode dispatcher (spec.md §4.6 step 5 "Each renderer
/// sets the InferenceService as owner, performs checkExist->create|update").
pub async fn reconcile_owned<T>(
    api: &Api<T>,
    name: &str,
    owner: OwnerReference,
    build: impl FnOnce(&str) -> T,
    spec_changed: impl FnOnce(&T) -> bool,
    apply_spec: impl FnOnce(&mut T),
) -> Result<T, crate::util::Error>
where
    T: Clone + Resource + Serialize + DeserializeOwned + Debug,
    <T as Resource>::DynamicType: Default,
{
    match api.get(name).await {
        Ok(mut existing) => {
            if spec_changed(&existing) {
                apply_spec(&mut existing);
                Ok(api.replace(name, &Default::default(), &existing).await?)
            } else {
                Ok(existing)
            }
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            let mut obj = build(name);
            obj.meta_mut().owner_references = Some(vec![owner]);
            Ok(api.create(&PostParams::default(), &obj).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Best-effort delete; a missing object is not an error (spec.md §4.6 step
/// 6 "delete all owned child objects").
pub async fn delete_if_present<T>(api: &Api<T>, name: &str) -> Result<(), crate::util::Error>
where
    T: Clone + Resource + Serialize + DeserializeOwned + Debug,
    <T as Resource>::DynamicType: Default,
{
    match api.delete(name, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// The first pod matching `labels` in `namespace`, used for pod-derived
/// model status (spec.md §4.7 "Pod-derived model state").
pub async fn first_pod_for_labels(
    client: Client,
    namespace: &str,
    labels: &str,
) -> Result<Option<Pod>, crate::util::Error> {
    let api: Api<Pod> = Api::namespaced(client, namespace);
    let mut list = api.list(&ListParams::default().labels(labels)).await?;
    Ok(if list.items.is_empty() {
        None
    } else {
        Some(list.items.remove(0))
    })
}

pub fn failure_reason_for_base_model(disabled: bool) -> Option<FailureReason> {
    if disabled {
        Some(FailureReason::BaseModelDisabled)
    } else {
        None
    }
}
