use kube::{
    api::{Patch, Resource},
    core::{ClusterResourceScope, NamespaceResourceScope},
    Api, Client,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::{clone::Clone, fmt::Debug};

use super::Error;

/// Each reconciled kind registers its own finalizer name so that one kind's
/// finalizer never blocks deletion on account of another kind's controller
/// being absent (spec.md §6, "Finalizer names").
pub const CLUSTER_CAPACITY_RESERVATION_FINALIZER: &str = "ome.io/clustercapacityreservation-finalizer";
pub const BASE_MODEL_FINALIZER: &str = "ome.io/basemodel-finalizer";
pub const CLUSTER_BASE_MODEL_FINALIZER: &str = "ome.io/clusterbasemodel-finalizer";
pub const INFERENCE_SERVICE_FINALIZER: &str = "ome.io/inferenceservice-finalizer";

/// Adds a finalizer record into a namespaced `T` kind of resource. If the
/// finalizer already exists, this action has no effect.
///
/// Note: Does not check for resource's existence for simplicity.
pub async fn add<T: Clone + Resource + Serialize + DeserializeOwned + Debug>(
    client: Client,
    name: &str,
    namespace: &str,
    finalizer: &str,
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = NamespaceResourceScope>,
{
    let api: Api<T> = Api::namespaced(client, namespace);
    add_via(&api, name, finalizer).await
}

/// Removes all finalizers from a namespaced `T` resource. If there are no
/// finalizers already, this action has no effect.
///
/// Note: Does not check for resource's existence for simplicity.
pub async fn delete<T: Clone + Resource + Serialize + DeserializeOwned + Debug>(
    client: Client,
    name: &str,
    namespace: &str,
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = NamespaceResourceScope>,
{
    let api: Api<T> = Api::namespaced(client, namespace);
    delete_via(&api, name).await
}

/// Cluster-scoped counterpart of [`add`] (`ClusterCapacityReservation`,
/// `ClusterBaseModel` have no namespace to scope an `Api` by).
pub async fn add_cluster<T: Clone + Resource + Serialize + DeserializeOwned + Debug>(
    client: Client,
    name: &str,
    finalizer: &str,
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = ClusterResourceScope>,
{
    let api: Api<T> = Api::all(client);
    add_via(&api, name, finalizer).await
}

/// Cluster-scoped counterpart of [`delete`].
pub async fn delete_cluster<T: Clone + Resource + Serialize + DeserializeOwned + Debug>(
    client: Client,
    name: &str,
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = ClusterResourceScope>,
{
    let api: Api<T> = Api::all(client);
    delete_via(&api, name).await
}

pub async fn add_via<T: Clone + Resource + Serialize + DeserializeOwned + Debug>(
    api: &Api<T>,
    name: &str,
    finalizer: &str,
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
{
    let patch_value: Value = json!({
        "metadata": {
            "finalizers": [finalizer]
        }
    });
    let patch: Patch<&Value> = Patch::Merge(&patch_value);
    Ok(api.patch(name, &Default::default(), &patch).await?)
}

pub async fn delete_via<T: Clone + Resource + Serialize + DeserializeOwned + Debug>(
    api: &Api<T>,
    name: &str,
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
{
    let patch_value: Value = json!({
        "metadata": {
            "finalizers": null
        }
    });
    let patch: Patch<&Value> = Patch::Merge(&patch_value);
    Ok(api.patch(name, &Default::default(), &patch).await?)
}
