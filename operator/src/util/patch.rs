use super::{Error, MANAGER_NAME};
use kube::{
    api::{Patch, PatchParams, Resource},
    core::{ClusterResourceScope, NamespaceResourceScope},
    Api, Client,
};
use ome_types::{StatusObject, StatusTimestamp};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::{clone::Clone, fmt::Debug};

/// Patches a namespaced resource's status with the provided function. The
/// function is passed a mutable reference to the status object, which is
/// mutated in-place; move closures are supported.
///
/// No API call is made if `f` leaves the status semantically unchanged (I4,
/// P5, P6): `lastUpdated` is bumped, and a diff is sent, only on a real
/// transition.
pub async fn patch_status<
    S: Clone + PartialEq,
    T: Clone + Resource + StatusObject<S> + Serialize + DeserializeOwned + Debug,
>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = NamespaceResourceScope>,
    S: StatusTimestamp,
{
    match diff_status(instance, f) {
        None => Ok(instance.clone()),
        Some(ops) => {
            let patch = Patch::Json::<T>(ops);
            let name = instance.meta().name.as_deref().unwrap();
            let namespace = instance.meta().namespace.as_deref().unwrap();
            let api: Api<T> = Api::namespaced(client, namespace);
            Ok(api
                .patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
                .await?)
        }
    }
}

/// Cluster-scoped counterpart of [`patch_status`].
pub async fn patch_status_cluster<
    S: Clone + PartialEq,
    T: Clone + Resource + StatusObject<S> + Serialize + DeserializeOwned + Debug,
>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = ClusterResourceScope>,
    S: StatusTimestamp,
{
    match diff_status(instance, f) {
        None => Ok(instance.clone()),
        Some(ops) => {
            let patch = Patch::Json::<T>(ops);
            let name = instance.meta().name.as_deref().unwrap();
            let api: Api<T> = Api::all(client);
            Ok(api
                .patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
                .await?)
        }
    }
}

/// Scope-agnostic counterpart of [`patch_status`]/[`patch_status_cluster`] for
/// callers that already hold a pre-built `Api<T>` (namespaced or
/// cluster-wide) and so don't need `T: Resource<Scope = ..>` themselves.
pub async fn patch_status_via<
    S: Clone + PartialEq,
    T: Clone + Resource + StatusObject<S> + Serialize + DeserializeOwned + Debug,
>(
    api: &Api<T>,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    S: StatusTimestamp,
{
    match diff_status(instance, f) {
        None => Ok(instance.clone()),
        Some(ops) => {
            let patch = Patch::Json::<T>(ops);
            let name = instance.meta().name.as_deref().unwrap();
            Ok(api
                .patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
                .await?)
        }
    }
}

/// Applies a JSON merge patch to a namespaced resource's spec (as opposed to
/// its status) via server-side apply. Used to absorb node-reported config
/// back into a resource's spec (spec.md §4.3 step 1) and to write back an
/// auto-selected value (spec.md §4.4 runtime selection) so later reconciles
/// observe a stable spec.
pub async fn patch_spec<T: Clone + Resource + Serialize + DeserializeOwned + Debug>(
    client: Client,
    name: &str,
    namespace: &str,
    spec_patch: Value,
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = NamespaceResourceScope>,
{
    let api: Api<T> = Api::namespaced(client, namespace);
    patch_spec_via(&api, name, spec_patch).await
}

/// Cluster-scoped counterpart of [`patch_spec`].
pub async fn patch_spec_cluster<T: Clone + Resource + Serialize + DeserializeOwned + Debug>(
    client: Client,
    name: &str,
    spec_patch: Value,
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = ClusterResourceScope>,
{
    let api: Api<T> = Api::all(client);
    patch_spec_via(&api, name, spec_patch).await
}

/// Scope-agnostic counterpart of [`patch_spec`]/[`patch_spec_cluster`] for
/// callers that already hold a pre-built `Api<T>`.
pub async fn patch_spec_via<T: Clone + Resource + Serialize + DeserializeOwned + Debug>(
    api: &Api<T>,
    name: &str,
    spec_patch: Value,
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
{
    let body = json!({ "spec": spec_patch });
    let patch: Patch<&Value> = Patch::Merge(&body);
    Ok(api.patch(name, &Default::default(), &patch).await?)
}

/// Applies `f` to a clone of `instance`'s status and returns the JSON patch
/// describing the change, or `None` if the status came out unchanged (I4,
/// P5, P6).
fn diff_status<S: Clone + PartialEq + StatusTimestamp, T: Clone + Serialize + StatusObject<S>>(
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Option<json_patch::Patch> {
    let mut modified = instance.clone();
    let status = modified.mut_status();
    let before = status.clone();
    f(status);
    if *status == before {
        return None;
    }
    status.set_last_updated(chrono::Utc::now().to_rfc3339());
    Some(json_patch::diff(
        &serde_json::to_value(instance).unwrap(),
        &serde_json::to_value(&modified).unwrap(),
    ))
}
