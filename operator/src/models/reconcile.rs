use futures::stream::StreamExt;
use kube::{
    api::ListParams, client::Client, runtime::controller::Action, runtime::Controller, Api,
    Resource, ResourceExt,
};
use ome_types::{BaseModel, ClusterBaseModel, ModelKey, ModelLifecycleState, ModelStatus, StatusObject};
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, sync::Arc};
use tokio::time::Duration;

#[cfg(feature = "metrics")]
use super::metrics::{MODEL_ACTION_COUNTER, MODEL_RECONCILE_COUNTER};

use super::actions::{list_existing_nodes, list_node_state_documents};
use super::aggregator::{aggregate, any_node_holds_model, lifecycle_state};
use crate::util::{
    finalizer,
    patch::{patch_spec_via, patch_status_via},
    retry, Error, MODEL_DELETE_PROBE_INTERVAL, MODEL_PROBE_INTERVAL, PROBE_INTERVAL,
};

/// Shared surface over [`BaseModel`] (namespaced) and [`ClusterBaseModel`]
/// (cluster-scoped), letting one reconcile loop serve both kinds (spec.md
/// §4.3 applies identically to either). `kube::Api<T>`'s own methods carry
/// no `Resource::Scope` bound, so a generic function built around a
/// pre-constructed `Api<Self>` never needs to be generic over scope itself.
pub trait ModelLike:
    Resource<DynamicType = ()>
    + StatusObject<ModelStatus>
    + Clone
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    /// Label used on metrics and log lines to distinguish the two kinds.
    const KIND_LABEL: &'static str;

    /// Finalizer name registered on this kind (spec.md §6 "Finalizer
    /// names") — distinct per kind so one kind's controller being down
    /// never blocks another kind's deletion.
    const FINALIZER: &'static str;

    fn is_cluster_scoped() -> bool;

    /// Builds an `Api<Self>` scoped appropriately for `namespace` (ignored
    /// for cluster-scoped kinds).
    fn api_for(client: Client, namespace: Option<&str>) -> Api<Self>;

    fn model_key(&self) -> ModelKey {
        ModelKey::encode(self.meta().namespace.as_deref(), &self.name_any(), Self::is_cluster_scoped())
    }
}

impl ModelLike for BaseModel {
    const KIND_LABEL: &'static str = "BaseModel";
    const FINALIZER: &'static str = finalizer::BASE_MODEL_FINALIZER;

    fn is_cluster_scoped() -> bool {
        false
    }

    fn api_for(client: Client, namespace: Option<&str>) -> Api<Self> {
        Api::namespaced(client, namespace.expect("BaseModel is namespaced"))
    }
}

impl ModelLike for ClusterBaseModel {
    const KIND_LABEL: &'static str = "ClusterBaseModel";
    const FINALIZER: &'static str = finalizer::CLUSTER_BASE_MODEL_FINALIZER;

    fn is_cluster_scoped() -> bool {
        true
    }

    fn api_for(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }
}

/// Entrypoint for the `BaseModel` controller.
pub async fn run_namespaced(client: Client) -> Result<(), Error> {
    run::<BaseModel>(client).await
}

/// Entrypoint for the `ClusterBaseModel` controller.
pub async fn run_cluster(client: Client) -> Result<(), Error> {
    run::<ClusterBaseModel>(client).await
}

async fn run<T: ModelLike>(client: Client) -> Result<(), Error> {
    println!("Starting {} controller...", T::KIND_LABEL);
    let api: Api<T> = T::api_for(client.clone(), None);
    let operator_namespace = crate::util::operator_namespace();
    let context: Arc<ContextData> = Arc::new(ContextData {
        client,
        operator_namespace,
    });

    Controller::new(api, ListParams::default())
        .run(reconcile::<T>, on_error::<T>, context)
        .for_each(|_res| async move {})
        .await;
    Ok(())
}

struct ContextData {
    client: Client,
    operator_namespace: String,
}

#[derive(Debug, PartialEq)]
enum ModelAction {
    AddFinalizer,
    DeleteBlocked,
    DeleteReady,
    Aggregate,
}

async fn reconcile<T: ModelLike>(instance: Arc<T>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let name = instance.name_any();
    let namespace = instance.meta().namespace.clone();
    let api = T::api_for(client.clone(), namespace.as_deref());
    let model_key = instance.model_key();

    #[cfg(feature = "metrics")]
    MODEL_RECONCILE_COUNTER
        .with_label_values(&[T::KIND_LABEL, &name])
        .inc();

    let documents = list_node_state_documents(client.clone(), &context.operator_namespace).await?;

    let action = if instance.meta().deletion_timestamp.is_some() {
        if any_node_holds_model(&model_key, &documents) {
            ModelAction::DeleteBlocked
        } else {
            ModelAction::DeleteReady
        }
    } else if !instance.finalizers().iter().any(|f| f == T::FINALIZER) {
        ModelAction::AddFinalizer
    } else {
        ModelAction::Aggregate
    };

    #[cfg(feature = "metrics")]
    MODEL_ACTION_COUNTER
        .with_label_values(&[T::KIND_LABEL, &name, &format!("{:?}", action)])
        .inc();

    let result = match action {
        ModelAction::AddFinalizer => {
            let updated = retry::on_conflict(|| finalizer::add_via(&api, &name, T::FINALIZER)).await?;
            retry::on_conflict(|| {
                patch_status_via(&api, &updated, |status: &mut ModelStatus| {
                    if status.state.is_none() {
                        status.state = Some(ModelLifecycleState::Importing);
                    }
                })
            })
            .await?;
            Action::requeue(Duration::ZERO)
        }
        ModelAction::DeleteBlocked => Action::requeue(MODEL_DELETE_PROBE_INTERVAL),
        ModelAction::DeleteReady => {
            retry::on_conflict(|| finalizer::delete_via(&api, &name)).await?;
            Action::await_change()
        }
        ModelAction::Aggregate => {
            let existing_nodes = list_existing_nodes(client.clone()).await?;
            let result = aggregate(&model_key, &documents, &existing_nodes);
            let state = lifecycle_state(&result);

            if let Some(spec_patch) = result.spec_patch.clone() {
                retry::on_conflict(|| patch_spec_via(&api, &name, spec_patch.clone())).await?;
            }

            retry::on_conflict(|| {
                patch_status_via(&api, &instance, |status: &mut ModelStatus| {
                    status.state = Some(state);
                    status.nodes_ready = result.nodes_ready.clone();
                    status.nodes_failed = result.nodes_failed.clone();
                })
            })
            .await?;

            match state {
                ModelLifecycleState::Importing | ModelLifecycleState::InTransit => {
                    Action::requeue(MODEL_PROBE_INTERVAL)
                }
                _ => Action::requeue(PROBE_INTERVAL),
            }
        }
    };
    Ok(result)
}

fn on_error<T: ModelLike>(instance: Arc<T>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!(
        "Reconciliation error ({}):\n{:?}.\n{:?}",
        T::KIND_LABEL,
        error,
        instance.name_any()
    );
    Action::requeue(Duration::from_secs(5))
}
