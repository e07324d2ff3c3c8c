use futures::stream::StreamExt;
use kube::{
    api::ListParams, client::Client, runtime::controller::Action, runtime::Controller, Api,
    Resource, ResourceExt,
};
use ome_types::{
    CapacityReservationLifecycleState as LifecycleState, ClusterCapacityReservation,
    ClusterQueue, FlavorQuota, FlavorUsage,
};
use std::sync::Arc;
use tokio::time::Duration;

#[cfg(feature = "metrics")]
use super::metrics::{CAPACITY_ACTION_COUNTER, CAPACITY_RECONCILE_COUNTER};

use super::actions::{self, QueueDisposition};
use super::admission::{self, AdmissionResult};
use crate::util::{
    condition::set_condition, finalizer, messages, patch::patch_status_cluster, retry, Error,
    PROBE_INTERVAL,
};
use ome_types::condition_type;

/// Entrypoint for the `ClusterCapacityReservation` controller.
///
/// `queue_inactive_threshold_seconds` comes from `util::config::Config`'s
/// `clusterQueue.creationFailedTimeThresholdSecond` (spec.md §4.2, "not-yet-
/// settled and Capacity unset and now - queueCreateTime > threshold").
pub async fn run(client: Client, queue_inactive_threshold_seconds: u64) -> Result<(), Error> {
    println!("Starting ClusterCapacityReservation controller...");
    let crd_api: Api<ClusterCapacityReservation> = Api::all(client.clone());
    let context: Arc<ContextData> =
        Arc::new(ContextData::new(client.clone(), queue_inactive_threshold_seconds));

    Controller::new(crd_api, ListParams::default())
        .owns(Api::<ClusterQueue>::all(client), ListParams::default())
        .run(reconcile, on_error, context)
        .for_each(|_res| async move {})
        .await;
    Ok(())
}

struct ContextData {
    client: Client,
    queue_inactive_threshold_seconds: u64,
}

impl ContextData {
    fn new(client: Client, queue_inactive_threshold_seconds: u64) -> Self {
        ContextData {
            client,
            queue_inactive_threshold_seconds,
        }
    }
}

#[derive(Debug, PartialEq)]
enum ReservationAction {
    AddFinalizer,
    Delete,
    Insufficient,
    Reconcile,
    NoOp,
}

async fn reconcile(
    instance: Arc<ClusterCapacityReservation>,
    context: Arc<ContextData>,
) -> Result<Action, Error> {
    let client = context.client.clone();
    let name = instance.name_any();

    #[cfg(feature = "metrics")]
    CAPACITY_RECONCILE_COUNTER.with_label_values(&[&name]).inc();

    let action = determine_action(client.clone(), &instance).await?;
    if action != ReservationAction::NoOp {
        println!("{} ACTION: {:?}", name, action);
    }

    #[cfg(feature = "metrics")]
    CAPACITY_ACTION_COUNTER
        .with_label_values(&[&name, &format!("{:?}", action)])
        .inc();

    let result = match action {
        ReservationAction::AddFinalizer => {
            retry::on_conflict(|| {
                finalizer::add_cluster::<ClusterCapacityReservation>(
                    client.clone(),
                    &name,
                    finalizer::CLUSTER_CAPACITY_RESERVATION_FINALIZER,
                )
            })
            .await?;
            Action::requeue(Duration::ZERO)
        }
        ReservationAction::Delete => {
            // ClusterQueue is owned; GC handles its removal. The reservation
            // itself has no node-held dependents to drain (I3 applies to
            // models, not reservations).
            retry::on_conflict(|| {
                finalizer::delete_cluster::<ClusterCapacityReservation>(client.clone(), &name)
            })
            .await?;
            Action::await_change()
        }
        ReservationAction::Insufficient => {
            mark_insufficient(client, &instance).await?;
            Action::await_change()
        }
        ReservationAction::Reconcile => {
            reconcile_sufficient(client, &instance, context.queue_inactive_threshold_seconds).await?;
            Action::requeue(PROBE_INTERVAL)
        }
        ReservationAction::NoOp => Action::requeue(PROBE_INTERVAL),
    };
    Ok(result)
}

fn desired_quota(instance: &ClusterCapacityReservation) -> Result<FlavorQuota, Error> {
    let mut out = FlavorQuota::new();
    for group in &instance.spec.resource_groups {
        for flavor in &group.flavors {
            for resource in &flavor.resources {
                let amount = ome_types::Amount::parse(&resource.nominal_quota)?;
                out.set(&flavor.name, &resource.name, amount);
            }
        }
    }
    Ok(out)
}

async fn determine_action(
    client: Client,
    instance: &ClusterCapacityReservation,
) -> Result<ReservationAction, Error> {
    if instance.meta().deletion_timestamp.is_some() {
        return Ok(ReservationAction::Delete);
    }
    if !instance
        .finalizers()
        .iter()
        .any(|f| f == finalizer::CLUSTER_CAPACITY_RESERVATION_FINALIZER)
    {
        return Ok(ReservationAction::AddFinalizer);
    }

    let desired = desired_quota(instance)?;
    let current_capacity = FlavorUsage::list_to_quota(
        instance.status.as_ref().map(|s| s.capacity.as_slice()).unwrap_or_default(),
    )?;
    let available = actions::cluster_available_capacity(client.clone()).await?;
    let allocated =
        actions::allocated_across_reservations(client, instance.uid().as_deref()).await?;

    match admission::admit(&desired, &current_capacity, &available, &allocated) {
        AdmissionResult::Insufficient => Ok(ReservationAction::Insufficient),
        AdmissionResult::Sufficient => Ok(ReservationAction::Reconcile),
    }
}

async fn mark_insufficient(client: Client, instance: &ClusterCapacityReservation) -> Result<(), Error> {
    retry::on_conflict(|| {
        patch_status_cluster(client.clone(), instance, |status| {
            status.state = Some(LifecycleState::Failed);
            status.lifecycle_detail = Some(messages::RESOURCES_INSUFFICIENT.to_owned());
            set_condition(
                &mut status.conditions,
                condition_type::RESOURCES_SUFFICIENT,
                ome_types::ConditionStatus::False,
                Some("Insufficient".to_owned()),
                Some(messages::RESOURCES_INSUFFICIENT.to_owned()),
            );
            set_condition(
                &mut status.conditions,
                condition_type::READY,
                ome_types::ConditionStatus::False,
                Some("Insufficient".to_owned()),
                Some(messages::RESOURCES_INSUFFICIENT.to_owned()),
            );
        })
    })
    .await?;
    Ok(())
}

async fn reconcile_sufficient(
    client: Client,
    instance: &ClusterCapacityReservation,
    queue_inactive_threshold_seconds: u64,
) -> Result<(), Error> {
    let desired = desired_quota(instance)?;
    let queue = actions::reconcile_queue(client.clone(), instance, &desired).await?;
    let queue_status = queue.status.clone().unwrap_or_default();

    let capacity_already_set = instance
        .status
        .as_ref()
        .map(|s| !s.capacity.is_empty())
        .unwrap_or(false);
    let queue_age = queue
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|t| chrono::Utc::now() - t.0);
    let threshold = chrono::Duration::seconds(queue_inactive_threshold_seconds as i64);

    let disposition =
        actions::determine_queue_disposition(&queue_status, capacity_already_set, queue_age, threshold);

    retry::on_conflict(|| {
        patch_status_cluster(client.clone(), instance, |status| {
            status.queue_name = Some(queue.name_any());
            if status.queue_created_at.is_none() {
                status.queue_created_at = queue
                    .metadata
                    .creation_timestamp
                    .as_ref()
                    .map(|t| t.0.to_rfc3339());
            }
            match &disposition {
                QueueDisposition::Active => {
                    status.state = Some(LifecycleState::Active);
                    status.lifecycle_detail = None;
                    status.capacity = desired.to_flavor_usage();
                    status.allocatable = desired.to_flavor_usage();
                }
                QueueDisposition::Updating => {
                    status.state = Some(LifecycleState::Updating);
                }
                QueueDisposition::Creating => {
                    status.state = Some(LifecycleState::Creating);
                }
                QueueDisposition::Failed { detail } => {
                    status.state = Some(LifecycleState::Failed);
                    status.lifecycle_detail = Some(detail.clone());
                }
            }
            let (ready_status, reason) = match &disposition {
                QueueDisposition::Active => (ome_types::ConditionStatus::True, "Active"),
                QueueDisposition::Failed { .. } => (ome_types::ConditionStatus::False, "Failed"),
                _ => (ome_types::ConditionStatus::Unknown, "Settling"),
            };
            set_condition(
                &mut status.conditions,
                condition_type::RESOURCES_SUFFICIENT,
                ome_types::ConditionStatus::True,
                Some("Sufficient".to_owned()),
                None,
            );
            set_condition(
                &mut status.conditions,
                condition_type::READY,
                ready_status,
                Some(reason.to_owned()),
                None,
            );
        })
    })
    .await?;
    Ok(())
}

fn on_error(instance: Arc<ClusterCapacityReservation>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!("Reconciliation error:\n{:?}.\n{:?}", error, instance.name_any());
    Action::requeue(Duration::from_secs(5))
}
