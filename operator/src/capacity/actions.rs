use k8s_openapi::api::core::v1::Node;
use kube::{api::ListParams, Api, Client, ResourceExt};
use ome_types::{
    Amount, ClusterCapacityReservation, ClusterQueue, ClusterQueueSpec, ClusterQueueStatus,
    FlavorQuota, FlavorUsage, QueuePhase,
};

use crate::util::Error;

/// Label on a `Node` naming the capacity flavor it belongs to (spec.md
/// GLOSSARY "Flavor"). Nodes without the label do not contribute capacity
/// to any flavor.
const FLAVOR_LABEL: &str = "ome.io/flavor";

/// Sums allocatable capacity across all nodes, grouped by [`FLAVOR_LABEL`]
/// (the cluster-available capacity `A` in spec.md §4.2). This is the
/// operator's own view of available capacity; the child queue object is the
/// external system of record for what has actually been committed.
pub async fn cluster_available_capacity(client: Client) -> Result<FlavorQuota, Error> {
    let api: Api<Node> = Api::all(client);
    let nodes = api.list(&ListParams::default()).await?;
    let mut out = FlavorQuota::new();
    for node in nodes.items {
        let flavor = match node.labels().get(FLAVOR_LABEL) {
            Some(f) => f,
            None => continue,
        };
        let allocatable = match node.status.as_ref().and_then(|s| s.allocatable.as_ref()) {
            Some(a) => a,
            None => continue,
        };
        for (resource, quantity) in allocatable {
            let amount = Amount::parse(&quantity.0)?;
            let existing = out.get(flavor, resource).unwrap_or(Amount::ZERO);
            out.set(flavor, resource, existing + amount);
        }
    }
    Ok(out)
}

/// Sums `status.allocatable` across every `ClusterCapacityReservation`
/// except `exclude_uid` (the reservation currently being reconciled), giving
/// `R` in spec.md §4.2.
pub async fn allocated_across_reservations(
    client: Client,
    exclude_uid: Option<&str>,
) -> Result<FlavorQuota, Error> {
    let api: Api<ClusterCapacityReservation> = Api::all(client);
    let reservations = api.list(&ListParams::default()).await?;
    let mut out = FlavorQuota::new();
    for reservation in reservations.items {
        if exclude_uid.is_some() && reservation.uid().as_deref() == exclude_uid {
            continue;
        }
        let allocatable = match reservation.status.as_ref() {
            Some(s) => &s.allocatable,
            None => continue,
        };
        let quota = FlavorUsage::list_to_quota(allocatable)?;
        for (flavor, resources) in quota.0 {
            for (resource, qty) in resources {
                let existing = out.get(&flavor, &resource).unwrap_or(Amount::ZERO);
                out.set(&flavor, &resource, existing + qty);
            }
        }
    }
    Ok(out)
}

/// Name of the child `ClusterQueue` owned by a reservation. Matches the
/// reservation's own name so `checkExist` is a direct `get` (spec.md §4.2
/// "Post-admission").
pub fn queue_name(reservation: &ClusterCapacityReservation) -> String {
    reservation.name_any()
}

/// `checkExist -> create | update` for the child `ClusterQueue` (spec.md
/// §4.2 "Post-admission"). Returns the queue as observed after the write.
pub async fn reconcile_queue(
    client: Client,
    reservation: &ClusterCapacityReservation,
    desired: &FlavorQuota,
) -> Result<ClusterQueue, Error> {
    let api: Api<ClusterQueue> = Api::all(client);
    let name = queue_name(reservation);
    let desired_spec = ClusterQueueSpec {
        resource_groups: reservation.spec.resource_groups.clone(),
        cohort: reservation.spec.cohort.clone(),
    };

    match api.get(&name).await {
        Ok(mut existing) => {
            if existing.spec != desired_spec {
                existing.spec = desired_spec;
                Ok(api
                    .replace(&name, &Default::default(), &existing)
                    .await?)
            } else {
                Ok(existing)
            }
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            let _ = desired; // desired already folded into desired_spec above
            let mut queue = ClusterQueue::new(&name, desired_spec);
            queue.metadata.owner_references = Some(vec![owner_ref(reservation)]);
            Ok(api.create(&Default::default(), &queue).await?)
        }
        Err(e) => Err(e.into()),
    }
}

fn owner_ref(reservation: &ClusterCapacityReservation) -> k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
    k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
        api_version: "ome.io/v1".to_owned(),
        kind: "ClusterCapacityReservation".to_owned(),
        name: reservation.name_any(),
        uid: reservation.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Derived disposition of a reservation once admission has succeeded and
/// the child queue has been reconciled (spec.md §4.2 "Post-admission").
#[derive(Debug, Clone, PartialEq)]
pub enum QueueDisposition {
    Active,
    Updating,
    Creating,
    Failed { detail: String },
}

/// Maps the child queue's phase (plus the reservation's own recorded state)
/// to the reservation's next lifecycle state (spec.md §4.2).
pub fn determine_queue_disposition(
    queue_status: &ClusterQueueStatus,
    capacity_already_set: bool,
    queue_age: Option<chrono::Duration>,
    threshold: chrono::Duration,
) -> QueueDisposition {
    match queue_status.phase() {
        QueuePhase::Active => QueueDisposition::Active,
        QueuePhase::Inactive => {
            let message = queue_status
                .conditions
                .iter()
                .find(|c| c.type_ == ome_types::condition_type::READY)
                .and_then(|c| c.message.clone())
                .unwrap_or_else(|| "child queue reported Inactive".to_owned());
            QueueDisposition::Failed { detail: message }
        }
        QueuePhase::Pending if capacity_already_set => QueueDisposition::Updating,
        QueuePhase::Pending => match queue_age {
            Some(age) if age > threshold => QueueDisposition::Failed {
                detail: crate::util::messages::QUEUE_INACTIVE_BEYOND_THRESHOLD.to_owned(),
            },
            _ => QueueDisposition::Creating,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ome_types::Condition;
    use ome_types::ConditionStatus;

    fn status_with_ready(status: ConditionStatus) -> ClusterQueueStatus {
        ClusterQueueStatus {
            conditions: vec![Condition {
                type_: ome_types::condition_type::READY.to_owned(),
                status,
                reason: None,
                message: Some("test".to_owned()),
                last_transition_time: None,
            }],
        }
    }

    #[test]
    fn active_queue_yields_active_disposition() {
        let status = status_with_ready(ConditionStatus::True);
        assert_eq!(
            determine_queue_disposition(&status, true, None, chrono::Duration::seconds(60)),
            QueueDisposition::Active
        );
    }

    #[test]
    fn inactive_queue_yields_failed() {
        let status = status_with_ready(ConditionStatus::False);
        assert!(matches!(
            determine_queue_disposition(&status, true, None, chrono::Duration::seconds(60)),
            QueueDisposition::Failed { .. }
        ));
    }

    #[test]
    fn pending_queue_past_threshold_fails() {
        let status = ClusterQueueStatus { conditions: vec![] };
        assert!(matches!(
            determine_queue_disposition(
                &status,
                false,
                Some(chrono::Duration::seconds(120)),
                chrono::Duration::seconds(60)
            ),
            QueueDisposition::Failed { .. }
        ));
    }

    #[test]
    fn pending_queue_within_threshold_is_creating() {
        let status = ClusterQueueStatus { conditions: vec![] };
        assert_eq!(
            determine_queue_disposition(
                &status,
                false,
                Some(chrono::Duration::seconds(10)),
                chrono::Duration::seconds(60)
            ),
            QueueDisposition::Creating
        );
    }

    #[test]
    fn pending_queue_with_capacity_already_set_is_updating() {
        let status = ClusterQueueStatus { conditions: vec![] };
        assert_eq!(
            determine_queue_disposition(&status, true, None, chrono::Duration::seconds(60)),
            QueueDisposition::Updating
        );
    }
}
