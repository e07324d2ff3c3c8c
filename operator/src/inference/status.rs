use k8s_openapi::api::core::v1::{ContainerState, Pod};
use ome_types::{
    Condition, ConditionStatus, ComponentStatus, FailureInfo, FailureReason, KnativeServiceStatus,
    ModelCopies, ModelStatusBlock, RayDeploymentStatus, TrafficTarget, TransitionStatus,
};

/// Result of folding one component's underlying child object state into
/// the service's per-component status (spec.md §4.7 "Four fold variants").
#[derive(Debug, Clone, PartialEq)]
pub struct FoldedComponent {
    pub status: ComponentStatus,
    pub ready: ConditionStatus,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Plain workload fold: "revision annotation -> latestCreatedRevision;
/// Available=True -> URL attached and component-ready condition True."
pub fn fold_plain_workload(
    revision_annotation: Option<&str>,
    available: Option<&Condition>,
    url: Option<String>,
) -> FoldedComponent {
    let ready = available.map(|c| c.status).unwrap_or(ConditionStatus::Unknown);
    FoldedComponent {
        status: ComponentStatus {
            latest_created_revision: revision_annotation.map(str::to_owned),
            url: if ready == ConditionStatus::True { url } else { None },
            ..Default::default()
        },
        ready,
        reason: available.and_then(|c| c.reason.clone()),
        message: available.and_then(|c| c.message.clone()),
    }
}

/// Leader-worker workload fold: "resource-version -> latestCreatedRevision;
/// Available=True -> URL attached; translate workload condition to
/// component-ready condition preserving the reason/message/time."
pub fn fold_leader_worker_workload(
    resource_version: Option<&str>,
    available: Option<&Condition>,
    url: Option<String>,
) -> FoldedComponent {
    let ready = available.map(|c| c.status).unwrap_or(ConditionStatus::Unknown);
    FoldedComponent {
        status: ComponentStatus {
            latest_created_revision: resource_version.map(str::to_owned),
            url: if ready == ConditionStatus::True { url } else { None },
            ..Default::default()
        },
        ready,
        reason: available.and_then(|c| c.reason.clone()),
        message: available.and_then(|c| c.message.clone()),
    }
}

/// Multi-deployment (Ray) fold: "first deployment's revision + conjunction
/// of every deployment's Available condition."
pub fn fold_multi_deployment(deployments: &[RayDeploymentStatus]) -> FoldedComponent {
    let latest_created_revision = deployments.first().and_then(|d| d.revision.clone());
    let available: Vec<ConditionStatus> = deployments
        .iter()
        .map(|d| {
            d.conditions
                .iter()
                .find(|c| c.type_ == ome_types::condition_type::READY)
                .map(|c| c.status)
                .unwrap_or(ConditionStatus::Unknown)
        })
        .collect();
    let ready = aggregate_conditions(&available);
    FoldedComponent {
        status: ComponentStatus {
            latest_created_revision,
            ..Default::default()
        },
        ready,
        reason: None,
        message: None,
    }
}

/// Knative service fold: "latestReady/latestCreated revision, URL, address,
/// traffic vector; also computes latestRolledoutRevision and
/// previousRolledoutRevision based on traffic fractions (rollback-aware)."
pub fn fold_knative(status: &KnativeServiceStatus, previous: &ComponentStatus) -> FoldedComponent {
    let ready_condition = status
        .conditions
        .iter()
        .find(|c| c.type_ == ome_types::condition_type::READY);
    let ready = ready_condition.map(|c| c.status).unwrap_or(ConditionStatus::Unknown);

    let (latest_rolledout, previous_rolledout) = rollout_revisions(&status.traffic, previous);

    FoldedComponent {
        status: ComponentStatus {
            url: status.url.clone(),
            address: status.address.clone(),
            latest_created_revision: status.latest_created_revision_name.clone(),
            latest_ready_revision: status.latest_ready_revision_name.clone(),
            latest_rolledout_revision: latest_rolledout,
            previous_rolledout_revision: previous_rolledout,
            traffic: status.traffic.clone(),
            ..Default::default()
        },
        ready,
        reason: ready_condition.and_then(|c| c.reason.clone()),
        message: ready_condition.and_then(|c| c.message.clone()),
    }
}

/// A revision carrying 100% of traffic becomes the new
/// `latestRolledoutRevision`; the previously-rolled-out revision (if it
/// differs) is retained as `previousRolledoutRevision` so a rollback can be
/// detected (spec.md §7 "Rollbacks from Failed are automatic").
fn rollout_revisions(traffic: &[TrafficTarget], previous: &ComponentStatus) -> (Option<String>, Option<String>) {
    let full = traffic.iter().find(|t| t.percent == 100).map(|t| t.revision_name.clone());
    match full {
        Some(revision) if Some(&revision) != previous.latest_rolledout_revision.as_ref() => {
            (Some(revision), previous.latest_rolledout_revision.clone())
        }
        Some(revision) => (Some(revision), previous.previous_rolledout_revision.clone()),
        None => (
            previous.latest_rolledout_revision.clone(),
            previous.previous_rolledout_revision.clone(),
        ),
    }
}

/// spec.md §4.7 "Cross-component folding... Status True iff all present
/// components' corresponding condition is True; Unknown if any present is
/// Unknown; False otherwise." Used for both `RoutesReady` (from
/// per-component RouteReady) and `LatestDeploymentReady` (from per-component
/// ConfigurationReady) (P7).
pub fn aggregate_conditions(states: &[ConditionStatus]) -> ConditionStatus {
    if states.is_empty() {
        ConditionStatus::Unknown
    } else if states.iter().all(|s| *s == ConditionStatus::True) {
        ConditionStatus::True
    } else if states.iter().any(|s| *s == ConditionStatus::Unknown) {
        ConditionStatus::Unknown
    } else {
        ConditionStatus::False
    }
}

/// spec.md §4.7 "Pod-derived model state." Examines the first pod's init
/// and main container states to derive the model-loading transition status.
/// `reason` on the resulting [`FailureInfo`] has no typed counterpart for a
/// generic container crash (spec.md §7's `FailureReason` taxonomy only
/// names InvalidSpec causes), so it carries the struct's own placeholder
/// default; `message`/`exit_code` carry the actual diagnostic.
pub fn derive_model_transition(pod: Option<&Pod>, ready_replicas: usize) -> ModelStatusBlock {
    let Some(pod) = pod else {
        return ModelStatusBlock {
            transition_status: Some(TransitionStatus::InProgress),
            ..Default::default()
        };
    };
    let status = match pod.status.as_ref() {
        Some(s) => s,
        None => {
            return ModelStatusBlock {
                transition_status: Some(TransitionStatus::InProgress),
                ..Default::default()
            }
        }
    };

    let init_statuses = status.init_container_statuses.as_deref().unwrap_or(&[]);
    let main_statuses = status.container_statuses.as_deref().unwrap_or(&[]);

    if let Some(failure) = init_statuses
        .iter()
        .find_map(container_failure)
        .or_else(|| main_statuses.iter().find_map(container_failure))
    {
        return ModelStatusBlock {
            transition_status: Some(TransitionStatus::BlockedByFailedLoad),
            failure_info: Some(failure),
            copies: None,
        };
    }

    let still_loading = init_statuses.iter().any(|c| matches!(&c.state, Some(ContainerState { running: Some(_), .. })));
    if still_loading {
        return ModelStatusBlock {
            transition_status: Some(TransitionStatus::InProgress),
            ..Default::default()
        };
    }

    ModelStatusBlock {
        transition_status: Some(TransitionStatus::UpToDate),
        failure_info: None,
        copies: Some(ModelCopies {
            total: ready_replicas,
            ready: ready_replicas,
        }),
    }
}

fn container_failure(c: &k8s_openapi::api::core::v1::ContainerStatus) -> Option<FailureInfo> {
    if let Some(ContainerState { terminated: Some(t), .. }) = &c.state {
        if t.exit_code != 0 {
            return Some(FailureInfo {
                reason: FailureReason::default(),
                message: t.message.clone().unwrap_or_else(|| "container terminated with a non-zero exit code".to_owned()),
                exit_code: Some(t.exit_code),
            });
        }
    }
    if c.restart_count > 0 {
        if let (Some(ContainerState { waiting: Some(w), .. }), Some(ContainerState { terminated: Some(last), .. })) =
            (&c.state, &c.last_state)
        {
            if w.reason.as_deref() == Some("CrashLoopBackOff") {
                return Some(FailureInfo {
                    reason: FailureReason::default(),
                    message: last.message.clone().unwrap_or_else(|| "container is crash-looping".to_owned()),
                    exit_code: Some(last.exit_code),
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_workload_attaches_url_only_when_available_true() {
        let cond = Condition {
            type_: "Available".to_owned(),
            status: ConditionStatus::True,
            reason: Some("Deployed".to_owned()),
            message: None,
            last_transition_time: None,
        };
        let folded = fold_plain_workload(Some("rev-1"), Some(&cond), Some("http://svc".to_owned()));
        assert_eq!(folded.ready, ConditionStatus::True);
        assert_eq!(folded.status.url.as_deref(), Some("http://svc"));
        assert_eq!(folded.status.latest_created_revision.as_deref(), Some("rev-1"));
    }

    #[test]
    fn plain_workload_withholds_url_when_not_available() {
        let cond = Condition {
            type_: "Available".to_owned(),
            status: ConditionStatus::False,
            reason: None,
            message: None,
            last_transition_time: None,
        };
        let folded = fold_plain_workload(None, Some(&cond), Some("http://svc".to_owned()));
        assert!(folded.status.url.is_none());
    }

    /// P7: RoutesReady aggregate is True iff every present component's
    /// condition is True.
    #[test]
    fn aggregate_conditions_true_iff_all_true() {
        assert_eq!(
            aggregate_conditions(&[ConditionStatus::True, ConditionStatus::True]),
            ConditionStatus::True
        );
        assert_eq!(
            aggregate_conditions(&[ConditionStatus::True, ConditionStatus::False]),
            ConditionStatus::False
        );
        assert_eq!(
            aggregate_conditions(&[ConditionStatus::True, ConditionStatus::Unknown]),
            ConditionStatus::Unknown
        );
        assert_eq!(aggregate_conditions(&[]), ConditionStatus::Unknown);
    }

    #[test]
    fn multi_deployment_conjunction_of_availability() {
        let deployments = vec![
            RayDeploymentStatus {
                revision: Some("rev-a".to_owned()),
                conditions: vec![Condition {
                    type_: ome_types::condition_type::READY.to_owned(),
                    status: ConditionStatus::True,
                    reason: None,
                    message: None,
                    last_transition_time: None,
                }],
            },
            RayDeploymentStatus {
                revision: Some("rev-b".to_owned()),
                conditions: vec![Condition {
                    type_: ome_types::condition_type::READY.to_owned(),
                    status: ConditionStatus::False,
                    reason: None,
                    message: None,
                    last_transition_time: None,
                }],
            },
        ];
        let folded = fold_multi_deployment(&deployments);
        assert_eq!(folded.ready, ConditionStatus::False);
        assert_eq!(folded.status.latest_created_revision.as_deref(), Some("rev-a"));
    }

    #[test]
    fn rollout_tracks_previous_revision_on_traffic_shift() {
        let previous = ComponentStatus {
            latest_rolledout_revision: Some("rev-1".to_owned()),
            ..Default::default()
        };
        let traffic = vec![TrafficTarget {
            revision_name: "rev-2".to_owned(),
            percent: 100,
            tag: None,
        }];
        let (latest, prev) = rollout_revisions(&traffic, &previous);
        assert_eq!(latest.as_deref(), Some("rev-2"));
        assert_eq!(prev.as_deref(), Some("rev-1"));
    }

    #[test]
    fn no_pod_means_in_progress() {
        let block = derive_model_transition(None, 0);
        assert_eq!(block.transition_status, Some(TransitionStatus::InProgress));
    }
}
