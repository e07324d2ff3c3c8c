use crate::condition::Condition;
use crate::flavor::FlavorUsage;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// [`ClusterCapacityReservationSpec`] describes a cluster-scoped request for a
/// bundle of resource quotas, organized by [`FlavorQuotaGroup`]. The
/// controller admission-controls this request against available cluster
/// capacity minus what is already committed to other reservations (spec.md
/// §4.2) and, on success, renders it as a child queue object.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ome.io",
    version = "v1",
    kind = "ClusterCapacityReservation",
    plural = "clustercapacityreservations",
    derive = "PartialEq",
    status = "ClusterCapacityReservationStatus"
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.capacityReservationLifecycleState\", \"name\": \"STATE\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.lifecycleDetail\", \"name\": \"DETAIL\", \"type\": \"string\" }")]
pub struct ClusterCapacityReservationSpec {
    /// Bundles of covered resource kinds and their per-flavor nominal quotas.
    #[serde(rename = "resourceGroups", default)]
    pub resource_groups: Vec<ResourceGroup>,

    /// Logical group of reservations that can share capacity via preemption.
    #[serde(default)]
    pub cohort: Option<String>,

    /// Preemption policy applied when this reservation's flavors are
    /// oversubscribed by its cohort.
    #[serde(rename = "preemptionRule", default)]
    pub preemption_rule: Option<String>,
}

/// A bundle of covered resource kinds and their per-flavor nominal quotas
/// inside a [`ClusterCapacityReservationSpec`] (GLOSSARY: "Resource group").
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ResourceGroup {
    #[serde(rename = "coveredResources", default)]
    pub covered_resources: Vec<String>,
    #[serde(default)]
    pub flavors: Vec<ResourceFlavor>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ResourceFlavor {
    pub name: String,
    #[serde(default)]
    pub resources: Vec<FlavorResourceQuota>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct FlavorResourceQuota {
    pub name: String,
    #[serde(rename = "nominalQuota")]
    pub nominal_quota: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ClusterCapacityReservationStatus {
    #[serde(rename = "capacityReservationLifecycleState")]
    pub state: Option<CapacityReservationLifecycleState>,

    #[serde(rename = "lifecycleDetail")]
    pub lifecycle_detail: Option<String>,

    #[serde(default)]
    pub capacity: Vec<FlavorUsage>,

    #[serde(default)]
    pub allocatable: Vec<FlavorUsage>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Name of the child queue object owned by this reservation, once
    /// created (used to re-fetch its status on subsequent reconciles).
    #[serde(rename = "queueName", default)]
    pub queue_name: Option<String>,

    /// Timestamp (RFC3339) the child queue was created, used for the
    /// creation-failed-time threshold check (spec.md §4.2).
    #[serde(rename = "queueCreatedAt", default)]
    pub queue_created_at: Option<String>,

    #[serde(rename = "lastUpdated", default)]
    pub last_updated: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum CapacityReservationLifecycleState {
    Creating,
    Updating,
    Active,
    Failed,
    Deleting,
}

impl FromStr for CapacityReservationLifecycleState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Creating" => Ok(Self::Creating),
            "Updating" => Ok(Self::Updating),
            "Active" => Ok(Self::Active),
            "Failed" => Ok(Self::Failed),
            "Deleting" => Ok(Self::Deleting),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CapacityReservationLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "Creating"),
            Self::Updating => write!(f, "Updating"),
            Self::Active => write!(f, "Active"),
            Self::Failed => write!(f, "Failed"),
            Self::Deleting => write!(f, "Deleting"),
        }
    }
}

/// Minimal mirror of the external workload-queue CRD's status (spec.md §1
/// "out of scope... the workload-queue CRD implementation"; only the fields
/// the admission algorithm reads are modeled here).
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ome.io",
    version = "v1",
    kind = "ClusterQueue",
    plural = "clusterqueues",
    derive = "PartialEq",
    status = "ClusterQueueStatus"
)]
#[kube(derive = "Default")]
pub struct ClusterQueueSpec {
    #[serde(rename = "resourceGroups", default)]
    pub resource_groups: Vec<ResourceGroup>,
    #[serde(default)]
    pub cohort: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ClusterQueueStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ClusterQueueStatus {
    /// `Active` iff the queue's own `Ready` condition (or absence of any
    /// terminal condition) reports healthy; `Inactive` iff `Ready=False`.
    pub fn phase(&self) -> QueuePhase {
        match self
            .conditions
            .iter()
            .find(|c| c.type_ == crate::condition::condition_type::READY)
        {
            Some(c) if c.status == crate::condition::ConditionStatus::True => QueuePhase::Active,
            Some(c) if c.status == crate::condition::ConditionStatus::False => QueuePhase::Inactive,
            _ => QueuePhase::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    Pending,
    Active,
    Inactive,
}
