use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single typed condition on a status block, following the same
/// type/status/reason/message/lastTransitionTime shape used throughout the
/// container orchestrator's own built-in resources.
///
/// [`Condition`] is rewritten only when `status`, `reason`, or `message`
/// actually change (I4): see `ome_operator::util::condition::set_condition`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Well-known condition type names shared by more than one resource kind.
pub mod condition_type {
    pub const READY: &str = "Ready";
    pub const RESOURCES_SUFFICIENT: &str = "ResourcesSufficient";
    pub const ROUTES_READY: &str = "RoutesReady";
    pub const LATEST_DEPLOYMENT_READY: &str = "LatestDeploymentReady";
}
