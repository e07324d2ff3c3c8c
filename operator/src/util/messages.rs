/// User-friendly message to display in `status` whenever a resource is
/// first seen by the controller, before any lifecycle state is assigned.
pub const PENDING: &str = "Resource first appeared to the controller.";

/// User-friendly message to display in `status.message` whenever a resource's
/// deletion is pending dependent cleanup.
pub const TERMINATING: &str = "Resource deletion is pending dependent cleanup.";

/// `ResourcesSufficient=False` message template for a `ClusterCapacityReservation`
/// rejected by admission (spec.md §4.2, §7 "ResourcesInsufficient").
pub const RESOURCES_INSUFFICIENT: &str = "Requested resources exceed available cluster capacity.";

/// `Ready=False` message for a reservation whose child queue remained
/// inactive past the creation-failed-time threshold (spec.md §4.2).
pub const QUEUE_INACTIVE_BEYOND_THRESHOLD: &str =
    "Child queue remains inactive beyond the configured threshold.";

/// Message attached to the terminal `InvalidSpec` model-status transition
/// when the referenced base model could not be found (spec.md §7).
pub const BASE_MODEL_NOT_FOUND: &str = "Referenced BaseModel/ClusterBaseModel does not exist.";

/// Message attached to the terminal `InvalidSpec` transition when the
/// referenced base model is disabled (spec.md §7).
pub const BASE_MODEL_DISABLED: &str = "Referenced BaseModel/ClusterBaseModel is disabled.";

/// Message for the `ServerlessModeRejected` terminal error (spec.md §8,
/// scenario 6: Knative CRD not installed while a component resolves to
/// Serverless).
pub const SERVERLESS_MODE_REJECTED: &str =
    "Deployment mode resolved to Serverless but the serverless workload kind is unavailable.";
