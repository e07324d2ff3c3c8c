use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

use crate::util::metrics::prefix;

lazy_static! {
    pub static ref INFERENCE_RECONCILE_COUNTER: CounterVec = register_counter_vec!(
        format!("{}_inference_service_reconcile_counter", prefix()),
        "Number of reconciliations by the InferenceService controller.",
        &["name"]
    )
    .unwrap();
    pub static ref INFERENCE_ACTION_COUNTER: CounterVec = register_counter_vec!(
        format!("{}_inference_service_action_counter", prefix()),
        "Number of actions taken by the InferenceService controller.",
        &["name", "action"]
    )
    .unwrap();
    pub static ref INFERENCE_COMPONENT_DISPATCH_COUNTER: CounterVec = register_counter_vec!(
        format!("{}_inference_service_component_dispatch_counter", prefix()),
        "Number of per-component dispatches by deployment mode.",
        &["name", "component", "mode"]
    )
    .unwrap();
}
