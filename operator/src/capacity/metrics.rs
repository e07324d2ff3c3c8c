use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

use crate::util::metrics::prefix;

lazy_static! {
    pub static ref CAPACITY_RECONCILE_COUNTER: CounterVec = register_counter_vec!(
        format!("{}_capacity_reconcile_counter", prefix()),
        "Number of reconciliations by the ClusterCapacityReservation controller.",
        &["name"]
    )
    .unwrap();
    pub static ref CAPACITY_ACTION_COUNTER: CounterVec = register_counter_vec!(
        format!("{}_capacity_action_counter", prefix()),
        "Number of actions taken by the ClusterCapacityReservation controller.",
        &["name", "action"]
    )
    .unwrap();
}
