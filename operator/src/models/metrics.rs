use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

use crate::util::metrics::prefix;

lazy_static! {
    pub static ref MODEL_RECONCILE_COUNTER: CounterVec = register_counter_vec!(
        format!("{}_model_reconcile_counter", prefix()),
        "Number of reconciliations by the BaseModel/ClusterBaseModel controllers.",
        &["kind", "name"]
    )
    .unwrap();
    pub static ref MODEL_ACTION_COUNTER: CounterVec = register_counter_vec!(
        format!("{}_model_action_counter", prefix()),
        "Number of actions taken by the BaseModel/ClusterBaseModel controllers.",
        &["kind", "name", "action"]
    )
    .unwrap();
}
