mod actions;
mod aggregator;
mod reconcile;

#[cfg(feature = "metrics")]
mod metrics;

pub use reconcile::{run_cluster, run_namespaced};
