mod actions;
mod admission;
mod reconcile;

#[cfg(feature = "metrics")]
mod metrics;

pub use reconcile::run;
