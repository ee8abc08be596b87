use std::time::Duration;

#[cfg(feature = "metrics")]
pub mod metrics;
pub mod patch;

pub(crate) mod colors;

mod error;

pub use error::*;

/// The metrics bundle handed to a reconciler's context. A real
/// `ControllerMetrics` when the `metrics` feature is on, a zero-sized
/// stand-in otherwise, so `ContextData` doesn't need its own `metrics`
/// field to be conditionally compiled.
#[cfg(feature = "metrics")]
pub use metrics::ControllerMetrics as Metrics;

#[cfg(not(feature = "metrics"))]
#[derive(Clone)]
pub struct Metrics;

/// Builds the metrics bundle for a reconciler named `kind`
/// (`operation`/`taskgroup`/`task`), or the zero-sized stand-in when the
/// `metrics` feature is compiled out.
pub fn new_metrics(_kind: &str) -> Metrics {
    #[cfg(feature = "metrics")]
    {
        Metrics::new(_kind)
    }
    #[cfg(not(feature = "metrics"))]
    {
        Metrics
    }
}

/// The default interval for requeuing a managed resource that has nothing
/// left to do but wait for its children.
pub(crate) const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Name of the field manager used for all server-side-apply status patches.
pub(crate) const MANAGER_NAME: &str = "kubeadm-operator";
