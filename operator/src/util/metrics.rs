use prometheus::{HistogramVec, IntCounterVec, Opts, Registry, register_histogram_vec_with_registry, register_int_counter_vec_with_registry};

/// Per-controller reconcile/action counters and read/write latency
/// histograms, registered under a distinct `Registry` per object kind
/// (`operation`, `taskgroup`, `task`) so `/metrics` output stays readable.
/// `Clone` is cheap — every field is an `Arc`-backed handle into the same
/// registered instruments, which lets one instance be built at process
/// startup and handed to a reconciler loop that may be spawned more than
/// once across leader-election transitions.
#[derive(Clone)]
pub struct ControllerMetrics {
    pub registry: Registry,
    pub reconcile_counter: IntCounterVec,
    pub action_counter: IntCounterVec,
    pub read_histogram: HistogramVec,
    pub write_histogram: HistogramVec,
}

impl ControllerMetrics {
    pub fn new(kind: &str) -> Self {
        let registry = Registry::new_custom(Some(format!("kubeadm_operator_{kind}")), None)
            .expect("valid metrics namespace");

        let reconcile_counter = register_int_counter_vec_with_registry!(
            Opts::new("reconcile_total", "Total number of reconciles observed"),
            &["name", "namespace"],
            registry
        )
        .expect("register reconcile_total");

        let action_counter = register_int_counter_vec_with_registry!(
            Opts::new("action_total", "Total number of actions taken per kind"),
            &["name", "namespace", "action"],
            registry
        )
        .expect("register action_total");

        let read_histogram = register_histogram_vec_with_registry!(
            "read_duration_seconds",
            "Time spent determining the next action",
            &["name", "namespace", "action"],
            registry
        )
        .expect("register read_duration_seconds");

        let write_histogram = register_histogram_vec_with_registry!(
            "write_duration_seconds",
            "Time spent applying the next action",
            &["name", "namespace", "action"],
            registry
        )
        .expect("register write_duration_seconds");

        ControllerMetrics {
            registry,
            reconcile_counter,
            action_counter,
            read_histogram,
            write_histogram,
        }
    }
}
