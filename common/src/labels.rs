//! Label keys applied to every object this operator creates, under the
//! `operator.kubeadm.x-k8s.io` prefix. These are what Group/Agent
//! reconcilers use as the `selector` they watch, not free-form metadata.

/// Name of the owning `Operation`, set on every `RuntimeTaskGroup` and
/// `RuntimeTask` it produces (transitively, for Tasks).
pub const OPERATION: &str = "operator.kubeadm.x-k8s.io/operation";

/// The `Operation`'s minted UUID, stable across retries even if the
/// `Operation` object is recreated under the same name.
pub const UID: &str = "operator.kubeadm.x-k8s.io/uid";

/// Name of the owning `RuntimeTaskGroup`, set on every `RuntimeTask` it
/// produces.
pub const TASKGROUP: &str = "operator.kubeadm.x-k8s.io/taskgroup";

/// Lexicographically sortable creation-order key assigned by the Plan
/// Builder, shared by a `RuntimeTaskGroup` and all `RuntimeTask`s within it.
pub const ORDER: &str = "operator.kubeadm.x-k8s.io/order";
