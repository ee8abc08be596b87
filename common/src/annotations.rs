//! Annotation keys applied to objects this operator creates.

/// Hex-encoded SHA-256 of the spec a child was created from. See
/// [`crate::hash_spec`] — informational, never read back for reconciliation.
pub const SPEC_HASH: &str = "operator.kubeadm.x-k8s.io/spec-hash";
