use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{command::Command, taskgroup::RuntimeTaskGroupTemplate};

/// Which nodes within an already-filtered `nodeSelector` set a
/// [`RuntimeTaskGroupTemplate`] should actually target.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum NodeFilter {
    /// Every matching node.
    #[default]
    All,
    /// Only the first matching node in stable sort order (a single control-plane node).
    Head,
    /// Every matching node except the first (the remaining control-plane nodes).
    Tail,
}

/// How a Group Reconciler is allowed to create the [`crate::RuntimeTask`]
/// children it owns. Serial is the only strategy today; this stays an enum
/// rather than a bare bool because the Plan Builder already speaks of
/// "creation ordering" as a pluggable concept.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum CreateStrategy {
    #[default]
    Serial,
}

/// Governs how aggressively the Agent Reconciler advances its command cursor.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum ExecutionMode {
    /// Advance the cursor automatically as each command completes.
    #[default]
    Auto,
    /// Advance the cursor only when an operator annotates the Task to do so.
    Controlled,
    /// Run the Command Executor in dry-run mode: log the command, never shell out.
    DryRun,
}

/// What the Agent Reconciler does when a command in the cursor fails.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum RecoveryMode {
    /// Re-run the same command on the next reconcile instead of failing the Task.
    RetryFailedCommand,
    /// Advance past the failed command as though it had succeeded.
    SkipFailedCommand,
}

/// The body of a [`crate::RuntimeTask`] before an owning Group attaches
/// labels and a node name to it.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct RuntimeTaskTemplate {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    pub commands: Vec<Command>,
}

/// The tagged union selecting what an [`crate::Operation`] does. Exactly one
/// variant is ever constructed — the spec's "at most one populated" rule is
/// therefore structural rather than something the Plan Builder has to check.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(tag = "type")]
pub enum Operator {
    #[serde(rename = "upgrade")]
    Upgrade {
        #[serde(rename = "kubernetesVersion")]
        kubernetes_version: String,
    },

    #[serde(rename = "renewCertificates")]
    RenewCertificates {},

    #[serde(rename = "custom")]
    Custom { workflow: Vec<RuntimeTaskGroupTemplate> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_operator_round_trips() {
        let op = Operator::Upgrade {
            kubernetes_version: "v1.31.2".into(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "upgrade", "kubernetesVersion": "v1.31.2"})
        );
        assert_eq!(serde_json::from_value::<Operator>(json).unwrap(), op);
    }

    #[test]
    fn renew_certificates_carries_no_fields() {
        let json = serde_json::json!({"type": "renewCertificates"});
        assert_eq!(
            serde_json::from_value::<Operator>(json).unwrap(),
            Operator::RenewCertificates {}
        );
    }

    #[test]
    fn custom_workflow_nests_group_templates() {
        let json = serde_json::json!({
            "type": "custom",
            "workflow": [{
                "name": "smoke-test",
                "nodeFilter": "Head",
                "template": {"commands": [{"type": "pass"}]},
            }],
        });
        let op: Operator = serde_json::from_value(json).unwrap();
        match op {
            Operator::Custom { workflow } => {
                assert_eq!(workflow.len(), 1);
                assert_eq!(workflow[0].name, "smoke-test");
                assert_eq!(workflow[0].spec.node_filter, NodeFilter::Head);
            }
            _ => panic!("expected Custom"),
        }
    }
}
