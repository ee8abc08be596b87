use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{command::Command, error::TaskError, operator::RecoveryMode, phase::Phase};

/// Bottom tier: one `RuntimeTask` per node, advancing a single command
/// cursor one step per reconcile.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "operator.kubeadm.x-k8s.io",
    version = "v1alpha1",
    kind = "RuntimeTask",
    plural = "runtimetasks",
    derive = "PartialEq",
    status = "RuntimeTaskStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.nodeName\", \"name\": \"NODE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.commandProgress\", \"name\": \"CURRENT\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
pub struct RuntimeTaskSpec {
    #[serde(rename = "nodeName")]
    pub node_name: String,

    #[serde(default, rename = "recoveryMode")]
    pub recovery_mode: Option<RecoveryMode>,

    #[serde(default)]
    pub paused: bool,

    pub commands: Vec<Command>,
}

/// Status object for the [`RuntimeTask`] resource.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct RuntimeTaskStatus {
    #[serde(rename = "startTime")]
    pub start_time: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,

    #[serde(rename = "completionTime")]
    pub completion_time: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,

    #[serde(default)]
    pub paused: bool,

    #[serde(default)]
    pub phase: Phase,

    /// 1-based index into `spec.commands` of the command the cursor is
    /// currently on (or about to run). `0` means "not started yet".
    #[serde(default, rename = "currentCommand")]
    pub current_command: u32,

    /// `"{current}/{total}"`, derived — never set directly, see
    /// `kubeadm_operator::phase::command_progress`.
    #[serde(default, rename = "commandProgress")]
    pub command_progress: Option<String>,

    pub error: Option<TaskError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_task_status_has_not_started_cursor() {
        let status = RuntimeTaskStatus::default();
        assert_eq!(status.current_command, 0);
        assert!(status.command_progress.is_none());
    }

    #[test]
    fn recovery_mode_defaults_to_none() {
        let spec = RuntimeTaskSpec {
            node_name: "node-1".into(),
            recovery_mode: None,
            paused: false,
            commands: vec![],
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert!(json.get("recoveryMode").is_none() || json["recoveryMode"].is_null());
    }
}
