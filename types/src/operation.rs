use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::OperationError,
    operator::{ExecutionMode, Operator},
    phase::Phase,
};

/// Top of the three-tier hierarchy: one `Operation` describes a single
/// cluster-wide intent (an upgrade, a certificate renewal, a custom
/// workflow) and fans out into `RuntimeTaskGroup`/`RuntimeTask` children.
#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "operator.kubeadm.x-k8s.io",
    version = "v1alpha1",
    kind = "Operation",
    plural = "operations",
    derive = "PartialEq",
    status = "OperationStatus",
    namespaced
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
pub struct OperationSpec {
    #[serde(default)]
    pub paused: bool,

    #[serde(default, rename = "executionMode")]
    pub execution_mode: ExecutionMode,

    pub operator: Operator,
}

/// Status object for the [`Operation`] resource.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct OperationStatus {
    #[serde(rename = "startTime")]
    pub start_time: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,

    #[serde(rename = "completionTime")]
    pub completion_time: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,

    #[serde(default)]
    pub paused: bool,

    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub groups: u32,

    #[serde(default, rename = "runningGroups")]
    pub running_groups: u32,

    #[serde(default, rename = "succeededGroups")]
    pub succeeded_groups: u32,

    #[serde(default, rename = "failedGroups")]
    pub failed_groups: u32,

    #[serde(default, rename = "invalidGroups")]
    pub invalid_groups: u32,

    pub error: Option<OperationError>,
}
