use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::GroupError,
    operator::{CreateStrategy, NodeFilter, RuntimeTaskTemplate},
    phase::Phase,
};

/// Middle tier: one `RuntimeTaskGroup` owns the `RuntimeTask` children
/// targeting the nodes it was given, and creates them in the order its
/// `createStrategy` dictates.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "operator.kubeadm.x-k8s.io",
    version = "v1alpha1",
    kind = "RuntimeTaskGroup",
    plural = "runtimetaskgroups",
    derive = "PartialEq",
    status = "RuntimeTaskGroupStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.labels.operator\\\\.kubeadm\\\\.x-k8s\\\\.io/order\", \"name\": \"ORDER\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
pub struct RuntimeTaskGroupSpec {
    #[serde(default, rename = "nodeSelector")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, rename = "nodeFilter")]
    pub node_filter: NodeFilter,

    /// Label selector matching the `RuntimeTask` children this Group owns.
    #[serde(default)]
    pub selector: BTreeMap<String, String>,

    pub template: RuntimeTaskTemplate,

    #[serde(default, rename = "createStrategy")]
    pub create_strategy: CreateStrategy,
}

/// A named [`RuntimeTaskGroupSpec`], either produced by the Plan Builder from
/// a built-in operator or supplied verbatim in a `custom` operator's workflow.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct RuntimeTaskGroupTemplate {
    pub name: String,

    #[serde(flatten)]
    pub spec: RuntimeTaskGroupSpec,
}

/// Status object for the [`RuntimeTaskGroup`] resource.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct RuntimeTaskGroupStatus {
    #[serde(rename = "startTime")]
    pub start_time: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,

    #[serde(rename = "completionTime")]
    pub completion_time: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,

    #[serde(default)]
    pub paused: bool,

    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub nodes: u32,

    #[serde(default, rename = "runningNodes")]
    pub running_nodes: u32,

    #[serde(default, rename = "succeededNodes")]
    pub succeeded_nodes: u32,

    #[serde(default, rename = "failedNodes")]
    pub failed_nodes: u32,

    #[serde(default, rename = "invalidNodes")]
    pub invalid_nodes: u32,

    pub error: Option<GroupError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_starts_pending() {
        assert_eq!(RuntimeTaskGroupStatus::default().phase, Phase::Pending);
    }
}
