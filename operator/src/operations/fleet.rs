use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::{
    api::apps::v1::{DaemonSet, DaemonSetSpec},
    api::core::v1::{
        Container, EnvVar, EnvVarSource, HostPathVolumeSource, ObjectFieldSelector, PodSpec,
        PodTemplateSpec, Volume, VolumeMount,
    },
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use kube::{
    Api, Client, ResourceExt,
    api::{ObjectMeta, Resource},
};
use kubeadm_operator_common::labels;
use kubeadm_operator_types::{Operation, RuntimeTaskGroupTemplate};

use crate::util::Error;

/// Name of the `DaemonSet` this module creates/deletes — one per Operation,
/// so it doubles as the fleet's own name.
fn fleet_name(operation: &Operation) -> String {
    operation.name_any()
}

/// Union of every desired group's `nodeSelector`, flattened into one map an
/// `affinity`/`nodeSelector` field can match against. A node matching *any*
/// group is part of the fleet; the Group Reconciler still applies its own
/// `nodeFilter` when deciding which of those nodes get a `RuntimeTask`.
fn fleet_node_selector(plan: &[RuntimeTaskGroupTemplate]) -> BTreeMap<String, String> {
    let mut keys = BTreeSet::new();
    for group in plan {
        keys.extend(group.spec.node_selector.keys().cloned());
    }
    // `nodeSelector` ANDs its entries, so a true union across groups with
    // different selector keys can't be expressed as one `nodeSelector` map.
    // With a single distinct key across the plan we can still match it
    // precisely; past that we fall back to no selector (every node) rather
    // than silently under-covering some group's nodes.
    if keys.len() <= 1 {
        let mut selector = BTreeMap::new();
        if let Some(key) = keys.into_iter().next() {
            selector.insert(key, "true".to_string());
        }
        selector
    } else {
        BTreeMap::new()
    }
}

fn fleet_daemonset(operation: &Operation, plan: &[RuntimeTaskGroupTemplate], image: &str) -> DaemonSet {
    let name = fleet_name(operation);
    let mut pod_labels = BTreeMap::new();
    pod_labels.insert(labels::OPERATION.to_string(), operation.name_any());
    pod_labels.insert("app".to_string(), name.clone());

    let node_selector = fleet_node_selector(plan);

    DaemonSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: operation.namespace(),
            owner_references: Some(vec![operation.controller_owner_ref(&()).unwrap()]),
            labels: Some(pod_labels.clone()),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(pod_labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    host_network: Some(true),
                    node_selector: if node_selector.is_empty() {
                        None
                    } else {
                        Some(node_selector)
                    },
                    containers: vec![Container {
                        name: "agent".to_string(),
                        image: Some(image.to_string()),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        args: Some(vec![
                            "agent".to_string(),
                            "--agent-node-name=$(AGENT_NODE_NAME)".to_string(),
                            format!("--agent-operation={name}"),
                        ]),
                        env: Some(vec![EnvVar {
                            name: "AGENT_NODE_NAME".to_string(),
                            value_from: Some(EnvVarSource {
                                field_ref: Some(ObjectFieldSelector {
                                    field_path: "spec.nodeName".to_string(),
                                    ..Default::default()
                                }),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        volume_mounts: Some(vec![
                            VolumeMount {
                                name: "kubeadm-config".to_string(),
                                mount_path: "/etc/kubernetes".to_string(),
                                read_only: Some(true),
                                ..Default::default()
                            },
                            VolumeMount {
                                name: "kubeadm-bin".to_string(),
                                mount_path: "/usr/bin/kubeadm".to_string(),
                                ..Default::default()
                            },
                        ]),
                        security_context: Some(k8s_openapi::api::core::v1::SecurityContext {
                            privileged: Some(true),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    volumes: Some(vec![
                        Volume {
                            name: "kubeadm-config".to_string(),
                            host_path: Some(HostPathVolumeSource {
                                path: "/etc/kubernetes".to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        Volume {
                            name: "kubeadm-bin".to_string(),
                            host_path: Some(HostPathVolumeSource {
                                path: "/usr/bin/kubeadm".to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    ]),
                    restart_policy: Some("Always".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Ensures a fleet `DaemonSet` exists for an active, error-free Operation and
/// doesn't otherwise. `image` is the operator's own container image, passed
/// down from `main.rs` so the agent stays version-matched with the
/// controller that spawned it.
pub async fn reconcile_fleet(
    client: Client,
    operation: &Operation,
    plan: &[RuntimeTaskGroupTemplate],
    image: &str,
    wants_fleet: bool,
) -> Result<(), Error> {
    let namespace = operation
        .namespace()
        .ok_or_else(|| Error::UserInput("Operation must be namespaced".to_string()))?;
    let daemonsets: Api<DaemonSet> = Api::namespaced(client, &namespace);
    let name = fleet_name(operation);
    let existing = daemonsets.get_opt(&name).await?;

    match (wants_fleet, existing) {
        (true, None) => {
            let ds = fleet_daemonset(operation, plan, image);
            daemonsets.create(&Default::default(), &ds).await?;
        }
        (false, Some(_)) => {
            daemonsets.delete(&name, &Default::default()).await?;
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeadm_operator_types::{
        Command, CreateStrategy, NodeFilter, OperationSpec, Operator, RuntimeTaskGroupSpec,
        RuntimeTaskTemplate,
    };
    use std::collections::BTreeMap;

    fn operation() -> Operation {
        let mut op = Operation::new(
            "op1",
            OperationSpec {
                paused: false,
                execution_mode: Default::default(),
                operator: Operator::Upgrade {
                    kubernetes_version: "v1.31.2".into(),
                },
            },
        );
        op.meta_mut().namespace = Some("default".to_string());
        op
    }

    fn group(selector_key: &str) -> RuntimeTaskGroupTemplate {
        RuntimeTaskGroupTemplate {
            name: "g".into(),
            spec: RuntimeTaskGroupSpec {
                node_selector: BTreeMap::from([(selector_key.to_string(), "true".to_string())]),
                node_filter: NodeFilter::All,
                selector: BTreeMap::new(),
                template: RuntimeTaskTemplate {
                    labels: BTreeMap::new(),
                    annotations: BTreeMap::new(),
                    commands: vec![Command::Pass],
                },
                create_strategy: CreateStrategy::Serial,
            },
        }
    }

    #[test]
    fn single_selector_key_is_passed_through() {
        let plan = vec![group("node-role.kubernetes.io/control-plane")];
        let selector = fleet_node_selector(&plan);
        assert_eq!(
            selector.get("node-role.kubernetes.io/control-plane"),
            Some(&"true".to_string())
        );
    }

    #[test]
    fn multiple_selector_keys_fall_back_to_every_node() {
        let plan = vec![
            group("node-role.kubernetes.io/control-plane"),
            group("node-role.kubernetes.io/worker"),
        ];
        assert!(fleet_node_selector(&plan).is_empty());
    }

    #[test]
    fn daemonset_is_owned_by_the_operation() {
        let op = operation();
        let plan = vec![group("node-role.kubernetes.io/control-plane")];
        let ds = fleet_daemonset(&op, &plan, "kubeadm-operator:latest");
        assert_eq!(ds.metadata.owner_references.unwrap().len(), 1);
        assert_eq!(ds.metadata.name, Some("op1".to_string()));
    }

    #[test]
    fn agent_container_carries_the_scoping_flags() {
        let op = operation();
        let plan = vec![group("node-role.kubernetes.io/control-plane")];
        let ds = fleet_daemonset(&op, &plan, "kubeadm-operator:latest");
        let container = &ds.spec.unwrap().template.spec.unwrap().containers[0];
        let args = container.args.clone().unwrap();
        assert!(args.iter().any(|a| a.starts_with("--agent-node-name=")));
        assert!(args.contains(&"--agent-operation=op1".to_string()));
    }
}
