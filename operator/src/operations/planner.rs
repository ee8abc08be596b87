use std::collections::BTreeMap;

use kubeadm_operator_types::{
    Command, NodeFilter, Operation, Operator, RuntimeTaskGroupSpec, RuntimeTaskGroupTemplate,
    RuntimeTaskTemplate,
};

pub const CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";
pub const WORKER_LABEL: &str = "node-role.kubernetes.io/worker";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    /// A `custom` workflow named a group with an empty command template —
    /// nothing for an Agent Reconciler to run, so there would never be a
    /// way for the resulting Task to reach a terminal phase.
    #[error("group {0:?} has an empty command template")]
    EmptyCommandList(String),
}

/// Translates an [`Operation`]'s `operator` union into the ordered list of
/// [`RuntimeTaskGroupTemplate`]s the Operation Reconciler will create one at
/// a time. Pure — no I/O, no clock, no randomness.
pub fn build_plan(operation: &Operation) -> Result<Vec<RuntimeTaskGroupTemplate>, PlanError> {
    let plan = match &operation.spec.operator {
        Operator::Upgrade { kubernetes_version } => upgrade_plan(kubernetes_version),
        Operator::RenewCertificates {} => renew_certificates_plan(),
        Operator::Custom { workflow } => workflow.clone(),
    };
    for group in &plan {
        if group.spec.template.commands.is_empty() {
            return Err(PlanError::EmptyCommandList(group.name.clone()));
        }
    }
    Ok(plan)
}

fn selector(label: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(label.to_string(), "true".to_string())])
}

fn template(commands: Vec<Command>) -> RuntimeTaskTemplate {
    RuntimeTaskTemplate {
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        commands,
    }
}

fn group(
    name: &str,
    node_selector: BTreeMap<String, String>,
    node_filter: NodeFilter,
    commands: Vec<Command>,
) -> RuntimeTaskGroupTemplate {
    RuntimeTaskGroupTemplate {
        name: name.to_string(),
        spec: RuntimeTaskGroupSpec {
            node_selector,
            node_filter,
            selector: BTreeMap::new(),
            template: template(commands),
            create_strategy: Default::default(),
        },
    }
}

fn upgrade_plan(_kubernetes_version: &str) -> Vec<RuntimeTaskGroupTemplate> {
    vec![
        group(
            "upgrade-cp-1",
            selector(CONTROL_PLANE_LABEL),
            NodeFilter::Head,
            vec![
                Command::UpgradeKubeadm,
                Command::KubeadmUpgradeApply,
                Command::UpgradeKubeletAndKubectl,
            ],
        ),
        group(
            "upgrade-cp-n",
            selector(CONTROL_PLANE_LABEL),
            NodeFilter::Tail,
            vec![
                Command::UpgradeKubeadm,
                Command::KubeadmUpgradeNode,
                Command::UpgradeKubeletAndKubectl,
            ],
        ),
        group(
            "upgrade-w",
            selector(WORKER_LABEL),
            NodeFilter::All,
            vec![
                Command::KubectlDrain,
                Command::UpgradeKubeadm,
                Command::KubeadmUpgradeNode,
                Command::UpgradeKubeletAndKubectl,
                Command::KubectlUncordon,
            ],
        ),
    ]
}

/// Open question in the source spec: the renewal plan's exact shape is
/// under-specified beyond "same cp1/cpN split as upgrade, one command".
/// Implemented literally as instructed rather than guessed further.
fn renew_certificates_plan() -> Vec<RuntimeTaskGroupTemplate> {
    vec![
        group(
            "renew-certificates-cp-1",
            selector(CONTROL_PLANE_LABEL),
            NodeFilter::Head,
            vec![Command::KubeadmRenewCertificates],
        ),
        group(
            "renew-certificates-cp-n",
            selector(CONTROL_PLANE_LABEL),
            NodeFilter::Tail,
            vec![Command::KubeadmRenewCertificates],
        ),
    ]
}

/// Stamps lexicographically sortable `"NN"` order labels onto a plan, in
/// plan order. Separate from `build_plan` so the Operation Reconciler can
/// label a plan of arbitrary length (more than 99 groups would need 3
/// digits; today's plans top out at 3).
pub fn order_label(index: usize) -> String {
    format!("{:02}", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeadm_operator_types::OperationSpec;

    fn operation_with(operator: Operator) -> Operation {
        Operation::new(
            "op1",
            OperationSpec {
                paused: false,
                execution_mode: Default::default(),
                operator,
            },
        )
    }

    #[test]
    fn upgrade_plan_has_three_groups_in_order() {
        let op = operation_with(Operator::Upgrade {
            kubernetes_version: "v1.31.2".into(),
        });
        let plan = build_plan(&op).unwrap();
        let names: Vec<_> = plan.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["upgrade-cp-1", "upgrade-cp-n", "upgrade-w"]);
        assert_eq!(plan[0].spec.node_filter, NodeFilter::Head);
        assert_eq!(plan[1].spec.node_filter, NodeFilter::Tail);
        assert_eq!(plan[2].spec.node_filter, NodeFilter::All);
    }

    #[test]
    fn upgrade_cp1_commands_match_spec_order() {
        let op = operation_with(Operator::Upgrade {
            kubernetes_version: "v1.31.2".into(),
        });
        let plan = build_plan(&op).unwrap();
        assert_eq!(
            plan[0].spec.template.commands,
            vec![
                Command::UpgradeKubeadm,
                Command::KubeadmUpgradeApply,
                Command::UpgradeKubeletAndKubectl,
            ]
        );
    }

    #[test]
    fn renew_certificates_follows_cp1_cpn_split() {
        let op = operation_with(Operator::RenewCertificates {});
        let plan = build_plan(&op).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].spec.node_filter, NodeFilter::Head);
        assert_eq!(plan[1].spec.node_filter, NodeFilter::Tail);
        for g in &plan {
            assert_eq!(g.spec.template.commands, vec![Command::KubeadmRenewCertificates]);
        }
    }

    #[test]
    fn custom_workflow_passes_through_verbatim() {
        let custom = vec![group(
            "smoke-test",
            selector("kubernetes.io/os"),
            NodeFilter::All,
            vec![Command::Pass],
        )];
        let op = operation_with(Operator::Custom {
            workflow: custom.clone(),
        });
        assert_eq!(build_plan(&op).unwrap(), custom);
    }

    #[test]
    fn custom_workflow_rejects_empty_command_template() {
        let custom = vec![group("empty", BTreeMap::new(), NodeFilter::All, vec![])];
        let op = operation_with(Operator::Custom { workflow: custom });
        assert_eq!(
            build_plan(&op),
            Err(PlanError::EmptyCommandList("empty".into()))
        );
    }

    #[test]
    fn plan_is_deterministic() {
        let op = operation_with(Operator::Upgrade {
            kubernetes_version: "v1.31.2".into(),
        });
        assert_eq!(build_plan(&op).unwrap(), build_plan(&op).unwrap());
    }

    #[test]
    fn order_labels_are_lexicographically_sortable() {
        let labels: Vec<_> = (0..3).map(order_label).collect();
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(labels, sorted);
        assert_eq!(labels, ["01", "02", "03"]);
    }
}
