use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single step executed in order by the Agent Reconciler's command cursor.
///
/// Most commands carry no parameters — the node name and any other context
/// they need comes from the owning [`crate::RuntimeTask`]. `Wait` is the one
/// exception, since a fixed pause has to be parameterized somewhere.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "upgradeKubeadm")]
    UpgradeKubeadm,

    #[serde(rename = "kubeadmUpgradeApply")]
    KubeadmUpgradeApply,

    #[serde(rename = "kubeadmUpgradeNode")]
    KubeadmUpgradeNode,

    #[serde(rename = "upgradeKubeletAndKubectl")]
    UpgradeKubeletAndKubectl,

    #[serde(rename = "kubeadmRenewCertificates")]
    KubeadmRenewCertificates,

    #[serde(rename = "kubectlDrain")]
    KubectlDrain,

    #[serde(rename = "kubectlUncordon")]
    KubectlUncordon,

    #[serde(rename = "preflight")]
    Preflight,

    /// Always succeeds. Used by tests and by the no-op group in dry runs.
    #[serde(rename = "pass")]
    Pass,

    /// Always fails. Used by tests exercising recovery modes.
    #[serde(rename = "fail")]
    Fail,

    /// Sleeps for the given number of seconds, then succeeds.
    #[serde(rename = "wait")]
    Wait { seconds: u64 },
}

impl Command {
    /// Stable, lowerCamelCase name matching the `type` tag on the wire.
    /// Used for metrics labels and log lines, not re-parsed from this value.
    pub fn name(&self) -> &'static str {
        match self {
            Command::UpgradeKubeadm => "upgradeKubeadm",
            Command::KubeadmUpgradeApply => "kubeadmUpgradeApply",
            Command::KubeadmUpgradeNode => "kubeadmUpgradeNode",
            Command::UpgradeKubeletAndKubectl => "upgradeKubeletAndKubectl",
            Command::KubeadmRenewCertificates => "kubeadmRenewCertificates",
            Command::KubectlDrain => "kubectlDrain",
            Command::KubectlUncordon => "kubectlUncordon",
            Command::Preflight => "preflight",
            Command::Pass => "pass",
            Command::Fail => "fail",
            Command::Wait { .. } => "wait",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trips_for_unit_variants() {
        let json = serde_json::to_value(Command::KubectlDrain).unwrap();
        assert_eq!(json, serde_json::json!({"type": "kubectlDrain"}));
        let back: Command = serde_json::from_value(json).unwrap();
        assert_eq!(back, Command::KubectlDrain);
    }

    #[test]
    fn wait_carries_its_parameter() {
        let json = serde_json::json!({"type": "wait", "seconds": 30});
        let cmd: Command = serde_json::from_value(json).unwrap();
        assert_eq!(cmd, Command::Wait { seconds: 30 });
        assert_eq!(cmd.name(), "wait");
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let json = serde_json::json!({"type": "rebootNode"});
        assert!(serde_json::from_value::<Command>(json).is_err());
    }
}
