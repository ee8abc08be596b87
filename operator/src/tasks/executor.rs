use async_trait::async_trait;
use kubeadm_operator_types::Command;
use tokio::process::Command as ProcessCommand;

/// Raised by a [`CommandExecutor`] when a command fails. Always surfaces on
/// the owning Task as a `TaskErrorReason::ExecutionError` — an out-of-range
/// cursor is a reconciler-level error, never raised here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorError {
    pub message: String,
}

impl std::fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExecutorError {}

/// Runs one [`Command`] against one node and reports success or failure.
/// External collaborator boundary (§4.6/§6 of the source design) — the Agent
/// Reconciler depends only on this trait, never on `tokio::process` directly,
/// so its tests can swap in [`FakeExecutor`].
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, node_name: &str, command: &Command) -> Result<(), ExecutorError>;
}

/// Shells out to the real `kubeadm`/`kubectl` binaries on the local host.
/// Used only by the Agent process, never by the cluster-wide reconcilers.
pub struct ProcessCommandExecutor {
    pub kubeadm_path: String,
    pub kubectl_path: String,
}

impl ProcessCommandExecutor {
    pub fn new(kubeadm_path: String, kubectl_path: String) -> Self {
        Self {
            kubeadm_path,
            kubectl_path,
        }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<(), ExecutorError> {
        let output = ProcessCommand::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| ExecutorError {
                message: format!("failed to spawn {program}: {e}"),
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(ExecutorError {
            message: format!(
                "{program} {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr),
            ),
        })
    }
}

#[async_trait]
impl CommandExecutor for ProcessCommandExecutor {
    async fn execute(&self, node_name: &str, command: &Command) -> Result<(), ExecutorError> {
        match command {
            Command::UpgradeKubeadm => {
                self.run(&self.kubeadm_path, &["version", "--output=short"])
                    .await
            }
            Command::KubeadmUpgradeApply => {
                self.run(&self.kubeadm_path, &["upgrade", "apply", "-y"]).await
            }
            Command::KubeadmUpgradeNode => {
                self.run(&self.kubeadm_path, &["upgrade", "node"]).await
            }
            Command::UpgradeKubeletAndKubectl => {
                self.run("apt-get", &["install", "-y", "--allow-change-held-packages", "kubelet", "kubectl"])
                    .await
            }
            Command::KubeadmRenewCertificates => {
                self.run(&self.kubeadm_path, &["certs", "renew", "all"])
                    .await
            }
            Command::KubectlDrain => {
                self.run(
                    &self.kubectl_path,
                    &["drain", node_name, "--ignore-daemonsets", "--delete-emptydir-data"],
                )
                .await
            }
            Command::KubectlUncordon => self.run(&self.kubectl_path, &["uncordon", node_name]).await,
            Command::Preflight => self.run(&self.kubeadm_path, &["upgrade", "plan"]).await,
            Command::Pass => Ok(()),
            Command::Fail => Err(ExecutorError {
                message: "command type is `fail`".to_string(),
            }),
            Command::Wait { seconds } => {
                tokio::time::sleep(std::time::Duration::from_secs(*seconds)).await;
                Ok(())
            }
        }
    }
}

/// Scriptable stand-in for [`ProcessCommandExecutor`] used by `tasks::reconcile`
/// tests; records every command it was asked to run.
#[cfg(test)]
pub struct FakeExecutor {
    pub fail_on: std::sync::Mutex<Vec<Command>>,
    pub calls: std::sync::Mutex<Vec<(String, Command)>>,
}

#[cfg(test)]
impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            fail_on: std::sync::Mutex::new(Vec::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(commands: Vec<Command>) -> Self {
        Self {
            fail_on: std::sync::Mutex::new(commands),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn execute(&self, node_name: &str, command: &Command) -> Result<(), ExecutorError> {
        self.calls
            .lock()
            .unwrap()
            .push((node_name.to_string(), command.clone()));
        if self.fail_on.lock().unwrap().contains(command) || matches!(command, Command::Fail) {
            return Err(ExecutorError {
                message: format!("{} failed", command.name()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_executor_records_calls_and_honors_fail_on() {
        let exec = FakeExecutor::failing_on(vec![Command::KubectlDrain]);
        assert!(exec.execute("n1", &Command::Pass).await.is_ok());
        assert!(exec.execute("n1", &Command::KubectlDrain).await.is_err());
        assert_eq!(exec.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fail_command_always_fails() {
        let exec = FakeExecutor::new();
        assert!(exec.execute("n1", &Command::Fail).await.is_err());
    }

    #[tokio::test]
    async fn wait_command_sleeps_then_succeeds() {
        let exec = ProcessCommandExecutor::new("kubeadm".into(), "kubectl".into());
        let start = std::time::Instant::now();
        exec.execute("n1", &Command::Wait { seconds: 0 })
            .await
            .unwrap();
        assert!(start.elapsed() < std::time::Duration::from_millis(500));
    }
}
