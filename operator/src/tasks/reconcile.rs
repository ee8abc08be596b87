use std::{sync::Arc, time::Duration};

use kube::{
    Api, Client, Resource, ResourceExt,
    api::ListParams,
    runtime::{Controller, controller::Action},
};
use futures::StreamExt;
use kubeadm_operator_common::labels;
use kubeadm_operator_types::{ExecutionMode, Operation, RecoveryMode, RuntimeTask, TaskError, TaskErrorReason};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use crate::{
    phase::{self, PhaseInputs},
    tasks::executor::CommandExecutor,
    util::{
        Error, Metrics,
        colors::{FG1, FG2},
        patch::patch_status,
    },
};

pub struct AgentContext {
    pub client: Client,
    pub node_name: String,
    pub operation_name: String,
    pub executor: Arc<dyn CommandExecutor>,
    pub metrics: Metrics,
}

/// Builds the long-lived context for the Agent Reconciler.
pub fn build_context(
    client: Client,
    node_name: String,
    operation_name: String,
    executor: Arc<dyn CommandExecutor>,
    metrics: Metrics,
) -> Arc<AgentContext> {
    Arc::new(AgentContext {
        client,
        node_name,
        operation_name,
        executor,
        metrics,
    })
}

/// Runs the Agent Reconciler to completion. Never wrapped in leader
/// election — exactly one agent process is expected per node, each scoped
/// to a single Operation by `--agent-operation`.
pub async fn run(ctx: Arc<AgentContext>) {
    println!(
        "{}",
        format!(
            "🤖 starting agent • node={} operation={}",
            ctx.node_name, ctx.operation_name
        )
        .green()
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        kubeadm_operator_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });
    kubeadm_operator_common::signal_ready();

    let tasks: Api<RuntimeTask> = Api::all(ctx.client.clone());
    let controller = Controller::new(tasks, ListParams::default())
        .run(reconcile, on_error, ctx)
        .for_each(|_res| futures::future::ready(()));

    tokio::select! {
        _ = controller => {},
        _ = shutdown.cancelled() => {},
    }
}

/// Pure decision reached from the task's current state plus the two values
/// the Agent Reconciler reads off the owning Operation. Kept separate from
/// `reconcile` so the state machine in §4.5 can be tested without a client.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    NotAddressedToThisAgent,
    Terminal,
    RetryFailedCommand,
    SkipFailedCommand {
        new_current_command: u32,
        completes: bool,
        should_pause: bool,
    },
    Paused,
    Start,
    IndexOutOfRange,
    Execute {
        index: usize,
    },
}

pub fn decide(
    task: &RuntimeTask,
    agent_node_name: &str,
    agent_operation: &str,
    execution_mode: ExecutionMode,
    operation_paused: bool,
) -> Decision {
    if task.spec.node_name != agent_node_name {
        return Decision::NotAddressedToThisAgent;
    }
    if task.labels().get(labels::OPERATION).map(String::as_str) != Some(agent_operation) {
        return Decision::NotAddressedToThisAgent;
    }

    let status = task.status.clone().unwrap_or_default();
    if status.completion_time.is_some() || task.metadata.deletion_timestamp.is_some() {
        return Decision::Terminal;
    }

    if let (Some(recovery), true) = (task.spec.recovery_mode, status.error.is_some()) {
        return match recovery {
            RecoveryMode::RetryFailedCommand => Decision::RetryFailedCommand,
            RecoveryMode::SkipFailedCommand => {
                let new_current_command = status.current_command + 1;
                let completes = new_current_command as usize > task.spec.commands.len();
                Decision::SkipFailedCommand {
                    new_current_command,
                    completes,
                    should_pause: execution_mode == ExecutionMode::Controlled,
                }
            }
        };
    }

    if task.spec.paused || operation_paused {
        return Decision::Paused;
    }

    if status.start_time.is_none() {
        return Decision::Start;
    }

    let index = status.current_command.saturating_sub(1) as usize;
    if index >= task.spec.commands.len() {
        return Decision::IndexOutOfRange;
    }
    Decision::Execute { index }
}

async fn reconcile(task: Arc<RuntimeTask>, ctx: Arc<AgentContext>) -> Result<Action, Error> {
    let name = task.name_any();
    let namespace = task
        .namespace()
        .ok_or_else(|| Error::UserInput("RuntimeTask must be namespaced".to_string()))?;

    #[cfg(feature = "metrics")]
    ctx.metrics
        .reconcile_counter
        .with_label_values(&[&name, &namespace])
        .inc();

    let operation_name = task
        .labels()
        .get(labels::OPERATION)
        .cloned()
        .unwrap_or_default();
    let operations: Api<Operation> = Api::namespaced(ctx.client.clone(), &namespace);
    #[cfg(feature = "metrics")]
    let read_timer = ctx
        .metrics
        .read_histogram
        .with_label_values(&[&name, &namespace, "get_operation"])
        .start_timer();
    let fetched = operations.get_opt(&operation_name).await?;
    #[cfg(feature = "metrics")]
    read_timer.observe_duration();
    let operation = match fetched {
        Some(op) => op,
        None => return Ok(Action::requeue(Duration::from_secs(10))),
    };
    let execution_mode = operation.spec.execution_mode;
    let operation_paused = operation.spec.paused
        || operation
            .status
            .as_ref()
            .is_some_and(|s| s.paused);

    let decision = decide(
        &task,
        &ctx.node_name,
        &ctx.operation_name,
        execution_mode,
        operation_paused,
    );

    if !matches!(decision, Decision::NotAddressedToThisAgent | Decision::Terminal) {
        println!(
            "🔧 {}{}{}{}{}",
            namespace.color(FG2),
            "/".color(FG1),
            name.color(FG2),
            " DECISION: ".color(FG1),
            format!("{decision:?}").color(FG2),
        );
    }

    match decision {
        Decision::NotAddressedToThisAgent | Decision::Terminal => Ok(Action::await_change()),

        Decision::RetryFailedCommand => {
            patch_status(ctx.client.clone(), task.as_ref(), |status| {
                status.error = None;
            })
            .await?;
            clear_recovery_mode(&ctx.client, &task).await?;
            Ok(Action::await_change())
        }

        Decision::SkipFailedCommand {
            new_current_command,
            completes,
            should_pause,
        } => {
            patch_status(ctx.client.clone(), task.as_ref(), |status| {
                status.error = None;
                status.current_command = new_current_command;
                status.command_progress =
                    phase::command_progress(new_current_command, task.spec.commands.len());
                if completes {
                    status.completion_time = Some(now());
                }
                if should_pause && !completes {
                    status.paused = true;
                }
                status.phase = phase::derive(PhaseInputs {
                    deletion_timestamp_set: false,
                    has_error: false,
                    completion_time_set: status.completion_time.is_some(),
                    paused: status.paused,
                    start_time_set: status.start_time.is_some(),
                });
            })
            .await?;
            clear_recovery_mode(&ctx.client, &task).await?;
            Ok(Action::await_change())
        }

        Decision::Paused => {
            patch_status(ctx.client.clone(), task.as_ref(), |status| {
                status.paused = true;
                status.phase = phase::derive(PhaseInputs {
                    deletion_timestamp_set: false,
                    has_error: status.error.is_some(),
                    completion_time_set: status.completion_time.is_some(),
                    paused: true,
                    start_time_set: status.start_time.is_some(),
                });
            })
            .await?;
            Ok(Action::await_change())
        }

        Decision::Start => {
            patch_status(ctx.client.clone(), task.as_ref(), |status| {
                status.start_time = Some(now());
                status.current_command = 1;
                status.command_progress = phase::command_progress(1, task.spec.commands.len());
                status.paused = false;
                status.phase = phase::derive(PhaseInputs {
                    deletion_timestamp_set: false,
                    has_error: false,
                    completion_time_set: false,
                    paused: false,
                    start_time_set: true,
                });
            })
            .await?;
            Ok(Action::requeue(Duration::from_secs(1)))
        }

        Decision::IndexOutOfRange => {
            patch_status(ctx.client.clone(), task.as_ref(), |status| {
                status.error = Some(TaskError {
                    reason: TaskErrorReason::IndexOutOfRangeError,
                    message: "currentCommand is past the end of spec.commands".to_string(),
                });
                status.phase = kubeadm_operator_types::Phase::Failed;
            })
            .await?;
            Ok(Action::await_change())
        }

        Decision::Execute { index } => {
            let command = task.spec.commands[index].clone();
            let dry_run = execution_mode == ExecutionMode::DryRun;

            #[cfg(feature = "metrics")]
            let timer = ctx
                .metrics
                .write_histogram
                .with_label_values(&[&name, &namespace, command.name()])
                .start_timer();

            let result = if dry_run {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            } else {
                ctx.executor.execute(&ctx.node_name, &command).await
            };

            #[cfg(feature = "metrics")]
            timer.observe_duration();

            #[cfg(feature = "metrics")]
            ctx.metrics
                .action_counter
                .with_label_values(&[&name, &namespace, command.name()])
                .inc();

            match result {
                Err(err) => {
                    patch_status(ctx.client.clone(), task.as_ref(), |status| {
                        status.error = Some(TaskError {
                            reason: TaskErrorReason::ExecutionError,
                            message: err.to_string(),
                        });
                        status.phase = kubeadm_operator_types::Phase::Failed;
                    })
                    .await?;
                    Ok(Action::requeue(Duration::from_secs(15)))
                }
                Ok(()) => {
                    println!(
                        "✅ {}{}{} completed {}",
                        namespace.color(FG2),
                        "/".color(FG1),
                        name.color(FG2),
                        command.name(),
                    );
                    let next_cursor = index as u32 + 2;
                    let total = task.spec.commands.len();
                    let completes = next_cursor as usize > total;
                    let should_pause = !completes && execution_mode == ExecutionMode::Controlled;
                    patch_status(ctx.client.clone(), task.as_ref(), |status| {
                        if completes {
                            status.completion_time = Some(now());
                        } else {
                            status.current_command = next_cursor;
                            status.command_progress = phase::command_progress(next_cursor, total);
                            if should_pause {
                                status.paused = true;
                            }
                        }
                        status.phase = phase::derive(PhaseInputs {
                            deletion_timestamp_set: false,
                            has_error: false,
                            completion_time_set: status.completion_time.is_some(),
                            paused: status.paused,
                            start_time_set: true,
                        });
                    })
                    .await?;
                    Ok(Action::requeue(Duration::from_millis(250)))
                }
            }
        }
    }
}

/// Clears `spec.recoveryMode` once the recovery action it requested has been
/// applied — an operator sets it once per failure, never twice in a row.
async fn clear_recovery_mode(client: &Client, task: &RuntimeTask) -> Result<(), Error> {
    let namespace = task.namespace().unwrap();
    let api: Api<RuntimeTask> = Api::namespaced(client.clone(), &namespace);
    let patch = kube::api::Patch::Merge(serde_json::json!({"spec": {"recoveryMode": null}}));
    api.patch(&task.name_any(), &kube::api::PatchParams::default(), &patch)
        .await?;
    Ok(())
}

fn now() -> k8s_openapi::apimachinery::pkg::apis::meta::v1::Time {
    k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now())
}

fn on_error(task: Arc<RuntimeTask>, error: &Error, _ctx: Arc<AgentContext>) -> Action {
    eprintln!(
        "{}",
        format!("task reconciliation error: {error:?} {task:?}").red()
    );
    Action::requeue(Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeadm_operator_types::{Command, RuntimeTaskSpec, RuntimeTaskStatus};
    use std::collections::BTreeMap;

    fn task_with(spec: RuntimeTaskSpec, status: Option<RuntimeTaskStatus>) -> RuntimeTask {
        let mut task = RuntimeTask::new("group-a-n1", spec);
        task.status = status;
        task.meta_mut().labels = Some(BTreeMap::from([(
            labels::OPERATION.to_string(),
            "op1".to_string(),
        )]));
        task
    }

    fn spec(commands: Vec<Command>) -> RuntimeTaskSpec {
        RuntimeTaskSpec {
            node_name: "n1".into(),
            recovery_mode: None,
            paused: false,
            commands,
        }
    }

    #[test]
    fn ignores_tasks_for_other_nodes() {
        let mut s = spec(vec![Command::Pass]);
        s.node_name = "other-node".into();
        let task = task_with(s, None);
        assert_eq!(
            decide(&task, "n1", "op1", ExecutionMode::Auto, false),
            Decision::NotAddressedToThisAgent
        );
    }

    #[test]
    fn ignores_tasks_scoped_to_other_operations() {
        let task = task_with(spec(vec![Command::Pass]), None);
        assert_eq!(
            decide(&task, "n1", "op2", ExecutionMode::Auto, false),
            Decision::NotAddressedToThisAgent
        );
    }

    #[test]
    fn unstarted_task_starts() {
        let task = task_with(spec(vec![Command::Pass]), None);
        assert_eq!(
            decide(&task, "n1", "op1", ExecutionMode::Auto, false),
            Decision::Start
        );
    }

    #[test]
    fn paused_task_does_not_advance() {
        let mut s = spec(vec![Command::Pass, Command::Pass]);
        s.paused = true;
        let status = RuntimeTaskStatus {
            start_time: Some(now()),
            current_command: 1,
            ..Default::default()
        };
        let task = task_with(s, Some(status));
        assert_eq!(
            decide(&task, "n1", "op1", ExecutionMode::Auto, false),
            Decision::Paused
        );
    }

    #[test]
    fn operation_pause_propagates_even_without_task_spec_paused() {
        let status = RuntimeTaskStatus {
            start_time: Some(now()),
            current_command: 1,
            ..Default::default()
        };
        let task = task_with(spec(vec![Command::Pass, Command::Pass]), Some(status));
        assert_eq!(
            decide(&task, "n1", "op1", ExecutionMode::Auto, true),
            Decision::Paused
        );
    }

    #[test]
    fn started_task_executes_at_cursor() {
        let status = RuntimeTaskStatus {
            start_time: Some(now()),
            current_command: 2,
            ..Default::default()
        };
        let task = task_with(
            spec(vec![Command::Pass, Command::KubectlDrain, Command::Pass]),
            Some(status),
        );
        assert_eq!(
            decide(&task, "n1", "op1", ExecutionMode::Auto, false),
            Decision::Execute { index: 1 }
        );
    }

    #[test]
    fn cursor_past_end_is_index_out_of_range() {
        let status = RuntimeTaskStatus {
            start_time: Some(now()),
            current_command: 4,
            ..Default::default()
        };
        let task = task_with(spec(vec![Command::Pass]), Some(status));
        assert_eq!(
            decide(&task, "n1", "op1", ExecutionMode::Auto, false),
            Decision::IndexOutOfRange
        );
    }

    #[test]
    fn retry_recovery_mode_on_errored_task() {
        let mut s = spec(vec![Command::Pass, Command::Fail]);
        s.recovery_mode = Some(RecoveryMode::RetryFailedCommand);
        let status = RuntimeTaskStatus {
            start_time: Some(now()),
            current_command: 2,
            error: Some(TaskError {
                reason: TaskErrorReason::ExecutionError,
                message: "boom".into(),
            }),
            ..Default::default()
        };
        let task = task_with(s, Some(status));
        assert_eq!(
            decide(&task, "n1", "op1", ExecutionMode::Auto, false),
            Decision::RetryFailedCommand
        );
    }

    #[test]
    fn skip_recovery_mode_advances_past_failed_command_and_completes() {
        let mut s = spec(vec![Command::Pass, Command::Fail]);
        s.recovery_mode = Some(RecoveryMode::SkipFailedCommand);
        let status = RuntimeTaskStatus {
            start_time: Some(now()),
            current_command: 2,
            error: Some(TaskError {
                reason: TaskErrorReason::ExecutionError,
                message: "boom".into(),
            }),
            ..Default::default()
        };
        let task = task_with(s, Some(status));
        assert_eq!(
            decide(&task, "n1", "op1", ExecutionMode::Auto, false),
            Decision::SkipFailedCommand {
                new_current_command: 3,
                completes: true,
                should_pause: false,
            }
        );
    }

    #[test]
    fn recovery_mode_is_ignored_when_task_has_no_error() {
        let mut s = spec(vec![Command::Pass]);
        s.recovery_mode = Some(RecoveryMode::RetryFailedCommand);
        let status = RuntimeTaskStatus {
            start_time: Some(now()),
            current_command: 1,
            ..Default::default()
        };
        let task = task_with(s, Some(status));
        assert_eq!(
            decide(&task, "n1", "op1", ExecutionMode::Auto, false),
            Decision::Execute { index: 0 }
        );
    }

    #[test]
    fn deleted_task_is_terminal() {
        let task_with_deletion = {
            let mut t = task_with(spec(vec![Command::Pass]), None);
            t.meta_mut().deletion_timestamp = Some(now());
            t
        };
        assert_eq!(
            decide(&task_with_deletion, "n1", "op1", ExecutionMode::Auto, false),
            Decision::Terminal
        );
    }
}
