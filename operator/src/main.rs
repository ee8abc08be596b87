use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kube::client::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

mod groups;
mod operations;
mod phase;
mod tasks;
mod util;

#[cfg(feature = "metrics")]
mod metrics;

use tasks::executor::ProcessCommandExecutor;

/// Top-level CLI configuration for the binary. Any command line
/// flags should go in here.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Prometheus metrics server scrape port. Disabled by default.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

/// List of subcommands for the binary. Clap will convert the
/// name of each enum variant to kebab-case for the CLI.
#[derive(Subcommand)]
enum Command {
    /// Runs the cluster-wide Operation and RuntimeTaskGroup reconcilers
    /// behind leader election, so more than one replica can run for HA
    /// without two instances racing to act on the same Operation.
    Manage {
        /// Container image to run for each Agent Fleet worker. Defaults to
        /// this process's own image so the fleet stays version-matched.
        #[arg(long, env = "AGENT_IMAGE")]
        agent_image: String,
    },
    /// Runs the per-node Agent Reconciler, scoped to one node and Operation.
    /// Never leader-elected: exactly one agent process is expected per node.
    Agent {
        #[arg(long, env = "AGENT_NODE_NAME")]
        agent_node_name: String,

        #[arg(long, env = "AGENT_OPERATION")]
        agent_operation: String,

        #[arg(long, env = "KUBEADM_PATH", default_value = "kubeadm")]
        kubeadm_path: String,

        #[arg(long, env = "KUBECTL_PATH", default_value = "kubectl")]
        kubectl_path: String,
    },
}

/// Secondary entrypoint that runs the appropriate subcommand.
async fn run(client: Client) -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "metrics")]
    let mut registries = metrics::Registries::default();

    match cli.command {
        Command::Manage { agent_image } => {
            let op_metrics = util::new_metrics("operation");
            let group_metrics = util::new_metrics("taskgroup");
            #[cfg(feature = "metrics")]
            {
                registries.push(op_metrics.registry.clone());
                registries.push(group_metrics.registry.clone());
            }

            // Built once, before the leader-election loop, so the metrics
            // registries above keep accumulating across leadership
            // transitions instead of resetting every time the controllers
            // are respawned.
            let op_ctx = operations::build_context(client.clone(), agent_image, op_metrics);
            let group_ctx = groups::build_context(client.clone(), group_metrics);

            #[cfg(feature = "metrics")]
            if let Some(metrics_port) = cli.metrics_port {
                tokio::spawn(metrics::run_server(metrics_port, registries));
            }

            run_elected(client, "kubeadm-operator-lock", move || {
                let op_ctx = op_ctx.clone();
                let group_ctx = group_ctx.clone();
                async move {
                    tokio::join!(operations::run(op_ctx), groups::run(group_ctx));
                }
            })
            .await?;
        }
        Command::Agent {
            agent_node_name,
            agent_operation,
            kubeadm_path,
            kubectl_path,
        } => {
            let executor = Arc::new(ProcessCommandExecutor::new(kubeadm_path, kubectl_path));
            let task_metrics = util::new_metrics("task");
            #[cfg(feature = "metrics")]
            registries.push(task_metrics.registry.clone());

            let ctx = tasks::build_context(client, agent_node_name, agent_operation, executor, task_metrics);

            #[cfg(feature = "metrics")]
            if let Some(metrics_port) = cli.metrics_port {
                tokio::spawn(metrics::run_server(metrics_port, registries));
            }

            tasks::run(ctx).await;
        }
    }

    anyhow::bail!("exited unexpectedly")
}

/// Runs `spawn_controllers` under process-level leader election, so only one
/// replica of the `manage` subcommand actually reconciles at a time. Modeled
/// on the teacher's `Strim` controller lease loop: one `Lease` object guards
/// the work, renewed on an interval well inside its TTL, with the controller
/// task aborted the instant the lease is lost or can't be renewed.
async fn run_elected<F, Fut>(client: Client, lease_name: &str, spawn_controllers: F) -> Result<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("kubeadm-operator-{}", uuid::Uuid::new_v4()));
    let lease_ttl = Duration::from_secs(15);
    let renew_every = Duration::from_secs(5);
    let leadership = LeaseLock::new(
        client,
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: lease_name.to_string(),
            lease_ttl,
        },
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        kubeadm_operator_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });
    kubeadm_operator_common::signal_ready();

    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(renew_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    task.await.ok();
                }
                return Ok(());
            },
            _ = tick.tick() => {}
        }

        let lease = match leadership.try_acquire_or_renew().await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("leader election renew/acquire failed: {e}");
                if let Some(task) = controller_task.take() {
                    task.abort();
                    eprintln!("aborted controller due to leader election error");
                }
                continue;
            }
        };

        if lease.acquired_lease {
            if controller_task.is_none() {
                println!("{}", "acquired leadership; starting controllers".green());
                controller_task = Some(tokio::spawn(spawn_controllers()));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("{}", "lost leadership; stopping controllers".red());
            task.abort();
        }
    }
}

/// Main entrypoint that sets up the environment before running the secondary entrypoint `run`.
#[tokio::main]
async fn main() -> Result<()> {
    kubeadm_operator_common::init();

    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    let client: Client =
        Client::try_default().await.map_err(|e| anyhow::anyhow!("no valid KUBECONFIG: {e}"))?;

    run(client).await
}
