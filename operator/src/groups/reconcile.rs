use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{
    Api, Client, Resource, ResourceExt,
    api::ListParams,
    runtime::{Controller, controller::Action},
};
use kubeadm_operator_common::labels;
use kubeadm_operator_types::{
    ExecutionMode, GroupError, GroupErrorReason, NodeFilter, Operation, RuntimeTask,
    RuntimeTaskGroup, RuntimeTaskStatus,
};
use owo_colors::OwoColorize;

use crate::{
    phase::{self, PhaseInputs},
    util::{
        Error, Metrics, PROBE_INTERVAL,
        colors::{FG1, FG2},
        patch::patch_status,
    },
};

pub struct ContextData {
    client: Client,
    pub metrics: Metrics,
}

impl ContextData {
    fn new(client: Client, metrics: Metrics) -> Self {
        ContextData { client, metrics }
    }
}

/// Builds the long-lived context for the RuntimeTaskGroup controller. Built
/// once at process start, outside any leader-election loop, so its metrics
/// registry keeps accumulating across leadership transitions instead of
/// resetting every time the controller task is respawned.
pub fn build_context(client: Client, metrics: Metrics) -> Arc<ContextData> {
    Arc::new(ContextData::new(client, metrics))
}

/// Runs the RuntimeTaskGroup controller to completion (i.e. forever, until
/// the enclosing task is aborted). Callers that need high availability wrap
/// this in a leader-election loop, as `main.rs` does for the `manage`
/// subcommand.
pub async fn run(ctx: Arc<ContextData>) {
    println!("{}", "🌱 Starting RuntimeTaskGroup controller...".green());
    let groups: Api<RuntimeTaskGroup> = Api::all(ctx.client.clone());
    Controller::new(groups, ListParams::default())
        .owns(Api::<RuntimeTask>::all(ctx.client.clone()), ListParams::default())
        .run(reconcile, on_error, ctx)
        .for_each(|_res| futures::future::ready(()))
        .await;
}

/// Pure classification of one node against its owned tasks — §4.4 step 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBucket {
    ToBeCreated,
    Pending,
    Running,
    Completed,
    Failed,
    Invalid,
}

pub fn bucket_node(tasks_for_node: &[&RuntimeTaskStatus]) -> NodeBucket {
    match tasks_for_node {
        [] => NodeBucket::ToBeCreated,
        [status] => {
            if status.error.is_some() {
                NodeBucket::Failed
            } else if status.completion_time.is_some() {
                NodeBucket::Completed
            } else if status.start_time.is_some() {
                NodeBucket::Running
            } else {
                NodeBucket::Pending
            }
        }
        _ => NodeBucket::Invalid,
    }
}

/// Applies a [`NodeFilter`] to a lexicographically-sorted node name list.
pub fn apply_node_filter(mut node_names: Vec<String>, filter: NodeFilter) -> Vec<String> {
    node_names.sort();
    match filter {
        NodeFilter::All => node_names,
        NodeFilter::Head => node_names.into_iter().take(1).collect(),
        NodeFilter::Tail => node_names.into_iter().skip(1).collect(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeBuckets {
    pub to_be_created: Vec<String>,
    pub pending: u32,
    pub running: u32,
    pub completed: u32,
    pub failed: u32,
    pub invalid: u32,
}

impl NodeBuckets {
    pub fn active(&self) -> bool {
        self.pending > 0 || self.running > 0
    }
}

pub fn bucket_nodes(
    target_nodes: &[String],
    tasks: &[(String, RuntimeTaskStatus)],
) -> NodeBuckets {
    let mut by_node: BTreeMap<&str, Vec<&RuntimeTaskStatus>> = BTreeMap::new();
    for (node_name, status) in tasks {
        by_node.entry(node_name.as_str()).or_default().push(status);
    }

    let mut buckets = NodeBuckets::default();
    for node in target_nodes {
        match bucket_node(by_node.get(node.as_str()).map_or(&[][..], |v| v.as_slice())) {
            NodeBucket::ToBeCreated => buckets.to_be_created.push(node.clone()),
            NodeBucket::Pending => buckets.pending += 1,
            NodeBucket::Running => buckets.running += 1,
            NodeBucket::Completed => buckets.completed += 1,
            NodeBucket::Failed => buckets.failed += 1,
            NodeBucket::Invalid => buckets.invalid += 1,
        }
    }
    let target_set: std::collections::BTreeSet<&str> =
        target_nodes.iter().map(String::as_str).collect();
    for (node_name, _) in tasks {
        if !target_set.contains(node_name.as_str()) {
            buckets.invalid += 1;
        }
    }
    buckets
}

async fn reconcile(group: Arc<RuntimeTaskGroup>, ctx: Arc<ContextData>) -> Result<Action, Error> {
    let client = ctx.client.clone();
    let namespace = group
        .namespace()
        .ok_or_else(|| Error::UserInput("RuntimeTaskGroup must be namespaced".to_string()))?;
    let name = group.name_any();

    #[cfg(feature = "metrics")]
    ctx.metrics
        .reconcile_counter
        .with_label_values(&[&name, &namespace])
        .inc();

    // Step 1: refuse to proceed for terminal groups.
    if group.status.as_ref().is_some_and(|s| s.completion_time.is_some()) {
        return Ok(Action::await_change());
    }

    let operation_name = group
        .labels()
        .get(labels::OPERATION)
        .cloned()
        .unwrap_or_default();
    let operations: Api<Operation> = Api::namespaced(client.clone(), &namespace);
    #[cfg(feature = "metrics")]
    let read_timer = ctx
        .metrics
        .read_histogram
        .with_label_values(&[&name, &namespace, "get_operation"])
        .start_timer();
    let operation = operations.get_opt(&operation_name).await?;
    #[cfg(feature = "metrics")]
    read_timer.observe_duration();
    let operation_paused = operation.as_ref().is_some_and(|o| o.spec.paused);
    let execution_mode = operation
        .as_ref()
        .map(|o| o.spec.execution_mode)
        .unwrap_or_default();

    // Step 3: enumerate + filter target nodes.
    let nodes: Api<Node> = Api::all(client.clone());
    let matching: Vec<String> = nodes
        .list(&ListParams::default().labels(&label_selector_expr(&group.spec.node_selector)))
        .await?
        .into_iter()
        .map(|n| n.name_any())
        .collect();
    let target_nodes = apply_node_filter(matching, group.spec.node_filter);

    // Step 4: list owned tasks by the Group's own selector (spec §4.4 step
    // 4) rather than re-deriving one — `create_task` always stamps the
    // labels the selector names, so this round-trips through whatever the
    // Group was created with, including a `custom` workflow's own selector.
    let tasks_api: Api<RuntimeTask> = Api::namespaced(client.clone(), &namespace);
    let selector = if group.spec.selector.is_empty() {
        format!("{}={}", labels::TASKGROUP, name)
    } else {
        label_selector_expr(&group.spec.selector)
    };
    #[cfg(feature = "metrics")]
    let read_timer = ctx
        .metrics
        .read_histogram
        .with_label_values(&[&name, &namespace, "list_tasks"])
        .start_timer();
    let tasks: Vec<(String, RuntimeTaskStatus)> = tasks_api
        .list(&ListParams::default().labels(&selector))
        .await?
        .into_iter()
        .map(|t| (t.spec.node_name.clone(), t.status.unwrap_or_default()))
        .collect();
    #[cfg(feature = "metrics")]
    read_timer.observe_duration();

    let buckets = bucket_nodes(&target_nodes, &tasks);
    let total = target_nodes.len() as u32;
    let all_completed = total > 0 && buckets.completed == total;
    let next_to_create = buckets.to_be_created.first().cloned();

    println!(
        "🔧 {}{}{}{}{}",
        namespace.color(FG2),
        "/".color(FG1),
        name.color(FG2),
        " NODES: ".color(FG1),
        format!("{buckets:?}").color(FG2),
    );

    let was_unstarted = group
        .status
        .as_ref()
        .map_or(true, |s| s.start_time.is_none());

    let updated: RuntimeTaskGroup = patch_status(client.clone(), group.as_ref(), |status| {
        status.paused = operation_paused;
        status.nodes = total;
        status.running_nodes = buckets.running;
        status.succeeded_nodes = buckets.completed;
        status.failed_nodes = buckets.failed;
        status.invalid_nodes = buckets.invalid;

        if buckets.active() {
            status.error = None;
        } else if buckets.invalid > 0 {
            status.error = Some(GroupError {
                reason: GroupErrorReason::ReconciliationError,
                message: format!("{} task(s) are orphaned or duplicated", buckets.invalid),
            });
        } else if buckets.failed > 0 {
            status.error = Some(GroupError {
                reason: GroupErrorReason::ReplicaError,
                message: format!("{} task(s) failed", buckets.failed),
            });
        }

        if status.start_time.is_none() {
            status.start_time = Some(now());
        } else if all_completed && status.completion_time.is_none() {
            status.completion_time = Some(now());
        }

        status.phase = phase::derive(PhaseInputs {
            deletion_timestamp_set: false,
            has_error: status.error.is_some(),
            completion_time_set: status.completion_time.is_some(),
            paused: status.paused,
            start_time_set: status.start_time.is_some(),
        });
    })
    .await?;

    if was_unstarted {
        return Ok(Action::requeue(Duration::from_millis(100)));
    }
    if updated.status.as_ref().is_some_and(|s| s.completion_time.is_some()) {
        return Ok(Action::await_change());
    }
    if updated.status.as_ref().is_some_and(|s| s.paused) {
        return Ok(Action::await_change());
    }
    if updated.status.as_ref().is_some_and(|s| s.error.is_some()) {
        return Ok(Action::await_change());
    }

    if let Some(node_name) = next_to_create
        && !buckets.active()
    {
        create_task(
            client,
            &namespace,
            &name,
            &operation_name,
            &group,
            &node_name,
            execution_mode == ExecutionMode::Controlled,
        )
        .await?;
        return Ok(Action::requeue(Duration::from_millis(250)));
    }

    Ok(Action::requeue(PROBE_INTERVAL))
}

fn label_selector_expr(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[allow(clippy::too_many_arguments)]
async fn create_task(
    client: Client,
    namespace: &str,
    group_name: &str,
    operation_name: &str,
    group: &RuntimeTaskGroup,
    node_name: &str,
    start_paused: bool,
) -> Result<(), Error> {
    let spec = kubeadm_operator_types::RuntimeTaskSpec {
        node_name: node_name.to_string(),
        recovery_mode: None,
        paused: start_paused,
        commands: group.spec.template.commands.clone(),
    };
    let mut task = RuntimeTask::new(&format!("{group_name}-{node_name}"), spec);
    let mut object_labels = group.spec.template.labels.clone();
    object_labels.insert(labels::OPERATION.to_string(), operation_name.to_string());
    object_labels.insert(labels::TASKGROUP.to_string(), group_name.to_string());
    // Carried from the Group's own label, which the Operation Reconciler
    // stamped from the Operation's uid — keeps the same scoped-listing
    // index (spec §5) meaningful one level down.
    if let Some(uid) = group.labels().get(labels::UID) {
        object_labels.insert(labels::UID.to_string(), uid.clone());
    }
    task.meta_mut().labels = Some(object_labels);
    task.meta_mut().annotations = Some(group.spec.template.annotations.clone());
    task.meta_mut().namespace = Some(namespace.to_string());
    task.meta_mut().owner_references = Some(vec![group.controller_owner_ref(&()).unwrap()]);

    let api: Api<RuntimeTask> = Api::namespaced(client, namespace);
    api.create(&Default::default(), &task).await?;
    Ok(())
}

fn now() -> k8s_openapi::apimachinery::pkg::apis::meta::v1::Time {
    k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now())
}

fn on_error(group: Arc<RuntimeTaskGroup>, error: &Error, _ctx: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!("group reconciliation error: {error:?} {group:?}").red()
    );
    Action::requeue(Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(start: bool, complete: bool, error: bool) -> RuntimeTaskStatus {
        RuntimeTaskStatus {
            start_time: start.then(now),
            completion_time: complete.then(now),
            error: error.then(|| kubeadm_operator_types::TaskError {
                reason: kubeadm_operator_types::TaskErrorReason::ExecutionError,
                message: "boom".into(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn head_filter_keeps_first_node_lexicographically() {
        let nodes = apply_node_filter(vec!["n2".into(), "n1".into(), "n3".into()], NodeFilter::Head);
        assert_eq!(nodes, vec!["n1".to_string()]);
    }

    #[test]
    fn tail_filter_drops_first_node() {
        let nodes = apply_node_filter(vec!["n2".into(), "n1".into(), "n3".into()], NodeFilter::Tail);
        assert_eq!(nodes, vec!["n2".to_string(), "n3".to_string()]);
    }

    #[test]
    fn all_filter_keeps_everything_sorted() {
        let nodes = apply_node_filter(vec!["n2".into(), "n1".into()], NodeFilter::All);
        assert_eq!(nodes, vec!["n1".to_string(), "n2".to_string()]);
    }

    #[test]
    fn node_without_task_is_to_be_created() {
        let buckets = bucket_nodes(&["n1".to_string()], &[]);
        assert_eq!(buckets.to_be_created, vec!["n1".to_string()]);
    }

    #[test]
    fn node_with_two_tasks_is_invalid() {
        let tasks = vec![
            ("n1".to_string(), status(true, false, false)),
            ("n1".to_string(), status(false, false, false)),
        ];
        let buckets = bucket_nodes(&["n1".to_string()], &tasks);
        assert_eq!(buckets.invalid, 1);
    }

    #[test]
    fn task_whose_node_is_out_of_scope_is_invalid() {
        let tasks = vec![("rogue".to_string(), status(true, false, false))];
        let buckets = bucket_nodes(&["n1".to_string()], &tasks);
        assert_eq!(buckets.invalid, 1);
        assert_eq!(buckets.to_be_created, vec!["n1".to_string()]);
    }

    #[test]
    fn one_task_per_node_is_classified_by_status() {
        let tasks = vec![
            ("n1".to_string(), status(true, true, false)),
            ("n2".to_string(), status(true, false, true)),
            ("n3".to_string(), status(true, false, false)),
        ];
        let buckets = bucket_nodes(&["n1".to_string(), "n2".to_string(), "n3".to_string()], &tasks);
        assert_eq!(buckets.completed, 1);
        assert_eq!(buckets.failed, 1);
        assert_eq!(buckets.running, 1);
        assert!(buckets.active());
    }
}
