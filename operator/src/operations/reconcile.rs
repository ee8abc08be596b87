use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::StreamExt;
use kube::{
    Api, Client, Resource, ResourceExt,
    api::{ListParams, Patch, PatchParams},
    runtime::{Controller, controller::Action},
};
use kubeadm_operator_common::labels;
use kubeadm_operator_types::{
    Operation, OperationError, OperationErrorReason, RuntimeTaskGroup, RuntimeTaskGroupStatus,
    RuntimeTaskGroupTemplate,
};
use owo_colors::OwoColorize;

use crate::{
    operations::{fleet, planner},
    phase::{self, PhaseInputs},
    util::{
        Error, Metrics, PROBE_INTERVAL,
        colors::{FG1, FG2},
        patch::patch_status,
    },
};

pub struct ContextData {
    client: Client,
    image: String,
    pub metrics: Metrics,
}

impl ContextData {
    fn new(client: Client, image: String, metrics: Metrics) -> Self {
        ContextData { client, image, metrics }
    }
}

/// Builds the long-lived context for the Operation controller. Built once at
/// process start, outside any leader-election loop, so its metrics registry
/// keeps accumulating across leadership transitions instead of resetting
/// every time the controller task is respawned.
pub fn build_context(client: Client, image: String, metrics: Metrics) -> Arc<ContextData> {
    Arc::new(ContextData::new(client, image, metrics))
}

/// Runs the Operation controller to completion (i.e. forever, until the
/// enclosing task is aborted). Callers that need high availability wrap this
/// in a leader-election loop, as `main.rs` does for the `manage` subcommand.
pub async fn run(ctx: Arc<ContextData>) {
    println!("{}", "🌱 Starting Operation controller...".green());
    let operations: Api<Operation> = Api::all(ctx.client.clone());
    Controller::new(operations, ListParams::default())
        .owns(Api::<RuntimeTaskGroup>::all(ctx.client.clone()), ListParams::default())
        .run(reconcile, on_error, ctx)
        .for_each(|_res| futures::future::ready(()))
        .await;
}

/// Pure classification of owned groups against a desired plan — §4.2 step 6.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupBuckets {
    pub to_be_created: Vec<String>,
    pub pending: u32,
    pub running: u32,
    pub completed: u32,
    pub failed: u32,
    pub invalid: u32,
}

impl GroupBuckets {
    pub fn total(&self) -> u32 {
        self.to_be_created.len() as u32 + self.pending + self.running + self.completed + self.failed
    }

    pub fn active(&self) -> bool {
        self.pending > 0 || self.running > 0
    }
}

pub fn bucket_groups(
    desired: &[RuntimeTaskGroupTemplate],
    owned: &[(String, RuntimeTaskGroupStatus)],
) -> GroupBuckets {
    let owned_by_name: BTreeMap<&str, &RuntimeTaskGroupStatus> =
        owned.iter().map(|(n, s)| (n.as_str(), s)).collect();

    let mut buckets = GroupBuckets::default();
    // Preserve plan order, not alphabetical order — the "next to create" pick
    // in §4.2 step 12 depends on the order the Plan Builder produced.
    for group in desired {
        match owned_by_name.get(group.name.as_str()) {
            None => buckets.to_be_created.push(group.name.clone()),
            Some(status) => {
                if status.error.is_some() {
                    buckets.failed += 1;
                } else if status.completion_time.is_some() {
                    buckets.completed += 1;
                } else if status.start_time.is_some() {
                    buckets.running += 1;
                } else {
                    buckets.pending += 1;
                }
            }
        }
    }
    let desired_names: std::collections::BTreeSet<&str> =
        desired.iter().map(|g| g.name.as_str()).collect();
    for (name, _) in owned {
        if !desired_names.contains(name.as_str()) {
            buckets.invalid += 1;
        }
    }
    buckets
}

async fn reconcile(operation: Arc<Operation>, ctx: Arc<ContextData>) -> Result<Action, Error> {
    let client = ctx.client.clone();
    let namespace = operation
        .namespace()
        .ok_or_else(|| Error::UserInput("Operation must be namespaced".to_string()))?;
    let name = operation.name_any();

    #[cfg(feature = "metrics")]
    ctx.metrics
        .reconcile_counter
        .with_label_values(&[&name, &namespace])
        .inc();

    // Step 1: terminal operations only tear down their fleet.
    let terminal = operation
        .status
        .as_ref()
        .is_some_and(|s| s.completion_time.is_some());
    if terminal {
        fleet::reconcile_fleet(client, &operation, &[], &ctx.image, false).await?;
        return Ok(Action::await_change());
    }

    // Step 3: mint a stable identity label on first sight.
    let Some(uid) = operation.labels().get(labels::UID).cloned() else {
        let mut new_labels = BTreeMap::new();
        new_labels.insert(labels::UID.to_string(), uuid::Uuid::new_v4().to_string());
        let patch = Patch::Merge(serde_json::json!({ "metadata": { "labels": new_labels } }));
        let api: Api<Operation> = Api::namespaced(client.clone(), &namespace);
        api.patch(&name, &PatchParams::default(), &patch).await?;
        return Ok(Action::requeue(Duration::from_millis(100)));
    };

    let plan = planner::build_plan(&operation)?;

    // Step 2 + error state (step 7/8) are folded into the same status patch
    // as the bucketing below, since they all read the same owned-group list.
    // `operation`+`uid` together are the scoped-listing index (spec §5) so a
    // recreated-same-name Operation never adopts a prior instance's groups.
    let groups: Api<RuntimeTaskGroup> = Api::namespaced(client.clone(), &namespace);
    let selector = format!("{}={},{}={}", labels::OPERATION, name, labels::UID, uid);
    #[cfg(feature = "metrics")]
    let read_timer = ctx
        .metrics
        .read_histogram
        .with_label_values(&[&name, &namespace, "list_groups"])
        .start_timer();
    let owned: Vec<(String, RuntimeTaskGroupStatus)> = groups
        .list(&ListParams::default().labels(&selector))
        .await?
        .into_iter()
        .map(|g| (g.name_any(), g.status.unwrap_or_default()))
        .collect();
    #[cfg(feature = "metrics")]
    read_timer.observe_duration();
    let buckets = bucket_groups(&plan, &owned);

    // Step 5: cascade deletion is handled by Kubernetes owner references;
    // nothing left to finalize explicitly.
    if operation.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    println!(
        "🔧 {}{}{}{}{}",
        namespace.color(FG2),
        "/".color(FG1),
        name.color(FG2),
        " GROUPS: ".color(FG1),
        format!("{buckets:?}").color(FG2),
    );

    let operation_paused = operation.spec.paused;
    let next_to_create = buckets.to_be_created.first().cloned();
    let all_completed = buckets.completed == plan.len() as u32 && !plan.is_empty();
    let was_unstarted = operation
        .status
        .as_ref()
        .map_or(true, |s| s.start_time.is_none());

    let updated: Operation = patch_status(client.clone(), operation.as_ref(), |status| {
        status.paused = operation_paused;
        status.groups = plan.len() as u32;
        status.running_groups = buckets.running;
        status.succeeded_groups = buckets.completed;
        status.failed_groups = buckets.failed;
        status.invalid_groups = buckets.invalid;

        if buckets.active() {
            status.error = None;
        } else if buckets.invalid > 0 {
            status.error = Some(OperationError {
                reason: OperationErrorReason::ReconciliationError,
                message: format!("{} owned RuntimeTaskGroup(s) have no matching plan entry", buckets.invalid),
            });
        } else if buckets.failed > 0 {
            status.error = Some(OperationError {
                reason: OperationErrorReason::ReplicaError,
                message: format!("{} RuntimeTaskGroup(s) failed", buckets.failed),
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

    let wants_fleet = updated.status.as_ref().is_some_and(|s| {
        s.completion_time.is_none() && s.error.is_none()
    });
    fleet::reconcile_fleet(client.clone(), &updated, &plan, &ctx.image, wants_fleet).await?;

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

    if let Some(group_name) = next_to_create
        && !buckets.active()
    {
        create_group(client, &namespace, &name, &uid, &plan, &group_name).await?;
        return Ok(Action::requeue(Duration::from_millis(250)));
    }

    Ok(Action::requeue(PROBE_INTERVAL))
}

async fn create_group(
    client: Client,
    namespace: &str,
    operation_name: &str,
    operation_uid: &str,
    plan: &[RuntimeTaskGroupTemplate],
    group_name: &str,
) -> Result<(), Error> {
    let index = plan
        .iter()
        .position(|g| g.name == group_name)
        .expect("group_name comes from this plan");
    let template = &plan[index];
    let full_name = format!("{operation_name}-{group_name}");

    let mut spec = template.spec.clone();
    if spec.selector.is_empty() {
        // The group's own name is the natural selector for the Tasks it
        // creates — see `groups::reconcile::create_task`, which always
        // stamps `labels::TASKGROUP` with this same value.
        spec.selector = BTreeMap::from([(labels::TASKGROUP.to_string(), full_name.clone())]);
    }

    let mut group = RuntimeTaskGroup::new(&full_name, spec);
    let mut object_labels = BTreeMap::new();
    object_labels.insert(labels::OPERATION.to_string(), operation_name.to_string());
    object_labels.insert(labels::UID.to_string(), operation_uid.to_string());
    object_labels.insert(labels::ORDER.to_string(), planner::order_label(index));
    group.meta_mut().labels = Some(object_labels);
    group.meta_mut().namespace = Some(namespace.to_string());

    let api: Api<RuntimeTaskGroup> = Api::namespaced(client, namespace);
    api.create(&Default::default(), &group).await?;
    Ok(())
}

fn now() -> k8s_openapi::apimachinery::pkg::apis::meta::v1::Time {
    k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now())
}

fn on_error(operation: Arc<Operation>, error: &Error, _ctx: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!("operation reconciliation error: {error:?} {operation:?}").red()
    );
    Action::requeue(Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(start: bool, complete: bool, error: bool) -> RuntimeTaskGroupStatus {
        RuntimeTaskGroupStatus {
            start_time: start.then(now),
            completion_time: complete.then(now),
            error: error.then(|| kubeadm_operator_types::GroupError {
                reason: kubeadm_operator_types::GroupErrorReason::ReplicaError,
                message: "boom".into(),
            }),
            ..Default::default()
        }
    }

    fn desired(names: &[&str]) -> Vec<RuntimeTaskGroupTemplate> {
        names
            .iter()
            .map(|n| RuntimeTaskGroupTemplate {
                name: n.to_string(),
                spec: Default::default(),
            })
            .collect()
    }

    #[test]
    fn missing_group_is_to_be_created() {
        let buckets = bucket_groups(&desired(&["a", "b"]), &[("a".into(), status(true, false, false))]);
        assert_eq!(buckets.to_be_created, vec!["b".to_string()]);
        assert_eq!(buckets.running, 1);
    }

    #[test]
    fn owned_group_with_no_plan_entry_is_invalid() {
        let buckets = bucket_groups(&desired(&["a"]), &[("rogue".into(), status(true, false, false))]);
        assert_eq!(buckets.invalid, 1);
    }

    #[test]
    fn completed_and_failed_are_classified_correctly() {
        let buckets = bucket_groups(
            &desired(&["a", "b"]),
            &[
                ("a".into(), status(true, true, false)),
                ("b".into(), status(true, false, true)),
            ],
        );
        assert_eq!(buckets.completed, 1);
        assert_eq!(buckets.failed, 1);
        assert!(!buckets.active());
    }

    #[test]
    fn pending_group_has_neither_start_nor_completion() {
        let buckets = bucket_groups(&desired(&["a"]), &[("a".into(), status(false, false, false))]);
        assert_eq!(buckets.pending, 1);
        assert!(buckets.active());
    }

    #[test]
    fn all_completed_matches_plan_length() {
        let plan = desired(&["a", "b"]);
        let buckets = bucket_groups(
            &plan,
            &[
                ("a".into(), status(true, true, false)),
                ("b".into(), status(true, true, false)),
            ],
        );
        assert_eq!(buckets.completed, plan.len() as u32);
    }
}
