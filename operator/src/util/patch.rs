use super::MANAGER_NAME;
use kube::{
    Api, Client, Error,
    api::{Patch, PatchParams, Resource},
    core::NamespaceResourceScope,
};
use kubeadm_operator_types::{Operation, OperationStatus, RuntimeTask, RuntimeTaskGroup, RuntimeTaskGroupStatus, RuntimeTaskStatus};
use serde::{Serialize, de::DeserializeOwned};
use std::{clone::Clone, fmt::Debug};

/// Implemented by each of the three CRD kinds so `patch_status` can get at
/// (and lazily initialize) their status sub-object generically.
pub trait Object<S> {
    fn mut_status(&mut self) -> &mut S;
}

impl Object<OperationStatus> for Operation {
    fn mut_status(&mut self) -> &mut OperationStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

impl Object<RuntimeTaskGroupStatus> for RuntimeTaskGroup {
    fn mut_status(&mut self) -> &mut RuntimeTaskGroupStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

impl Object<RuntimeTaskStatus> for RuntimeTask {
    fn mut_status(&mut self) -> &mut RuntimeTaskStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

/// Patches the resource's status sub-object with the provided function. The
/// function is passed a mutable reference to the (lazily-initialized) status
/// object, which is to be mutated in place.
pub async fn patch_status<S, T>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone
        + Resource
        + Object<S>
        + Serialize
        + DeserializeOwned
        + Debug
        + Resource<Scope = NamespaceResourceScope>,
{
    let mut modified = instance.clone();
    f(modified.mut_status());
    let patch = Patch::Json::<T>(json_patch::diff(
        &serde_json::to_value(instance).unwrap(),
        &serde_json::to_value(&modified).unwrap(),
    ));
    let name = instance.meta().name.as_deref().unwrap();
    let namespace = instance.meta().namespace.as_deref().unwrap();
    let api: Api<T> = Api::namespaced(client, namespace);
    api.patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await
}
