use kube::CustomResourceExt;
use kubeadm_operator_types::{Operation, RuntimeTask, RuntimeTaskGroup};
use std::fs;

fn main() {
    let _ = fs::create_dir("../crds");
    fs::write(
        "../crds/operator.kubeadm.x-k8s.io_operations.yaml",
        serde_yaml::to_string(&Operation::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/operator.kubeadm.x-k8s.io_runtimetaskgroups.yaml",
        serde_yaml::to_string(&RuntimeTaskGroup::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/operator.kubeadm.x-k8s.io_runtimetasks.yaml",
        serde_yaml::to_string(&RuntimeTask::crd()).unwrap(),
    )
    .unwrap();
}
