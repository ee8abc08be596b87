use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Why an [`crate::Operation`] landed in `status.error`.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum OperationErrorReason {
    /// A plan or invariant violation was detected at the Operation level
    /// (malformed `operator` union, an owned group with no plan counterpart).
    ReconciliationError,
    /// At least one owned `RuntimeTaskGroup` is `Failed`.
    ReplicaError,
}

/// Why a [`crate::RuntimeTaskGroup`] landed in `status.error`.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum GroupErrorReason {
    /// An invalid node/task mapping was detected (duplicate or orphaned task).
    ReconciliationError,
    /// A failed task exists and no active task is progressing.
    ReplicaError,
}

/// Why a [`crate::RuntimeTask`] landed in `status.error`.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum TaskErrorReason {
    /// The Command Executor returned a non-nil error for the current command.
    ExecutionError,
    /// `currentCommand` pointed past the end of `spec.commands`; fatal.
    IndexOutOfRangeError,
}

/// A structured error recorded in `status.error`, cleared automatically the
/// next time the owning reconciler observes an active (pending or running)
/// child.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct OperationError {
    pub reason: OperationErrorReason,
    pub message: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct GroupError {
    pub reason: GroupErrorReason,
    pub message: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct TaskError {
    pub reason: TaskErrorReason,
    pub message: String,
}
