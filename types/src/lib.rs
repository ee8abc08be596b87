mod command;
mod error;
mod operation;
mod operator;
mod phase;
mod task;
mod taskgroup;

pub use command::Command;
pub use error::{
    GroupError, GroupErrorReason, OperationError, OperationErrorReason, TaskError,
    TaskErrorReason,
};
pub use operation::{Operation, OperationSpec, OperationStatus};
pub use operator::{
    CreateStrategy, ExecutionMode, NodeFilter, Operator, RecoveryMode, RuntimeTaskTemplate,
};
pub use phase::Phase;
pub use task::{RuntimeTask, RuntimeTaskSpec, RuntimeTaskStatus};
pub use taskgroup::{
    RuntimeTaskGroup, RuntimeTaskGroupSpec, RuntimeTaskGroupStatus, RuntimeTaskGroupTemplate,
};
