use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use texec_dag::{TaskId, TaskRun};

use crate::{Codec, CodecError};

/// The well-known attributes shipped on the wire with every envelope
/// (`spec.md` §3): a task id, name, the two shared-storage directories, the
/// input file mapping, and the output file patterns.
///
/// Invariant: once constructed on the submitter the envelope carrying this
/// is immutable; the worker decodes it from the `payload` blob on first
/// access (see `texec-exec::envelope::RemoteTaskEnvelope::hydrate`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAttributes {
    /// Identifier of the task.
    pub task_id: TaskId,
    /// Human-readable name.
    pub name: String,
    /// Shared-storage working directory.
    pub work_dir: PathBuf,
    /// Shared-storage target directory.
    pub target_dir: PathBuf,
    /// Logical name -> source path on shared storage.
    pub input_files: BTreeMap<String, PathBuf>,
    /// Output file glob patterns, relative to scratch.
    pub output_files: Vec<String>,
}

impl From<&TaskRun> for TaskAttributes {
    fn from(task: &TaskRun) -> Self {
        TaskAttributes {
            task_id: task.id,
            name: task.name.clone(),
            work_dir: task.work_dir.clone(),
            target_dir: task.target_dir.clone(),
            input_files: task.input_files.clone(),
            output_files: task.output_files.clone(),
        }
    }
}

/// Codec for [`TaskAttributes`], backed by `bincode`.
pub struct AttributeCodec;

impl Codec<TaskAttributes> for AttributeCodec {
    fn serialize(value: &TaskAttributes) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(CodecError::Serialize)
    }

    fn deserialize(bytes: &[u8]) -> Result<TaskAttributes, CodecError> {
        bincode::deserialize(bytes).map_err(CodecError::Deserialize)
    }
}
