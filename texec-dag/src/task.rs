use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::TaskId;

/// Which kind of remote task a `TaskRun` describes. Dispatched on at handler
/// construction and at result-parsing time, per the tagged-variant design
/// note: the source selects the handler/envelope shape via a script-type
/// tag, modeled here as a first-class enum instead of a string flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskKind {
    /// Run a shell script via a subprocess.
    Script(ScriptSpec),
    /// Rehydrate and invoke a pre-registered closure.
    Closure(ClosureSpec),
}

/// Fields specific to a script task.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScriptSpec {
    /// The body of the script to run.
    pub script: String,
    /// Bytes fed to the subprocess's standard input.
    pub stdin: Vec<u8>,
    /// Argv prefix (e.g. `["bash"]`) the launcher path is appended to.
    pub shell: Vec<String>,
    /// Optional container image to run the script inside.
    pub container: Option<String>,
    /// Whether the container's entrypoint is itself executable (as opposed
    /// to needing the shell prefix wrapped around it).
    pub executable_container: bool,
    /// Environment variables. Copied on envelope construction so the
    /// envelope never mutates the caller's map (see `spec.md` §5).
    pub env: BTreeMap<String, String>,
}

/// Fields specific to a closure task. `code_obj`/`delegate_obj` are the
/// dehydrated closure and delegate context, shipped as opaque bytes and
/// rehydrated worker-side (see `texec-exec::closure_task`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClosureSpec {
    /// Identifier of the pre-registered operator this closure invokes.
    pub operator: String,
    /// Serialized arguments passed to the operator.
    pub args: Vec<u8>,
    /// Serialized delegate context (the bindings the closure is bound to).
    pub delegate: Vec<u8>,
}

/// Result of a completed script task: an exit status plus the shared-storage
/// paths of its captured stdout/stderr (populated only after un-staging).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// Process exit status.
    pub exit_status: i32,
    /// Path to the captured stdout file, under the task's shared `work_dir`.
    pub stdout: PathBuf,
    /// Path to the captured stderr file, under the task's shared `work_dir`.
    pub stderr: PathBuf,
}

/// Result of a completed closure task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureOutcome {
    /// The closure's return value, serialized.
    pub value: Vec<u8>,
    /// The delegate's post-execution holder mapping.
    pub context: BTreeMap<String, Vec<u8>>,
}

/// The outcome of a completed task, shaped by its kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// A script task's outcome.
    Script(ScriptOutcome),
    /// A closure task's outcome.
    Closure(ClosureOutcome),
}

/// A lightweight, serializable failure recorded on a `TaskRun`. Concrete
/// error types (`CodecError`, `ProcessExecutionError`, ...) live in the
/// crates that raise them and are converted into this shape when they reach
/// the handler, since `TaskRun` must stay free of those crates' types to
/// avoid a dependency cycle (`texec-exec`/`texec-codec` both depend on this
/// crate, not the other way around).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskFailure {
    /// Human-readable description of the failure.
    pub message: String,
    /// Whether this failure represents a cancellation, per `spec.md` §4.6.
    pub cancelled: bool,
}

impl TaskFailure {
    /// Build a non-cancellation failure.
    pub fn new(message: impl Into<String>) -> Self {
        TaskFailure {
            message: message.into(),
            cancelled: false,
        }
    }

    /// The sentinel `CANCELLED` failure produced when a cluster future
    /// reports cancellation.
    pub fn cancelled() -> Self {
        TaskFailure {
            message: "CANCELLED".to_string(),
            cancelled: true,
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TaskFailure {}

/// External task description submitted to the executor. Constructed by the
/// (out of scope) workflow engine, mutated in place by the `TaskHandler` on
/// completion (`outcome`/`error`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    /// Unique identifier of this task run.
    pub id: TaskId,
    /// Human-readable name, used in logs and error messages.
    pub name: String,
    /// Working directory on shared storage.
    pub work_dir: PathBuf,
    /// Target directory on shared storage where declared outputs land.
    pub target_dir: PathBuf,
    /// Logical name -> source path on shared storage, staged into scratch.
    pub input_files: BTreeMap<String, PathBuf>,
    /// Glob patterns (relative to scratch) of expected output files.
    pub output_files: Vec<String>,
    /// What kind of task this is and its kind-specific fields.
    pub kind: TaskKind,
    /// Populated by the `TaskHandler` once the task completes successfully.
    pub outcome: Option<TaskOutcome>,
    /// Populated by the `TaskHandler` if the task failed or was cancelled.
    pub error: Option<TaskFailure>,
}

impl TaskRun {
    /// Construct a new, not-yet-submitted script task run.
    pub fn new_script(
        name: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        target_dir: impl Into<PathBuf>,
        spec: ScriptSpec,
    ) -> Self {
        TaskRun {
            id: TaskId::new(),
            name: name.into(),
            work_dir: work_dir.into(),
            target_dir: target_dir.into(),
            input_files: BTreeMap::new(),
            output_files: Vec::new(),
            kind: TaskKind::Script(spec),
            outcome: None,
            error: None,
        }
    }

    /// Construct a new, not-yet-submitted closure task run.
    pub fn new_closure(
        name: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        target_dir: impl Into<PathBuf>,
        spec: ClosureSpec,
    ) -> Self {
        TaskRun {
            id: TaskId::new(),
            name: name.into(),
            work_dir: work_dir.into(),
            target_dir: target_dir.into(),
            input_files: BTreeMap::new(),
            output_files: Vec::new(),
            kind: TaskKind::Closure(spec),
            outcome: None,
            error: None,
        }
    }

    /// Declare an input file, mapping a logical name to a source path on
    /// shared storage.
    pub fn with_input(mut self, logical_name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        self.input_files.insert(logical_name.into(), source.into());
        self
    }

    /// Declare an expected output file pattern.
    pub fn with_output(mut self, pattern: impl Into<String>) -> Self {
        self.output_files.push(pattern.into());
        self
    }
}
