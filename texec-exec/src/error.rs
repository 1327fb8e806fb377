use thiserror::Error;

/// Errors raised while running a task envelope, per `spec.md` §7.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Payload (de)serialization failed; fatal for the affected task.
    #[error("codec error: {0}")]
    Codec(#[from] texec_codec::CodecError),
    /// Any envelope-level failure (stage, execute, or un-stage), wrapping
    /// the original cause and the task name.
    #[error("task {task} failed: {cause}")]
    Process {
        /// Name of the task that failed.
        task: String,
        /// Underlying cause.
        #[source]
        cause: anyhow::Error,
    },
    /// The cluster future reported cancellation.
    #[error("task was cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Wrap an arbitrary cause as a [`ExecutionError::Process`] for `task`.
    pub fn process(task: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        ExecutionError::Process {
            task: task.into(),
            cause: cause.into(),
        }
    }
}

impl From<ExecutionError> for texec_dag::TaskFailure {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Cancelled => texec_dag::TaskFailure::cancelled(),
            other => texec_dag::TaskFailure::new(other.to_string()),
        }
    }
}
