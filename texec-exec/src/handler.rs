use std::sync::{Arc, Mutex};

use texec_codec::TaskAttributes;
use texec_dag::{SessionId, TaskKind, TaskOutcome, TaskRun};

use crate::cluster::{ClusterConnector, ClusterFuture, ComputeJob};
use crate::closure_task::ClosureTaskEnvelope;
use crate::envelope::RemoteTaskEnvelope;
use crate::error::ExecutionError;
use crate::script_task::ScriptTaskEnvelope;
use crate::wrapper::WrapperBuilder;
use texec_store::LocalCache;

/// Per-task submitter-side lifecycle state (`spec.md` §4.6). Transitions
/// are one-way and monotonic: `NEW -> SUBMITTED -> RUNNING -> COMPLETED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Constructed, not yet submitted.
    New,
    /// `submit()` has handed the envelope to the Executor.
    Submitted,
    /// A poll observed the future exists; approximates "reached the
    /// worker" (`spec.md` §4.6: the cluster exposes no distinct started
    /// event).
    Running,
    /// The task's result (or error) has been recorded on the `TaskRun`.
    Completed,
}

struct EnvelopeJob {
    envelope: Arc<dyn RemoteTaskEnvelope + Send + Sync>,
    cache: Arc<LocalCache>,
}

impl ComputeJob for EnvelopeJob {
    fn call(&self) -> Result<TaskOutcome, ExecutionError> {
        self.envelope.call(&self.cache)
    }

    fn cancel(&self) {
        self.envelope.cancel();
    }
}

/// Per-task submitter-side state machine bridging the cluster future to
/// the polling monitor (`spec.md` §4.6).
pub struct TaskHandler {
    state: Mutex<HandlerState>,
    future: Mutex<Option<Box<dyn ClusterFuture>>>,
}

impl TaskHandler {
    /// Construct a new, not-yet-submitted handler.
    pub fn new() -> Self {
        TaskHandler {
            state: Mutex::new(HandlerState::New),
            future: Mutex::new(None),
        }
    }

    /// The handler's current state.
    pub fn state(&self) -> HandlerState {
        *self.state.lock().unwrap()
    }

    /// Build the envelope matching `task.kind` (script vs closure), submit
    /// it to the cluster under a single-job load-balanced wrapper, and
    /// transition to `SUBMITTED`. The handler does not drive the
    /// submit-to-running transition itself; that is polled via
    /// [`check_if_running`](Self::check_if_running).
    pub fn submit(
        &self,
        task: &TaskRun,
        session_id: SessionId,
        connector: &ClusterConnector,
        wrapper: Arc<dyn WrapperBuilder>,
        cache: Arc<LocalCache>,
    ) -> Result<(), ExecutionError> {
        let attributes = TaskAttributes::from(task);
        let envelope: Arc<dyn RemoteTaskEnvelope + Send + Sync> = match &task.kind {
            TaskKind::Script(spec) => Arc::new(ScriptTaskEnvelope::new(&attributes, session_id, spec.clone(), wrapper)?),
            TaskKind::Closure(spec) => Arc::new(ClosureTaskEnvelope::new(&attributes, session_id, spec.clone())?),
        };

        let job = Box::new(EnvelopeJob { envelope, cache });
        let future = connector.execute(job);

        *self.future.lock().unwrap() = Some(future);
        *self.state.lock().unwrap() = HandlerState::Submitted;
        Ok(())
    }

    /// If in `SUBMITTED` and a future exists, transition to `RUNNING`.
    /// Returns whether the handler is (now, or already) running.
    pub fn check_if_running(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == HandlerState::Submitted && self.future.lock().unwrap().is_some() {
            *state = HandlerState::Running;
        }
        *state == HandlerState::Running
    }

    /// If in `RUNNING` and the future is done (or cancelled), record the
    /// result or error on `task` and transition to `COMPLETED`. Returns
    /// whether completion was observed on this call.
    ///
    /// The completion predicate is kind-dispatched (`spec.md` §9): script
    /// tasks additionally require the shared exit-status file to exist, but
    /// since this crate's `ClusterFuture::is_done` already gates on the
    /// envelope's own `call()` having returned — which for script tasks
    /// only returns after the exit file is written — the two signals never
    /// actually race here, unlike in a system where the exit file and the
    /// future are updated by independent processes.
    pub fn check_if_completed(&self, task: &mut TaskRun) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != HandlerState::Running {
            return false;
        }
        let future = self.future.lock().unwrap();
        let future = match future.as_ref() {
            Some(future) => future,
            None => return false,
        };
        if !future.is_done() && !future.is_cancelled() {
            return false;
        }

        if future.is_cancelled() {
            let _ = future.take_result();
            task.error = Some(texec_dag::TaskFailure::cancelled());
        } else {
            match future.take_result() {
                Some(Ok(outcome)) => task.outcome = Some(outcome),
                Some(Err(err)) => task.error = Some(err.into()),
                None => return false,
            }
        }
        *state = HandlerState::Completed;
        true
    }

    /// Request cancellation of the underlying cluster future.
    pub fn kill(&self) {
        if let Some(future) = self.future.lock().unwrap().as_ref() {
            future.cancel();
        }
    }
}

impl Default for TaskHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{FixedNodeBalancer, LocalClusterComputeService};
    use crate::wrapper::ShellWrapperBuilder;
    use std::time::Duration;
    use texec_dag::{ClusterNodeId, ScriptSpec};

    fn local_connector() -> ClusterConnector {
        ClusterConnector::new(Arc::new(LocalClusterComputeService), Arc::new(FixedNodeBalancer(ClusterNodeId::new())))
    }

    fn wait_for<F: Fn() -> bool>(predicate: F) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("condition never became true");
    }

    #[test]
    fn handler_progresses_monotonically_to_completed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(LocalCache::open(dir.path().join("cache"), dir.path().join("scratch"), 1 << 20).unwrap());
        let connector = local_connector();

        let mut task = TaskRun::new_script(
            "echo-hi",
            dir.path().join("work"),
            dir.path().join("target"),
            ScriptSpec {
                script: "echo hi".to_string(),
                shell: vec!["/bin/sh".to_string()],
                ..Default::default()
            },
        );

        let handler = TaskHandler::new();
        assert_eq!(handler.state(), HandlerState::New);

        handler
            .submit(&task, SessionId::new(), &connector, Arc::new(ShellWrapperBuilder), cache)
            .unwrap();
        assert_eq!(handler.state(), HandlerState::Submitted);

        assert!(handler.check_if_running());
        assert_eq!(handler.state(), HandlerState::Running);

        wait_for(|| handler.check_if_completed(&mut task));
        assert_eq!(handler.state(), HandlerState::Completed);
        assert!(task.error.is_none());
        assert!(matches!(task.outcome, Some(TaskOutcome::Script(ref outcome)) if outcome.exit_status == 0));
    }

    #[test]
    fn cancellation_after_submit_is_recorded_as_completed_with_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(LocalCache::open(dir.path().join("cache"), dir.path().join("scratch"), 1 << 20).unwrap());
        let connector = local_connector();

        let mut task = TaskRun::new_script(
            "sleep",
            dir.path().join("work"),
            dir.path().join("target"),
            ScriptSpec {
                script: "sleep 5".to_string(),
                shell: vec!["/bin/sh".to_string()],
                ..Default::default()
            },
        );

        let handler = TaskHandler::new();
        handler
            .submit(&task, SessionId::new(), &connector, Arc::new(ShellWrapperBuilder), cache)
            .unwrap();
        handler.check_if_running();
        handler.kill();

        wait_for(|| handler.check_if_completed(&mut task));
        assert_eq!(handler.state(), HandlerState::Completed);
        assert!(task.error.is_some());
    }
}
