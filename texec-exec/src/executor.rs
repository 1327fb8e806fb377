use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use texec_dag::{SessionId, TaskOutcome, TaskRun};
use texec_store::LocalCache;

use crate::cluster::{ClusterComputeService, ClusterConnector, ClusterFuture, ComputeLoadBalancer};
use crate::config::ExecutorConfig;
use crate::error::ExecutionError;
use crate::handler::TaskHandler;
use crate::wrapper::WrapperBuilder;

/// Creates task handlers and submits their envelopes to the Cluster
/// Compute Service, owning the connector and driving the polling monitor
/// (`spec.md` §4.7).
pub struct Executor {
    connector: ClusterConnector,
    cache: Arc<LocalCache>,
    wrapper: Arc<dyn WrapperBuilder>,
    config: ExecutorConfig,
    handlers: Mutex<Vec<(Arc<TaskHandler>, Arc<Mutex<TaskRun>>)>>,
}

impl Executor {
    /// Build a new Executor against the given Cluster Compute Service and
    /// load balancer (bundled into a [`ClusterConnector`]), worker-local
    /// cache, launcher builder, and tunables.
    pub fn new(
        cluster: Arc<dyn ClusterComputeService>,
        balancer: Arc<dyn ComputeLoadBalancer>,
        cache: Arc<LocalCache>,
        wrapper: Arc<dyn WrapperBuilder>,
        config: ExecutorConfig,
    ) -> Self {
        Executor {
            connector: ClusterConnector::new(cluster, balancer),
            cache,
            wrapper,
            config,
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// `createTaskHandler(task) -> TaskHandler` then `submit()`
    /// (`spec.md` §4.6/§4.7): dispatch is handled inside `TaskHandler`
    /// itself, keyed on `task.kind`. Registers the handler so the polling
    /// monitor picks it up.
    pub fn execute(&self, task: Arc<Mutex<TaskRun>>, session_id: SessionId) -> Result<Arc<TaskHandler>, ExecutionError> {
        let handler = Arc::new(TaskHandler::new());
        {
            let task_ref = task.lock().unwrap();
            handler.submit(&task_ref, session_id, &self.connector, self.wrapper.clone(), self.cache.clone())?;
        }
        self.handlers.lock().unwrap().push((handler.clone(), task));
        Ok(handler)
    }

    /// `call(callable) -> ClusterFuture` (`spec.md` §4.7): generic
    /// fire-and-forget submission for ancillary control tasks that have no
    /// `TaskRun`/envelope of their own. Unlike `execute`, the returned
    /// future is handed to the caller directly; the Executor does not track
    /// it for polling.
    pub fn call<F>(&self, callable: F) -> Box<dyn ClusterFuture>
    where
        F: FnOnce() -> Result<TaskOutcome, ExecutionError> + Send + 'static,
    {
        self.connector.call(callable)
    }

    /// Poll every registered handler once, advancing `SUBMITTED ->
    /// RUNNING` and `RUNNING -> COMPLETED` transitions. Called by the
    /// [`PollingMonitor`] at `config.poll_interval`, but exposed directly
    /// for callers that want to drive polling themselves (e.g. tests).
    pub fn poll_once(&self) {
        for (handler, task) in self.handlers.lock().unwrap().iter() {
            if handler.check_if_running() {
                let mut task = task.lock().unwrap();
                handler.check_if_completed(&mut task);
            }
        }
    }

    /// The configured poll interval.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

/// Background thread polling an [`Executor`]'s handlers at ~1s granularity
/// (`spec.md` §4.7), grounded on `task-maker-exec::client`'s status-poller
/// thread (`STATUS_POLL_INTERVAL_MS`, an `AtomicBool` stop flag, joined on
/// shutdown).
pub struct PollingMonitor {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PollingMonitor {
    /// Spawn a monitor thread polling `executor` until dropped.
    pub fn spawn(executor: Arc<Executor>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let interval = executor.config().poll_interval();
        let thread = thread::Builder::new()
            .name("texec-polling-monitor".into())
            .spawn(move || {
                while !stop_thread.load(Ordering::Relaxed) {
                    executor.poll_once();
                    thread::sleep(interval);
                }
            })
            .expect("failed to spawn polling monitor thread");
        PollingMonitor {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for PollingMonitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{FixedNodeBalancer, LocalClusterComputeService};
    use crate::wrapper::ShellWrapperBuilder;
    use std::time::Duration;
    use texec_dag::{ClusterNodeId, ScriptOutcome, ScriptSpec};

    #[test]
    fn polling_monitor_drives_a_handler_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(LocalCache::open(dir.path().join("cache"), dir.path().join("scratch"), 1 << 20).unwrap());
        let cluster: Arc<dyn ClusterComputeService> = Arc::new(LocalClusterComputeService);
        let balancer: Arc<dyn ComputeLoadBalancer> = Arc::new(FixedNodeBalancer(ClusterNodeId::new()));
        let wrapper: Arc<dyn WrapperBuilder> = Arc::new(ShellWrapperBuilder);
        let mut config = ExecutorConfig::default();
        config.poll_interval_ms = 20;

        let executor = Arc::new(Executor::new(cluster, balancer, cache, wrapper, config));

        let task = Arc::new(Mutex::new(TaskRun::new_script(
            "echo-hi",
            dir.path().join("work"),
            dir.path().join("target"),
            ScriptSpec {
                script: "echo hi".to_string(),
                shell: vec!["/bin/sh".to_string()],
                ..Default::default()
            },
        )));

        let handler = executor.execute(task.clone(), SessionId::new()).unwrap();
        let monitor = PollingMonitor::spawn(executor);

        for _ in 0..200 {
            if handler.state() == crate::handler::HandlerState::Completed {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        drop(monitor);

        assert_eq!(handler.state(), crate::handler::HandlerState::Completed);
        let task = task.lock().unwrap();
        assert!(matches!(task.outcome, Some(TaskOutcome::Script(ref outcome)) if outcome.exit_status == 0));
    }

    #[test]
    fn call_submits_a_generic_callable_outside_the_handler_bookkeeping() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(LocalCache::open(dir.path().join("cache"), dir.path().join("scratch"), 1 << 20).unwrap());
        let cluster: Arc<dyn ClusterComputeService> = Arc::new(LocalClusterComputeService);
        let balancer: Arc<dyn ComputeLoadBalancer> = Arc::new(FixedNodeBalancer(ClusterNodeId::new()));
        let wrapper: Arc<dyn WrapperBuilder> = Arc::new(ShellWrapperBuilder);
        let executor = Executor::new(cluster, balancer, cache, wrapper, ExecutorConfig::default());

        let future = executor.call(|| {
            Ok(TaskOutcome::Script(ScriptOutcome {
                exit_status: 0,
                stdout: "stdout".into(),
                stderr: "stderr".into(),
            }))
        });

        for _ in 0..100 {
            if future.is_done() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(future.take_result().unwrap().is_ok());
        assert!(executor.handlers.lock().unwrap().is_empty());
    }
}
