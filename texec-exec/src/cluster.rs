//! The Cluster Compute Service and Class-Loader Provider (`spec.md` §6):
//! external collaborators whose interfaces are referenced but not designed
//! here. Modeled as traits rather than a concrete cluster implementation,
//! plus a minimal in-process [`LocalClusterComputeService`] (the one
//! concrete compute service this crate ships) for tests and small
//! deployments, mirroring the teacher's own `LocalExecutor` alongside its
//! abstract `Executor`. [`ClusterConnector`] is the Executor's own handle
//! onto this façade (`spec.md` §4.7).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use texec_dag::{ClusterNodeId, SessionId, TaskOutcome};

use crate::error::ExecutionError;

/// A single unit of work submitted to the cluster: an envelope's `call()`
/// wrapped so the compute façade never needs to know about envelopes.
pub trait ComputeJob: Send + Sync {
    /// Run the job to completion.
    fn call(&self) -> Result<TaskOutcome, ExecutionError>;
    /// Request cancellation; a no-op if the job has already finished.
    fn cancel(&self);
}

/// Picks the cluster node a job should run on.
pub trait ComputeLoadBalancer: Send + Sync {
    /// Choose a node, excluding any already tried.
    fn pick(&self, excluded: &[ClusterNodeId]) -> ClusterNodeId;
}

/// Asynchronous handle to a submitted job's outcome.
pub trait ClusterFuture: Send + Sync {
    /// Whether the job has finished (successfully, with an error, or by
    /// cancellation).
    fn is_done(&self) -> bool;
    /// Whether the job was cancelled.
    fn is_cancelled(&self) -> bool;
    /// Request cancellation of the underlying job.
    fn cancel(&self);
    /// Take the job's result. Returns `None` until the job is done, and can
    /// only be taken once.
    fn take_result(&self) -> Option<Result<TaskOutcome, ExecutionError>>;
}

/// The compute façade the Executor submits jobs through (`spec.md` §6).
pub trait ClusterComputeService: Send + Sync {
    /// Submit `job` under a single-job load-balanced wrapper: the adapter's
    /// `map` returns the one-element mapping `{job -> balancer.pick(..)}`
    /// and its `reduce` returns the sole result — indirection that exists
    /// only to surface the load-balancer dependency to the framework
    /// (`spec.md` §4.7).
    fn execute(
        &self,
        job: Box<dyn ComputeJob>,
        balancer: &dyn ComputeLoadBalancer,
    ) -> Box<dyn ClusterFuture>;
}

/// Resolves the session-scoped class loader a closure task would rehydrate
/// user code against (`spec.md` §6). The bounded, pre-registered operator
/// form this crate implements for closure tasks (`spec.md` §9) never needs
/// to rehydrate arbitrary user code, so no concrete implementation of this
/// trait is shipped; it is kept for implementers who extend the closure
/// task to a less bounded form.
pub trait ClassLoaderProvider: Send + Sync {
    /// Opaque per-session configuration carrier.
    type Session;
    /// Fetch the session for `session_id`, if one is registered.
    fn session_for(&self, session_id: SessionId) -> Option<Self::Session>;
}

struct LocalFuture {
    job: Arc<dyn ComputeJob>,
    done: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    result: Arc<Mutex<Option<Result<TaskOutcome, ExecutionError>>>>,
}

impl ClusterFuture for LocalFuture {
    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.job.cancel();
    }

    fn take_result(&self) -> Option<Result<TaskOutcome, ExecutionError>> {
        self.result.lock().unwrap().take()
    }
}

/// Runs each submitted job on its own thread, standing in for a real
/// cluster transport (explicitly out of scope per `spec.md` §1).
#[derive(Debug, Default)]
pub struct LocalClusterComputeService;

impl ClusterComputeService for LocalClusterComputeService {
    fn execute(
        &self,
        job: Box<dyn ComputeJob>,
        balancer: &dyn ComputeLoadBalancer,
    ) -> Box<dyn ClusterFuture> {
        // Surfaces the load-balancer dependency, per spec.md §4.7, even
        // though a single-process cluster has nowhere else to place it.
        let _picked = balancer.pick(&[]);

        let job: Arc<dyn ComputeJob> = Arc::from(job);
        let done = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let result = Arc::new(Mutex::new(None));

        let job_thread = job.clone();
        let done_thread = done.clone();
        let result_thread = result.clone();
        thread::Builder::new()
            .name("texec-local-worker".into())
            .spawn(move || {
                let outcome = job_thread.call();
                *result_thread.lock().unwrap() = Some(outcome);
                done_thread.store(true, Ordering::Release);
            })
            .expect("failed to spawn local cluster worker thread");

        Box::new(LocalFuture {
            job,
            done,
            cancelled,
            result,
        })
    }
}

/// A load balancer with a single fixed node, useful for tests and
/// single-node deployments.
pub struct FixedNodeBalancer(pub ClusterNodeId);

impl ComputeLoadBalancer for FixedNodeBalancer {
    fn pick(&self, _excluded: &[ClusterNodeId]) -> ClusterNodeId {
        self.0
    }
}

/// The Executor's own handle onto the Cluster Compute Service (`spec.md`
/// §4.7: "owns a Connector to the Cluster Compute Service"). Bundles the
/// compute façade with the load balancer it was injected with, and exposes
/// both submission operations named in `spec.md` §4.7: `execute` for
/// envelope-backed jobs and `call` for generic fire-and-forget callables
/// used by ancillary control tasks.
pub struct ClusterConnector {
    service: Arc<dyn ClusterComputeService>,
    balancer: Arc<dyn ComputeLoadBalancer>,
}

impl ClusterConnector {
    /// Build a connector over `service`, placing every job through
    /// `balancer`.
    pub fn new(service: Arc<dyn ClusterComputeService>, balancer: Arc<dyn ComputeLoadBalancer>) -> Self {
        ClusterConnector { service, balancer }
    }

    /// `execute(envelope) -> ClusterFuture` (`spec.md` §4.7): submit an
    /// already-built job under the connector's load balancer.
    pub fn execute(&self, job: Box<dyn ComputeJob>) -> Box<dyn ClusterFuture> {
        self.service.execute(job, self.balancer.as_ref())
    }

    /// `call(callable) -> ClusterFuture` (`spec.md` §4.7): generic
    /// fire-and-forget submission, used by ancillary control tasks that
    /// have no envelope to wrap.
    pub fn call<F>(&self, callable: F) -> Box<dyn ClusterFuture>
    where
        F: FnOnce() -> Result<TaskOutcome, ExecutionError> + Send + 'static,
    {
        self.execute(Box::new(CallableJob {
            callable: Mutex::new(Some(callable)),
        }))
    }
}

struct CallableJob<F> {
    callable: Mutex<Option<F>>,
}

impl<F> ComputeJob for CallableJob<F>
where
    F: FnOnce() -> Result<TaskOutcome, ExecutionError> + Send,
{
    fn call(&self) -> Result<TaskOutcome, ExecutionError> {
        match self.callable.lock().unwrap().take() {
            Some(callable) => callable(),
            None => Err(ExecutionError::Cancelled),
        }
    }

    fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use texec_dag::ScriptOutcome;

    struct Instant;
    impl ComputeJob for Instant {
        fn call(&self) -> Result<TaskOutcome, ExecutionError> {
            Ok(TaskOutcome::Script(ScriptOutcome {
                exit_status: 0,
                stdout: "stdout".into(),
                stderr: "stderr".into(),
            }))
        }
        fn cancel(&self) {}
    }

    #[test]
    fn local_cluster_runs_a_job_to_completion() {
        let service = LocalClusterComputeService;
        let balancer = FixedNodeBalancer(ClusterNodeId::new());
        let future = service.execute(Box::new(Instant), &balancer);
        for _ in 0..100 {
            if future.is_done() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(future.is_done());
        assert!(future.take_result().unwrap().is_ok());
    }

    #[test]
    fn connector_call_runs_a_generic_callable() {
        let connector = ClusterConnector::new(Arc::new(LocalClusterComputeService), Arc::new(FixedNodeBalancer(ClusterNodeId::new())));
        let future = connector.call(|| {
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
    }
}
