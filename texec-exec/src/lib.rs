//! Everything downstream of a `TaskRun` reaching the executor (`spec.md`
//! §4.3-§4.8): the envelope lifecycle, its script and closure
//! specializations, the submitter-side handler state machine, the
//! executor/polling monitor, and the external collaborators (cluster
//! compute service, wrapper builder) modeled as traits.

mod closure_task;
mod cluster;
mod config;
mod envelope;
mod error;
mod executor;
mod handler;
mod script_task;
mod wrapper;

pub use closure_task::ClosureTaskEnvelope;
pub use cluster::{
    ClassLoaderProvider, ClusterComputeService, ClusterConnector, ClusterFuture, ComputeJob, ComputeLoadBalancer,
    FixedNodeBalancer, LocalClusterComputeService,
};
pub use config::ExecutorConfig;
pub use envelope::{EnvelopeBase, RemoteTaskEnvelope};
pub use error::ExecutionError;
pub use executor::{Executor, PollingMonitor};
pub use handler::{HandlerState, TaskHandler};
pub use script_task::ScriptTaskEnvelope;
pub use wrapper::{ShellWrapperBuilder, WrapperBuilder};
