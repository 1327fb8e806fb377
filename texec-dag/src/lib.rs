//! Data model shared by the task executor: task runs, task ids, and the
//! small DAG type used to render the workflow graph.
//!
//! This crate intentionally stays free of I/O: staging, execution and
//! rendering to disk live in `texec-store`/`texec-exec`, this crate only
//! owns the shapes those crates pass around.

mod dag;
mod ids;
mod render;
mod task;

pub use dag::{Dag, Edge, Vertex, VertexKind};
pub use ids::{ClusterNodeId, SessionId, TaskId};
pub use render::render;
pub use task::{
    ClosureOutcome, ClosureSpec, ScriptOutcome, ScriptSpec, TaskFailure, TaskKind, TaskOutcome,
    TaskRun,
};
