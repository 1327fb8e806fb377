//! The Local Cache (`spec.md` §4.2): a single per-process worker-local
//! directory where input files are materialized once per `(sessionId,
//! source path)` pair, plus the Scratch Directory (`spec.md` §3) guard each
//! envelope execution stages into.
//!
//! Grounded on `task-maker-store::FileStore`: a lazily created base
//! directory, process-exclusive locking, and a handle whose `Drop` governs
//! lifetime, adapted from a content-addressed file store to a
//! session-keyed materialization cache.

mod cache;
mod scratch;

pub use cache::LocalCache;
pub use scratch::ScratchDir;
