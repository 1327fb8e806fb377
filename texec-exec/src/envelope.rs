use std::path::Path;
use std::sync::OnceLock;

use glob::Pattern;
use texec_codec::{AttributeCodec, Codec, TaskAttributes};
use texec_dag::{SessionId, TaskOutcome};
use texec_store::{LocalCache, ScratchDir};

use crate::error::ExecutionError;

/// Submitter-constructed, worker-decoded envelope state shared by every
/// task kind (`spec.md` §4.3): the attribute blob plus the session id,
/// immutable once built. The live attribute map is decoded from `payload`
/// on first access and cached, matching the "decode on first access"
/// invariant without re-decoding on every call.
pub struct EnvelopeBase {
    payload: Vec<u8>,
    session_id: SessionId,
    attributes: OnceLock<TaskAttributes>,
}

impl EnvelopeBase {
    /// Build a new envelope base, encoding `attributes` via the Task
    /// Payload Codec. Only the blob is retained beyond construction; the
    /// attribute map itself is discarded until `hydrate()` decodes it
    /// again, per `spec.md` §4.3's "attribute map is discarded from wire
    /// representation" note.
    pub fn new(attributes: &TaskAttributes, session_id: SessionId) -> Result<Self, ExecutionError> {
        let payload = AttributeCodec::serialize(attributes)?;
        Ok(EnvelopeBase {
            payload,
            session_id,
            attributes: OnceLock::new(),
        })
    }

    /// Decode and cache the attribute map if this is the first access.
    pub fn hydrate(&self) -> Result<&TaskAttributes, ExecutionError> {
        if let Some(attrs) = self.attributes.get() {
            return Ok(attrs);
        }
        let decoded = AttributeCodec::deserialize(&self.payload)?;
        Ok(self.attributes.get_or_init(|| decoded))
    }

    /// The session this envelope executes under.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}

/// Worker-side execution lifecycle shared by every task kind (`spec.md`
/// §4.3): hydrate, stage, execute, un-stage. `stage`/`unstage` are provided
/// default methods; only `execute0` and (optionally) `cancel` are
/// kind-specific.
pub trait RemoteTaskEnvelope {
    /// Access the shared envelope state.
    fn base(&self) -> &EnvelopeBase;

    /// Run the kind-specific work inside the already-staged `scratch`
    /// directory.
    fn execute0(&self, scratch: &Path, attributes: &TaskAttributes) -> Result<TaskOutcome, ExecutionError>;

    /// Request cancellation of any in-flight work. Default is a no-op
    /// (`spec.md` §4.3); closure tasks never override this, script tasks
    /// do (§4.4).
    fn cancel(&self) {}

    /// Run the full lifecycle: hydrate, stage, execute, un-stage.
    fn call(&self, cache: &LocalCache) -> Result<TaskOutcome, ExecutionError> {
        let attributes = self.base().hydrate()?.clone();
        let name = attributes.name.clone();

        let scratch = stage(&attributes, self.base().session_id(), cache)
            .map_err(|err| ExecutionError::process(&name, err))?;

        let outcome = self.execute0(scratch.path(), &attributes);
        finish_with_unstage(outcome, scratch.path(), &attributes.target_dir, &attributes.output_files, &name)
    }
}

/// Resolve an `execute0` outcome against the attempted un-stage (`spec.md`
/// §5 Cancellation: "the envelope's `call()` must still attempt un-staging
/// on the exception path iff stage completed"). Un-staging always runs once
/// staging has succeeded, regardless of whether `outcome` is an error; on
/// the success path a failed un-stage is promoted to a fatal error, on the
/// failure path it is only logged, since the original failure is the more
/// informative one to surface.
pub(crate) fn finish_with_unstage(
    outcome: Result<TaskOutcome, ExecutionError>,
    scratch: &Path,
    target_dir: &Path,
    patterns: &[String],
    name: &str,
) -> Result<TaskOutcome, ExecutionError> {
    let unstage_outcome = unstage(scratch, target_dir, patterns);
    match outcome {
        Ok(outcome) => {
            unstage_outcome.map_err(|err| ExecutionError::process(name, err))?;
            Ok(outcome)
        }
        Err(err) => {
            if let Err(unstage_err) = unstage_outcome {
                log::warn!("un-stage after execute failure for {name} also failed: {unstage_err}");
            }
            Err(err)
        }
    }
}

/// Create a fresh scratch directory and symlink every declared input into
/// it from the Local Cache (`spec.md` §4.3 step 2). Symlinks, never
/// copies: identical inputs across parallel tasks on the same worker share
/// storage.
pub(crate) fn stage(attributes: &TaskAttributes, session_id: SessionId, cache: &LocalCache) -> anyhow::Result<ScratchDir> {
    let scratch = cache.scratch_dir()?;
    for (logical_name, source) in &attributes.input_files {
        let cached_path = cache.get_local_cache_path(source, session_id)?;
        let link_path = scratch.path().join(logical_name);
        if let Some(parent) = link_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        symlink(&cached_path, &link_path)?;
    }
    Ok(scratch)
}

/// Ensure `target_dir` exists, then copy every scratch file matching one of
/// `patterns` into it, preserving its scratch-relative path (`spec.md`
/// §4.3 step 4). A pattern containing `**` only matches regular files;
/// otherwise any entry matches. Unmatched patterns are not fatal; per-file
/// copy failures are logged, not propagated.
pub(crate) fn unstage(scratch: &Path, target_dir: &Path, patterns: &[String]) -> anyhow::Result<()> {
    std::fs::create_dir_all(target_dir)?;
    for pattern in patterns {
        let restrict_to_files = pattern.contains("**");
        let glob_pattern = Pattern::new(pattern)?;
        for entry in walkdir::WalkDir::new(scratch).into_iter().filter_map(Result::ok) {
            let relative = match entry.path().strip_prefix(scratch) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            if relative.as_os_str().is_empty() {
                continue;
            }
            if restrict_to_files && !entry.file_type().is_file() {
                continue;
            }
            if !glob_pattern.matches_path(relative) {
                continue;
            }
            let destination = target_dir.join(relative);
            if let Some(parent) = destination.parent() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    log::warn!("failed to create {}: {err}", parent.display());
                    continue;
                }
            }
            if let Err(err) = std::fs::copy(entry.path(), &destination) {
                log::warn!("failed to copy {} to {}: {err}", entry.path().display(), destination.display());
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}
