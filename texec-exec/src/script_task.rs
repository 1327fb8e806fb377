use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use texec_codec::TaskAttributes;
use texec_dag::{ScriptOutcome, ScriptSpec, SessionId, TaskOutcome};
use texec_store::LocalCache;

use crate::envelope::{finish_with_unstage, stage, EnvelopeBase, RemoteTaskEnvelope};
use crate::error::ExecutionError;
use crate::wrapper::WrapperBuilder;

const EXIT_FILE: &str = ".command.exit";
const STDOUT_FILE: &str = ".command.out";
const STDERR_FILE: &str = ".command.err";
const TRACE_FILE: &str = ".command.trace";

/// Specialization of [`RemoteTaskEnvelope`] that runs a shell script via a
/// subprocess and returns its exit status (`spec.md` §4.4).
pub struct ScriptTaskEnvelope {
    base: EnvelopeBase,
    spec: ScriptSpec,
    wrapper: Arc<dyn WrapperBuilder>,
    child: Mutex<Option<Child>>,
}

impl ScriptTaskEnvelope {
    /// Build a new script task envelope. `spec.env` is copied, never the
    /// caller's original mapping, so the envelope cannot mutate it
    /// (`spec.md` §4.4).
    pub fn new(
        attributes: &TaskAttributes,
        session_id: SessionId,
        spec: ScriptSpec,
        wrapper: Arc<dyn WrapperBuilder>,
    ) -> Result<Self, ExecutionError> {
        Ok(ScriptTaskEnvelope {
            base: EnvelopeBase::new(attributes, session_id)?,
            spec,
            wrapper,
            child: Mutex::new(None),
        })
    }

    fn run_subprocess(&self, scratch: &Path, name: &str) -> Result<i32, ExecutionError> {
        let launcher = self
            .wrapper
            .build_launcher(&self.spec, scratch)
            .map_err(|err| ExecutionError::process(name, err))?;

        let mut argv = self.spec.shell.clone();
        if argv.is_empty() {
            argv.push("/bin/sh".to_string());
        }
        argv.push(launcher.to_string_lossy().into_owned());

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .current_dir(scratch)
            .envs(&self.spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn subprocess for {name}"))
            .map_err(|err| ExecutionError::process(name, err))?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(&self.spec.stdin);
        }
        let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
        let stdout_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf);
            buf
        });
        let stderr_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf);
            buf
        });

        *self.child.lock().unwrap() = Some(child);

        // `self.child` is only ever cleared after this loop exits (see
        // below), and `cancel()` kills the child in place rather than
        // taking it out of the mutex, so the slot is always occupied here.
        let exit_status = loop {
            let mut guard = self.child.lock().unwrap();
            let child = guard.as_mut().expect("child is only cleared after the wait loop exits");
            if let Some(status) = child
                .try_wait()
                .with_context(|| format!("failed to wait on subprocess for {name}"))
                .map_err(|err| ExecutionError::process(name, err))?
            {
                break status;
            }
            drop(guard);
            thread::sleep(Duration::from_millis(20));
        };
        self.child.lock().unwrap().take();

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        let exit_code = exit_status.code().unwrap_or(-1);

        std::fs::write(scratch.join(STDOUT_FILE), &stdout)
            .with_context(|| "failed to write .command.out".to_string())
            .map_err(|err| ExecutionError::process(name, err))?;
        std::fs::write(scratch.join(STDERR_FILE), &stderr)
            .with_context(|| "failed to write .command.err".to_string())
            .map_err(|err| ExecutionError::process(name, err))?;
        std::fs::write(scratch.join(EXIT_FILE), exit_code.to_string())
            .with_context(|| "failed to write .command.exit".to_string())
            .map_err(|err| ExecutionError::process(name, err))?;

        Ok(exit_code)
    }
}

impl RemoteTaskEnvelope for ScriptTaskEnvelope {
    fn base(&self) -> &EnvelopeBase {
        &self.base
    }

    fn execute0(&self, scratch: &Path, attributes: &TaskAttributes) -> Result<TaskOutcome, ExecutionError> {
        let exit_status = self.run_subprocess(scratch, &attributes.name)?;
        Ok(TaskOutcome::Script(ScriptOutcome {
            exit_status,
            stdout: attributes.work_dir.join(STDOUT_FILE),
            stderr: attributes.work_dir.join(STDERR_FILE),
        }))
    }

    fn cancel(&self) {
        if let Some(child) = self.child.lock().unwrap().as_mut() {
            let _ = child.kill();
        }
    }

    /// Overrides the default lifecycle to add the extension from `spec.md`
    /// §4.4: beyond glob un-staging (still attempted on the exception path,
    /// per `spec.md` §5), always copy the exit-status and stdout files
    /// (required) and the stderr/trace files (optional, missing tolerated)
    /// into the task's shared working directory once execution succeeded.
    fn call(&self, cache: &LocalCache) -> Result<TaskOutcome, ExecutionError> {
        let attributes = self.base().hydrate()?.clone();
        let name = attributes.name.clone();

        let scratch = stage(&attributes, self.base().session_id(), cache)
            .map_err(|err| ExecutionError::process(&name, err))?;

        let outcome = self.execute0(scratch.path(), &attributes);
        let outcome = finish_with_unstage(outcome, scratch.path(), &attributes.target_dir, &attributes.output_files, &name)?;

        copy_script_artifacts(scratch.path(), &attributes.work_dir)
            .map_err(|err| ExecutionError::process(&name, err))?;

        Ok(outcome)
    }
}

fn copy_script_artifacts(scratch: &Path, work_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(work_dir)
        .with_context(|| format!("failed to create working directory at {}", work_dir.display()))?;

    for required in [EXIT_FILE, STDOUT_FILE] {
        std::fs::copy(scratch.join(required), work_dir.join(required))
            .with_context(|| format!("failed to copy required script artifact {required}"))?;
    }
    for optional in [STDERR_FILE, TRACE_FILE] {
        if let Err(err) = std::fs::copy(scratch.join(optional), work_dir.join(optional)) {
            log::warn!("optional script artifact {optional} missing or unreadable: {err}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::ShellWrapperBuilder;
    use std::collections::BTreeMap;
    use texec_dag::TaskId;

    fn attributes(work_dir: std::path::PathBuf, target_dir: std::path::PathBuf) -> TaskAttributes {
        TaskAttributes {
            task_id: TaskId::new(),
            name: "echo-hi".to_string(),
            work_dir,
            target_dir,
            input_files: BTreeMap::new(),
            output_files: vec![],
        }
    }

    #[test]
    fn minimal_script_task_completes_successfully() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path().join("cache"), dir.path().join("scratch"), 1 << 20).unwrap();
        let attrs = attributes(dir.path().join("work"), dir.path().join("target"));

        let spec = ScriptSpec {
            script: "echo hi".to_string(),
            shell: vec!["/bin/sh".to_string()],
            ..Default::default()
        };
        let envelope = ScriptTaskEnvelope::new(&attrs, SessionId::new(), spec, Arc::new(ShellWrapperBuilder)).unwrap();

        let outcome = envelope.call(&cache).unwrap();
        let TaskOutcome::Script(script_outcome) = outcome else {
            panic!("expected a script outcome");
        };
        assert_eq!(script_outcome.exit_status, 0);
        assert!(attrs.work_dir.join(EXIT_FILE).exists());
        assert!(attrs.work_dir.join(STDOUT_FILE).exists());
        assert_eq!(script_outcome.stdout, attrs.work_dir.join(STDOUT_FILE));
    }

    #[test]
    fn nonzero_exit_status_is_reported_without_failing_the_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path().join("cache"), dir.path().join("scratch"), 1 << 20).unwrap();
        let attrs = attributes(dir.path().join("work"), dir.path().join("target"));

        let spec = ScriptSpec {
            script: "exit 7".to_string(),
            shell: vec!["/bin/sh".to_string()],
            ..Default::default()
        };
        let envelope = ScriptTaskEnvelope::new(&attrs, SessionId::new(), spec, Arc::new(ShellWrapperBuilder)).unwrap();

        let outcome = envelope.call(&cache).unwrap();
        let TaskOutcome::Script(script_outcome) = outcome else {
            panic!("expected a script outcome");
        };
        assert_eq!(script_outcome.exit_status, 7);
    }
}
