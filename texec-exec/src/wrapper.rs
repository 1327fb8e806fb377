use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

use texec_dag::ScriptSpec;

/// Produces the launcher script a script task's `shell` prefix is pointed
/// at (`spec.md` §4.4: "Ask an external *Wrapper Builder* to produce a
/// launcher script"). Treated as opaque and out of scope by `spec.md`;
/// [`ShellWrapperBuilder`] is a minimal implementation kept thin on
/// purpose.
pub trait WrapperBuilder: Send + Sync {
    /// Write a launcher script for `spec` into `scratch_dir`, returning its
    /// path.
    fn build_launcher(&self, spec: &ScriptSpec, scratch_dir: &Path) -> Result<std::path::PathBuf>;
}

const LAUNCHER_NAME: &str = ".command.sh";

/// Writes a `#!/bin/sh` launcher that exports the task's environment and
/// runs the script body, quoting with `shell-words` the way
/// `NGustafson-pants`'s process execution uses `shell-quote` for the same
/// kind of launcher-script construction.
#[derive(Debug, Default)]
pub struct ShellWrapperBuilder;

impl WrapperBuilder for ShellWrapperBuilder {
    fn build_launcher(&self, spec: &ScriptSpec, scratch_dir: &Path) -> Result<std::path::PathBuf> {
        let path = scratch_dir.join(LAUNCHER_NAME);
        let body = render_launcher(spec);
        std::fs::write(&path, body)
            .with_context(|| format!("failed to write launcher script at {}", path.display()))?;
        set_executable(&path)
            .with_context(|| format!("failed to mark launcher script executable at {}", path.display()))?;
        Ok(path)
    }
}

fn render_launcher(spec: &ScriptSpec) -> String {
    let mut lines = vec!["#!/bin/sh".to_string(), "set -e".to_string()];
    for (key, value) in sorted_env(&spec.env) {
        lines.push(format!("export {}={}", key, shell_words::quote(&value)));
    }
    lines.push(spec.script.clone());
    lines.join("\n") + "\n"
}

fn sorted_env(env: &BTreeMap<String, String>) -> impl Iterator<Item = (&String, &String)> {
    env.iter()
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o700);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launcher_exports_environment_and_runs_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = ScriptSpec {
            script: "echo hi".to_string(),
            ..Default::default()
        };
        spec.env.insert("FOO".to_string(), "bar baz".to_string());

        let builder = ShellWrapperBuilder;
        let path = builder.build_launcher(&spec, dir.path()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();

        assert!(contents.contains("export FOO='bar baz'"));
        assert!(contents.trim_end().ends_with("echo hi"));
    }
}
