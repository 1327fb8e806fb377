use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

/// A freshly created scratch directory for one envelope execution
/// (`spec.md` §3). Deleted on `Drop`, mirroring
/// `task-maker-store::FileStoreHandle`'s RAII lifetime management, adapted
/// from refcounted retention to unconditional cleanup since a scratch
/// directory is never shared between executions.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub(crate) fn new(scratch_root: &Path) -> Result<Self> {
        let path = scratch_root.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create scratch directory at {}", path.display()))?;
        Ok(ScratchDir { path })
    }

    /// The directory's path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.path) {
            log::warn!("failed to remove scratch directory {}: {err}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_and_removes_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchDir::new(root.path()).unwrap();
            assert!(scratch.path().exists());
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn distinct_calls_get_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let a = ScratchDir::new(root.path()).unwrap();
        let b = ScratchDir::new(root.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
