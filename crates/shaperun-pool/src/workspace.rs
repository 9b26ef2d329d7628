//! Per-task files on disk.
//!
//! For task `<id>` the workspace holds `<id>_code.txt` and `<id>_args.json`
//! while the task is in flight, then `<id>.brep` and/or `<id>.brep.err`
//! until the retention sweep removes them.

use std::fs;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use shaperun_core::{Task, TaskId};
use shaperun_protocol::sidecar_path;
use tracing::{debug, warn};

use crate::error::PoolError;

/// Artifact file extension.
pub const ARTIFACT_EXTENSION: &str = "brep";

/// File locations of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPaths {
    pub task_id: TaskId,
    pub code_path: PathBuf,
    pub args_path: PathBuf,
    pub output_path: PathBuf,
}

impl TaskPaths {
    pub fn sidecar_path(&self) -> PathBuf {
        sidecar_path(&self.output_path)
    }

    /// Contents of the error sidecar, if one was written.
    pub fn read_sidecar(&self) -> Option<String> {
        fs::read_to_string(self.sidecar_path()).ok()
    }

    /// True if a non-empty artifact exists.
    pub fn has_artifact(&self) -> bool {
        fs::metadata(&self.output_path)
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }
}

/// The shared workspace directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open (creating if needed) the workspace at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PoolError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locations for `id`. The id is trusted; see [`Workspace::artifact_path`]
    /// for ids that come from outside.
    pub fn paths_for(&self, id: &TaskId) -> TaskPaths {
        TaskPaths {
            task_id: id.clone(),
            code_path: self.root.join(format!("{}_code.txt", id)),
            args_path: self.root.join(format!("{}_args.json", id)),
            output_path: self
                .root
                .join(format!("{}.{}", id, ARTIFACT_EXTENSION)),
        }
    }

    /// Write the task's script and parameters and reserve its output path.
    ///
    /// The returned guard removes the input files when dropped.
    pub fn materialize(&self, task: &Task) -> Result<MaterializedTask, PoolError> {
        if !task.id.is_path_safe() {
            return Err(PoolError::InvalidTaskId(task.id.to_string()));
        }
        let paths = self.paths_for(&task.id);

        remove_if_present(&paths.output_path)?;
        remove_if_present(&paths.sidecar_path())?;

        // Guard first so a half-written task is still cleaned up.
        let guard = MaterializedTask {
            paths,
            finalized: false,
        };
        fs::write(&guard.paths.code_path, &task.script)?;
        fs::write(&guard.paths.args_path, task.parameters.to_json_string()?)?;

        debug!(task_id = %task.id, "Materialized task");
        Ok(guard)
    }

    /// Remove a task's input files. Missing files are fine.
    pub fn finalize(paths: &TaskPaths) {
        for path in [&paths.code_path, &paths.args_path] {
            if let Err(e) = remove_if_present(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove task input");
            }
        }
    }

    /// Artifact for an externally supplied task id, if present.
    pub fn artifact_path(&self, id: &TaskId) -> Result<Option<PathBuf>, PoolError> {
        if !id.is_path_safe() {
            return Err(PoolError::InvalidTaskId(id.to_string()));
        }
        let paths = self.paths_for(id);
        Ok(paths.has_artifact().then_some(paths.output_path))
    }

    /// Sidecar detail for an externally supplied task id, if present.
    pub fn sidecar(&self, id: &TaskId) -> Result<Option<String>, PoolError> {
        if !id.is_path_safe() {
            return Err(PoolError::InvalidTaskId(id.to_string()));
        }
        Ok(self.paths_for(id).read_sidecar())
    }

    /// Delete workspace files last modified more than `age` ago.
    ///
    /// Returns the number of files removed.
    pub fn reap_older_than(&self, age: Duration) -> Result<usize, PoolError> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            let expired = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|elapsed| elapsed > age);
            if !expired {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to reap file"),
            }
        }

        if removed > 0 {
            debug!(removed, "Reaped expired workspace files");
        }
        Ok(removed)
    }
}

/// RAII guard over a materialized task: inputs are removed on drop.
#[derive(Debug)]
pub struct MaterializedTask {
    paths: TaskPaths,
    finalized: bool,
}

impl MaterializedTask {
    pub fn paths(&self) -> &TaskPaths {
        &self.paths
    }

    /// Finalize now rather than at drop.
    pub fn finish(mut self) {
        self.finalize_once();
    }

    fn finalize_once(&mut self) {
        if !self.finalized {
            Workspace::finalize(&self.paths);
            self.finalized = true;
        }
    }
}

impl Deref for MaterializedTask {
    type Target = TaskPaths;

    fn deref(&self) -> &TaskPaths {
        &self.paths
    }
}

impl Drop for MaterializedTask {
    fn drop(&mut self) {
        self.finalize_once();
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaperun_core::Parameters;

    fn task(id: &str) -> Task {
        Task::new("result = box(1, 1, 1)", Parameters::new().with("h", 2.0))
            .with_id(TaskId::new(id))
    }

    #[test]
    fn test_materialize_layout() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path().join("ws")).unwrap();

        let guard = ws.materialize(&task("t1")).unwrap();
        assert_eq!(guard.code_path, ws.root().join("t1_code.txt"));
        assert_eq!(guard.output_path, ws.root().join("t1.brep"));
        assert_eq!(fs::read_to_string(&guard.code_path).unwrap(), "result = box(1, 1, 1)");
        assert_eq!(fs::read_to_string(&guard.args_path).unwrap(), r#"{"h":2.0}"#);
        assert!(!guard.output_path.exists());
    }

    #[test]
    fn test_materialize_clears_stale_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let paths = ws.paths_for(&TaskId::new("t1"));
        fs::write(&paths.output_path, "old").unwrap();
        fs::write(paths.sidecar_path(), "old").unwrap();

        let _guard = ws.materialize(&task("t1")).unwrap();
        assert!(!paths.output_path.exists());
        assert!(!paths.sidecar_path().exists());
    }

    #[test]
    fn test_guard_finalizes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();

        let guard = ws.materialize(&task("t1")).unwrap();
        let paths = guard.paths().clone();
        fs::write(&paths.output_path, "artifact").unwrap();
        drop(guard);

        assert!(!paths.code_path.exists());
        assert!(!paths.args_path.exists());
        assert!(paths.output_path.exists());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();

        let guard = ws.materialize(&task("t1")).unwrap();
        let paths = guard.paths().clone();
        guard.finish();
        Workspace::finalize(&paths);
        Workspace::finalize(&paths);
        assert!(!paths.code_path.exists());
    }

    #[test]
    fn test_guard_finalizes_on_panic() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let paths = ws.paths_for(&TaskId::new("t1"));

        let result = std::panic::catch_unwind(|| {
            let _guard = ws.materialize(&task("t1")).unwrap();
            panic!("dispatch blew up");
        });
        assert!(result.is_err());
        assert!(!paths.code_path.exists());
    }

    #[test]
    fn test_unsafe_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();

        assert!(matches!(
            ws.artifact_path(&TaskId::new("../etc/passwd")),
            Err(PoolError::InvalidTaskId(_))
        ));
        assert!(ws.materialize(&task("a/b")).is_err());
        assert_eq!(ws.artifact_path(&TaskId::new("missing")).unwrap(), None);
    }

    #[test]
    fn test_reap() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let paths = ws.paths_for(&TaskId::new("t1"));
        fs::write(&paths.output_path, "artifact").unwrap();
        fs::write(paths.sidecar_path(), "detail").unwrap();

        assert_eq!(ws.reap_older_than(Duration::from_secs(3600)).unwrap(), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ws.reap_older_than(Duration::ZERO).unwrap(), 2);
        assert!(!paths.output_path.exists());
    }
}
