//! Native library search path setup.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Extra directory to put on the library search path.
pub const LIB_DIR_ENV: &str = "SHAPERUN_LIB_DIR";

/// Variable the platform's dynamic loader searches.
pub fn library_search_var() -> &'static str {
    if cfg!(windows) {
        "PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

/// Directories to prepend: `<exe_dir>/lib` if it exists, then
/// `$SHAPERUN_LIB_DIR` if set.
pub fn library_dirs(exe: Option<&Path>, extra: Option<OsString>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(lib) = exe.and_then(Path::parent).map(|dir| dir.join("lib")) {
        if lib.is_dir() {
            dirs.push(lib);
        }
    }
    if let Some(extra) = extra.filter(|e| !e.is_empty()) {
        dirs.push(PathBuf::from(extra));
    }
    dirs
}

/// `dirs` followed by the entries of `current`, skipping duplicates.
pub fn prepend_search_path(current: Option<OsString>, dirs: &[PathBuf]) -> Option<OsString> {
    let existing: Vec<PathBuf> = current
        .as_deref()
        .map(|value| env::split_paths(value).collect())
        .unwrap_or_default();

    let mut joined: Vec<PathBuf> = Vec::new();
    for dir in dirs.iter().chain(existing.iter()) {
        if !joined.contains(dir) {
            joined.push(dir.clone());
        }
    }
    env::join_paths(joined).ok()
}

/// Augment the library search path once, before any thread is started.
///
/// This matches the Windows `PATH`/DLL-directory setup. On Linux the loader
/// has already read `LD_LIBRARY_PATH`, so only child processes see it.
pub fn setup_environment() {
    let exe = env::current_exe().ok();
    let dirs = library_dirs(exe.as_deref(), env::var_os(LIB_DIR_ENV));
    if dirs.is_empty() {
        return;
    }

    let var = library_search_var();
    match prepend_search_path(env::var_os(var), &dirs) {
        Some(value) => {
            debug!(var, value = ?value, "Augmented library search path");
            env::set_var(var, value);
        }
        None => warn!(var, "Library directory contains a path separator, not added"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exe_lib_dir_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("shaperun-worker");
        assert!(library_dirs(Some(&exe), None).is_empty());

        std::fs::create_dir(dir.path().join("lib")).unwrap();
        assert_eq!(library_dirs(Some(&exe), None), vec![dir.path().join("lib")]);
    }

    #[test]
    fn test_extra_dir_appended() {
        let dirs = library_dirs(None, Some(OsString::from("/opt/occt/lib")));
        assert_eq!(dirs, vec![PathBuf::from("/opt/occt/lib")]);
        assert!(library_dirs(None, Some(OsString::new())).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_prepend_dedups() {
        let dirs = vec![PathBuf::from("/a"), PathBuf::from("/b")];
        let value = prepend_search_path(Some(OsString::from("/b:/c")), &dirs).unwrap();
        assert_eq!(value, OsString::from("/a:/b:/c"));

        let value = prepend_search_path(None, &dirs).unwrap();
        assert_eq!(value, OsString::from("/a:/b"));
    }
}
