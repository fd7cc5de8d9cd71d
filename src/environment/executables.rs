//! Engine Executable Resolution
//!
//! Engine executables are resolved in the following order:
//! 1. Environment override: `DOCKRUNNER_<NAME>_EXEC`
//! 2. System PATH

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use log::{debug, warn};

/// Name of the environment variable overriding an executable's location.
///
/// ```
/// use dockrunner::environment::executables::override_var;
///
/// assert_eq!(override_var("cns"), "DOCKRUNNER_CNS_EXEC");
/// ```
pub fn override_var(name: &str) -> String {
    let upper: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("DOCKRUNNER_{}_EXEC", upper)
}

/// Resolves an engine executable, or `None` if it cannot be found.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let var = override_var(name);
    if let Some(value) = env::var_os(&var) {
        let path = PathBuf::from(value);
        if is_executable(&path) {
            debug!("Using {} from {}: {}", name, var, path.display());
            return Some(path);
        }
        warn!(
            "{} points to '{}', which is not an executable file",
            var,
            path.display()
        );
    }

    let search = env::var_os("PATH")?;
    find_in_paths(name, &search)
}

/// Searches a PATH-style list of directories for an executable.
pub fn find_in_paths(name: &str, paths: &OsStr) -> Option<PathBuf> {
    env::split_paths(paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
