use std::collections::HashMap;
use std::path::{Path, PathBuf};

use hana_types::{HanaError, Result};

/// Finds external executables.
///
/// Explicit per-tool paths win when they point at an executable; otherwise
/// the search directories are tried in order.
#[derive(Debug, Clone, Default)]
pub struct ToolLocator {
    search_dirs: Vec<PathBuf>,
    overrides: HashMap<String, PathBuf>,
}

impl ToolLocator {
    /// A locator with no search directories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Search the running executable's directory, then `$PATH`.
    pub fn from_env() -> Self {
        let mut dirs = Vec::new();
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            dirs.push(exe_dir);
        }
        if let Some(path) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&path));
        }
        Self {
            search_dirs: dirs,
            overrides: HashMap::new(),
        }
    }

    /// Put `dirs` ahead of the existing search directories.
    pub fn with_search_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut merged: Vec<PathBuf> = dirs.into_iter().collect();
        merged.append(&mut self.search_dirs);
        self.search_dirs = merged;
        self
    }

    pub fn with_override(mut self, tool: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(tool.into(), path.into());
        self
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    pub fn find(&self, tool: &str) -> Option<PathBuf> {
        if let Some(explicit) = self.overrides.get(tool) {
            if is_executable(explicit) {
                return Some(explicit.clone());
            }
            tracing::warn!(
                tool,
                path = %explicit.display(),
                "Configured tool path is not executable, searching instead"
            );
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(tool))
            .find(|candidate| is_executable(candidate))
    }

    pub fn require(&self, tool: &str) -> Result<PathBuf> {
        self.find(tool).ok_or_else(|| HanaError::ToolNotFound {
            tool: tool.to_string(),
        })
    }
}

/// A regular file this process may execute.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;

    if !path.is_file() {
        return false;
    }
    let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 }
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}
