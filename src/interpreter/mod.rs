//! Python interpreter discovery.
//!
//! Candidates are checked in a fixed order: an explicit override, the
//! conventional install locations for each supported version, then every
//! directory on `PATH`. The first existing file wins.

use std::{
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use directories::BaseDirs;
use tracing::debug;

/// Minor versions of Python 3 probed in the fixed install locations.
const VERSIONS: &[u32] = &[9, 10, 11, 12, 13];

#[derive(Debug, Clone, Default)]
pub struct InterpreterLocator {
    explicit: Option<PathBuf>,
    candidates: Vec<PathBuf>,
    search_path: Option<OsString>,
    binary_names: Vec<&'static str>,
}

impl InterpreterLocator {
    /// Locator for the current platform and environment.
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        Self::new(default_candidates(), env::var_os("PATH")).with_explicit(explicit)
    }

    pub fn new(candidates: Vec<PathBuf>, search_path: Option<OsString>) -> Self {
        Self {
            explicit: None,
            candidates,
            search_path,
            binary_names: default_binary_names(),
        }
    }

    pub fn with_explicit(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    #[cfg(test)]
    pub fn with_binary_names(mut self, names: Vec<&'static str>) -> Self {
        self.binary_names = names;
        self
    }

    /// Return the first interpreter that exists, or `None`.
    pub fn find(&self) -> Option<PathBuf> {
        if let Some(p) = self.explicit.as_deref().filter(|p| is_file(p)) {
            debug!(path = %p.display(), "using configured interpreter");
            return Some(p.to_path_buf());
        }

        if let Some(p) = self.candidates.iter().find(|p| is_file(p)) {
            debug!(path = %p.display(), "found interpreter in install location");
            return Some(p.clone());
        }

        let dirs = self.search_path.as_ref()?;
        for dir in env::split_paths(dirs) {
            if dir.as_os_str().is_empty() {
                continue;
            }
            for name in &self.binary_names {
                let candidate = dir.join(name);
                if is_file(&candidate) {
                    debug!(path = %candidate.display(), "found interpreter on PATH");
                    return Some(candidate);
                }
            }
        }
        None
    }
}

// Unreadable or malformed entries count as "not here".
fn is_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn default_binary_names() -> Vec<&'static str> {
    if cfg!(windows) {
        vec!["python.exe"]
    } else {
        vec!["python3", "python"]
    }
}

/// Conventional per-version install locations, in probe order.
pub fn default_candidates() -> Vec<PathBuf> {
    if cfg!(windows) {
        let program_files = env::var_os("ProgramFiles")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"));
        let local = BaseDirs::new().map(|b| b.data_local_dir().to_path_buf());
        windows_candidates(&program_files, local.as_deref())
    } else {
        unix_candidates()
    }
}

fn windows_candidates(program_files: &Path, local_app_data: Option<&Path>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for minor in VERSIONS {
        let dir = format!("Python3{minor}");
        out.push(program_files.join(&dir).join("python.exe"));
        if let Some(local) = local_app_data {
            out.push(
                local
                    .join("Programs")
                    .join("Python")
                    .join(&dir)
                    .join("python.exe"),
            );
        }
    }
    out
}

fn unix_candidates() -> Vec<PathBuf> {
    let mut out = Vec::new();
    for minor in VERSIONS {
        let name = format!("python3.{minor}");
        out.push(Path::new("/usr/local/bin").join(&name));
        out.push(Path::new("/usr/bin").join(&name));
    }
    out.push(PathBuf::from("/usr/local/bin/python3"));
    out.push(PathBuf::from("/usr/bin/python3"));
    out
}
