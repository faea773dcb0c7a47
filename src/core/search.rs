//! Purpose: Ordered candidate-directory scan for native library files.
//! Exports: `SearchPlan`, `SearchDir`, `SearchOrigin`, `Resolved`, `FileProbe`, `OsFileProbe`.
//! Role: Pure (plan, file name) -> path resolution over an injectable file probe.
//! Invariants: Priority is program image, system dir, WINDIR, cwd, then PATH entries in order.
//! Invariants: The first existing file wins; later candidates are never probed.
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::core::host::{HostEnv, sanitize_env_value, split_path_list};

pub trait FileProbe {
    fn is_file(&self, path: &Path) -> bool;
}

/// Probes the real filesystem. Unreadable candidates count as absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFileProbe;

impl FileProbe for OsFileProbe {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

impl<P: FileProbe + ?Sized> FileProbe for &P {
    fn is_file(&self, path: &Path) -> bool {
        (**self).is_file(path)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchOrigin {
    ProgramImage,
    SystemDirectory,
    WindowsDirectory,
    CurrentDirectory,
    PathEntry { index: usize },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SearchDir {
    pub origin: SearchOrigin,
    pub dir: PathBuf,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Resolved {
    pub path: PathBuf,
    pub origin: SearchOrigin,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SearchPlan {
    dirs: Vec<SearchDir>,
}

impl SearchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_host(host: &HostEnv) -> Self {
        let mut plan = Self::new();
        plan.push(SearchOrigin::ProgramImage, host.program_dir.clone());
        if let Some(dir) = &host.system_dir {
            plan.push(SearchOrigin::SystemDirectory, dir.clone());
        }
        if let Some(raw) = &host.windows_dir {
            let value = sanitize_env_value(raw);
            if !value.is_empty() {
                plan.push(SearchOrigin::WindowsDirectory, PathBuf::from(value));
            }
        }
        if let Some(dir) = &host.current_dir {
            plan.push(SearchOrigin::CurrentDirectory, dir.clone());
        }
        if let Some(raw) = &host.path_var {
            for (index, dir) in split_path_list(raw, host.path_separator).into_iter().enumerate() {
                plan.push(SearchOrigin::PathEntry { index }, dir);
            }
        }
        plan
    }

    pub fn push(&mut self, origin: SearchOrigin, dir: impl Into<PathBuf>) {
        self.dirs.push(SearchDir {
            origin,
            dir: dir.into(),
        });
    }

    pub fn with_dir(mut self, origin: SearchOrigin, dir: impl Into<PathBuf>) -> Self {
        self.push(origin, dir);
        self
    }

    pub fn dirs(&self) -> &[SearchDir] {
        &self.dirs
    }

    pub fn resolve<P: FileProbe>(&self, probe: &P, file_name: &str) -> Option<Resolved> {
        self.dirs.iter().find_map(|candidate| {
            let path = candidate.dir.join(file_name);
            if probe.is_file(&path) {
                debug!(file = file_name, path = %path.display(), origin = ?candidate.origin, "resolved library");
                Some(Resolved {
                    path,
                    origin: candidate.origin,
                })
            } else {
                debug!(file = file_name, path = %path.display(), "library not in candidate directory");
                None
            }
        })
    }
}
