//! Purpose: Snapshot the host facts that anchor library resolution.
//! Exports: `HostEnv`, `sanitize_env_value`, `split_path_list`, `anchor_dir`, `PATH_LIST_SEPARATOR`.
//! Role: The only place that reads process environment for the verifier.
//! Invariants: Environment values are stripped of quotes and trimmed before use.
//! Invariants: Missing program-image context is a `Configuration` error, never "missing library".
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};

#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: char = ':';

/// Raw inputs for a [`SearchPlan`](crate::core::search::SearchPlan), captured once per check.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HostEnv {
    pub program_dir: PathBuf,
    pub system_dir: Option<PathBuf>,
    pub windows_dir: Option<String>,
    pub current_dir: Option<PathBuf>,
    pub path_var: Option<String>,
    pub path_separator: char,
}

impl HostEnv {
    pub fn new(program_dir: impl Into<PathBuf>) -> Self {
        Self {
            program_dir: program_dir.into(),
            system_dir: None,
            windows_dir: None,
            current_dir: None,
            path_var: None,
            path_separator: PATH_LIST_SEPARATOR,
        }
    }

    pub fn capture() -> Result<Self, Error> {
        let program_dir = anchor_dir(std::env::current_exe().ok(), module_image_path())?;
        let current_dir = std::env::current_dir().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read current directory")
                .with_source(err)
        })?;
        Ok(Self {
            program_dir,
            system_dir: system_dir(),
            windows_dir: env_string("WINDIR"),
            current_dir: Some(current_dir),
            path_var: env_string("PATH"),
            path_separator: PATH_LIST_SEPARATOR,
        })
    }
}

pub fn sanitize_env_value(raw: &str) -> String {
    raw.replace(['"', '\''], "").trim().to_string()
}

pub fn split_path_list(raw: &str, separator: char) -> Vec<PathBuf> {
    sanitize_env_value(raw)
        .split(separator)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Directory of the entry image, else of the module hosting this crate.
pub fn anchor_dir(entry: Option<PathBuf>, module: Option<PathBuf>) -> Result<PathBuf, Error> {
    entry
        .as_deref()
        .and_then(Path::parent)
        .or_else(|| module.as_deref().and_then(Path::parent))
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            Error::new(ErrorKind::Configuration)
                .with_message("could not find a suitable program image to anchor library lookup")
        })
}

fn env_string(name: &str) -> Option<String> {
    std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
}

#[cfg(windows)]
fn system_dir() -> Option<PathBuf> {
    ["SystemRoot", "WINDIR"]
        .into_iter()
        .filter_map(env_string)
        .map(|value| sanitize_env_value(&value))
        .find(|value| !value.is_empty())
        .map(|root| PathBuf::from(root).join("System32"))
}

#[cfg(not(windows))]
fn system_dir() -> Option<PathBuf> {
    Some(PathBuf::from("/usr/lib"))
}

#[cfg(unix)]
fn module_image_path() -> Option<PathBuf> {
    use std::ffi::CStr;
    use std::os::unix::ffi::OsStrExt;

    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    let anchor = module_image_path as *const libc::c_void;
    let found = unsafe { libc::dladdr(anchor, &mut info) };
    if found == 0 || info.dli_fname.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(info.dli_fname) };
    Some(PathBuf::from(std::ffi::OsStr::from_bytes(name.to_bytes())))
}

#[cfg(not(unix))]
fn module_image_path() -> Option<PathBuf> {
    None
}
