//! Purpose: Single structured error type shared by the verifier, image reader, and lifecycle.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`, `missing_library`, `version_mismatch`.
//! Role: Carry kind plus optional context; callers decide how to render it.
//! Invariants: Exit codes per kind are stable once published.
//! Invariants: Sources are preserved untouched; no kind is rewritten after construction.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::version::FileVersion;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Internal,
    Usage,
    MissingLibrary,
    VersionMismatch,
    Configuration,
    Corrupt,
    Io,
    Observer,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    library: Option<String>,
    found: Option<FileVersion>,
    required: Option<FileVersion>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            library: None,
            found: None,
            required: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn library(&self) -> Option<&str> {
        self.library.as_deref()
    }

    pub fn found(&self) -> Option<FileVersion> {
        self.found
    }

    pub fn required(&self) -> Option<FileVersion> {
        self.required
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    pub fn with_versions(mut self, found: FileVersion, required: FileVersion) -> Self {
        self.found = Some(found);
        self.required = Some(required);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_boxed_source(mut self, source: Box<dyn StdError + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn missing_library(file_name: &str) -> Error {
    Error::new(ErrorKind::MissingLibrary)
        .with_library(file_name)
        .with_message(format!("PhysX library \"{file_name}\" is missing."))
        .with_hint("Install the PhysX system software or place the library next to the executable.")
}

pub fn version_mismatch(file_name: &str, found: FileVersion, required: FileVersion) -> Error {
    Error::new(ErrorKind::VersionMismatch)
        .with_library(file_name)
        .with_versions(found, required)
        .with_message(format!(
            "PhysX library \"{file_name}\" is not the correct version. Given: {found}. Required: {required}."
        ))
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::MissingLibrary => 3,
        ErrorKind::VersionMismatch => 4,
        ErrorKind::Configuration => 5,
        ErrorKind::Corrupt => 6,
        ErrorKind::Io => 7,
        ErrorKind::Observer => 8,
    }
}
