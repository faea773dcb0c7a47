//! Purpose: Verify required native libraries are present at their exact versions.
//! Exports: `Verifier`, `VersionSource`, `ImageVersionSource`, `CheckReport`, `LibraryCheck`,
//! `SurveyReport`, `SurveyEntry`, `SurveyStatus`.
//! Role: Startup gate run once before any native-backed wrapper is constructed.
//! Invariants: `check` is sequential and halts at the first failing descriptor.
//! Invariants: Only a not-found resolution becomes `MissingLibrary`; read errors pass through unchanged.
//! Invariants: Version comparison is exact equality of all four parts.
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::core::config::CheckConfig;
use crate::core::error::{Error, ErrorKind, missing_library, version_mismatch};
use crate::core::host::HostEnv;
use crate::core::image::read_image_info;
use crate::core::manifest::{Arch, LibraryDescriptor, Manifest};
use crate::core::search::{FileProbe, OsFileProbe, SearchOrigin, SearchPlan};
use crate::core::version::FileVersion;

pub trait VersionSource {
    fn file_version(&self, path: &Path) -> Result<FileVersion, Error>;

    fn fingerprint(&self, _path: &Path) -> Option<String> {
        None
    }
}

impl<V: VersionSource + ?Sized> VersionSource for &V {
    fn file_version(&self, path: &Path) -> Result<FileVersion, Error> {
        (**self).file_version(path)
    }

    fn fingerprint(&self, path: &Path) -> Option<String> {
        (**self).fingerprint(path)
    }
}

/// Reads versions from PE version resources on disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageVersionSource;

impl VersionSource for ImageVersionSource {
    fn file_version(&self, path: &Path) -> Result<FileVersion, Error> {
        Ok(read_image_info(path)?.file_version)
    }

    fn fingerprint(&self, path: &Path) -> Option<String> {
        sha256_file(path).ok()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LibraryCheck {
    pub file: String,
    pub path: PathBuf,
    pub origin: SearchOrigin,
    pub version: FileVersion,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CheckReport {
    pub arch: Arch,
    pub libraries: Vec<LibraryCheck>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStatus {
    Ok,
    Missing,
    VersionMismatch,
    Unreadable,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SurveyEntry {
    pub file: String,
    pub required: FileVersion,
    pub status: SurveyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<SearchOrigin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<FileVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Kind of the failure `check` would have raised for this entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SurveyReport {
    pub arch: Arch,
    pub ok: bool,
    pub entries: Vec<SurveyEntry>,
}

impl SurveyReport {
    pub fn failures(&self) -> impl Iterator<Item = &SurveyEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.status != SurveyStatus::Ok)
    }
}

pub struct Verifier<P = OsFileProbe, V = ImageVersionSource> {
    plan: SearchPlan,
    probe: P,
    versions: V,
}

impl Verifier {
    /// Builds a verifier over the real filesystem for the current process.
    pub fn for_host() -> Result<Self, Error> {
        let host = HostEnv::capture()?;
        Ok(Self::new(SearchPlan::from_host(&host), OsFileProbe, ImageVersionSource))
    }
}

impl<P: FileProbe, V: VersionSource> Verifier<P, V> {
    pub fn new(plan: SearchPlan, probe: P, versions: V) -> Self {
        Self {
            plan,
            probe,
            versions,
        }
    }

    pub fn plan(&self) -> &SearchPlan {
        &self.plan
    }

    pub fn check_library(&self, descriptor: &LibraryDescriptor) -> Result<LibraryCheck, Error> {
        let name = descriptor.file_name.as_str();
        let resolved = self
            .plan
            .resolve(&self.probe, name)
            .ok_or_else(|| missing_library(name))?;
        let version = self.versions.file_version(&resolved.path)?;
        if version != descriptor.required {
            return Err(version_mismatch(name, version, descriptor.required)
                .with_path(resolved.path));
        }
        debug!(file = name, version = %version, "library version ok");
        Ok(LibraryCheck {
            file: descriptor.file_name.clone(),
            path: resolved.path,
            origin: resolved.origin,
            version,
        })
    }

    pub fn check(&self, manifest: &Manifest) -> Result<CheckReport, Error> {
        let libraries = manifest
            .libraries
            .iter()
            .map(|descriptor| self.check_library(descriptor))
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            arch = manifest.arch.as_str(),
            count = libraries.len(),
            "native libraries verified"
        );
        Ok(CheckReport {
            arch: manifest.arch,
            libraries,
        })
    }

    /// Evaluates every descriptor without halting; for diagnostics only.
    pub fn survey(&self, manifest: &Manifest) -> SurveyReport {
        let entries = manifest
            .libraries
            .iter()
            .map(|descriptor| self.survey_library(descriptor))
            .collect::<Vec<_>>();
        let ok = entries.iter().all(|entry| entry.status == SurveyStatus::Ok);
        SurveyReport {
            arch: manifest.arch,
            ok,
            entries,
        }
    }

    fn survey_library(&self, descriptor: &LibraryDescriptor) -> SurveyEntry {
        let mut entry = SurveyEntry {
            file: descriptor.file_name.clone(),
            required: descriptor.required,
            status: SurveyStatus::Missing,
            path: None,
            origin: None,
            found: None,
            sha256: None,
            error: None,
            error_kind: Some(ErrorKind::MissingLibrary),
        };
        let Some(resolved) = self.plan.resolve(&self.probe, &descriptor.file_name) else {
            entry.error = missing_library(&descriptor.file_name)
                .message()
                .map(str::to_string);
            return entry;
        };
        entry.sha256 = self.versions.fingerprint(&resolved.path);
        entry.origin = Some(resolved.origin);
        match self.versions.file_version(&resolved.path) {
            Ok(version) if version == descriptor.required => {
                entry.status = SurveyStatus::Ok;
                entry.found = Some(version);
                entry.error_kind = None;
            }
            Ok(version) => {
                entry.status = SurveyStatus::VersionMismatch;
                entry.found = Some(version);
                entry.error_kind = Some(ErrorKind::VersionMismatch);
                entry.error = version_mismatch(&descriptor.file_name, version, descriptor.required)
                    .message()
                    .map(str::to_string);
            }
            Err(err) => {
                entry.status = SurveyStatus::Unreadable;
                entry.error = Some(err.to_string());
                entry.error_kind = Some(err.kind());
            }
        }
        entry.path = Some(resolved.path);
        entry
    }
}

/// Runs the startup check for this process: `PHYSX_SHIM_MANIFEST` if set, else the
/// built-in manifest for this build.
pub fn check() -> Result<CheckReport, Error> {
    let manifest = CheckConfig::from_env().manifest()?;
    Verifier::for_host()?.check(&manifest)
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}
