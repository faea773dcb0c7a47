//! Purpose: Required native library descriptors per target architecture.
//! Exports: `Arch`, `LibraryDescriptor`, `Manifest`, required version constants.
//! Role: Source of truth for which files the verifier checks and at what version.
//! Invariants: Descriptor order is the check order; the built-in tables never change at runtime.
//! Invariants: File names are bare names, never paths.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::version::FileVersion;

/// Version shared by the core, cooking, loader and character-controller libraries.
pub const PHYSX_DLL_VERSION: FileVersion = FileVersion::new(2, 8, 4, 6);
pub const CUDA_DLL_VERSION: FileVersion = FileVersion::new(6, 14, 11, 3000);
pub const PHYSX_DEVICE_DLL_VERSION: FileVersion = FileVersion::new(9, 10, 513, 0);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X64,
    X86,
}

impl Arch {
    pub fn host() -> Self {
        if cfg!(target_pointer_width = "64") {
            Arch::X64
        } else {
            Arch::X86
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::X86 => "x86",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LibraryDescriptor {
    #[serde(rename = "file")]
    pub file_name: String,
    #[serde(rename = "version")]
    pub required: FileVersion,
}

impl LibraryDescriptor {
    pub fn new(file_name: impl Into<String>, required: FileVersion) -> Self {
        Self {
            file_name: file_name.into(),
            required,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub arch: Arch,
    pub libraries: Vec<LibraryDescriptor>,
}

impl Manifest {
    pub fn new(arch: Arch, libraries: Vec<LibraryDescriptor>) -> Result<Self, Error> {
        let manifest = Self { arch, libraries };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn builtin(arch: Arch) -> Self {
        let libraries = match arch {
            Arch::X64 => vec![
                LibraryDescriptor::new("PhysXCore64.dll", PHYSX_DLL_VERSION),
                LibraryDescriptor::new("PhysXCooking64.dll", PHYSX_DLL_VERSION),
                LibraryDescriptor::new("cudart64_30_9.dll", CUDA_DLL_VERSION),
                LibraryDescriptor::new("PhysXDevice64.dll", PHYSX_DEVICE_DLL_VERSION),
                LibraryDescriptor::new("PhysXLoader64.dll", PHYSX_DLL_VERSION),
                LibraryDescriptor::new("NxCharacter64.dll", PHYSX_DLL_VERSION),
            ],
            Arch::X86 => vec![
                LibraryDescriptor::new("PhysXCore.dll", PHYSX_DLL_VERSION),
                LibraryDescriptor::new("PhysXCooking.dll", PHYSX_DLL_VERSION),
                LibraryDescriptor::new("cudart32_30_9.dll", CUDA_DLL_VERSION),
                LibraryDescriptor::new("PhysXDevice.dll", PHYSX_DEVICE_DLL_VERSION),
                LibraryDescriptor::new("PhysXLoader.dll", PHYSX_DLL_VERSION),
            ],
        };
        Self { arch, libraries }
    }

    pub fn for_target() -> Self {
        Self::builtin(Arch::host())
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to open manifest")
                .with_path(path)
                .with_source(err)
        })?;
        let manifest: Manifest = serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid manifest")
                .with_path(path)
                .with_hint("Expected {\"arch\": \"x64\", \"libraries\": [{\"file\": \"...\", \"version\": \"a.b.c.d\"}]}.")
                .with_source(err)
        })?;
        manifest.validate().map_err(|err| err.with_path(path))?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.libraries.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("manifest lists no libraries"));
        }
        for descriptor in &self.libraries {
            let name = descriptor.file_name.as_str();
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("library file name {name:?} must be a bare file name")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Arch, CUDA_DLL_VERSION, LibraryDescriptor, Manifest, PHYSX_DEVICE_DLL_VERSION,
        PHYSX_DLL_VERSION,
    };
    use crate::core::error::ErrorKind;
    use crate::core::version::FileVersion;

    #[test]
    fn x64_manifest_lists_six_libraries_in_check_order() {
        let manifest = Manifest::builtin(Arch::X64);
        let names = manifest
            .libraries
            .iter()
            .map(|d| d.file_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "PhysXCore64.dll",
                "PhysXCooking64.dll",
                "cudart64_30_9.dll",
                "PhysXDevice64.dll",
                "PhysXLoader64.dll",
                "NxCharacter64.dll",
            ]
        );
        assert_eq!(manifest.libraries[2].required, CUDA_DLL_VERSION);
        assert_eq!(manifest.libraries[3].required, PHYSX_DEVICE_DLL_VERSION);
        assert_eq!(manifest.libraries[5].required, PHYSX_DLL_VERSION);
    }

    #[test]
    fn x86_manifest_has_no_character_library() {
        let manifest = Manifest::builtin(Arch::X86);
        assert_eq!(manifest.libraries.len(), 5);
        assert!(
            manifest
                .libraries
                .iter()
                .all(|d| !d.file_name.starts_with("NxCharacter"))
        );
    }

    #[test]
    fn load_parses_json_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{"arch":"x64","libraries":[{"file":"PhysXDevice64.dll","version":"1.2.3.5"}]}"#,
        )
        .expect("write");
        let manifest = Manifest::load(&path).expect("load");
        assert_eq!(manifest.arch, Arch::X64);
        assert_eq!(
            manifest.libraries,
            vec![LibraryDescriptor::new(
                "PhysXDevice64.dll",
                FileVersion::new(1, 2, 3, 5)
            )]
        );
    }

    #[test]
    fn load_rejects_bad_versions_and_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cases = [
            r#"{"arch":"x64","libraries":[{"file":"a.dll","version":"1.2.3"}]}"#,
            r#"{"arch":"x64","libraries":[{"file":"sub/a.dll","version":"1.2.3.4"}]}"#,
            r#"{"arch":"x64","libraries":[]}"#,
            r#"{"arch":"arm","libraries":[{"file":"a.dll","version":"1.2.3.4"}]}"#,
        ];
        for (index, body) in cases.iter().enumerate() {
            let path = dir.path().join(format!("m{index}.json"));
            std::fs::write(&path, body).expect("write");
            let err = Manifest::load(&path).expect_err(body);
            assert_eq!(err.kind(), ErrorKind::Usage, "{body}");
        }
    }
}
