// Layered check configuration: explicit values, then environment, then built-in tables.
use std::path::PathBuf;

use crate::core::error::Error;
use crate::core::manifest::{Arch, Manifest};

pub const MANIFEST_ENV: &str = "PHYSX_SHIM_MANIFEST";
pub const LOG_ENV: &str = "PHYSX_SHIM_LOG";

/// Explicit values (CLI flags, ABI arguments) always outrank the environment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CheckConfig {
    pub manifest_path: Option<PathBuf>,
    pub arch: Option<Arch>,
    /// Manifest named by `PHYSX_SHIM_MANIFEST`; used only when no explicit value is set.
    pub env_manifest_path: Option<PathBuf>,
}

impl CheckConfig {
    pub fn from_env() -> Self {
        let env_manifest_path = std::env::var_os(MANIFEST_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self {
            env_manifest_path,
            ..Self::default()
        }
    }

    pub fn with_manifest_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.manifest_path = path;
        }
        self
    }

    pub fn with_arch(mut self, arch: Option<Arch>) -> Self {
        if arch.is_some() {
            self.arch = arch;
        }
        self
    }

    /// Explicit manifest file, then explicit arch, then the env manifest, then the built-in
    /// table for this build. A manifest file names its own architecture.
    pub fn manifest(&self) -> Result<Manifest, Error> {
        if let Some(path) = &self.manifest_path {
            return Manifest::load(path);
        }
        if let Some(arch) = self.arch {
            return Ok(Manifest::builtin(arch));
        }
        match &self.env_manifest_path {
            Some(path) => Manifest::load(path),
            None => Ok(Manifest::for_target()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CheckConfig;
    use crate::core::error::ErrorKind;
    use crate::core::manifest::Arch;
    use std::path::PathBuf;

    #[test]
    fn explicit_values_override_and_none_keeps_existing() {
        let config = CheckConfig {
            manifest_path: Some(PathBuf::from("/etc/physx.json")),
            ..CheckConfig::default()
        }
        .with_manifest_path(None)
        .with_arch(Some(Arch::X86));
        assert_eq!(config.manifest_path, Some(PathBuf::from("/etc/physx.json")));
        assert_eq!(config.arch, Some(Arch::X86));
    }

    #[test]
    fn builtin_manifest_follows_requested_arch() {
        let manifest = CheckConfig::default()
            .with_arch(Some(Arch::X86))
            .manifest()
            .expect("manifest");
        assert_eq!(manifest.arch, Arch::X86);
    }

    #[test]
    fn missing_manifest_file_is_io() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = CheckConfig::default()
            .with_manifest_path(Some(dir.path().join("absent.json")))
            .manifest()
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    fn write_manifest(dir: &std::path::Path, arch: &str) -> PathBuf {
        let path = dir.join(format!("{arch}.json"));
        std::fs::write(
            &path,
            format!(r#"{{"arch":"{arch}","libraries":[{{"file":"Only.dll","version":"1.0.0.0"}}]}}"#),
        )
        .expect("write manifest");
        path
    }

    #[test]
    fn explicit_arch_outranks_env_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CheckConfig {
            env_manifest_path: Some(write_manifest(dir.path(), "x64")),
            ..CheckConfig::default()
        }
        .with_manifest_path(None)
        .with_arch(Some(Arch::X86));
        let manifest = config.manifest().expect("manifest");
        assert_eq!(manifest.arch, Arch::X86);
        assert_eq!(manifest.libraries.len(), 5);
    }

    #[test]
    fn env_manifest_applies_without_explicit_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CheckConfig {
            env_manifest_path: Some(write_manifest(dir.path(), "x86")),
            ..CheckConfig::default()
        };
        let manifest = config.manifest().expect("manifest");
        assert_eq!(manifest.arch, Arch::X86);
        assert_eq!(manifest.libraries.len(), 1);
    }

    #[test]
    fn explicit_manifest_outranks_env_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CheckConfig {
            env_manifest_path: Some(dir.path().join("absent.json")),
            ..CheckConfig::default()
        }
        .with_manifest_path(Some(write_manifest(dir.path(), "x64")));
        assert_eq!(config.manifest().expect("manifest").arch, Arch::X64);
    }
}
