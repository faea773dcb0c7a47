//! Purpose: Hold top-level CLI command dispatch for the `physx-shim` binary.
//! Role: Keeps `main.rs` focused on parsing, error emission, and process exit.
//! Invariants: Every command writes exactly one JSON document to stdout.
use super::*;

use physx_shim::api::{
    CheckConfig, HostEnv, ImageVersionSource, OsFileProbe, SearchPlan, Verifier,
    VersionSource, read_image_info,
};

pub(super) fn dispatch_command(
    command: Command,
    _color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Check { manifest } => {
            let manifest = resolve_config(&manifest).manifest()?;
            let report = Verifier::for_host()?.check(&manifest)?;
            let mut value = to_json(&report)?;
            if let Value::Object(map) = &mut value {
                map.insert("ok".to_string(), json!(true));
                if let Some(checked_at) = now_rfc3339() {
                    map.insert("checked_at".to_string(), json!(checked_at));
                }
            }
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Survey { manifest } => {
            let manifest = resolve_config(&manifest).manifest()?;
            let report = Verifier::for_host()?.survey(&manifest);
            let exit_code = report
                .failures()
                .next()
                .and_then(|entry| entry.error_kind)
                .map(to_exit_code)
                .unwrap_or(0);
            emit_json(to_json(&report)?);
            Ok(RunOutcome::with_code(exit_code))
        }
        Command::Resolve { file } => {
            let host = HostEnv::capture()?;
            let plan = SearchPlan::from_host(&host);
            let resolved = plan.resolve(&OsFileProbe, &file);
            let exit_code = if resolved.is_some() {
                0
            } else {
                to_exit_code(ErrorKind::MissingLibrary)
            };
            emit_json(json!({
                "file": file,
                "resolved": to_json(&resolved)?,
                "plan": to_json(plan.dirs())?,
            }));
            Ok(RunOutcome::with_code(exit_code))
        }
        Command::Version { path } => {
            let info = read_image_info(&path)?;
            let mut value = to_json(&info)?;
            if let Value::Object(map) = &mut value {
                map.insert("path".to_string(), json!(path.display().to_string()));
                if let Some(sha256) = ImageVersionSource.fingerprint(&path) {
                    map.insert("sha256".to_string(), json!(sha256));
                }
            }
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Manifest { manifest } => {
            let manifest = resolve_config(&manifest).manifest()?;
            emit_json(to_json(&manifest)?);
            Ok(RunOutcome::ok())
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "physx-shim", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
    }
}

fn resolve_config(args: &ManifestArgs) -> CheckConfig {
    CheckConfig::from_env()
        .with_manifest_path(args.manifest.clone())
        .with_arch(args.arch.map(Arch::from))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode json")
            .with_source(err)
    })
}
