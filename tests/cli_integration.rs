// CLI integration tests: the binary resolves fixture libraries through cwd, PATH and WINDIR.
use std::path::Path;
use std::process::{Command, Output};

use physx_shim::api::{Arch, FileVersion, Manifest};
use physx_shim::testkit::write_library;
use serde_json::Value;

fn cmd(cwd: &Path) -> Command {
    let exe = env!("CARGO_BIN_EXE_physx-shim");
    let mut command = Command::new(exe);
    command
        .current_dir(cwd)
        .env("PATH", "")
        .env_remove("WINDIR")
        .env_remove("PHYSX_SHIM_MANIFEST")
        .env_remove("PHYSX_SHIM_LOG");
    command
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn stdout_json(output: &Output) -> Value {
    parse_json(std::str::from_utf8(&output.stdout).expect("utf8").trim())
}

fn stderr_error(output: &Output) -> Value {
    let text = String::from_utf8_lossy(&output.stderr);
    let line = text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .expect("stderr line");
    let value = parse_json(line);
    value.get("error").cloned().expect("error object")
}

fn install_builtin(dir: &Path, arch: Arch) {
    for descriptor in Manifest::builtin(arch).libraries {
        write_library(dir, &descriptor.file_name, descriptor.required).expect("write library");
    }
}

#[test]
fn check_passes_when_every_x64_library_matches() {
    let work = tempfile::tempdir().expect("tempdir");
    install_builtin(work.path(), Arch::X64);

    let output = cmd(work.path())
        .args(["check", "--arch", "x64"])
        .output()
        .expect("check");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["ok"], true);
    assert_eq!(json["arch"], "x64");
    assert!(json["checked_at"].as_str().is_some());
    let libraries = json["libraries"].as_array().expect("libraries");
    assert_eq!(libraries.len(), 6);
    assert_eq!(libraries[0]["file"], "PhysXCore64.dll");
    assert_eq!(libraries[0]["version"], "2.8.4.6");
    assert_eq!(libraries[0]["origin"]["kind"], "current_directory");
}

#[test]
fn check_reports_missing_library_with_exit_code() {
    let work = tempfile::tempdir().expect("tempdir");

    let output = cmd(work.path())
        .args(["check", "--arch", "x64"])
        .output()
        .expect("check");
    assert_eq!(output.status.code(), Some(3));
    let err = stderr_error(&output);
    assert_eq!(err["kind"], "MissingLibrary");
    assert_eq!(err["message"], "PhysX library \"PhysXCore64.dll\" is missing.");
    assert_eq!(err["library"], "PhysXCore64.dll");
}

#[test]
fn check_reports_version_mismatch_from_manifest_file() {
    let work = tempfile::tempdir().expect("tempdir");
    let libs = tempfile::tempdir().expect("tempdir");
    write_library(libs.path(), "PhysXDevice64.dll", FileVersion::new(1, 2, 3, 4)).expect("write");
    let manifest = work.path().join("physx.json");
    std::fs::write(
        &manifest,
        r#"{"arch":"x64","libraries":[{"file":"PhysXDevice64.dll","version":"1.2.3.5"}]}"#,
    )
    .expect("write manifest");

    let output = cmd(work.path())
        .env("PATH", libs.path())
        .args(["check", "--manifest", manifest.to_str().unwrap()])
        .output()
        .expect("check");
    assert_eq!(output.status.code(), Some(4));
    let err = stderr_error(&output);
    assert_eq!(err["kind"], "VersionMismatch");
    let message = err["message"].as_str().expect("message");
    assert!(message.contains("PhysXDevice64.dll"));
    assert!(message.contains("1.2.3.4"));
    assert!(message.contains("1.2.3.5"));
    assert_eq!(err["found"], "1.2.3.4");
    assert_eq!(err["required"], "1.2.3.5");
}

#[test]
fn manifest_env_var_is_used_when_flag_is_absent() {
    let work = tempfile::tempdir().expect("tempdir");
    write_library(work.path(), "Only.dll", FileVersion::new(3, 1, 0, 0)).expect("write");
    let manifest = work.path().join("only.json");
    std::fs::write(
        &manifest,
        r#"{"arch":"x86","libraries":[{"file":"Only.dll","version":"3.1.0.0"}]}"#,
    )
    .expect("write manifest");

    let output = cmd(work.path())
        .env("PHYSX_SHIM_MANIFEST", &manifest)
        .arg("check")
        .output()
        .expect("check");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["arch"], "x86");
    assert_eq!(json["libraries"].as_array().expect("libraries").len(), 1);
}

#[test]
fn arch_flag_outranks_manifest_env_var() {
    let work = tempfile::tempdir().expect("tempdir");
    install_builtin(work.path(), Arch::X86);
    let manifest = work.path().join("x64-only.json");
    std::fs::write(
        &manifest,
        r#"{"arch":"x64","libraries":[{"file":"PhysXCore64.dll","version":"2.8.4.6"}]}"#,
    )
    .expect("write manifest");

    let output = cmd(work.path())
        .env("PHYSX_SHIM_MANIFEST", &manifest)
        .args(["check", "--arch", "x86"])
        .output()
        .expect("check");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["arch"], "x86");
    assert_eq!(json["libraries"].as_array().expect("libraries").len(), 5);

    let listed = cmd(work.path())
        .env("PHYSX_SHIM_MANIFEST", &manifest)
        .args(["manifest", "--arch", "x86"])
        .output()
        .expect("manifest");
    assert_eq!(stdout_json(&listed)["arch"], "x86");
}

#[test]
fn quoted_windir_is_sanitized_before_search() {
    let work = tempfile::tempdir().expect("tempdir");
    let windir = tempfile::tempdir().expect("tempdir");
    install_builtin(windir.path(), Arch::X86);
    let quoted = format!("  \"{}\"  ", windir.path().display());

    let output = cmd(work.path())
        .env("WINDIR", quoted)
        .args(["check", "--arch", "x86"])
        .output()
        .expect("check");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["libraries"][0]["origin"]["kind"], "windows_directory");
}

#[test]
fn survey_reports_every_library_and_fails_on_first_problem() {
    let work = tempfile::tempdir().expect("tempdir");
    install_builtin(work.path(), Arch::X86);
    write_library(work.path(), "PhysXCore.dll", FileVersion::new(2, 8, 4, 5)).expect("write");
    std::fs::remove_file(work.path().join("PhysXLoader.dll")).expect("remove");

    let output = cmd(work.path())
        .args(["survey", "--arch", "x86"])
        .output()
        .expect("survey");
    assert_eq!(output.status.code(), Some(4));
    let json = stdout_json(&output);
    assert_eq!(json["ok"], false);
    let entries = json["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[0]["status"], "version_mismatch");
    assert_eq!(entries[0]["found"], "2.8.4.5");
    assert_eq!(entries[1]["status"], "ok");
    assert_eq!(entries[1]["sha256"].as_str().expect("sha256").len(), 64);
    assert_eq!(entries[4]["status"], "missing");
    assert!(entries[4].get("path").is_none());
    assert_eq!(entries[0]["error_kind"], "VersionMismatch");
    assert_eq!(entries[4]["error_kind"], "MissingLibrary");
    assert!(entries[1].get("error_kind").is_none());
}

#[test]
fn resolve_walks_path_entries_in_order() {
    let work = tempfile::tempdir().expect("tempdir");
    let first = tempfile::tempdir().expect("tempdir");
    let second = tempfile::tempdir().expect("tempdir");
    write_library(second.path(), "PhysXLoader64.dll", FileVersion::new(2, 8, 4, 6)).expect("write");
    let path_var = std::env::join_paths([first.path(), second.path()]).expect("join paths");

    let output = cmd(work.path())
        .env("PATH", path_var)
        .args(["resolve", "PhysXLoader64.dll"])
        .output()
        .expect("resolve");
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["resolved"]["origin"]["kind"], "path_entry");
    assert_eq!(json["resolved"]["origin"]["index"], 1);
    assert!(json["plan"].as_array().expect("plan").len() >= 4);

    let missing = cmd(work.path())
        .args(["resolve", "Nope.dll"])
        .output()
        .expect("resolve");
    assert_eq!(missing.status.code(), Some(3));
    assert!(stdout_json(&missing)["resolved"].is_null());
}

#[test]
fn version_prints_image_info_and_rejects_non_images() {
    let work = tempfile::tempdir().expect("tempdir");
    let dll = write_library(work.path(), "NxCharacter64.dll", FileVersion::new(2, 8, 4, 6))
        .expect("write");

    let output = cmd(work.path())
        .args(["version", dll.to_str().unwrap()])
        .output()
        .expect("version");
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["file_version"], "2.8.4.6");
    assert_eq!(json["machine"], "x64");
    assert_eq!(json["format"], "pe32+");

    let text = work.path().join("notes.txt");
    std::fs::write(&text, b"not an image").expect("write");
    let bad = cmd(work.path())
        .args(["version", text.to_str().unwrap()])
        .output()
        .expect("version");
    assert_eq!(bad.status.code(), Some(6));
    let err = stderr_error(&bad);
    assert_eq!(err["kind"], "Corrupt");
    assert!(err["path"].as_str().expect("path").ends_with("notes.txt"));
}

#[test]
fn manifest_prints_builtin_table() {
    let work = tempfile::tempdir().expect("tempdir");
    let output = cmd(work.path())
        .args(["manifest", "--arch", "x86"])
        .output()
        .expect("manifest");
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["arch"], "x86");
    let files = json["libraries"]
        .as_array()
        .expect("libraries")
        .iter()
        .map(|entry| entry["file"].as_str().expect("file").to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        files,
        [
            "PhysXCore.dll",
            "PhysXCooking.dll",
            "cudart32_30_9.dll",
            "PhysXDevice.dll",
            "PhysXLoader.dll"
        ]
    );
}

#[test]
fn invalid_arguments_are_usage_errors() {
    let work = tempfile::tempdir().expect("tempdir");
    let output = cmd(work.path())
        .args(["check", "--arch", "arm"])
        .output()
        .expect("check");
    assert_eq!(output.status.code(), Some(2));
    let err = stderr_error(&output);
    assert_eq!(err["kind"], "Usage");
    assert!(err["hint"].as_str().expect("hint").contains("--help"));
}

#[test]
fn completion_generates_script() {
    let work = tempfile::tempdir().expect("tempdir");
    let output = cmd(work.path())
        .args(["completion", "bash"])
        .output()
        .expect("completion");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("physx-shim"));
}
