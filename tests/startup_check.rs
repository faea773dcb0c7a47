// Startup entry points read process environment, so this suite holds a single test.
use std::ptr;

use physx_shim::abi::{pxs_check, pxs_error, pxs_error_free, pxs_error_kind};
use physx_shim::api::{Arch, FileVersion, SearchOrigin, check};
use physx_shim::testkit::write_library;

#[test]
fn rust_and_c_startup_checks_honor_manifest_env() {
    let libs = tempfile::tempdir().expect("tempdir");
    write_library(libs.path(), "StartupOnly.dll", FileVersion::new(1, 0, 0, 7)).expect("write");
    let manifest = libs.path().join("startup.json");
    std::fs::write(
        &manifest,
        r#"{"arch":"x86","libraries":[{"file":"StartupOnly.dll","version":"1.0.0.7"}]}"#,
    )
    .expect("write manifest");

    // Only this test runs in the process, so mutating the environment is sound.
    unsafe {
        std::env::set_var("PHYSX_SHIM_MANIFEST", &manifest);
        std::env::set_var("PATH", libs.path());
        std::env::remove_var("WINDIR");
    }

    let report = check().expect("rust check");
    assert_eq!(report.arch, Arch::X86);
    assert_eq!(report.libraries.len(), 1);
    assert_eq!(report.libraries[0].origin, SearchOrigin::PathEntry { index: 0 });

    let mut err: *mut pxs_error = ptr::null_mut();
    assert_eq!(pxs_check(&mut err), 0);
    assert!(err.is_null());

    write_library(libs.path(), "StartupOnly.dll", FileVersion::new(1, 0, 0, 8)).expect("write");
    let rust_err = check().expect_err("mismatch");
    assert_eq!(pxs_check(&mut err), -1);
    assert_eq!(pxs_error_kind(err), 4);
    assert_eq!(
        physx_shim::api::to_exit_code(rust_err.kind()),
        pxs_error_kind(err)
    );
    pxs_error_free(err);
}
