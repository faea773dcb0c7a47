//! Purpose: C ABI bridge for the managed host (libphysx_shim).
//! Exports: C-callable startup check, lifecycle handles, and error helpers.
//! Role: Stable ABI surface the managed wrapper calls before touching PhysX.
//! Invariants: Opaque handles; explicit free functions; 0 is success, -1 is failure.
//! Invariants: Error kinds map 1:1 with `api::to_exit_code`.
#![allow(non_camel_case_types)]
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use crate::api::{
    DisposeEvent, DisposePhase, Disposable, Error, ErrorKind, Lifecycle, Manifest,
    ObserverError, Release, Subscription, Verifier, check, to_exit_code,
};
use std::ffi::{CStr, CString, c_void};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;

pub type pxs_release_fn = extern "C" fn(user_data: *mut c_void);
pub type pxs_observer_fn = extern "C" fn(user_data: *mut c_void, phase: i32) -> i32;

pub const PXS_PHASE_DISPOSING: i32 = 0;
pub const PXS_PHASE_DISPOSED: i32 = 1;

pub struct pxs_lifecycle {
    inner: Lifecycle<CallbackRelease>,
}

#[repr(C)]
pub struct pxs_error {
    kind: i32,
    message: *mut c_char,
    path: *mut c_char,
    library: *mut c_char,
    found: *mut c_char,
    required: *mut c_char,
}

struct CallbackRelease {
    callback: Option<pxs_release_fn>,
    user_data: *mut c_void,
}

// The host owns `user_data` and promises it may be released from any thread.
unsafe impl Send for CallbackRelease {}

impl Release for CallbackRelease {
    fn release(self) {
        if let Some(callback) = self.callback {
            callback(self.user_data);
        }
    }
}

struct CallbackObserver {
    callback: pxs_observer_fn,
    user_data: *mut c_void,
}

unsafe impl Send for CallbackObserver {}
unsafe impl Sync for CallbackObserver {}

impl CallbackObserver {
    fn call(&self, event: &DisposeEvent<'_>) -> Result<(), ObserverError> {
        let phase = match event.phase {
            DisposePhase::Disposing => PXS_PHASE_DISPOSING,
            DisposePhase::Disposed => PXS_PHASE_DISPOSED,
        };
        match (self.callback)(self.user_data, phase) {
            0 => Ok(()),
            code => Err(ObserverError::from(format!(
                "{} observer returned {code}",
                event.phase.as_str()
            ))),
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn pxs_check(out_err: *mut *mut pxs_error) -> i32 {
    finish(check().map(|_| ()), out_err)
}

#[unsafe(no_mangle)]
pub extern "C" fn pxs_check_manifest(
    manifest_path: *const c_char,
    out_err: *mut *mut pxs_error,
) -> i32 {
    let path = match borrow_str(manifest_path, "manifest_path") {
        Ok(path) => PathBuf::from(path),
        Err(err) => return fail(out_err, err),
    };
    let result = Manifest::load(&path).and_then(|manifest| run_check(&manifest));
    finish(result, out_err)
}

#[unsafe(no_mangle)]
pub extern "C" fn pxs_lifecycle_new(
    label: *const c_char,
    release: Option<pxs_release_fn>,
    user_data: *mut c_void,
    out_lifecycle: *mut *mut pxs_lifecycle,
    out_err: *mut *mut pxs_error,
) -> i32 {
    if out_lifecycle.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_lifecycle is null"),
        );
    }
    let label = if label.is_null() {
        "native object".to_string()
    } else {
        match borrow_str(label, "label") {
            Ok(label) => label.to_string(),
            Err(err) => return fail(out_err, err),
        }
    };
    let handle = Box::new(pxs_lifecycle {
        inner: Lifecycle::new(
            label,
            CallbackRelease {
                callback: release,
                user_data,
            },
        ),
    });
    unsafe {
        *out_lifecycle = Box::into_raw(handle);
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn pxs_lifecycle_on_disposing(
    lifecycle: *mut pxs_lifecycle,
    observer: Option<pxs_observer_fn>,
    user_data: *mut c_void,
    out_id: *mut u64,
    out_err: *mut *mut pxs_error,
) -> i32 {
    subscribe(lifecycle, DisposePhase::Disposing, observer, user_data, out_id, out_err)
}

#[unsafe(no_mangle)]
pub extern "C" fn pxs_lifecycle_on_disposed(
    lifecycle: *mut pxs_lifecycle,
    observer: Option<pxs_observer_fn>,
    user_data: *mut c_void,
    out_id: *mut u64,
    out_err: *mut *mut pxs_error,
) -> i32 {
    subscribe(lifecycle, DisposePhase::Disposed, observer, user_data, out_id, out_err)
}

/// Returns 1 when the observer was removed, 0 when unknown, -1 on a null handle.
#[unsafe(no_mangle)]
pub extern "C" fn pxs_lifecycle_unsubscribe(lifecycle: *mut pxs_lifecycle, id: u64) -> i32 {
    match borrow_lifecycle(lifecycle) {
        Some(handle) => i32::from(handle.inner.unsubscribe(Subscription::from_id(id))),
        None => -1,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn pxs_lifecycle_dispose(
    lifecycle: *mut pxs_lifecycle,
    out_err: *mut *mut pxs_error,
) -> i32 {
    let Some(handle) = borrow_lifecycle(lifecycle) else {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("lifecycle is null"),
        );
    };
    finish(handle.inner.dispose(), out_err)
}

/// Returns 1 once disposed, 0 while live, -1 on a null handle.
#[unsafe(no_mangle)]
pub extern "C" fn pxs_lifecycle_is_disposed(lifecycle: *mut pxs_lifecycle) -> i32 {
    match borrow_lifecycle(lifecycle) {
        Some(handle) => i32::from(handle.inner.is_disposed()),
        None => -1,
    }
}

/// Disposes (if still live) and frees the handle.
#[unsafe(no_mangle)]
pub extern "C" fn pxs_lifecycle_free(lifecycle: *mut pxs_lifecycle) {
    if lifecycle.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(lifecycle));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn pxs_error_kind(err: *const pxs_error) -> i32 {
    if err.is_null() {
        return 0;
    }
    unsafe { (*err).kind }
}

#[unsafe(no_mangle)]
pub extern "C" fn pxs_error_message(err: *const pxs_error) -> *const c_char {
    if err.is_null() {
        return ptr::null();
    }
    unsafe { (*err).message }
}

#[unsafe(no_mangle)]
pub extern "C" fn pxs_error_free(err: *mut pxs_error) {
    if err.is_null() {
        return;
    }
    unsafe {
        let err = Box::from_raw(err);
        for field in [err.message, err.path, err.library, err.found, err.required] {
            if !field.is_null() {
                drop(CString::from_raw(field));
            }
        }
    }
}

fn run_check(manifest: &Manifest) -> Result<(), Error> {
    Verifier::for_host()?.check(manifest).map(|_| ())
}

fn subscribe(
    lifecycle: *mut pxs_lifecycle,
    phase: DisposePhase,
    observer: Option<pxs_observer_fn>,
    user_data: *mut c_void,
    out_id: *mut u64,
    out_err: *mut *mut pxs_error,
) -> i32 {
    let Some(handle) = borrow_lifecycle(lifecycle) else {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("lifecycle is null"),
        );
    };
    let Some(callback) = observer else {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("observer is null"),
        );
    };
    let observer = CallbackObserver {
        callback,
        user_data,
    };
    let boxed = Box::new(move |event: &DisposeEvent<'_>| observer.call(event));
    let subscription = match phase {
        DisposePhase::Disposing => handle.inner.on_disposing(boxed),
        DisposePhase::Disposed => handle.inner.on_disposed(boxed),
    };
    if !out_id.is_null() {
        unsafe {
            *out_id = subscription.id();
        }
    }
    0
}

fn borrow_lifecycle<'a>(lifecycle: *mut pxs_lifecycle) -> Option<&'a pxs_lifecycle> {
    if lifecycle.is_null() {
        return None;
    }
    unsafe { Some(&*lifecycle) }
}

fn borrow_str<'a>(value: *const c_char, name: &str) -> Result<&'a str, Error> {
    if value.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!("{name} is null")));
    }
    unsafe { CStr::from_ptr(value) }
        .to_str()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message(format!("{name} is not valid UTF-8")))
}

fn finish(result: Result<(), Error>, out_err: *mut *mut pxs_error) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

fn fail(out_err: *mut *mut pxs_error, err: Error) -> i32 {
    if out_err.is_null() {
        return -1;
    }
    let error = Box::new(pxs_error {
        kind: to_exit_code(err.kind()),
        message: to_c_string(err.message().unwrap_or("")),
        path: err
            .path()
            .map(|path| to_c_string(path.to_string_lossy().as_ref()))
            .unwrap_or(ptr::null_mut()),
        library: err.library().map(to_c_string).unwrap_or(ptr::null_mut()),
        found: err
            .found()
            .map(|version| to_c_string(&version.to_string()))
            .unwrap_or(ptr::null_mut()),
        required: err
            .required()
            .map(|version| to_c_string(&version.to_string()))
            .unwrap_or(ptr::null_mut()),
    });
    unsafe {
        *out_err = Box::into_raw(error);
    }
    -1
}

fn to_c_string(input: &str) -> *mut c_char {
    CString::new(input)
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}
