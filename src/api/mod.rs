//! Purpose: Define the stable public Rust API boundary for the shim.
//! Exports: Verifier, manifest, image-metadata, and disposal-contract types.
//! Role: Public, additive-only surface; hides the internal module layout.
//! Invariants: This module is the only public path to core primitives.
//! Invariants: `check` is the zero-argument startup entry point.

pub use crate::core::config::{CheckConfig, LOG_ENV, MANIFEST_ENV};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::host::{HostEnv, PATH_LIST_SEPARATOR, sanitize_env_value, split_path_list};
pub use crate::core::image::{ImageFormat, ImageInfo, Machine, parse_image_info, read_image_info};
pub use crate::core::lifecycle::{
    DisposeEvent, DisposePhase, Disposable, Lifecycle, Observer, ObserverError, Release,
    Subscription,
};
pub use crate::core::manifest::{
    Arch, CUDA_DLL_VERSION, LibraryDescriptor, Manifest, PHYSX_DEVICE_DLL_VERSION,
    PHYSX_DLL_VERSION,
};
pub use crate::core::search::{FileProbe, OsFileProbe, Resolved, SearchDir, SearchOrigin, SearchPlan};
pub use crate::core::verify::{
    CheckReport, ImageVersionSource, LibraryCheck, SurveyEntry, SurveyReport, SurveyStatus,
    Verifier, VersionSource, check,
};
pub use crate::core::version::FileVersion;
