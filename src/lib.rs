//! Purpose: Interop shim crate guarding the PhysX native runtime for managed wrappers.
//! Exports: `api` (verifier, manifests, image metadata, disposal contract) and `abi` (C surface).
//! Role: Library backing the `physx-shim` CLI and the cdylib loaded by the managed host.
//! Invariants: The crate inspects native library files; it never loads or calls into them.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod abi;
pub mod api;
mod core;
#[doc(hidden)]
pub mod testkit;
