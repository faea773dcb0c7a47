// Core modules implementing library resolution, image metadata, and disposal.
pub mod config;
pub mod error;
pub mod host;
pub mod image;
pub mod lifecycle;
pub mod manifest;
pub mod search;
pub mod verify;
pub mod version;
