//! # bockos-common
//!
//! Shared types for the bockos init system.
//!
//! This crate provides functionality used by every bockos crate:
//! - The error taxonomy shared by the boot phases
//! - Standard filesystem paths and boot sentinels

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{BockOsError, BockOsResult};
pub use paths::OsPaths;
