//! # bockos-config
//!
//! The configuration document every boot phase reads.
//!
//! The document is merged from four layers, lowest precedence first:
//! built-in defaults, the persisted file, the cloud metadata blob and
//! `BOCKOS_*` environment overrides. [`ConfigStore`] owns the merged view and
//! is the only way to change it.

#![warn(missing_docs)]

pub mod document;
pub mod init;
pub mod merge;
pub mod spec;
pub mod store;

pub use document::{CONSOLE_SLOT, Config, DEFAULT_CONSOLE, EngineConfig, SystemEngineConfig};
pub use init::{InitFunc, run_init_funcs};
pub use spec::ContainerSpec;
pub use store::ConfigStore;
