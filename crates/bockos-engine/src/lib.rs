//! # bockos-engine
//!
//! Everything that talks to the container engine during boot:
//! - [`convert`]: declarative [`ContainerSpec`](bockos_config::ContainerSpec)
//!   to engine-native create/host configuration
//! - [`client`]: the [`Engine`] trait and its Unix-socket implementation
//! - [`lifecycle`]: one container from image import to exit
//! - [`images`]: bulk loading of image archives with import stamps
//! - [`testing`]: a recording in-memory engine for tests

#![warn(missing_docs)]

pub mod client;
pub mod convert;
pub mod images;
pub mod lifecycle;
pub mod reference;
pub mod testing;
pub mod types;

pub use client::{Attachment, DockerEngine, Engine, ExistingContainer, wait_for_engine};
pub use convert::{convert, substitute};
pub use lifecycle::{
    ContainerHandle, LifecycleManager, LifecycleState, Lookup, StartOutcome, stdin_is_tty,
};
pub use reference::ImageRef;
pub use types::{CreateConfig, HostConfig};
