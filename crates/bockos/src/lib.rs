//! # bockos
//!
//! Init system for an OS whose services all run in containers.
//!
//! - [`init`]: PID 1, starting the system engine and booting
//! - [`sysinit`]: the ordered boot phases (images, containers, sync)
//! - [`boot`]: the engine launcher run inside the engine container
//! - [`console_init`]: the console container entrypoint
//! - [`switch`]: changing the console at runtime
//! - [`reaper`]: zombie collection

#![warn(missing_docs)]

pub mod boot;
pub mod cli;
pub mod console_init;
pub mod flavor;
pub mod init;
pub mod reaper;
pub mod switch;
pub mod sysinit;
