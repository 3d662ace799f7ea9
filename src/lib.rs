//! Host bridge for native ZVMC virtual machines.
//!
//! A VM module is loaded through its C ABI ([`Vm::load`]), and executed
//! against an embedder-supplied [`HostContext`] ([`Vm::execute`]).  While
//! code runs, the VM reaches the host through a table of `extern "C"`
//! callbacks; the host context itself never crosses the boundary, only an
//! opaque handle to it does.
//!
//! # Safety
//!
//! The bridge trusts the loaded module to honour the ABI: pointers it passes
//! to callbacks must be valid for the duration of the callback, and every
//! result it returns must be released exactly once.  Protocol violations
//! (an unknown handle, an undefined call kind) are fatal.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod config;
mod error;
mod ffi_types;
mod host;
mod loader;
mod marshal;
mod registry;
mod result;
mod types;
mod vm;

pub use config::*;
pub use error::*;
pub use ffi_types::*;
pub use host::*;
pub use loader::*;
pub use marshal::*;
pub use registry::*;
pub use result::*;
pub use types::*;
pub use vm::*;
