//! plotwire-module-api: boundary contract for the chart compute module.
//!
//! The compute module is an opaque, non-reentrant engine reachable only
//! through a flat function table. This crate pins down that boundary for
//! both sides: the handle/pointer newtypes crossing it, the `ChartModule`
//! trait (one method per table entry), the integer-coded `ModuleError`,
//! and the host-side `FunctionTable` the module invokes callbacks through.

pub mod error;
pub mod handle;
pub mod module;
pub mod table;

pub use error::ModuleError;
pub use handle::{CallbackSlot, ModulePtr, NativeHandle, RawHandle};
pub use module::{ChartModule, RenderControl};
pub use table::{FunctionTable, HostCallback, TableError};

/// Module-call result type.
pub type Result<T> = core::result::Result<T, ModuleError>;
