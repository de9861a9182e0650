//! The single error shape the module can raise across the boundary.

use serde::{Deserialize, Serialize};

/// A fault reported by the compute module. The boundary carries nothing but
/// an integer code; the bridge decodes it into a message via
/// [`ChartModule::error_message`](crate::module::ChartModule::error_message).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[error("module error code {code}")]
pub struct ModuleError {
    pub code: i32,
}

impl ModuleError {
    #[inline]
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}
