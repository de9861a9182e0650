//! Error types for the bridging layer.

use crate::registry::ObjectClass;
use serde::{Deserialize, Serialize};

/// Everything that can go wrong on the host side of the boundary.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum BridgeError {
    /// Invalid path or value shape while encoding/decoding boundary data.
    #[error("marshalling error: {reason}")]
    Marshalling { reason: String },

    /// A native call was attempted through a disposed wrapper. Always a
    /// lifetime bug in the caller; never swallowed.
    #[error("use after free: {class:?} handle {handle} is already disposed")]
    UseAfterFree { class: ObjectClass, handle: u32 },

    /// Handle bookkeeping violation (invalid or duplicate native handle).
    #[error("registry error: {reason}")]
    Registry { reason: String },

    /// The module reported an internal error code, decoded into a message
    /// where its error table allows.
    #[error("module fault {code}: {message}")]
    ModuleFault { code: i32, message: String },

    /// The expected rejection reason of a superseded or stopped animation
    /// request. Not a defect.
    #[error("animation canceled")]
    Canceled,

    /// A bridging operation was attempted before the module finished
    /// loading.
    #[error("chart is not initialized; the module has not finished loading")]
    NotInitialized,

    /// A bridging operation was attempted after `detach()`.
    #[error("chart is detached")]
    Detached,
}

impl BridgeError {
    pub fn marshalling(reason: impl Into<String>) -> Self {
        Self::Marshalling {
            reason: reason.into(),
        }
    }

    /// True for the one rejection reason that is expected behavior rather
    /// than a defect.
    #[inline]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Coarse category for logging.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Marshalling { .. } => "marshalling",
            Self::UseAfterFree { .. } | Self::Registry { .. } => "lifetime",
            Self::ModuleFault { .. } => "module",
            Self::Canceled => "cancellation",
            Self::NotInitialized | Self::Detached => "lifecycle",
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Marshalling {
            reason: err.to_string(),
        }
    }
}

impl From<plotwire_module_api::TableError> for BridgeError {
    fn from(err: plotwire_module_api::TableError) -> Self {
        Self::Marshalling {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_not_a_defect() {
        assert!(BridgeError::Canceled.is_cancellation());
        assert!(!BridgeError::NotInitialized.is_cancellation());
    }

    #[test]
    fn categories() {
        let err = BridgeError::UseAfterFree {
            class: ObjectClass::Snapshot,
            handle: 7,
        };
        assert_eq!(err.category(), "lifetime");
        assert_eq!(BridgeError::marshalling("bad leaf").category(), "marshalling");
    }
}
